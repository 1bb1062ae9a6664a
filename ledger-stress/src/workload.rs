//! Random ledger entry generator.

use ledger_accounting::LedgerEntry;
use rand::Rng;

/// Label on every generated entry
pub const ENTRY_DESCRIPTION: &str = "Random transaction up to 700€";

/// Generates debit batches for the transactor workers.
///
/// Batch sums are not capped by the current balance: overdrafts are how the
/// insufficient-funds rollback path gets exercised.
#[derive(Debug, Clone)]
pub struct EntryGenerator {
    /// Fewest entries in a batch
    min_entries: usize,

    /// Most entries in a batch (inclusive)
    max_entries: usize,

    /// Exclusive upper bound of an entry amount (cents)
    max_amount_cents: i64,
}

impl Default for EntryGenerator {
    fn default() -> Self {
        Self {
            min_entries: 2,
            max_entries: 6,
            max_amount_cents: 70_000,
        }
    }
}

impl EntryGenerator {
    /// Generator with the default batch shape
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce one batch for an account currently holding `_balance_cents`
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R, _balance_cents: i64) -> Vec<LedgerEntry> {
        let count = rng.gen_range(self.min_entries..=self.max_entries);
        (0..count)
            .map(|_| {
                LedgerEntry::new(
                    rng.gen_range(0..self.max_amount_cents),
                    ENTRY_DESCRIPTION,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_same_seed_same_batch() {
        let generator = EntryGenerator::new();
        let first = generator.generate(&mut StdRng::seed_from_u64(7), 100_000);
        let second = generator.generate(&mut StdRng::seed_from_u64(7), 100_000);
        assert_eq!(first, second);
    }

    #[test]
    fn test_batch_sizes_cover_full_range() {
        let generator = EntryGenerator::new();
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = [false; 7];
        for _ in 0..1_000 {
            seen[generator.generate(&mut rng, 0).len()] = true;
        }
        assert_eq!(seen, [false, false, true, true, true, true, true]);
    }

    #[test]
    fn test_generates_overdrafts() {
        let generator = EntryGenerator::new();
        let mut rng = StdRng::seed_from_u64(3);
        let overdrafts = (0..200)
            .map(|_| generator.generate(&mut rng, 1_000))
            .filter(|batch| batch.iter().map(LedgerEntry::amount_cents).sum::<i64>() > 1_000)
            .count();
        assert!(overdrafts > 0);
    }

    proptest! {
        #[test]
        fn prop_entries_within_bounds(seed in any::<u64>(), balance in 0i64..1_000_000) {
            let batch = EntryGenerator::new().generate(&mut StdRng::seed_from_u64(seed), balance);
            prop_assert!((2..=6).contains(&batch.len()));
            for entry in &batch {
                prop_assert!((0..70_000).contains(&entry.amount_cents()));
                prop_assert_eq!(entry.description(), ENTRY_DESCRIPTION);
            }
        }
    }
}
