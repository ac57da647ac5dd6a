//! Replica selection.
//!
//! Every read picks its replica independently: a fresh draw per call and no
//! shared cursor, so selection needs no synchronization. Health-aware or
//! weighted policies belong in a wrapper implementing [`ReplicaSelector`].

use rand::Rng;

/// Chooses an index into a non-empty reader list.
pub trait ReplicaSelector: Send + Sync {
    /// Return a value in `[0, len)`. `len` is never zero.
    fn select(&self, len: usize) -> usize;
}

/// Uniform random choice over the reader list.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelector;

impl ReplicaSelector for RandomSelector {
    fn select(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Pick one reader.
///
/// # Panics
///
/// Panics on an empty slice. Cluster initialization refuses configurations
/// without readers, so reaching this with none is a bug in the caller.
pub fn select_reader<'a, T>(selector: &dyn ReplicaSelector, readers: &'a [T]) -> &'a T {
    assert!(!readers.is_empty(), "select_reader called with no readers");
    let index = selector.select(readers.len());
    &readers[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_in_range() {
        for len in 1..=8 {
            for _ in 0..1_000 {
                assert!(RandomSelector.select(len) < len);
            }
        }
    }

    #[test]
    fn approximately_uniform() {
        const K: usize = 4;
        const SAMPLES: usize = 40_000;

        let mut counts = [0usize; K];
        for _ in 0..SAMPLES {
            counts[RandomSelector.select(K)] += 1;
        }

        // Expected 10_000 each; 5% tolerance is many standard deviations wide
        let expected = SAMPLES / K;
        for (index, count) in counts.iter().enumerate() {
            let deviation = count.abs_diff(expected);
            assert!(
                deviation < expected / 20,
                "reader {} chosen {} times, expected ~{}",
                index,
                count,
                expected
            );
        }
    }

    #[test]
    fn single_reader_always_chosen() {
        let readers = ["only"];
        for _ in 0..100 {
            assert_eq!(*select_reader(&RandomSelector, &readers), "only");
        }
    }

    #[test]
    #[should_panic(expected = "no readers")]
    fn empty_reader_list_is_a_bug() {
        let readers: [u8; 0] = [];
        select_reader(&RandomSelector, &readers);
    }

    struct Always(usize);

    impl ReplicaSelector for Always {
        fn select(&self, _len: usize) -> usize {
            self.0
        }
    }

    #[test]
    fn custom_selector_decides() {
        let readers = ["a", "b", "c"];
        assert_eq!(*select_reader(&Always(2), &readers), "c");
    }
}
