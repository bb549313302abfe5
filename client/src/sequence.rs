use std::sync::atomic::{AtomicU32, Ordering};

/// Hands out command sequence numbers, cycling through 0..=255.
///
/// The counter itself is wider than a byte and only truncated on the way
/// out, so wrap-around is a plain atomic increment and concurrent callers
/// never observe the same position twice.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    counter: AtomicU32,
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns 0 on the first call after construction.
    pub fn next(&self) -> u8 {
        // 2^32 is a multiple of 256, so the counter wrapping keeps the cycle intact.
        self.counter.fetch_add(1, Ordering::Relaxed) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::thread;

    #[test]
    fn test_starts_at_zero() {
        let sequence = SequenceAllocator::new();
        assert_eq!(sequence.next(), 0);
        assert_eq!(sequence.next(), 1);
        assert_eq!(sequence.next(), 2);
    }

    #[test]
    fn test_wraps_after_255() {
        let sequence = SequenceAllocator::new();
        for expected in 0..=255u8 {
            assert_eq!(sequence.next(), expected);
        }
        assert_eq!(sequence.next(), 0);
        assert_eq!(sequence.next(), 1);
    }

    #[test]
    fn test_concurrent_callers_cover_every_position() {
        const THREADS: usize = 8;
        const CALLS: usize = 512;

        let sequence = SequenceAllocator::new();
        let mut counts: HashMap<u8, usize> = HashMap::new();

        thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| scope.spawn(|| (0..CALLS).map(|_| sequence.next()).collect::<Vec<u8>>()))
                .collect();

            for handle in handles {
                for value in handle.join().unwrap() {
                    *counts.entry(value).or_default() += 1;
                }
            }
        });

        // 8 * 512 calls is exactly 16 full cycles.
        assert_eq!(counts.len(), 256);
        assert!(counts.values().all(|&count| count == THREADS * CALLS / 256));
        assert_eq!(sequence.next(), 0);
    }
}
