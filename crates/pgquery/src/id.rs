//! Row id generation.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of new 64-bit row ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> i64;
}

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_NODE: i64 = (1 << NODE_BITS) - 1;
const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;

/// Custom epoch: 2010-11-04T01:42:54.657Z.
pub const SNOWFLAKE_EPOCH_MS: i64 = 1_288_834_974_657;

/// Snowflake-style generator: 41-bit millisecond timestamp, 10-bit node,
/// 12-bit per-millisecond sequence.
#[derive(Debug)]
pub struct Snowflake {
    node: i64,
    /// (last timestamp, sequence within that millisecond)
    state: Mutex<(i64, i64)>,
}

impl Snowflake {
    /// `node` is masked to 10 bits.
    pub fn new(node: i64) -> Self {
        Self {
            node: node & MAX_NODE,
            state: Mutex::new((0, 0)),
        }
    }

    pub fn node(&self) -> i64 {
        self.node
    }

    fn now_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
            - SNOWFLAKE_EPOCH_MS
    }
}

impl IdGenerator for Snowflake {
    fn next_id(&self) -> i64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (last, sequence) = &mut *state;

        let mut now = Self::now_ms().max(*last);
        if now == *last {
            *sequence = (*sequence + 1) & MAX_SEQUENCE;
            if *sequence == 0 {
                // Sequence exhausted for this millisecond.
                while now <= *last {
                    std::hint::spin_loop();
                    now = Self::now_ms();
                }
            }
        } else {
            *sequence = 0;
        }
        *last = now;

        (now << (NODE_BITS + SEQUENCE_BITS)) | (self.node << SEQUENCE_BITS) | *sequence
    }
}

/// Deterministic ids `start, start + 1, ...`.
#[derive(Debug)]
pub struct SequenceIdGenerator(AtomicI64);

impl SequenceIdGenerator {
    pub fn new(start: i64) -> Self {
        Self(AtomicI64::new(start))
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn next_id(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Process-wide generator (snowflake node 1).
pub fn default_generator() -> Arc<dyn IdGenerator> {
    static DEFAULT: OnceLock<Arc<Snowflake>> = OnceLock::new();
    DEFAULT.get_or_init(|| Arc::new(Snowflake::new(1))).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn snowflake_ids_are_unique_and_increasing() {
        let generator = Snowflake::new(1);
        let ids: Vec<i64> = (0..10_000).map(|_| generator.next_id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
    }

    #[test]
    fn snowflake_embeds_node() {
        let id = Snowflake::new(7).next_id();
        assert_eq!((id >> SEQUENCE_BITS) & MAX_NODE, 7);
        assert!(id > 0);
    }

    #[test]
    fn sequence_generator_counts_up() {
        let generator = SequenceIdGenerator::new(100);
        assert_eq!(generator.next_id(), 100);
        assert_eq!(generator.next_id(), 101);
    }
}
