//! Unique id generation.
//!
//! The stream accumulator needs locally-unique placeholder ids for tool calls
//! whose real id has not arrived yet.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs with a fixed prefix.
pub struct UuidGenerator {
    prefix: String,
}

impl UuidGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for UuidGenerator {
    fn default() -> Self {
        Self::new("pending_")
    }
}

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        format!("{}{}", self.prefix, Uuid::new_v4().simple())
    }
}

/// Monotonic counter ids, deterministic across runs. Handy in tests.
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{n}", self.prefix)
    }
}
