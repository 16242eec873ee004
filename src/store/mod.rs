//! Persistence layer: the durable chat → project/session mapping.

pub mod mappings;

pub use mappings::{ChatBinding, MappingStore, ThreadSession, DEFAULT_THREAD};
