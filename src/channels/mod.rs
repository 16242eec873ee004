//! Channel abstraction for message I/O.

pub mod channel;
pub mod chunker;
pub mod telegram;

pub use channel::*;
pub use chunker::{deliver, split_message};
pub use telegram::TelegramChannel;

#[cfg(test)]
pub(crate) mod testing;
