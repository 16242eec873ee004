//! The relay itself: protocol state machine, presence signal, bot commands,
//! and the dispatcher that ties them to a chat channel.

pub mod bot;
pub mod command;
pub mod presence;
pub mod protocol;

pub use bot::Bot;
pub use command::Command;
pub use presence::{ChannelPresence, PresenceNotifier, PresenceSignal};
pub use protocol::{ChatStatus, Relay, resolve_project, session_name};
