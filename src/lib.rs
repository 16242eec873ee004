//! Agent Relay: bridges a Telegram chat to a conversational agent's HTTP API.

pub mod agent;
pub mod channels;
pub mod config;
pub mod error;
pub mod relay;
pub mod store;
