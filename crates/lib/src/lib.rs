//! Chat relay core library: forwards qualifying chat messages to a conversational backend,
//! relays its replies and tracks per-room conversation state. Used by the `relay` CLI.

pub mod backend;
pub mod brain;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod filter;
pub mod gateway;
pub mod init;
pub mod interpret;
pub mod processor;
pub mod router;
pub mod trigger;
