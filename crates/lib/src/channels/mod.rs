//! Host transport: inbound message type, the channel trait and registry, and the two built-in
//! channels (webhook and shell). Inbound messages go to the processor; replies come back out
//! through the channel the message arrived on.

mod inbound;
mod registry;
mod shell;
mod webhook;

pub use inbound::InboundMessage;
pub use registry::{ChannelHandle, ChannelRegistry};
pub use shell::{ShellChannel, SHELL_CHANNEL_ID};
pub use webhook::{WebhookChannel, WEBHOOK_CHANNEL_ID};
