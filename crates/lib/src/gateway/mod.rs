//! Gateway: HTTP ingress for the relay.
//!
//! `GET /` answers a health probe; `POST /messages` queues an inbound chat message for the
//! processor. Replies leave through the webhook channel.

mod server;

pub use server::{app, run_gateway, GatewayState, InboundBody};
