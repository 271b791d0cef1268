//! Gateway: HTTP webhook endpoint for the messaging provider.
//!
//! `GET /webhook` answers the subscription handshake, `POST /webhook` accepts inbound events and
//! hands text messages to the dispatcher, `GET /` is a static identity probe.

mod server;

pub use server::{router, run_gateway, GatewayState};
