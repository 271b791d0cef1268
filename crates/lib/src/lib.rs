//! WhatsApp relay core library: webhook gateway, conversation relay, history stores,
//! completion backend and outbound channel used by the CLI.

pub mod agent;
pub mod channels;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod history;
pub mod init;
pub mod llm;
pub mod prompt;
pub mod relay;
pub mod scheduling;
