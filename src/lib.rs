//! Sandboxed remote file access over a record-marked TCP stream.
//!
//! The server ([`core_network::Server`]) confines every session to one base
//! directory; the client ([`core_client::Client`]) issues one command per
//! exchange and drives recursive transfers itself.
pub mod config;
pub mod constants;
pub mod core_cli;
pub mod core_client;
pub mod core_command;
pub mod core_error;
pub mod core_log;
pub mod core_network;
pub mod core_protocol;
pub mod server;
pub mod session;
