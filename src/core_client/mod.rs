//! Client side of the protocol.
//!
//! - [`input`] turns a user line into a [`ClientCommand`] once, at the boundary.
//! - [`dispatcher`] runs one command as one wire exchange.
//! - [`orchestrator`] replicates whole directory trees with many exchanges.
pub mod dispatcher;
pub mod input;
pub mod orchestrator;

pub use dispatcher::Client;
pub use input::ClientCommand;
pub use orchestrator::{Direction, Orchestrator, TransferFailure, TransferReport, TransferTask};
