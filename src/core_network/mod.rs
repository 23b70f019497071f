pub mod network;
pub mod transport;

pub use network::Server;
pub use transport::Connection;
