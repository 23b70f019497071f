pub mod error;

pub use error::{ClientError, CommandError, ConnectionError, FsFailure};
