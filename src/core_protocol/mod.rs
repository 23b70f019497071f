// Wire format shared by the server session and the client
pub mod codec;
pub mod command;
pub mod entry;

pub use codec::{Chunk, ReceiveSummary, SendSummary};
pub use command::{Command, RawCommand, Verb};
pub use entry::{DirectoryEntry, EntryKind};
