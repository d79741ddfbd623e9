pub mod partition;
pub mod reader;

pub use partition::{PartitionSet, SourceError};
pub use reader::{PartitionReader, ReaderError};
