//! Operation streams: the replayable input format and a random generator.

pub mod operation;
pub mod stream;

pub use operation::{replay, Operation, OperationFile, OperationOutcome, ReplayReport};
pub use stream::{generate_operation_stream, FiatQuote, StreamConfig};
