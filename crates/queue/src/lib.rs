pub mod broker;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod sqs;

pub use broker::{QueueHealth, TaskBroker};
pub use envelope::{MessageId, TaskEnvelope, ENVELOPE_VERSION};
pub use error::QueueError;
pub use memory::InMemoryBroker;
pub use sqs::SqsBroker;
