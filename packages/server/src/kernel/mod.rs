//! Infrastructure: event bus, registries, queue, protocol plumbing.

pub mod clients;
pub mod deps;
pub mod envelope;
pub mod errors;
pub mod event_bus;
pub mod log_relay;
pub mod orchestrator;
pub mod queue;

pub use clients::{ClientRegistry, ClientStatus};
pub use deps::ServerDeps;
pub use envelope::{
    generate_reply_token, Event, EventType, MessageEnvelope, MessageType, ResponseEnvelope,
    ResponseMessage,
};
pub use errors::{ErrorHub, ErrorKind, ErrorRecord, ErrorSeverity};
pub use event_bus::{topic_matches, BusError, BusMessage, EventBus, Subscriber};
pub use log_relay::LogRelay;
pub use orchestrator::MessageOrchestrator;
pub use queue::{JobPriority, JobQueue, QueuedJob, WorkerPool, WorkerPoolConfig};
