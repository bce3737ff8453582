//! Orders: just-in-time assembly, item lifecycle and the posting ledger.

pub mod builder;
pub mod models;
pub mod service;

pub use builder::{CreatedOrder, JobPayload, OrderBuilder};
pub use models::{ItemStatus, Order, OrderItem, OrderStatus, PostingHistory};
pub use service::{Confirmation, JobReport, OrderService, ReportedOutcome};

pub const TOPIC_ORDER_CREATED: &str = "order/created";
pub const TOPIC_ORDER_COMPLETED: &str = "order/completed";
pub const TOPIC_ORDER_DUPLICATE_BLOCKED: &str = "order/duplicate_blocked";
