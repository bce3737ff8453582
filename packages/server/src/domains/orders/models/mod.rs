pub mod order;
pub mod order_item;
pub mod posting_history;

pub use order::{Order, OrderStatus};
pub use order_item::{ItemStatus, OrderItem};
pub use posting_history::PostingHistory;
