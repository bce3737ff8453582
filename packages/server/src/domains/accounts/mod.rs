//! Agent accounts.

pub mod models;

pub use models::ClientAccount;
