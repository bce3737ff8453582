//! Product catalog: categories, products and their media assets.

pub mod config;
pub mod models;

pub use config::{AffiliateLink, PlatformProfile, ProductConfig, ProductDetail};
pub use models::{Category, MediaAsset, Product};
