//! Target platforms an agent can publish to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of supported publish targets, stored as lowercase TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Tiktok,
    Facebook,
    Shopee,
    Lazada,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
            Platform::Facebook => "facebook",
            Platform::Shopee => "shopee",
            Platform::Lazada => "lazada",
        }
    }

    /// How many leading tags stay pinned during tag shuffling.
    ///
    /// Video platforms weight the first few tags heavily for search, so
    /// they keep one more than the rest.
    pub fn keep_first_tags(&self) -> usize {
        match self {
            Platform::Youtube | Platform::Tiktok => 3,
            _ => 2,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "youtube" => Ok(Platform::Youtube),
            "tiktok" => Ok(Platform::Tiktok),
            "facebook" => Ok(Platform::Facebook),
            "shopee" => Ok(Platform::Shopee),
            "lazada" => Ok(Platform::Lazada),
            other => Err(anyhow::anyhow!("unknown platform: {other}")),
        }
    }
}
