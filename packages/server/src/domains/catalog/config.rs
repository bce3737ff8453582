//! Structured per-product posting configuration.
//!
//! Stored as a JSON column on `products`. Carries the copy (name,
//! descriptions, tags) plus one profile per target platform with its
//! affiliate links. Products imported without a configuration fall back to
//! the bare row fields.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domains::Platform;

/// One affiliate link entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AffiliateLink {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub is_primary: bool,
}

/// Per-platform posting profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformProfile {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_privacy")]
    pub privacy: String,
    #[serde(default)]
    pub props: Value,
    #[serde(default)]
    pub playlist: Value,
    #[serde(default)]
    pub aff_urls: Vec<AffiliateLink>,
}

fn default_privacy() -> String {
    "public".to_string()
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self {
            enabled: false,
            privacy: default_privacy(),
            props: Value::Null,
            playlist: Value::Null,
            aff_urls: Vec::new(),
        }
    }
}

impl PlatformProfile {
    /// Opaque settings map shipped to the agent alongside the payload.
    pub fn to_platform_config(&self) -> Value {
        json!({
            "privacy": self.privacy,
            "props": self.props,
            "playlist": self.playlist,
        })
    }
}

/// Copy shared by every platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub long_description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Full posting configuration for one product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductConfig {
    #[serde(default)]
    pub detail: ProductDetail,
    #[serde(default)]
    pub platforms: HashMap<String, PlatformProfile>,
}

impl ProductConfig {
    pub fn platform(&self, platform: Platform) -> Option<&PlatformProfile> {
        self.platforms.get(platform.as_str())
    }

    pub fn enabled_platforms(&self) -> Vec<&str> {
        self.platforms
            .iter()
            .filter(|(_, profile)| profile.enabled)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Affiliate links for a platform.
    ///
    /// Affiliate links are store links, so when the target platform carries
    /// none the shopee profile's links are used instead.
    pub fn affiliate_links(&self, platform: Platform) -> &[AffiliateLink] {
        match self.platform(platform) {
            Some(profile) if !profile.aff_urls.is_empty() => &profile.aff_urls,
            _ => self
                .platform(Platform::Shopee)
                .map(|p| p.aff_urls.as_slice())
                .unwrap_or(&[]),
        }
    }

    /// Description to post: long copy preferred, short as fallback.
    pub fn description(&self) -> &str {
        if !self.detail.long_description.is_empty() {
            &self.detail.long_description
        } else {
            &self.detail.short_description
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(platform: &str, links: Vec<AffiliateLink>) -> ProductConfig {
        let mut platforms = HashMap::new();
        platforms.insert(
            platform.to_string(),
            PlatformProfile {
                enabled: true,
                aff_urls: links,
                ..Default::default()
            },
        );
        ProductConfig {
            detail: ProductDetail {
                code: "Soap001".into(),
                name: "Soap".into(),
                long_description: "Long copy".into(),
                tags: vec!["soap".into(), "bath".into()],
                ..Default::default()
            },
            platforms,
        }
    }

    #[test]
    fn parses_with_defaults() {
        let config: ProductConfig = serde_json::from_value(json!({
            "detail": { "code": "X", "name": "X name" },
            "platforms": { "youtube": { "enabled": true } }
        }))
        .unwrap();

        let profile = config.platform(Platform::Youtube).unwrap();
        assert!(profile.enabled);
        assert_eq!(profile.privacy, "public");
        assert!(profile.aff_urls.is_empty());
        assert_eq!(config.enabled_platforms(), vec!["youtube"]);
    }

    #[test]
    fn affiliate_links_fall_back_to_shopee() {
        let link = AffiliateLink {
            label: "store".into(),
            url: "https://s.example/x".into(),
            is_primary: true,
        };
        let config = config_with("shopee", vec![link]);

        let links = config.affiliate_links(Platform::Youtube);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].label, "store");
    }

    #[test]
    fn description_prefers_long_copy() {
        let mut config = config_with("shopee", vec![]);
        assert_eq!(config.description(), "Long copy");
        config.detail.long_description.clear();
        config.detail.short_description = "Short".into();
        assert_eq!(config.description(), "Short");
    }
}
