// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Capability Value Objects
//!
//! A capability is a named, versioned request/response contract that an agent
//! can fulfil (e.g. `recommend.products@v1`). The major version is part of the
//! name: `catalog.search@v1` and `catalog.search@v2` are distinct capabilities
//! and resolve independently, so two generations of an agent can be served
//! side by side.
//!
//! # Naming Pattern
//!
//! ```text
//! <segment>(.<segment>)*@v<major>
//! segment := [a-z][a-z0-9_-]*
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

static CAPABILITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9_-]*(\.[a-z][a-z0-9_-]*)*@v(0|[1-9][0-9]*)$")
        .expect("capability pattern is a valid regex")
});

const MAX_CAPABILITY_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("Invalid capability name '{0}': expected '<domain>.<action>@v<major>'")]
    InvalidName(String),

    #[error("Capability name exceeds 128 characters")]
    TooLong,
}

/// Validated, versioned capability name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CapabilityName(String);

impl CapabilityName {
    pub fn new(name: impl Into<String>) -> Result<Self, CapabilityError> {
        let name = name.into();
        if name.len() > MAX_CAPABILITY_LEN {
            return Err(CapabilityError::TooLong);
        }
        if !CAPABILITY_PATTERN.is_match(&name) {
            return Err(CapabilityError::InvalidName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name without the version suffix (`recommend.products`).
    pub fn base(&self) -> &str {
        self.0.rsplit_once('@').map(|(base, _)| base).unwrap_or(&self.0)
    }

    /// Major version number.
    pub fn version(&self) -> u32 {
        self.0
            .rsplit_once("@v")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0)
    }
}

impl std::fmt::Display for CapabilityName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CapabilityName {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CapabilityName {
    type Error = CapabilityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CapabilityName> for String {
    fn from(value: CapabilityName) -> Self {
        value.0
    }
}

/// Request/response shape an agent announces for one of its capabilities.
///
/// Schemas are carried as opaque JSON documents; the router never inspects
/// them; they are published through discovery so gateway and agent authors
/// can agree on payload shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityContract {
    pub name: CapabilityName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_versioned_names() {
        let cap = CapabilityName::new("recommend.products@v1").unwrap();
        assert_eq!(cap.base(), "recommend.products");
        assert_eq!(cap.version(), 1);

        assert!(CapabilityName::new("sentiment@v12").is_ok());
        assert!(CapabilityName::new("catalog.price-check.bulk_v2@v3").is_ok());
    }

    #[test]
    fn test_rejects_malformed_names() {
        for bad in [
            "",
            "recommend.products",
            "Recommend.products@v1",
            "recommend..products@v1",
            "recommend.products@1",
            "recommend.products@v01",
            "1recommend@v1",
            "recommend products@v1",
        ] {
            assert!(CapabilityName::new(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_versions_are_distinct_capabilities() {
        let v1 = CapabilityName::new("catalog.search@v1").unwrap();
        let v2 = CapabilityName::new("catalog.search@v2").unwrap();
        assert_ne!(v1, v2);
        assert_eq!(v1.base(), v2.base());
    }

    #[test]
    fn test_serde_validates_on_deserialize() {
        let ok: CapabilityName = serde_json::from_str("\"pricing.quote@v1\"").unwrap();
        assert_eq!(ok.as_str(), "pricing.quote@v1");

        let bad: Result<CapabilityName, _> = serde_json::from_str("\"pricing quote\"");
        assert!(bad.is_err());
    }
}
