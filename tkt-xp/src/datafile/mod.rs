//! Datafile model
//!
//! The datafile is the versioned remote configuration describing every active
//! experiment. It is parsed once per sync and then shared read-only through
//! [`ConfigurationStore`]; it is never mutated in place.

mod store;

pub use store::ConfigurationStore;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::error;

/// Datafile bundled into the binary, used until the first successful sync
const BUNDLED_DATAFILE: &str = include_str!("default_datafile.json");

/// Size of the bucketing space (weights are in basis points)
pub const BUCKET_SPACE: u32 = 10_000;

/// Complete experiment configuration at one revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datafile {
    /// Opaque revision; only compared for inequality
    #[serde(deserialize_with = "revision_as_string")]
    pub revision: String,
    #[serde(default)]
    pub experiments: BTreeMap<String, Experiment>,
}

/// One experiment definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Experiment-level variable defaults (raw JSON, decoded at decision time)
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    /// Targeting rules, evaluated in order
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Targeting rule: an optional audience plus its traffic split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub audience: Option<Audience>,
    #[serde(default)]
    pub variations: Vec<Variation>,
}

/// Audience conditions
///
/// Every non-empty field must match; within a field any value matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Audience {
    pub interests_any: Vec<String>,
    pub operating_systems: Vec<String>,
    pub device_types: Vec<String>,
    pub locations: Vec<String>,
}

/// One variation and its traffic allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    pub key: String,
    /// Share of the bucket space in basis points (0..=10000)
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
}

fn default_enabled() -> bool {
    true
}

/// Accept `"7"` or `7` for the revision field
fn revision_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "revision must be a string or integer, got {}",
            other
        ))),
    }
}

impl Datafile {
    /// Parse a datafile payload
    pub fn parse(bytes: &[u8]) -> tkt_common::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Datafile with no experiments
    pub fn empty(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            experiments: BTreeMap::new(),
        }
    }

    /// The datafile compiled into the binary
    pub fn bundled() -> Self {
        match Self::parse(BUNDLED_DATAFILE.as_bytes()) {
            Ok(datafile) => datafile,
            Err(e) => {
                error!("Bundled datafile failed to parse: {}", e);
                Self::empty("bundled")
            }
        }
    }

    pub fn experiment(&self, key: &str) -> Option<&Experiment> {
        self.experiments.get(key)
    }
}

impl Variation {
    pub fn new(key: impl Into<String>, weight: u32) -> Self {
        Self {
            key: key.into(),
            weight,
            variables: BTreeMap::new(),
        }
    }
}
