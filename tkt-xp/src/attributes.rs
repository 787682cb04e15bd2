//! Attribute Store
//!
//! Per-user behavioral facts that feed experiment targeting. Interests grow
//! monotonically from completed purchases and are never removed; entries are
//! created lazily and live for the process lifetime.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Event category (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Concerts,
    Sports,
    Theater,
    Comedy,
    Festivals,
    Family,
}

impl Category {
    pub fn all_variants() -> &'static [Category] {
        &[
            Category::Concerts,
            Category::Sports,
            Category::Theater,
            Category::Comedy,
            Category::Festivals,
            Category::Family,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Concerts => "concerts",
            Category::Sports => "sports",
            Category::Theater => "theater",
            Category::Comedy => "comedy",
            Category::Festivals => "festivals",
            Category::Family => "family",
        }
    }

    /// Parse a wire name (case-insensitive)
    ///
    /// Only the six canonical names are accepted; anything else, including
    /// near-miss spellings, yields `None` so callers drop it.
    pub fn from_str(s: &str) -> Option<Self> {
        let name = s.trim().to_lowercase();
        Category::all_variants()
            .iter()
            .copied()
            .find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated, non-empty user identifier
///
/// Construction is the API-boundary check: components past this point never
/// see an empty id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> tkt_common::Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(tkt_common::Error::InvalidInput(
                "userId must not be empty".to_string(),
            ));
        }
        Ok(UserId(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attribute snapshot used for one decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAttributes {
    pub user_id: UserId,
    pub interests: BTreeSet<Category>,
    pub device_type: String,
    pub operating_system: String,
    pub location: String,
}

/// Map an operating system name to a coarse device type
pub fn device_type_for(operating_system: &str) -> &'static str {
    match operating_system.trim().to_lowercase().as_str() {
        "ios" | "android" | "ipados" => "mobile",
        "web" | "macos" | "windows" | "linux" => "desktop",
        _ => "unknown",
    }
}

/// Process-wide attribute store
///
/// Writes are serialized by the map lock; set insertion is the only mutation.
pub struct AttributeStore {
    interests: RwLock<HashMap<UserId, BTreeSet<Category>>>,
    location: String,
}

impl AttributeStore {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            interests: RwLock::new(HashMap::new()),
            location: location.into(),
        }
    }

    /// Record a purchase in `category`
    ///
    /// Idempotent: returns `true` only the first time a category is seen for
    /// this user.
    pub fn record_purchase(&self, user_id: &UserId, category: Category) -> bool {
        let mut map = self.interests.write().unwrap_or_else(PoisonError::into_inner);
        let added = map.entry(user_id.clone()).or_default().insert(category);
        if added {
            debug!(user_id = %user_id, category = %category, "Recorded new interest");
        }
        added
    }

    /// Current interests for a user (empty for unknown users)
    pub fn interests_of(&self, user_id: &UserId) -> BTreeSet<Category> {
        let map = self.interests.read().unwrap_or_else(PoisonError::into_inner);
        map.get(user_id).cloned().unwrap_or_default()
    }

    /// Build the attribute snapshot for a decision. Never fails.
    pub fn attributes_for(&self, user_id: &UserId, operating_system: &str) -> UserAttributes {
        let operating_system = operating_system.trim().to_lowercase();
        UserAttributes {
            user_id: user_id.clone(),
            interests: self.interests_of(user_id),
            device_type: device_type_for(&operating_system).to_string(),
            operating_system,
            location: self.location.clone(),
        }
    }

    pub fn user_count(&self) -> usize {
        self.interests.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for AttributeStore {
    fn default() -> Self {
        Self::new("US")
    }
}
