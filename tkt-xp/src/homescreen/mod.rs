//! Homescreen modules
//!
//! The homescreen experiment carries its layout as a `modules` variable: a
//! JSON list of typed UI sections. Decoding is lenient per item (unknown
//! module types and categories are skipped) and falls back to the bundled
//! five-module layout when the payload as a whole is unusable.

mod content;

pub use content::{
    decode_catalog, resolve, resolve_module, Event, ModuleContent, TRENDING_SEED,
    TRENDING_SORT_SEED, WEEKEND_SEED,
};

use crate::attributes::Category;
use crate::decision::{Decision, VariableValue, MODULES_VARIABLE};
use crate::resolved::Resolved;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::warn;

/// Closed set of module types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    HeroCarousel,
    Categories,
    TrendingNow,
    ThisWeekend,
    AllEvents,
}

impl ModuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::HeroCarousel => "hero_carousel",
            ModuleType::Categories => "categories",
            ModuleType::TrendingNow => "trending_now",
            ModuleType::ThisWeekend => "this_weekend",
            ModuleType::AllEvents => "all_events",
        }
    }

    /// Exact wire name only; unknown types are rejected, never coerced
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "hero_carousel" => Some(ModuleType::HeroCarousel),
            "categories" => Some(ModuleType::Categories),
            "trending_now" => Some(ModuleType::TrendingNow),
            "this_weekend" => Some(ModuleType::ThisWeekend),
            "all_events" => Some(ModuleType::AllEvents),
            _ => None,
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort order for `all_events`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    DateAsc,
    DateDesc,
    AlphabeticalAsc,
    /// No real trending metric exists; resolved as a seeded shuffle
    TrendingDesc,
}

impl SortBy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "date_asc" => Some(SortBy::DateAsc),
            "date_desc" => Some(SortBy::DateDesc),
            "alphabetical_asc" => Some(SortBy::AlphabeticalAsc),
            "trending_desc" => Some(SortBy::TrendingDesc),
            _ => None,
        }
    }
}

/// Per-module options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    /// `None` means every category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortBy>,
    /// `None` means unbounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

/// One homescreen section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HomescreenModule {
    /// `"{type}-{index}"`, stable within one decision
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub config: ModuleConfig,
}

impl HomescreenModule {
    pub fn new(index: usize, module_type: ModuleType, config: ModuleConfig) -> Self {
        Self {
            id: format!("{}-{}", module_type, index),
            module_type,
            config,
        }
    }

    pub fn includes_category(&self, category: Category) -> bool {
        match &self.config.categories {
            None => true,
            Some(list) => list.contains(&category),
        }
    }
}

/// Raw JSON of the bundled five-module layout
fn default_modules_value() -> Value {
    json!([
        { "type": "hero_carousel", "config": { "length": 5 } },
        { "type": "categories" },
        { "type": "trending_now", "config": { "length": 6 } },
        { "type": "this_weekend", "config": { "length": 6 } },
        { "type": "all_events", "config": { "sortBy": "date_asc" } }
    ])
}

/// Bundled layout as JSON text (the built-in `modules` variable)
pub fn default_modules_json() -> String {
    default_modules_value().to_string()
}

/// Bundled five-module layout
pub fn default_modules() -> Vec<HomescreenModule> {
    match default_modules_value() {
        Value::Array(items) => decode_items(&items),
        _ => Vec::new(),
    }
}

/// Decode a module list from JSON text
///
/// Also accepts a JSON string that itself contains the list (double-encoded
/// payloads). Falls back to [`default_modules`] when the text is not a list
/// or no item survives decoding.
pub fn decode_modules(text: &str) -> Resolved<Vec<HomescreenModule>> {
    match serde_json::from_str(text) {
        Ok(value) => decode_modules_value(value),
        Err(e) => Resolved::fallback(default_modules(), format!("invalid JSON: {}", e)),
    }
}

/// Decode a module list from an already parsed JSON value
pub fn decode_modules_value(value: Value) -> Resolved<Vec<HomescreenModule>> {
    let value = match value {
        Value::String(inner) => match serde_json::from_str(&inner) {
            Ok(v) => v,
            Err(e) => {
                return Resolved::fallback(default_modules(), format!("invalid nested JSON: {}", e))
            }
        },
        other => other,
    };

    let Value::Array(items) = value else {
        return Resolved::fallback(default_modules(), "module payload is not a list");
    };

    let modules = decode_items(&items);
    if modules.is_empty() {
        return Resolved::fallback(default_modules(), "no recognizable modules in payload");
    }
    Resolved::Ok(modules)
}

/// Decode the `modules` variable of a homescreen decision
pub fn modules_from_decision(decision: &Decision) -> Resolved<Vec<HomescreenModule>> {
    match decision.variable(MODULES_VARIABLE) {
        Some(VariableValue::String(text)) => decode_modules(text),
        Some(other) => Resolved::fallback(
            default_modules(),
            format!("modules variable has unexpected kind: {:?}", other),
        ),
        None => Resolved::fallback(default_modules(), "modules variable missing"),
    }
}

fn decode_items(items: &[Value]) -> Vec<HomescreenModule> {
    let mut modules = Vec::with_capacity(items.len());
    for item in items {
        let Some(obj) = item.as_object() else {
            warn!("Skipping non-object homescreen module entry");
            continue;
        };
        let type_name = obj.get("type").and_then(Value::as_str).unwrap_or_default();
        let Some(module_type) = ModuleType::from_str(type_name) else {
            warn!(module_type = %type_name, "Skipping unknown homescreen module type");
            continue;
        };
        let config = obj
            .get("config")
            .and_then(Value::as_object)
            .map(decode_config)
            .unwrap_or_default();
        modules.push(HomescreenModule::new(modules.len(), module_type, config));
    }
    modules
}

fn decode_config(obj: &Map<String, Value>) -> ModuleConfig {
    let categories = obj.get("categories").and_then(Value::as_array).and_then(|names| {
        let parsed: Vec<Category> = names
            .iter()
            .filter_map(|name| {
                let name = name.as_str()?;
                let category = Category::from_str(name);
                if category.is_none() {
                    warn!(category = %name, "Skipping unknown category in module config");
                }
                category
            })
            .collect();
        // An all-unknown filter behaves as no filter
        (!parsed.is_empty()).then_some(parsed)
    });

    let sort_by = obj.get("sortBy").and_then(Value::as_str).and_then(|name| {
        let sort = SortBy::from_str(name);
        if sort.is_none() {
            warn!(sort_by = %name, "Ignoring unknown sortBy in module config");
        }
        sort
    });

    let length = obj
        .get("length")
        .and_then(Value::as_u64)
        .map(|n| n as usize);

    ModuleConfig {
        categories,
        sort_by,
        length,
    }
}
