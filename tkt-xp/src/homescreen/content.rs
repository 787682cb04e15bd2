//! Module Content Resolver
//!
//! Turns a module list plus the event catalog into the event list shown by
//! each module. Pure and deterministic: the "random" modules use fixed seeds,
//! so the same inputs give the same order on every call. Callers compute
//! this once per decision fetch and treat the result as read-only.

use super::{HomescreenModule, ModuleType, SortBy};
use crate::attributes::Category;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Shuffle seed for `trending_now`
pub const TRENDING_SEED: u64 = 42;
/// Shuffle seed for `this_weekend`
pub const WEEKEND_SEED: u64 = 123;
/// Shuffle seed for the `trending_desc` sort of `all_events`
pub const TRENDING_SORT_SEED: u64 = 7;

/// Cap applied to shuffled modules without an explicit length
const DEFAULT_SHUFFLED_LENGTH: usize = 6;

/// Catalog entry (owned by the external catalog service)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub featured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Event lists keyed by module id
pub type ModuleContent = BTreeMap<String, Vec<Event>>;

/// Decode a catalog JSON array, skipping entries that do not decode
/// (unknown category, missing fields, bad dates)
pub fn decode_catalog(value: &Value) -> Vec<Event> {
    let Some(items) = value.as_array() else {
        warn!("Catalog payload is not a list");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match Event::deserialize(item) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("Skipping catalog entry: {}", e);
                None
            }
        })
        .collect()
}

/// Resolve every module against the catalog
pub fn resolve(modules: &[HomescreenModule], catalog: &[Event]) -> ModuleContent {
    modules
        .iter()
        .map(|module| (module.id.clone(), resolve_module(module, catalog)))
        .collect()
}

/// Resolve one module
pub fn resolve_module(module: &HomescreenModule, catalog: &[Event]) -> Vec<Event> {
    let mut events: Vec<Event> = catalog
        .iter()
        .filter(|e| module.includes_category(e.category))
        .cloned()
        .collect();

    match module.module_type {
        ModuleType::HeroCarousel => {
            events.retain(|e| e.featured);
            cap(events, module.config.length)
        }
        ModuleType::TrendingNow => {
            seeded_shuffle(&mut events, TRENDING_SEED);
            cap(events, Some(module.config.length.unwrap_or(DEFAULT_SHUFFLED_LENGTH)))
        }
        ModuleType::ThisWeekend => {
            seeded_shuffle(&mut events, WEEKEND_SEED);
            cap(events, Some(module.config.length.unwrap_or(DEFAULT_SHUFFLED_LENGTH)))
        }
        ModuleType::AllEvents => {
            if let Some(sort) = module.config.sort_by {
                sort_events(&mut events, sort);
            }
            cap(events, module.config.length)
        }
        ModuleType::Categories => events,
    }
}

/// Stable sort; ties keep catalog order
fn sort_events(events: &mut [Event], sort: SortBy) {
    match sort {
        SortBy::DateAsc => events.sort_by(|a, b| a.date.cmp(&b.date)),
        SortBy::DateDesc => events.sort_by(|a, b| b.date.cmp(&a.date)),
        SortBy::AlphabeticalAsc => events.sort_by_cached_key(|e| e.name.to_lowercase()),
        SortBy::TrendingDesc => seeded_shuffle(events, TRENDING_SORT_SEED),
    }
}

fn seeded_shuffle(events: &mut [Event], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    events.shuffle(&mut rng);
}

fn cap(mut events: Vec<Event>, length: Option<usize>) -> Vec<Event> {
    if let Some(limit) = length {
        events.truncate(limit);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homescreen::{decode_modules, default_modules, ModuleConfig};
    use chrono::TimeZone;

    fn event(id: usize, name: &str, category: Category, day: u32, featured: bool) -> Event {
        Event {
            id: format!("evt-{}", id),
            name: name.to_string(),
            category,
            date: Utc.with_ymd_and_hms(2025, 6, day, 19, 0, 0).unwrap(),
            venue: "Arena".to_string(),
            featured,
            image_url: None,
        }
    }

    fn catalog() -> Vec<Event> {
        let cats = Category::all_variants();
        (0..20)
            .map(|i| {
                event(
                    i,
                    &format!("Event {:02}", 20 - i),
                    cats[i % cats.len()],
                    (i % 28) as u32 + 1,
                    i % 2 == 0,
                )
            })
            .collect()
    }

    fn module(module_type: ModuleType, config: ModuleConfig) -> HomescreenModule {
        HomescreenModule::new(0, module_type, config)
    }

    #[test]
    fn test_hero_carousel_caps_featured() {
        let featured: Vec<Event> = (0..10)
            .map(|i| event(i, "F", Category::Concerts, 1, true))
            .collect();
        let hero = module(
            ModuleType::HeroCarousel,
            ModuleConfig {
                length: Some(4),
                ..Default::default()
            },
        );
        let out = resolve_module(&hero, &featured);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|e| e.featured));
    }

    #[test]
    fn test_hero_carousel_excludes_unfeatured() {
        let hero = module(ModuleType::HeroCarousel, ModuleConfig::default());
        let out = resolve_module(&hero, &catalog());
        assert_eq!(out.len(), 10);
        assert!(out.iter().all(|e| e.featured));
    }

    #[test]
    fn test_trending_shuffle_is_reproducible() {
        let trending = module(ModuleType::TrendingNow, ModuleConfig::default());
        let first = resolve_module(&trending, &catalog());
        let second = resolve_module(&trending, &catalog());
        assert_eq!(first, second);
        assert_eq!(first.len(), 6);
    }

    #[test]
    fn test_weekend_and_trending_use_different_seeds() {
        let config = ModuleConfig {
            length: Some(20),
            ..Default::default()
        };
        let trending = resolve_module(&module(ModuleType::TrendingNow, config.clone()), &catalog());
        let weekend = resolve_module(&module(ModuleType::ThisWeekend, config), &catalog());
        assert_eq!(trending.len(), 20);
        assert_ne!(
            trending.iter().map(|e| &e.id).collect::<Vec<_>>(),
            weekend.iter().map(|e| &e.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_category_filter() {
        let sports = module(
            ModuleType::Categories,
            ModuleConfig {
                categories: Some(vec![Category::Sports]),
                ..Default::default()
            },
        );
        let out = resolve_module(&sports, &catalog());
        assert!(!out.is_empty());
        assert!(out.iter().all(|e| e.category == Category::Sports));
    }

    #[test]
    fn test_all_events_sorts() {
        let by_date = module(
            ModuleType::AllEvents,
            ModuleConfig {
                sort_by: Some(SortBy::DateDesc),
                ..Default::default()
            },
        );
        let out = resolve_module(&by_date, &catalog());
        assert_eq!(out.len(), 20);
        assert!(out.windows(2).all(|w| w[0].date >= w[1].date));

        let alpha = module(
            ModuleType::AllEvents,
            ModuleConfig {
                sort_by: Some(SortBy::AlphabeticalAsc),
                length: Some(3),
                ..Default::default()
            },
        );
        let names: Vec<String> = resolve_module(&alpha, &catalog())
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Event 01", "Event 02", "Event 03"]);
    }

    #[test]
    fn test_alphabetical_is_case_insensitive_and_stable() {
        let events = vec![
            event(1, "beta", Category::Comedy, 1, false),
            event(2, "Alpha", Category::Comedy, 1, false),
            event(3, "alpha", Category::Comedy, 1, false),
        ];
        let alpha = module(
            ModuleType::AllEvents,
            ModuleConfig {
                sort_by: Some(SortBy::AlphabeticalAsc),
                ..Default::default()
            },
        );
        let ids: Vec<String> = resolve_module(&alpha, &events).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["evt-2", "evt-3", "evt-1"]);
    }

    #[test]
    fn test_date_sort_ties_keep_catalog_order() {
        let events = vec![
            event(1, "x", Category::Family, 5, false),
            event(2, "y", Category::Family, 3, false),
            event(3, "z", Category::Family, 5, false),
        ];
        let by_date = module(
            ModuleType::AllEvents,
            ModuleConfig {
                sort_by: Some(SortBy::DateAsc),
                ..Default::default()
            },
        );
        let ids: Vec<String> = resolve_module(&by_date, &events).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["evt-2", "evt-1", "evt-3"]);
    }

    #[test]
    fn test_resolve_keys_by_module_id() {
        let modules = default_modules();
        let content = resolve(&modules, &catalog());
        assert_eq!(content.len(), 5);
        assert_eq!(content["hero_carousel-0"].len(), 5);
        assert_eq!(content["categories-1"].len(), 20);
        assert_eq!(content["trending_now-2"].len(), 6);
        assert_eq!(content["all_events-4"].len(), 20);
    }

    #[test]
    fn test_decode_catalog_skips_bad_entries() {
        let raw = serde_json::json!([
            {"id":"1","name":"Gig","category":"concerts","date":"2025-06-01T19:00:00Z","featured":true},
            {"id":"2","name":"Opera","category":"opera","date":"2025-06-01T19:00:00Z"},
            {"id":"3","name":"Match","category":"sports","date":"not a date"},
            {"id":"4","name":"Show","category":"comedy","date":"2025-06-02T20:00:00Z","imageUrl":"x.png"}
        ]);
        let events = decode_catalog(&raw);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].image_url.as_deref(), Some("x.png"));
        assert!(decode_catalog(&serde_json::json!({"events": []})).is_empty());
    }

    #[test]
    fn test_unbounded_when_no_length() {
        let modules = decode_modules(r#"[{"type":"all_events"}]"#).into_inner();
        assert_eq!(resolve_module(&modules[0], &catalog()).len(), 20);
    }
}
