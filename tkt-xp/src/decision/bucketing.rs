//! Deterministic bucketing and audience evaluation

use crate::attributes::{Category, UserAttributes};
use crate::datafile::{Audience, Rule, Variation, BUCKET_SPACE};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Bucket in `0..BUCKET_SPACE` for a user within one experiment
///
/// Derived from SHA-256 of `"{user_id}:{experiment_key}"`, so it is stable
/// across processes and platforms.
pub fn bucket_for(user_id: &str, experiment_key: &str) -> u32 {
    let digest = Sha256::digest(format!("{}:{}", user_id, experiment_key).as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    prefix % BUCKET_SPACE
}

/// Variation whose cumulative weight range contains `bucket`
///
/// Ranges are laid out in declaration order. A bucket past the cumulative
/// total (capped at the bucket space) is not enrolled.
pub fn select_variation(variations: &[Variation], bucket: u32) -> Option<&Variation> {
    let mut upper = 0u32;
    for variation in variations {
        upper = upper.saturating_add(variation.weight).min(BUCKET_SPACE);
        if bucket < upper {
            return Some(variation);
        }
    }
    None
}

/// Whether a user matches an audience
pub fn audience_matches(audience: &Audience, attrs: &UserAttributes) -> bool {
    if !audience.interests_any.is_empty() {
        let wanted: Vec<Category> = audience
            .interests_any
            .iter()
            .filter_map(|name| {
                let parsed = Category::from_str(name);
                if parsed.is_none() {
                    warn!(category = %name, "Ignoring unknown category in audience");
                }
                parsed
            })
            .collect();
        if !wanted.iter().any(|c| attrs.interests.contains(c)) {
            return false;
        }
    }

    matches_any(&audience.operating_systems, &attrs.operating_system)
        && matches_any(&audience.device_types, &attrs.device_type)
        && matches_any(&audience.locations, &attrs.location)
}

fn matches_any(allowed: &[String], actual: &str) -> bool {
    allowed.is_empty() || allowed.iter().any(|a| a.eq_ignore_ascii_case(actual))
}

/// First rule whose audience the user belongs to
pub fn first_matching_rule<'a>(rules: &'a [Rule], attrs: &UserAttributes) -> Option<&'a Rule> {
    rules.iter().find(|rule| match &rule.audience {
        None => true,
        Some(audience) => audience_matches(audience, attrs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::UserId;
    use std::collections::BTreeSet;

    fn attrs(interests: &[Category], os: &str) -> UserAttributes {
        UserAttributes {
            user_id: UserId::parse("u").unwrap(),
            interests: interests.iter().copied().collect::<BTreeSet<_>>(),
            device_type: crate::attributes::device_type_for(os).to_string(),
            operating_system: os.to_string(),
            location: "US".to_string(),
        }
    }

    #[test]
    fn test_bucket_is_stable_and_in_range() {
        let a = bucket_for("user-1", "app_theme");
        let b = bucket_for("user-1", "app_theme");
        assert_eq!(a, b);
        assert!(a < BUCKET_SPACE);
    }

    #[test]
    fn test_bucket_depends_on_experiment() {
        // Across many users, two experiments must not bucket identically
        let differs = (0..50).any(|i| {
            let user = format!("user-{}", i);
            bucket_for(&user, "a") != bucket_for(&user, "b")
        });
        assert!(differs);
    }

    #[test]
    fn test_cumulative_ranges() {
        let variations = vec![Variation::new("a", 2500), Variation::new("b", 2500)];
        assert_eq!(select_variation(&variations, 0).unwrap().key, "a");
        assert_eq!(select_variation(&variations, 2499).unwrap().key, "a");
        assert_eq!(select_variation(&variations, 2500).unwrap().key, "b");
        assert_eq!(select_variation(&variations, 4999).unwrap().key, "b");
        assert!(select_variation(&variations, 5000).is_none());
    }

    #[test]
    fn test_overallocated_weights_are_capped() {
        let variations = vec![Variation::new("a", 9000), Variation::new("b", 9000)];
        assert_eq!(select_variation(&variations, 9999).unwrap().key, "b");
    }

    #[test]
    fn test_distribution_roughly_follows_weights() {
        let variations = vec![Variation::new("a", 5000), Variation::new("b", 5000)];
        let a_count = (0..2000)
            .filter(|i| {
                let bucket = bucket_for(&format!("user-{}", i), "split");
                select_variation(&variations, bucket).unwrap().key == "a"
            })
            .count();
        assert!((800..1200).contains(&a_count), "a_count = {}", a_count);
    }

    #[test]
    fn test_audience_interest_and_os() {
        let audience = Audience {
            interests_any: vec!["concerts".to_string(), "opera".to_string()],
            operating_systems: vec!["iOS".to_string()],
            ..Default::default()
        };
        assert!(audience_matches(&audience, &attrs(&[Category::Concerts], "ios")));
        assert!(!audience_matches(&audience, &attrs(&[Category::Concerts], "android")));
        assert!(!audience_matches(&audience, &attrs(&[Category::Sports], "ios")));
    }

    #[test]
    fn test_empty_audience_matches_everyone() {
        assert!(audience_matches(&Audience::default(), &attrs(&[], "web")));
    }
}
