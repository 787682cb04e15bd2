//! Decision Resolver
//!
//! Evaluates experiments for one user against the current datafile snapshot
//! and the user's accumulated attributes. Evaluation never fails: absent,
//! disabled or untargeted experiments resolve to the `"off"` decision with
//! default variables.
//!
//! Variable precedence (lowest to highest): built-in defaults, experiment
//! defaults from the datafile, variation variables.

mod bucketing;
mod variables;

pub use bucketing::{audience_matches, bucket_for, select_variation};
pub use variables::{decode_variables, VariableValue, Variables};

use crate::attributes::{AttributeStore, UserAttributes, UserId};
use crate::datafile::{ConfigurationStore, Datafile};
use crate::homescreen::{self, HomescreenModule};
use crate::resolved::Resolved;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Ticket purchase experience A/B test
pub const TICKET_EXPERIENCE: &str = "ticket_experience";
/// Homescreen module configuration
pub const HOMESCREEN_MODULES: &str = "homescreen_modules";
/// App theme
pub const APP_THEME: &str = "app_theme";

/// Experiments always reported, even when absent from the datafile
pub const KNOWN_EXPERIMENTS: &[&str] = &[TICKET_EXPERIENCE, HOMESCREEN_MODULES, APP_THEME];

/// Variation key for users not enrolled
pub const OFF_VARIATION: &str = "off";

/// Name of the homescreen module-list variable
pub const MODULES_VARIABLE: &str = "modules";

/// Outcome of one experiment for one user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    #[serde(skip)]
    pub experiment_key: String,
    pub enabled: bool,
    pub variation_key: String,
    pub variables: Variables,
    /// Targeting rule that enrolled the user
    #[serde(skip)]
    pub rule_key: Option<String>,
}

impl Decision {
    fn off(experiment_key: &str, variables: Variables) -> Self {
        Self {
            experiment_key: experiment_key.to_string(),
            enabled: false,
            variation_key: OFF_VARIATION.to_string(),
            variables,
            rule_key: None,
        }
    }

    pub fn is_off(&self) -> bool {
        self.variation_key == OFF_VARIATION
    }

    pub fn variable(&self, name: &str) -> Option<&VariableValue> {
        self.variables.get(name)
    }
}

/// Decisions for every experiment, all taken against one snapshot
#[derive(Debug, Clone, Serialize)]
pub struct UserDecisions {
    pub user_id: UserId,
    pub revision: String,
    pub decisions: BTreeMap<String, Decision>,
}

/// Homescreen decision plus its decoded module list
#[derive(Debug, Clone)]
pub struct HomescreenDecision {
    pub decision: Decision,
    pub modules: Resolved<Vec<HomescreenModule>>,
}

/// Built-in variables for a known experiment
pub fn builtin_defaults(experiment_key: &str) -> Variables {
    let mut vars = Variables::new();
    match experiment_key {
        TICKET_EXPERIENCE => {
            vars.insert("layout".to_string(), VariableValue::String("classic".to_string()));
            vars.insert("show_seat_map".to_string(), VariableValue::Bool(false));
        }
        HOMESCREEN_MODULES => {
            vars.insert(
                MODULES_VARIABLE.to_string(),
                VariableValue::String(homescreen::default_modules_json()),
            );
        }
        APP_THEME => {
            vars.insert("theme".to_string(), VariableValue::String("light".to_string()));
        }
        _ => {}
    }
    vars
}

/// Evaluate one experiment against a datafile snapshot
///
/// Pure: identical inputs always give the identical decision.
pub fn evaluate(datafile: &Datafile, attrs: &UserAttributes, experiment_key: &str) -> Decision {
    let mut vars = builtin_defaults(experiment_key);

    let Some(experiment) = datafile.experiment(experiment_key) else {
        debug!(experiment = experiment_key, "Experiment absent from datafile");
        return Decision::off(experiment_key, vars);
    };

    vars.extend(decode_variables(&experiment.variables));

    if !experiment.enabled {
        return Decision::off(experiment_key, vars);
    }

    let Some(rule) = bucketing::first_matching_rule(&experiment.rules, attrs) else {
        return Decision::off(experiment_key, vars);
    };

    let bucket = bucket_for(attrs.user_id.as_str(), experiment_key);
    let Some(variation) = select_variation(&rule.variations, bucket) else {
        return Decision::off(experiment_key, vars);
    };

    vars.extend(decode_variables(&variation.variables));
    Decision {
        experiment_key: experiment_key.to_string(),
        enabled: true,
        variation_key: variation.key.clone(),
        variables: vars,
        rule_key: Some(rule.key.clone()),
    }
}

/// Resolver over the live stores
pub struct DecisionResolver {
    store: Arc<ConfigurationStore>,
    attributes: Arc<AttributeStore>,
}

impl DecisionResolver {
    pub fn new(store: Arc<ConfigurationStore>, attributes: Arc<AttributeStore>) -> Self {
        Self { store, attributes }
    }

    /// Decide a single experiment
    pub fn decide(&self, user_id: &UserId, operating_system: &str, experiment_key: &str) -> Decision {
        let attrs = self.attributes.attributes_for(user_id, operating_system);
        let datafile = self.store.read();
        evaluate(&datafile, &attrs, experiment_key)
    }

    /// Decide every known experiment plus every experiment in the datafile
    pub fn decide_all(&self, user_id: &UserId, operating_system: &str) -> UserDecisions {
        let attrs = self.attributes.attributes_for(user_id, operating_system);
        let datafile = self.store.read();

        let keys: BTreeSet<&str> = KNOWN_EXPERIMENTS
            .iter()
            .copied()
            .chain(datafile.experiments.keys().map(String::as_str))
            .collect();

        let decisions = keys
            .into_iter()
            .map(|key| (key.to_string(), evaluate(&datafile, &attrs, key)))
            .collect();

        UserDecisions {
            user_id: user_id.clone(),
            revision: datafile.revision.clone(),
            decisions,
        }
    }

    /// Decide the homescreen experiment and decode its module list
    pub fn decide_homescreen(&self, user_id: &UserId, operating_system: &str) -> HomescreenDecision {
        let decision = self.decide(user_id, operating_system, HOMESCREEN_MODULES);
        let modules = homescreen::modules_from_decision(&decision);
        if let Some(reason) = modules.reason() {
            warn!(
                user_id = %user_id,
                variation = %decision.variation_key,
                "Using default homescreen modules: {}",
                reason
            );
        }
        HomescreenDecision { decision, modules }
    }
}
