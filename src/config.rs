//! Workflow configuration.
//!
//! Deserialized with the `config` crate from an optional TOML file, then
//! environment variables such as `WORKFLOW_TAX_RATE` (nested keys split on `__`).
use super::error::ValidationError;
use super::transition::TransitionTable;
use super::types::Amount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Tax applied to the subtotal of every document.
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,
    /// Days a new document stays valid when no date is given.
    #[serde(default = "default_validity_days")]
    pub default_validity_days: u32,
    /// Company segment of generated document numbers.
    #[serde(default = "default_company_code")]
    pub company_code: String,
    /// Used for non-INR documents created without an explicit rate.
    #[serde(default = "default_exchange_rate")]
    pub default_exchange_rate: Decimal,
    /// Replaces the built-in lifecycle: entity kind -> status -> reachable statuses.
    #[serde(default)]
    pub transitions: Option<BTreeMap<String, BTreeMap<String, Vec<String>>>>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            tax_rate: default_tax_rate(),
            default_validity_days: default_validity_days(),
            company_code: default_company_code(),
            default_exchange_rate: default_exchange_rate(),
            transitions: None,
        }
    }
}

impl WorkflowConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder
            .add_source(
                config::Environment::with_prefix("WORKFLOW")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn tax_rate(&self) -> Amount {
        self.tax_rate.into()
    }

    pub fn default_exchange_rate(&self) -> Amount {
        self.default_exchange_rate.into()
    }

    /// Built once at start-up and handed to the validator
    pub fn transition_table(&self) -> Result<TransitionTable, ValidationError> {
        match &self.transitions {
            Some(map) => TransitionTable::from_map(map),
            None => Ok(TransitionTable::standard()),
        }
    }
}

fn default_tax_rate() -> Decimal {
    Decimal::new(18, 2)
}

fn default_validity_days() -> u32 {
    15
}

fn default_company_code() -> String {
    "STC".to_string()
}

fn default_exchange_rate() -> Decimal {
    Decimal::new(83, 0)
}
