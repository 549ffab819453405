//! Feature layout configuration.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A low-cardinality categorical field encoded one-hot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneHotField {
    /// Raw column name.
    pub field: String,
    /// Known values, in output order. Unknown values encode as all zeros.
    pub vocabulary: Vec<String>,
}

impl OneHotField {
    /// Creates a one-hot field.
    #[must_use]
    pub fn new(field: impl Into<String>, vocabulary: &[&str]) -> Self {
        Self {
            field: field.into(),
            vocabulary: vocabulary.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Feature layout: one-hot blocks, then the shared hashed block, then numerics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// One-hot encoded fields.
    #[serde(default = "default_one_hot")]
    pub one_hot: Vec<OneHotField>,
    /// High-cardinality fields hashed into one shared block.
    #[serde(default = "default_hashed_fields")]
    pub hashed_fields: Vec<String>,
    /// Width of the hashed block.
    #[serde(default = "default_hash_buckets")]
    pub hash_buckets: usize,
    /// Numeric passthrough fields, in output order.
    #[serde(default = "default_numeric_fields")]
    pub numeric_fields: Vec<String>,
}

const CATEGORIES: &[&str] = &[
    "entertainment",
    "food_dining",
    "gas_transport",
    "grocery_net",
    "grocery_pos",
    "health_fitness",
    "home",
    "kids_pets",
    "misc_net",
    "misc_pos",
    "personal_care",
    "shopping_net",
    "shopping_pos",
    "travel",
];

const STATES: &[&str] = &[
    "AK", "AL", "AR", "AZ", "CA", "CO", "CT", "DC", "DE", "FL", "GA", "HI", "IA", "ID", "IL",
    "IN", "KS", "KY", "LA", "MA", "MD", "ME", "MI", "MN", "MO", "MS", "MT", "NC", "ND", "NE",
    "NH", "NJ", "NM", "NV", "NY", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VA", "VT", "WA", "WI", "WV", "WY",
];

fn default_one_hot() -> Vec<OneHotField> {
    vec![
        OneHotField::new("category", CATEGORIES),
        OneHotField::new("state", STATES),
    ]
}

fn default_hashed_fields() -> Vec<String> {
    vec!["merchant".to_string(), "job".to_string()]
}

fn default_hash_buckets() -> usize {
    128
}

fn default_numeric_fields() -> Vec<String> {
    ["amt", "zip", "lat", "long", "city_pop", "merch_lat", "merch_long"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            one_hot: default_one_hot(),
            hashed_fields: default_hashed_fields(),
            hash_buckets: default_hash_buckets(),
            numeric_fields: default_numeric_fields(),
        }
    }
}

impl FeatureConfig {
    /// Returns the total number of output features.
    #[must_use]
    pub fn width(&self) -> usize {
        let one_hot: usize = self.one_hot.iter().map(|f| f.vocabulary.len()).sum();
        let hashed = if self.hashed_fields.is_empty() {
            0
        } else {
            self.hash_buckets
        };
        one_hot + hashed + self.numeric_fields.len()
    }

    /// Checks the layout is usable.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.width() == 0 {
            return Err(ConfigurationError::invalid("features", "layout produces no features"));
        }
        if !self.hashed_fields.is_empty() && self.hash_buckets == 0 {
            return Err(ConfigurationError::invalid(
                "features.hash_buckets",
                "must be greater than zero when hashed fields are configured",
            ));
        }

        let mut seen = HashSet::new();
        let all_fields = self
            .one_hot
            .iter()
            .map(|f| f.field.as_str())
            .chain(self.hashed_fields.iter().map(String::as_str))
            .chain(self.numeric_fields.iter().map(String::as_str));
        for field in all_fields {
            if !seen.insert(field) {
                return Err(ConfigurationError::invalid(
                    "features",
                    format!("field '{field}' appears in more than one block"),
                ));
            }
        }

        for block in &self.one_hot {
            if block.vocabulary.is_empty() {
                return Err(ConfigurationError::invalid(
                    format!("features.one_hot.{}", block.field),
                    "vocabulary must not be empty",
                ));
            }
            let mut values = HashSet::new();
            if let Some(dup) = block.vocabulary.iter().find(|v| !values.insert(v.as_str())) {
                return Err(ConfigurationError::invalid(
                    format!("features.one_hot.{}", block.field),
                    format!("duplicate vocabulary value '{dup}'"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_width() {
        let config = FeatureConfig::default();
        assert_eq!(config.width(), 14 + 51 + 128 + 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_field_in_two_blocks_rejected() {
        let mut config = FeatureConfig::default();
        config.numeric_fields.push("merchant".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("merchant"));
    }

    #[test]
    fn test_duplicate_vocabulary_rejected() {
        let mut config = FeatureConfig::default();
        config.one_hot = vec![OneHotField::new("category", &["home", "home"])];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_layout_rejected() {
        let config = FeatureConfig {
            one_hot: Vec::new(),
            hashed_fields: Vec::new(),
            hash_buckets: 0,
            numeric_fields: Vec::new(),
        };
        assert!(config.validate().is_err());
    }
}
