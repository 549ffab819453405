//! Feature transformer.
//!
//! Turns a [`RawPaymentEvent`] into the model's feature vector. The transform
//! is pure: no I/O and no state beyond the layout fixed at construction, so
//! the same event always yields the same vector.
//!
//! Layout, in order:
//! 1. one block per one-hot field, named `field=value`
//! 2. one shared hashed block for the high-cardinality fields, named `hashed_<i>`
//! 3. the numeric passthrough fields, named after the field

mod encoders;

pub use encoders::{hash_bucket, GENDER_FIELD};

use crate::config::FeatureConfig;
use crate::core::{FeatureVector, RawPaymentEvent, SkippedRecord, TransformOutcome};
use crate::errors::ConfigurationError;
use tracing::debug;

/// Deterministic event-to-features mapping.
#[derive(Debug, Clone)]
pub struct FeatureTransformer {
    config: FeatureConfig,
    names: Vec<String>,
}

impl FeatureTransformer {
    /// Creates a transformer for a validated layout.
    pub fn new(config: FeatureConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let names = layout_names(&config);
        Ok(Self { config, names })
    }

    /// Returns the output feature names in order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    /// Returns the number of output features.
    #[must_use]
    pub fn width(&self) -> usize {
        self.names.len()
    }

    /// Checks the output layout matches what the scoring side expects.
    ///
    /// Any difference in names or order is a startup error.
    pub fn align_to(&self, expected: &[String]) -> Result<(), ConfigurationError> {
        let longest = self.names.len().max(expected.len());
        for position in 0..longest {
            let actual = self.names.get(position);
            let wanted = expected.get(position);
            if actual != wanted {
                return Err(ConfigurationError::FeatureMismatch {
                    position,
                    expected: wanted.cloned(),
                    actual: actual.cloned(),
                });
            }
        }
        Ok(())
    }

    /// Transforms one event.
    #[must_use]
    pub fn transform(&self, event: &RawPaymentEvent) -> TransformOutcome {
        let mut values = Vec::with_capacity(self.names.len());

        for block in &self.config.one_hot {
            let value = event.text(&block.field);
            encoders::one_hot(&block.vocabulary, value.as_deref(), &mut values);
        }

        if !self.config.hashed_fields.is_empty() {
            let tokens: Vec<String> = self
                .config
                .hashed_fields
                .iter()
                .filter_map(|field| event.text(field))
                .collect();
            encoders::hashed(
                tokens.iter().map(String::as_str),
                self.config.hash_buckets,
                &mut values,
            );
        }

        for field in &self.config.numeric_fields {
            match encoders::numeric(event, field) {
                Ok(v) => values.push(v),
                Err(reason) => {
                    debug!(trans_num = %event.trans_num, %reason, "Skipping record");
                    return TransformOutcome::Skipped(SkippedRecord {
                        trans_num: event.trans_num.clone(),
                        reason,
                    });
                }
            }
        }

        TransformOutcome::Features(FeatureVector::new(event.trans_num.clone(), values))
    }

    /// Transforms a batch, splitting vectors from skipped records.
    #[must_use]
    pub fn transform_batch(&self, events: &[RawPaymentEvent]) -> (Vec<FeatureVector>, Vec<SkippedRecord>) {
        let mut vectors = Vec::with_capacity(events.len());
        let mut skipped = Vec::new();
        for event in events {
            match self.transform(event) {
                TransformOutcome::Features(v) => vectors.push(v),
                TransformOutcome::Skipped(s) => skipped.push(s),
            }
        }
        (vectors, skipped)
    }
}

fn layout_names(config: &FeatureConfig) -> Vec<String> {
    let mut names = Vec::with_capacity(config.width());
    for block in &config.one_hot {
        for value in &block.vocabulary {
            names.push(format!("{}={value}", block.field));
        }
    }
    if !config.hashed_fields.is_empty() {
        names.extend((0..config.hash_buckets).map(|i| format!("hashed_{i}")));
    }
    names.extend(config.numeric_fields.iter().cloned());
    names
}
