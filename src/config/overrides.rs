//! Command-line overrides applied on top of the loaded configuration.

use serde::{Deserialize, Serialize};

use crate::domain::Vocabulary;

/// Values supplied on the command line; unset fields keep the config value.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocabulary: Option<Vocabulary>,
}

impl RunOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if any overrides are set.
    pub fn is_empty(&self) -> bool {
        self.iterations.is_none()
            && self.model.is_none()
            && self.steps.is_none()
            && self.vocabulary.is_none()
    }

    pub fn iterations(mut self, value: u32) -> Self {
        self.iterations = Some(value);
        self
    }

    pub fn model(mut self, value: impl Into<String>) -> Self {
        self.model = Some(value.into());
        self
    }

    pub fn steps(mut self, value: u32) -> Self {
        self.steps = Some(value);
        self
    }

    pub fn vocabulary(mut self, value: Vocabulary) -> Self {
        self.vocabulary = Some(value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_overrides() {
        assert!(RunOverrides::new().is_empty());
    }

    #[test]
    fn test_builder_sets_fields() {
        let overrides = RunOverrides::new().iterations(2).steps(10);
        assert!(!overrides.is_empty());
        assert_eq!(overrides.iterations, Some(2));
        assert_eq!(overrides.steps, Some(10));
        assert!(overrides.model.is_none());
    }

    #[test]
    fn test_serialization_skips_unset() {
        let json = serde_json::to_string(&RunOverrides::new().model("nerfacto")).unwrap();
        assert_eq!(json, r#"{"model":"nerfacto"}"#);
    }
}
