//! Per-model generation parameters.
//!
//! The file is a JSON object keyed by model name; each value is passed
//! through untouched as the `parameters` of an inference request, e.g.
//!
//! ```json
//! { "ai-forever/rugpt3medium_based_on_gpt2": { "max_new_tokens": 60, "temperature": 0.9 } }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

/// Generation parameters for every known model.
#[derive(Debug, Clone, Default)]
pub struct ModelParams {
    by_model: HashMap<String, Value>,
}

impl ModelParams {
    /// Load parameters from a JSON file.
    ///
    /// A missing or malformed file is not fatal: models run with the
    /// endpoint defaults and a warning is logged.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Model params not loaded: {e}");
                return Self::default();
            }
        };
        match Self::parse(&raw) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Model params file is invalid: {e}");
                Self::default()
            }
        }
    }

    /// Parse the JSON document. Keys are matched case-insensitively.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let by_model: HashMap<String, Value> = serde_json::from_str(raw)?;
        Ok(Self {
            by_model: by_model
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
        })
    }

    /// Parameters for a model, or an empty object.
    pub fn for_model(&self, model: &str) -> Value {
        self.by_model
            .get(&model.to_lowercase())
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}
