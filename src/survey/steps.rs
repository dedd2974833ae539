//! Step definitions: display text, response buttons and optional
//! generation prompt for every point of the survey.
//!
//! Loaded once at startup from a JSON file keyed by step id:
//!
//! ```json
//! {
//!   "order_frequency": {
//!     "text": "How often do you order from us?",
//!     "buttons": ["Daily", "Weekly", "Rarely"],
//!     "prompt": "Write a friendly question about how often the customer orders.",
//!     "label": "Order frequency"
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Identifier of a survey step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Intro,
    OrderFrequency,
    OrderProcess,
    DeliverySpeed,
    DeliveryQuality,
    OverallSatisfaction,
    AdditionalComments,
    ThankYou,
}

impl StepId {
    /// Every step the data file must define.
    pub const ALL: [StepId; 8] = [
        StepId::Intro,
        StepId::OrderFrequency,
        StepId::OrderProcess,
        StepId::DeliverySpeed,
        StepId::DeliveryQuality,
        StepId::OverallSatisfaction,
        StepId::AdditionalComments,
        StepId::ThankYou,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::OrderFrequency => "order_frequency",
            Self::OrderProcess => "order_process",
            Self::DeliverySpeed => "delivery_speed",
            Self::DeliveryQuality => "delivery_quality",
            Self::OverallSatisfaction => "overall_satisfaction",
            Self::AdditionalComments => "additional_comments",
            Self::ThankYou => "thank_you",
        }
    }

    /// Heading used for this step in the final summary.
    pub fn default_label(&self) -> &'static str {
        match self {
            Self::Intro => "Introduction",
            Self::OrderFrequency => "Order frequency",
            Self::OrderProcess => "Ordering convenience",
            Self::DeliverySpeed => "Delivery speed",
            Self::DeliveryQuality => "Delivery quality",
            Self::OverallSatisfaction => "Overall satisfaction",
            Self::AdditionalComments => "Comments",
            Self::ThankYou => "Thank you",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownStep {
                step: s.to_string(),
            })
    }
}

/// One point of the survey. Immutable and shared by every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    pub id: StepId,
    pub text: String,
    pub buttons: Vec<String>,
    /// Fed to the active backend instead of showing `text` verbatim.
    pub generation_prompt: Option<String>,
    pub label: String,
}

/// On-disk shape of a step.
#[derive(Debug, Deserialize)]
struct RawStep {
    text: String,
    #[serde(default)]
    buttons: Vec<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

/// Process-wide table of step definitions.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: HashMap<StepId, StepDefinition>,
}

impl StepRegistry {
    /// Read and validate the step file. Any problem is fatal at startup.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registry = Self::from_json(&raw, &path.display().to_string())?;
        tracing::info!(path = %path.display(), steps = registry.steps.len(), "Loaded survey steps");
        Ok(registry)
    }

    /// Parse and validate a JSON document. `source` names it in errors.
    pub fn from_json(raw: &str, source: &str) -> Result<Self, ConfigError> {
        let parsed: HashMap<String, RawStep> =
            serde_json::from_str(raw).map_err(|e| ConfigError::ParseError {
                path: source.to_string(),
                reason: e.to_string(),
            })?;

        let mut steps = HashMap::with_capacity(parsed.len());
        for (key, raw_step) in parsed {
            let id: StepId = key.parse()?;
            if raw_step.text.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("{source}:{key}.text"),
                    message: "step text must not be empty".to_string(),
                });
            }
            let generation_prompt = raw_step
                .prompt
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty());
            let label = raw_step
                .label
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| id.default_label().to_string());
            steps.insert(
                id,
                StepDefinition {
                    id,
                    text: raw_step.text,
                    buttons: raw_step.buttons,
                    generation_prompt,
                    label,
                },
            );
        }

        Self::from_definitions(steps.into_values())
    }

    /// Build from already-constructed definitions, checking every step exists.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = StepDefinition>,
    ) -> Result<Self, ConfigError> {
        let steps: HashMap<StepId, StepDefinition> =
            definitions.into_iter().map(|d| (d.id, d)).collect();
        if let Some(missing) = StepId::ALL.iter().find(|id| !steps.contains_key(*id)) {
            return Err(ConfigError::MissingStep {
                step: missing.to_string(),
            });
        }
        Ok(Self { steps })
    }

    /// Definition of a step. Every [`StepId`] is present after validation.
    pub fn get(&self, id: StepId) -> &StepDefinition {
        &self.steps[&id]
    }
}
