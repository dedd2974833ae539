//! Survey states: which question a user is on.

use serde::{Deserialize, Serialize};

use super::steps::StepId;

/// Position in the linear survey.
///
/// Progresses linearly: Idle → AwaitingOrderFrequency → AwaitingOrderProcess →
/// AwaitingDeliverySpeed → AwaitingDeliveryQuality → AwaitingOverallSatisfaction →
/// AwaitingAdditionalComments → Idle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyState {
    #[default]
    Idle,
    AwaitingOrderFrequency,
    AwaitingOrderProcess,
    AwaitingDeliverySpeed,
    AwaitingDeliveryQuality,
    AwaitingOverallSatisfaction,
    AwaitingAdditionalComments,
}

impl SurveyState {
    /// The question states, in order.
    pub const QUESTIONS: [SurveyState; 6] = [
        SurveyState::AwaitingOrderFrequency,
        SurveyState::AwaitingOrderProcess,
        SurveyState::AwaitingDeliverySpeed,
        SurveyState::AwaitingDeliveryQuality,
        SurveyState::AwaitingOverallSatisfaction,
        SurveyState::AwaitingAdditionalComments,
    ];

    /// First question of a freshly started survey.
    pub fn first() -> Self {
        Self::AwaitingOrderFrequency
    }

    /// State reached after an answer. The last question wraps to `Idle`.
    pub fn next(&self) -> Option<SurveyState> {
        use SurveyState::*;
        match self {
            Idle => None,
            AwaitingOrderFrequency => Some(AwaitingOrderProcess),
            AwaitingOrderProcess => Some(AwaitingDeliverySpeed),
            AwaitingDeliverySpeed => Some(AwaitingDeliveryQuality),
            AwaitingDeliveryQuality => Some(AwaitingOverallSatisfaction),
            AwaitingOverallSatisfaction => Some(AwaitingAdditionalComments),
            AwaitingAdditionalComments => Some(Idle),
        }
    }

    /// Step whose answer this state collects.
    pub fn step(&self) -> Option<StepId> {
        use SurveyState::*;
        match self {
            Idle => None,
            AwaitingOrderFrequency => Some(StepId::OrderFrequency),
            AwaitingOrderProcess => Some(StepId::OrderProcess),
            AwaitingDeliverySpeed => Some(StepId::DeliverySpeed),
            AwaitingDeliveryQuality => Some(StepId::DeliveryQuality),
            AwaitingOverallSatisfaction => Some(StepId::OverallSatisfaction),
            AwaitingAdditionalComments => Some(StepId::AdditionalComments),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for SurveyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingOrderFrequency => "awaiting_order_frequency",
            Self::AwaitingOrderProcess => "awaiting_order_process",
            Self::AwaitingDeliverySpeed => "awaiting_delivery_speed",
            Self::AwaitingDeliveryQuality => "awaiting_delivery_quality",
            Self::AwaitingOverallSatisfaction => "awaiting_overall_satisfaction",
            Self::AwaitingAdditionalComments => "awaiting_additional_comments",
        };
        write!(f, "{s}")
    }
}

/// Full state of a session: either somewhere in the survey, or choosing a
/// backend with the survey position parked until the choice is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SessionState {
    Survey { state: SurveyState },
    AwaitingModelSelection { resume: SurveyState },
}

impl SessionState {
    pub fn survey(state: SurveyState) -> Self {
        Self::Survey { state }
    }

    /// Survey position, parked or not.
    pub fn survey_state(&self) -> SurveyState {
        match self {
            Self::Survey { state } => *state,
            Self::AwaitingModelSelection { resume } => *resume,
        }
    }

    pub fn is_selecting_backend(&self) -> bool {
        matches!(self, Self::AwaitingModelSelection { .. })
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::survey(SurveyState::Idle)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Survey { state } => write!(f, "{state}"),
            Self::AwaitingModelSelection { resume } => {
                write!(f, "awaiting_model_selection(resume={resume})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_walks_all_questions_then_idle() {
        let mut current = SurveyState::first();
        let mut visited = vec![current];
        while let Some(next) = current.next() {
            if next.is_terminal() {
                break;
            }
            visited.push(next);
            current = next;
        }
        assert_eq!(visited, SurveyState::QUESTIONS);
        assert_eq!(
            SurveyState::AwaitingAdditionalComments.next(),
            Some(SurveyState::Idle)
        );
        assert!(SurveyState::Idle.next().is_none());
    }

    #[test]
    fn every_question_collects_a_distinct_step() {
        let steps: Vec<StepId> = SurveyState::QUESTIONS
            .iter()
            .map(|s| s.step().unwrap())
            .collect();
        assert_eq!(
            steps,
            vec![
                StepId::OrderFrequency,
                StepId::OrderProcess,
                StepId::DeliverySpeed,
                StepId::DeliveryQuality,
                StepId::OverallSatisfaction,
                StepId::AdditionalComments,
            ]
        );
        assert!(SurveyState::Idle.step().is_none());
    }

    #[test]
    fn display_matches_serde() {
        let states = std::iter::once(SurveyState::Idle).chain(SurveyState::QUESTIONS);
        for state in states {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(format!("\"{state}\""), json, "mismatch for {state:?}");
        }
    }

    #[test]
    fn parked_state_is_reported() {
        let state = SessionState::AwaitingModelSelection {
            resume: SurveyState::AwaitingDeliverySpeed,
        };
        assert!(state.is_selecting_backend());
        assert_eq!(state.survey_state(), SurveyState::AwaitingDeliverySpeed);
        assert_eq!(
            state.to_string(),
            "awaiting_model_selection(resume=awaiting_delivery_speed)"
        );
    }

    #[test]
    fn default_session_state_is_idle() {
        let state = SessionState::default();
        assert_eq!(state, SessionState::survey(SurveyState::Idle));
        assert!(!state.is_selecting_backend());
    }
}
