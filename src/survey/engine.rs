//! Pure survey transition function.
//!
//! Given a session and one event, `transition` yields exactly one next
//! state and the effects the dispatcher must carry out. It performs no I/O
//! and knows nothing about the transport.

use thiserror::Error;

use crate::llm::catalog::find_by_name;

use super::session::{Answers, Session};
use super::state::{SessionState, SurveyState};
use super::steps::StepId;

/// Domain events, already parsed from raw transport input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Start (or restart) the survey.
    Start,
    /// Free text while a survey question is pending.
    Answer(String),
    /// Enter backend selection.
    SelectBackend,
    /// Free text while backend selection is pending.
    BackendChoice(String),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Answer(_) => "answer",
            Self::SelectBackend => "select_backend",
            Self::BackendChoice(_) => "backend_choice",
        }
    }
}

/// Effects to be executed after a transition, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Show a step (generated text if it has a prompt).
    RenderStep(StepId),
    /// Show the summary of a finished survey and log the result.
    CompleteSurvey { answers: Answers },
    /// Ask the user to pick a backend.
    PromptBackendChoice,
    /// Install the named backend; must succeed for the transition to commit.
    SwapBackend { name: String },
}

/// Result of a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub state: SessionState,
    pub answers: Answers,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState, answers: Answers) -> Self {
        Self {
            state,
            answers,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// Apply to a session, yielding the next session value.
    pub fn apply(&self, session: &Session) -> Session {
        Session {
            user_id: session.user_id.clone(),
            state: self.state,
            answers: self.answers.clone(),
        }
    }
}

/// Events with no edge from the current state. The session is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("No transition for {event} in state {state}")]
    UnknownTransition { state: SessionState, event: &'static str },

    #[error("'{input}' is not a known backend")]
    UnknownBackendSelection { input: String },
}

/// Read-only facts the transition needs beyond the session itself.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    /// Canonical names of selectable backends.
    pub backends: &'a [String],
}

impl TransitionContext<'_> {
    fn resolve_backend(&self, input: &str) -> Option<&str> {
        find_by_name(self.backends, String::as_str, input).map(String::as_str)
    }
}

/// Normalize an answer the way it is stored: trimmed and lower-cased.
pub fn normalize_answer(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Pure transition function.
pub fn transition(
    session: &Session,
    context: &TransitionContext<'_>,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    let unknown = || TransitionError::UnknownTransition {
        state: session.state,
        event: event.kind(),
    };

    match (session.state, &event) {
        // Start from anywhere: discard answers, ask the first question.
        (_, Event::Start) => Ok(TransitionResult::new(
            SessionState::survey(SurveyState::first()),
            Answers::new(),
        )
        .with_effect(Effect::RenderStep(StepId::Intro))
        .with_effect(Effect::RenderStep(StepId::OrderFrequency))),

        // Enter backend selection, parking the survey position.
        (SessionState::Survey { state }, Event::SelectBackend) => Ok(TransitionResult::new(
            SessionState::AwaitingModelSelection { resume: state },
            session.answers.clone(),
        )
        .with_effect(Effect::PromptBackendChoice)),

        // Asking again while already selecting keeps the parked position.
        (SessionState::AwaitingModelSelection { .. }, Event::SelectBackend) => {
            Ok(TransitionResult::new(session.state, session.answers.clone())
                .with_effect(Effect::PromptBackendChoice))
        }

        (SessionState::AwaitingModelSelection { resume }, Event::BackendChoice(input)) => {
            let Some(name) = context.resolve_backend(input) else {
                return Err(TransitionError::UnknownBackendSelection {
                    input: input.trim().to_string(),
                });
            };
            let mut result =
                TransitionResult::new(SessionState::survey(resume), session.answers.clone())
                    .with_effect(Effect::SwapBackend {
                        name: name.to_string(),
                    });
            if let Some(step) = resume.step() {
                result = result.with_effect(Effect::RenderStep(step));
            }
            Ok(result)
        }

        (SessionState::Survey { state }, Event::Answer(text)) => {
            let Some(step) = state.step() else {
                return Err(unknown());
            };
            let normalized = normalize_answer(text);
            if normalized.is_empty() {
                return Err(unknown());
            }

            let mut answers = session.answers.clone();
            if !answers.record(step, normalized) {
                return Err(unknown());
            }

            match state.next() {
                Some(SurveyState::Idle) => Ok(TransitionResult::new(
                    SessionState::survey(SurveyState::Idle),
                    Answers::new(),
                )
                .with_effect(Effect::CompleteSurvey { answers })
                .with_effect(Effect::RenderStep(StepId::ThankYou))),
                Some(next) => {
                    let next_step = next.step().ok_or_else(unknown)?;
                    Ok(TransitionResult::new(SessionState::survey(next), answers)
                        .with_effect(Effect::RenderStep(next_step)))
                }
                None => Err(unknown()),
            }
        }

        // Answers while selecting and choices while surveying have no edge.
        (SessionState::AwaitingModelSelection { .. }, Event::Answer(_))
        | (SessionState::Survey { .. }, Event::BackendChoice(_)) => Err(unknown()),
    }
}
