//! Dispatcher: turns raw user input into survey transitions and renders
//! their effects as outgoing messages.
//!
//! This is the only place that knows about response keyboards. Per-event
//! errors never leave `handle_event`; each is turned into a reply for the
//! user who caused it.

use std::sync::Arc;
use std::time::Duration;

use crate::channels::OutgoingResponse;
use crate::config::{BotConfig, DEFAULT_FALLBACK_NOTICE};
use crate::error::LlmError;
use crate::llm::BackendRegistry;
use crate::survey::{
    Answers, Effect, Event, ResultLog, Session, SessionState, SessionStore, StepDefinition, StepId,
    StepRegistry, SurveyResult, TransitionContext, TransitionError, transition,
};

const SUMMARY_HEADER: &str = "Here are your answers:";
const IDLE_HINT: &str = "Send /start to begin the survey.";

/// Map raw input to an event. Commands win in every state; anything else
/// is an answer, or a backend choice while one is pending.
pub fn parse_input(state: &SessionState, raw: &str) -> Event {
    let text = raw.trim();

    if let Some(command) = text.strip_prefix('/') {
        // Telegram appends the bot name in groups: /start@survey_bot
        let command = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .split('@')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match command.as_str() {
            "start" => return Event::Start,
            "model" | "backend" => return Event::SelectBackend,
            _ => {}
        }
    }

    match text.to_lowercase().as_str() {
        "start survey" => Event::Start,
        "select backend" | "select model" => Event::SelectBackend,
        _ if state.is_selecting_backend() => Event::BackendChoice(text.to_string()),
        _ => Event::Answer(text.to_string()),
    }
}

pub struct Dispatcher {
    steps: Arc<StepRegistry>,
    sessions: Arc<SessionStore>,
    backends: Arc<BackendRegistry>,
    results: ResultLog,
    generation_timeout: Duration,
    fallback_notice: String,
}

impl Dispatcher {
    pub fn new(steps: Arc<StepRegistry>, backends: Arc<BackendRegistry>) -> Self {
        Self {
            steps,
            sessions: Arc::new(SessionStore::new()),
            backends,
            results: ResultLog::disabled(),
            generation_timeout: Duration::from_secs(30),
            fallback_notice: DEFAULT_FALLBACK_NOTICE.to_string(),
        }
    }

    /// Apply the per-event settings of a configuration.
    pub fn configured(self, config: &BotConfig) -> Self {
        self.with_generation_timeout(config.generation_timeout)
            .with_fallback_notice(config.fallback_notice.clone())
            .with_results(ResultLog::new(config.results_path.clone()))
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn with_fallback_notice(mut self, notice: impl Into<String>) -> Self {
        self.fallback_notice = notice.into();
        self
    }

    pub fn with_results(mut self, results: ResultLog) -> Self {
        self.results = results;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn backends(&self) -> &Arc<BackendRegistry> {
        &self.backends
    }

    pub fn results(&self) -> &ResultLog {
        &self.results
    }

    /// Process one message from `user_id` and return the replies in order.
    ///
    /// Holds the user's session for the whole event, so a second message
    /// from the same user waits; other users proceed in parallel.
    pub async fn handle_event(&self, user_id: &str, raw: &str) -> Vec<OutgoingResponse> {
        let handle = self.sessions.get_or_create(user_id).await;
        let session = handle.session().clone();
        let event = parse_input(&session.state, raw);
        tracing::debug!(user_id = %user_id, state = %session.state, event = event.kind(), "Handling event");

        let names = self.backends.available();
        let context = TransitionContext { backends: &names };
        let result = match transition(&session, &context, event) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(user_id = %user_id, state = %session.state, "Rejected input: {e}");
                return self.reprompt(&session, &e).await;
            }
        };

        let mut replies = Vec::new();
        for effect in &result.effects {
            match effect {
                Effect::RenderStep(step) => replies.push(self.render_step(*step).await),
                Effect::CompleteSurvey { answers } => {
                    replies.push(self.render_summary(answers));
                    let backend = self.backends.current_name().await;
                    self.results
                        .record(&SurveyResult::new(user_id, answers.clone(), backend))
                        .await;
                }
                Effect::PromptBackendChoice => replies.push(self.backend_prompt().await),
                Effect::SwapBackend { name } => match self.backends.swap(name).await {
                    Ok(backend) => replies.push(
                        OutgoingResponse::text(format!("Backend switched to {}.", backend.name()))
                            .with_options(vec![]),
                    ),
                    Err(e) => {
                        // Session stays in selection: the handle is dropped unsaved.
                        let current = self.backends.current_name().await;
                        replies.push(OutgoingResponse::text(format!(
                            "Could not switch backend: {e}. Still using {current}."
                        )));
                        replies.push(self.backend_prompt().await);
                        return replies;
                    }
                },
            }
        }

        let next = result.apply(&session);
        tracing::debug!(user_id = %user_id, from = %session.state, to = %next.state, "Transition");
        handle.save(next);
        replies
    }

    /// Text for a step: generated when it has a prompt, static otherwise.
    async fn render_step(&self, id: StepId) -> OutgoingResponse {
        let step = self.steps.get(id);
        let text = match &step.generation_prompt {
            Some(prompt) => self.generate_text(step, prompt).await,
            None => step.text.clone(),
        };
        OutgoingResponse::text(text).with_options(step.buttons.clone())
    }

    /// Call the active backend with a deadline. Any failure degrades to the
    /// static text; only real failures add the notice.
    async fn generate_text(&self, step: &StepDefinition, prompt: &str) -> String {
        let backend = self.backends.current().await;
        let generated = tokio::time::timeout(self.generation_timeout, backend.generate(prompt))
            .await
            .unwrap_or_else(|_| {
                Err(LlmError::Timeout {
                    backend: backend.name().to_string(),
                    timeout: self.generation_timeout,
                })
            });
        match generated {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                tracing::warn!(backend = %backend.name(), step = %step.id, "Backend returned empty text");
                self.fallback(step)
            }
            Err(e) if e.is_disabled() => step.text.clone(),
            Err(e) => {
                tracing::warn!(backend = %backend.name(), step = %step.id, "Generation failed: {e}");
                self.fallback(step)
            }
        }
    }

    fn fallback(&self, step: &StepDefinition) -> String {
        format!("{}\n\n{}", self.fallback_notice, step.text)
    }

    fn render_summary(&self, answers: &Answers) -> OutgoingResponse {
        let mut text = String::from(SUMMARY_HEADER);
        for (step, answer) in answers.iter() {
            text.push_str(&format!("\n{}: {answer}", self.steps.get(step).label));
        }
        OutgoingResponse::text(text).with_options(vec![])
    }

    async fn backend_prompt(&self) -> OutgoingResponse {
        let current = self.backends.current_name().await;
        OutgoingResponse::text(format!("Choose a text generation backend (current: {current}):"))
            .with_options(self.backends.available())
    }

    async fn reprompt(&self, session: &Session, error: &TransitionError) -> Vec<OutgoingResponse> {
        match error {
            TransitionError::UnknownBackendSelection { input } => vec![
                OutgoingResponse::text(format!("'{input}' is not a known backend.")),
                self.backend_prompt().await,
            ],
            TransitionError::UnknownTransition { .. } => match session.state {
                SessionState::AwaitingModelSelection { .. } => vec![self.backend_prompt().await],
                SessionState::Survey { state } => match state.step() {
                    Some(step) => {
                        let step = self.steps.get(step);
                        vec![
                            OutgoingResponse::text(step.text.clone())
                                .with_options(step.buttons.clone()),
                        ]
                    }
                    None => vec![OutgoingResponse::text(IDLE_HINT).with_options(vec![])],
                },
            },
        }
    }
}
