//! The delivery-feedback survey: step data, states, sessions and the pure
//! transition function that drives them.

pub mod engine;
pub mod results;
pub mod session;
pub mod state;
pub mod steps;

pub use engine::{
    Effect, Event, TransitionContext, TransitionError, TransitionResult, normalize_answer,
    transition,
};
pub use results::{ResultLog, SurveyResult};
pub use session::{Answers, Session, SessionHandle, SessionStore};
pub use state::{SessionState, SurveyState};
pub use steps::{StepDefinition, StepId, StepRegistry};
