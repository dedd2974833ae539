//! Text generation for survey steps.
//!
//! Supports:
//! - **static**: generation disabled, steps render their fixed text
//! - **Hosted models**: Hugging Face style inference endpoint via reqwest
//! - **Anthropic / OpenAI**: chat models via rig-core
//!
//! Every backend sits behind the `GenerationBackend` trait. The
//! `BackendCatalog` maps names to loaders and the `BackendRegistry` holds
//! the one active backend.

pub mod catalog;
pub mod inference;
pub mod params;
pub mod provider;
pub mod registry;
mod rig_adapter;

pub use catalog::{BackendCatalog, HOSTED_MODELS, STATIC_BACKEND};
pub use inference::{InferenceBackend, InferenceLoader};
pub use params::ModelParams;
pub use provider::{BackendLoader, GenerationBackend, PrebuiltLoader, StaticBackend, StaticLoader};
pub use registry::BackendRegistry;
pub use rig_adapter::{RigBackend, RigLoader, RigProvider};
