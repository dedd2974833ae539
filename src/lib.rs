//! Survey Bot: delivery-feedback survey over chat channels with a
//! swappable text-generation backend.

pub mod bot;
pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod llm;
pub mod status;
pub mod survey;
