//! Analysis council runner.
//!
//! Wires the `coordination` core to an OpenAI-compatible text backend and an
//! HTTP tool service, with the default analyst roster.

pub mod config;
pub mod display;
pub mod llm;
pub mod pipeline;
pub mod roster;
pub mod tools;

pub use config::AppConfig;
pub use display::OutputFormat;
pub use pipeline::{CouncilReport, Pipeline, PipelineError};
