//! Language model collaborators for RecipeForge.
//!
//! This crate provides:
//! - [`LlmService`]: the function-call and assistant/thread/run contract
//!   every other crate talks to
//! - [`functions`]: the named function schemas and their typed results
//! - [`OpenAiClient`]: an OpenAI-compatible HTTP implementation

pub mod functions;
mod openai;
mod service;

pub use openai::OpenAiClient;
pub use service::{
    AssistantSpec, FunctionCall, FunctionSchema, LlmService, RunAction, RunStatus,
    call_function_as, get_run_action_as,
};
