//! genstream - streaming client for the campaign packet generator
//!
//! The generation server runs a multi-step LLM pipeline and reports progress
//! as Server-Sent Events, pausing for human approval of the campaign plan.
//! This crate decodes that stream ([`sse`]), talks to the server ([`api`]),
//! and drives one generation session through its states ([`session`]).

pub mod api;
pub mod cli;
pub mod config;
pub mod render;
pub mod session;
pub mod sse;

pub use api::{ApiError, GenerationInput, HttpThreadApi, ResumeAction, ThreadApi};
pub use config::Config;
pub use session::{GenerationSessionController, Phase, SessionError, SessionState};
pub use sse::{DecodedEvent, StreamDecoder};
