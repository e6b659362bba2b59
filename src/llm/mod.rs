//! Optional document-understanding collaborator.
//!
//! Evidence snippets go out, a qualitative report comes back. Everything it
//! reports is advisory: quantities are clamped against the deterministic
//! counts, and any failure leaves the deterministic result untouched.

mod client;
mod config;
mod prompts;
mod response;

pub use client::{
    CollaboratorError, DocumentUnderstanding, DocumentUnderstandingClient, UnderstandingRequest,
};
pub use config::{LlmConfig, LlmProvider};
pub use prompts::{output_schema, DEFAULT_SYSTEM_PROMPT};
pub use response::{extract_json_block, parse_report, QualitativeReport, ReportEntry};
