//! Digest agent: generates the daily report, diffs it against the last
//! snapshot and relays what changed to a Telegram chat.
//!
//! The diffing, chunking and persistence logic lives in `report_pipeline`;
//! this crate wires it to the HTTP collaborators and the CLI.

pub mod config;
pub mod generator;
pub mod orchestrator;
pub mod prompts;
pub mod telegram;

pub use config::DigestConfig;
pub use generator::{ChatCompletionsGenerator, GeneratorError, ReportGenerator};
pub use orchestrator::{changed_message, CycleError, CycleOutcome, NotifyPolicy, Orchestrator};
pub use telegram::{LogTransport, TelegramTransport};
