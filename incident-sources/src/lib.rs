//! Tracker (ClickUp) and chat (Slack) clients.
//!
//! Both produce the raw record types of `rca_engine::sources`; the engine
//! does the normalization. Concrete clients, each over its own
//! `reqwest::Client`; no trait objects.

pub mod clickup;
pub mod config;
pub mod errors;
pub mod slack;
pub mod types;

pub use clickup::ClickUpClient;
pub use config::{ClickUpConfig, SlackConfig};
pub use errors::{ConfigError, ProviderError, SourceError, SourceResult};
pub use slack::{SlackClient, SlackIdentity, find_thread_link};
pub use types::{DateRange, ThreadRef, TicketSummary};
