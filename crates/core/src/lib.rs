//! Shared data model for the VTS voice gateway
//!
//! This crate provides the entities that flow between the gateway's
//! components: connection records, transcription session state, the
//! append-only conversation log, transient ASR events, and LLM analysis
//! results. None of these types depend on a transport or storage choice;
//! `vts-gateway-server` and `vts-gateway-persistence` adapt them to axum
//! and ScyllaDB respectively.

pub mod analysis;
pub mod connection;
pub mod conversation;
pub mod error;
pub mod session;
pub mod transcript;

pub use analysis::{AnalysisResult, Classification};
pub use connection::{ConnectionRecord, ConnectionStatus};
pub use conversation::{ConversationItem, ItemPayload, ItemType};
pub use error::{Error, Result};
pub use session::{AsrStartOptions, SessionStatus, TranscriptionSession};
pub use transcript::TranscriptEvent;
