//! LLM-backed risk classification for the VTS voice gateway (§4.3)

pub mod analyzer;
pub mod backend;
pub mod error;
pub mod prompt;

pub use analyzer::{Analyzer, DEFAULT_MAX_CONCURRENT};
pub use backend::{AnalyzerBackend, AnalyzerBackendConfig, ClaudeAnalyzerBackend};
pub use error::AnalyzerError;
pub use prompt::AnalysisContext;
