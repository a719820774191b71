pub mod backend;
pub mod diagnostics;
pub mod pool;
pub mod simulated;

pub use backend::{AsrStream, StreamingAsrBackend};
pub use diagnostics::{AudioDumpSink, FileAudioDumpSink, NullAudioDumpSink};
pub use pool::{AsrSessionPool, TranscriptSink};
pub use simulated::SimulatedAsrBackend;
