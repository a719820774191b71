//! Optional raw-audio diagnostic dump (§6 `saveAudioToStorage`, default false)
//!
//! When enabled, every fed PCM chunk is additionally written to an object
//! store for offline debugging — never read back by the gateway itself.
//! Disabled by default; [`NullAudioDumpSink`] is a pure no-op so the
//! feature costs nothing when it isn't turned on.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::warn;

#[async_trait]
pub trait AudioDumpSink: Send + Sync {
    async fn dump(&self, connection_id: &str, chunk: &[u8]);
}

/// Default sink: `saveAudioToStorage=false` wires this in, so `feed` pays
/// only the cost of a vtable call.
pub struct NullAudioDumpSink;

#[async_trait]
impl AudioDumpSink for NullAudioDumpSink {
    async fn dump(&self, _connection_id: &str, _chunk: &[u8]) {}
}

/// Appends raw PCM bytes to `<base_dir>/<connectionId>.pcm`, standing in
/// for the object-storage upload the real deployment would perform (the
/// concrete object store is an external collaborator, out of scope per
/// §1). Write failures are logged and swallowed — a diagnostic dump must
/// never affect the live session (§7 persistence-error policy applies
/// here by the same reasoning).
pub struct FileAudioDumpSink {
    base_dir: std::path::PathBuf,
}

impl FileAudioDumpSink {
    pub fn new(base_dir: impl Into<std::path::PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }
}

#[async_trait]
impl AudioDumpSink for FileAudioDumpSink {
    async fn dump(&self, connection_id: &str, chunk: &[u8]) {
        if let Err(err) = tokio::fs::create_dir_all(&self.base_dir).await {
            warn!(connection_id, error = %err, "failed to create audio dump directory");
            return;
        }

        let path = self.base_dir.join(format!("{connection_id}.pcm"));
        let file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await;
        match file {
            Ok(mut file) => {
                if let Err(err) = file.write_all(chunk).await {
                    warn!(connection_id, error = %err, "failed to append audio dump chunk");
                }
            }
            Err(err) => warn!(connection_id, error = %err, "failed to open audio dump file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_sink_is_a_no_op() {
        NullAudioDumpSink.dump("conn-1", &[1, 2, 3]).await;
    }

    #[tokio::test]
    async fn file_sink_appends_chunks() {
        let dir = std::env::temp_dir().join(format!("vts-gateway-audio-dump-test-{}", std::process::id()));
        let sink = FileAudioDumpSink::new(&dir);

        sink.dump("conn-1", &[1, 2, 3]).await;
        sink.dump("conn-1", &[4, 5]).await;

        let bytes = tokio::fs::read(dir.join("conn-1.pcm")).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4, 5]);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
