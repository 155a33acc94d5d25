use std::fs::File;
use std::io::{BufReader, Read};

use bytes::Bytes;
use camino::Utf8Path;
use flate2::read::GzEncoder;
use flate2::Compression;
use futures::stream::{self, Stream};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

const READ_CHUNK: usize = 8192;
const STREAM_CHUNK: usize = 64 * 1024;
// Chunks buffered per stream before the compressor blocks on the consumer.
const STREAM_WINDOW: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("digest worker stopped unexpectedly")]
    WorkerGone,
}

/// SHA-256 over the gzip-compressed bytes of a file, rendered as lowercase
/// hex. Compresses and hashes in fixed-size chunks; the file is never held
/// in memory whole.
pub fn gzip_digest_sync(fs_path: &Utf8Path, level: u32) -> Result<String, DigestError> {
    let file = File::open(fs_path)?;
    let mut encoder = GzEncoder::new(BufReader::new(file), Compression::new(level));
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = encoder.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Async wrapper for [`gzip_digest_sync`]; the work runs on the blocking pool.
pub async fn gzip_digest(fs_path: &Utf8Path, level: u32) -> Result<String, DigestError> {
    let path = fs_path.to_owned();
    tokio::task::spawn_blocking(move || gzip_digest_sync(&path, level))
        .await
        .map_err(|_| DigestError::WorkerGone)?
}

/// Gzip a file into a chunked byte stream suitable for a streaming request
/// body. Compression runs on the blocking pool and is re-done from scratch
/// on every call, so a retried upload always gets a fresh stream. Must be
/// called from within a tokio runtime.
pub fn gzip_stream(
    fs_path: &Utf8Path,
    level: u32,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let path = fs_path.to_owned();
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(STREAM_WINDOW);
    tokio::task::spawn_blocking(move || {
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        };
        let mut encoder = GzEncoder::new(BufReader::new(file), Compression::new(level));
        let mut buf = vec![0u8; STREAM_CHUNK];
        loop {
            match encoder.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    // A closed receiver means the request was dropped; stop
                    // compressing.
                    if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    break;
                }
            }
        }
    });
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
}
