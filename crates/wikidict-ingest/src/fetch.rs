//! Byte-chunk sources feeding the pipeline
//!
//! The pipeline pulls raw dump bytes through [`ChunkSource`]. Network
//! sources run the async HTTP client on a dedicated thread with its own
//! runtime and hand chunks over through a [`BoundedQueue`], so the rest of
//! the run stays on plain OS threads.

use std::fs::File;
use std::io::Read;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::queue::BoundedQueue;

/// Read size for file-backed sources
pub const FILE_CHUNK_SIZE: usize = 256 * 1024;

/// Pull-based stream of raw byte chunks
pub trait ChunkSource: Send {
    /// Next chunk, or `None` at the end of the stream
    ///
    /// Errors that ended the stream early are reported here rather than as
    /// a silent end of input.
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

impl<S: ChunkSource + ?Sized> ChunkSource for Box<S> {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        (**self).next_chunk()
    }
}

/// Source over any iterator of chunks
pub struct IterSource<I> {
    chunks: I,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = Vec<u8>> + Send,
{
    pub fn new(chunks: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            chunks: chunks.into_iter(),
        }
    }
}

impl<I> ChunkSource for IterSource<I>
where
    I: Iterator<Item = Vec<u8>> + Send,
{
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.chunks.next())
    }
}

/// Source reading a local file, used for cached dumps
pub struct FileSource<R = File> {
    reader: R,
    chunk_size: usize,
}

impl<R: Read + Send> FileSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, FILE_CHUNK_SIZE)
    }

    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
        }
    }
}

impl<R: Read + Send> ChunkSource for FileSource<R> {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.chunk_size];
        let n = loop {
            match self.reader.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }
}

/// HTTP client settings shared by every request of a run
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    connect_timeout: Duration,
    read_timeout: Duration,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(connect_timeout: Duration, read_timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            connect_timeout,
            read_timeout,
            user_agent: user_agent.into(),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(
            Duration::from_secs(config.connection_timeout_secs),
            Duration::from_secs(config.read_timeout_secs),
            config.user_agent.clone(),
        )
    }

    // No total timeout: a full dump download can take hours
    fn client(&self) -> Result<Client> {
        Ok(Client::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .user_agent(self.user_agent.clone())
            .build()?)
    }

    /// Fetch a small text resource such as a checksum manifest
    ///
    /// Blocks the calling thread; the request runs on a short-lived I/O
    /// thread so this works from any context.
    pub fn fetch_text(&self, url: &str) -> Result<String> {
        let client = self.client()?;
        let url = url.to_string();
        let handle = thread::Builder::new()
            .name("fetch-text".to_string())
            .spawn(move || -> Result<String> {
                let runtime = io_runtime()?;
                runtime.block_on(async move {
                    let response = get(&client, &url).await?;
                    Ok(response.text().await?)
                })
            })?;
        join_io_thread(handle)
    }

    /// Start streaming `url`; chunks become available through the source
    ///
    /// Cancelling `cancel` aborts the transfer even while it waits on the
    /// network.
    pub fn open(&self, url: &str, capacity: usize, cancel: &CancellationToken) -> Result<HttpSource> {
        let client = self.client()?;
        let queue = Arc::new(BoundedQueue::new(capacity));
        let cancel = cancel.child_token();

        let handle = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            let url = url.to_string();
            thread::Builder::new()
                .name("fetch".to_string())
                .spawn(move || {
                    let result = io_runtime()
                        .and_then(|rt| rt.block_on(stream_body(&client, &url, &queue, &cancel)));
                    queue.close();
                    result
                })?
        };

        Ok(HttpSource {
            queue,
            handle: Some(handle),
            cancel,
        })
    }
}

fn io_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

fn join_io_thread<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    handle.join().map_err(|_| IngestError::Pipeline {
        stage: "fetch".to_string(),
        message: "I/O thread panicked".to_string(),
    })?
}

async fn get(client: &Client, url: &str) -> Result<reqwest::Response> {
    debug!(url, "GET");
    let response = client.get(url).send().await?;
    if response.status() != StatusCode::OK {
        return Err(IngestError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    Ok(response)
}

async fn stream_body(
    client: &Client,
    url: &str,
    queue: &BoundedQueue<Vec<u8>>,
    cancel: &CancellationToken,
) -> Result<()> {
    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(IngestError::Cancelled),
        response = get(client, url) => response?,
    };
    info!(url, length = ?response.content_length(), "Streaming dump");

    let mut stream = response.bytes_stream();
    let mut received = 0u64;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;
        received += chunk.len() as u64;
        if !queue.push(chunk.to_vec()) {
            debug!(received, "Consumer stopped reading");
            return Ok(());
        }
    }
    debug!(url, received, "Transfer complete");
    Ok(())
}

/// Chunks of one HTTP response body
pub struct HttpSource {
    queue: Arc<BoundedQueue<Vec<u8>>>,
    handle: Option<JoinHandle<Result<()>>>,
    cancel: CancellationToken,
}

impl ChunkSource for HttpSource {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if let Some(chunk) = self.queue.pop() {
            return Ok(Some(chunk));
        }
        // Queue drained and closed: the transfer thread is done, find out how
        match self.handle.take() {
            Some(handle) => join_io_thread(handle).map(|()| None),
            None => Ok(None),
        }
    }
}

impl Drop for HttpSource {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.queue.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn drain(source: &mut dyn ChunkSource) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = source.next_chunk().unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn test_file_source_chunks() {
        let mut source = FileSource::with_chunk_size(Cursor::new(b"abcdefgh".to_vec()), 3);
        assert_eq!(
            drain(&mut source),
            vec![b"abc".to_vec(), b"def".to_vec(), b"gh".to_vec()]
        );
        assert!(source.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_iter_source() {
        let mut source = IterSource::new(vec![b"a".to_vec(), Vec::new(), b"b".to_vec()]);
        assert_eq!(drain(&mut source).len(), 3);
    }
}
