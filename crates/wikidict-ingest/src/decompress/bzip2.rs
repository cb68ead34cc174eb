//! Streaming bzip2 decoder
//!
//! Wikimedia dumps are multistream bzip2 files: many independent streams
//! written back to back. A new native context is opened lazily whenever
//! input arrives and no stream is open.

use ::bzip2::{Decompress, Status};
use tracing::trace;

use super::OUTPUT_WINDOW;
use crate::error::{IngestError, Result};
use crate::filter::StreamFilter;

const NAME: &str = "bzip2";

pub struct Bzip2Decoder {
    stream: Option<Decompress>,
    /// Input fed but not consumed yet
    pending: Vec<u8>,
    streams: u64,
}

impl Bzip2Decoder {
    pub fn new() -> Self {
        Self {
            stream: None,
            pending: Vec::new(),
            streams: 0,
        }
    }

    /// Number of complete streams decoded so far
    pub fn streams(&self) -> u64 {
        self.streams
    }
}

impl Default for Bzip2Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFilter for Bzip2Decoder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn feed(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.pending.extend_from_slice(input);
        let mut out = Vec::new();
        let mut pos = 0;

        loop {
            let rest = &self.pending[pos..];
            if rest.is_empty() && self.stream.is_none() {
                break;
            }
            let stream = self.stream.get_or_insert_with(|| Decompress::new(false));

            let in_before = stream.total_in();
            let out_before = stream.total_out();
            let start = out.len();
            out.resize(start + OUTPUT_WINDOW, 0);

            let status = stream
                .decompress(rest, &mut out[start..])
                .map_err(|e| IngestError::corrupt(NAME, e.to_string()));

            let consumed = (stream.total_in() - in_before) as usize;
            let produced = (stream.total_out() - out_before) as usize;
            out.truncate(start + produced);
            pos += consumed;

            match status? {
                Status::StreamEnd => {
                    self.streams += 1;
                    self.stream = None;
                    trace!(streams = self.streams, "bzip2 stream ended");
                },
                Status::MemNeeded => {
                    return Err(IngestError::corrupt(NAME, "decoder ran out of memory"));
                },
                _ if consumed == 0 && produced == 0 => break,
                _ => {},
            }
        }

        self.pending.drain(..pos);
        Ok(out)
    }

    fn finished(&self) -> bool {
        self.stream.is_none() && self.pending.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::filter::feed_all;
    use ::bzip2::write::BzEncoder;
    use std::io::Write;

    fn bzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = BzEncoder::new(Vec::new(), ::bzip2::Compression::fast());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn sample_text() -> Vec<u8> {
        (0..3000)
            .map(|i| format!("# definition number {}\n", i))
            .collect::<String>()
            .into_bytes()
    }

    #[test]
    fn test_arbitrary_chunking() {
        let text = sample_text();
        let compressed = bzip(&text);
        for size in [1, 3, 64, 1000, compressed.len()] {
            let mut decoder = Bzip2Decoder::new();
            let out = feed_all(&mut decoder, compressed.chunks(size)).unwrap();
            assert_eq!(out, text, "chunk size {}", size);
            assert!(decoder.finished());
        }
    }

    #[test]
    fn test_multistream() {
        let mut compressed = bzip(b"<mediawiki>");
        compressed.extend(bzip(b"<page/>"));
        compressed.extend(bzip(b"</mediawiki>"));

        let mut decoder = Bzip2Decoder::new();
        let out = feed_all(&mut decoder, compressed.chunks(17)).unwrap();
        assert_eq!(out, b"<mediawiki><page/></mediawiki>");
        assert_eq!(decoder.streams(), 3);
        assert!(decoder.finished());
    }

    #[test]
    fn test_truncated_stream_is_not_finished() {
        let compressed = bzip(&sample_text());
        let mut decoder = Bzip2Decoder::new();
        feed_all(&mut decoder, [&compressed[..compressed.len() - 10]]).unwrap();
        assert!(!decoder.finished());
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let mut decoder = Bzip2Decoder::new();
        let err = feed_all(&mut decoder, [b"definitely not bzip2".as_slice()]).unwrap_err();
        assert!(matches!(err, IngestError::CorruptStream { stage: "bzip2", .. }));
    }

    #[test]
    fn test_empty_feed_on_idle_decoder() {
        let mut decoder = Bzip2Decoder::new();
        assert!(decoder.feed(&[]).unwrap().is_empty());
        assert!(decoder.finished());
    }
}
