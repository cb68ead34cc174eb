//! Incremental byte-stream filters
//!
//! Decompressors and the tar filter share one contract: they are fed a byte
//! stream cut at arbitrary offsets and return whatever output those bytes
//! complete. Feeding the chunks of a stream one by one must produce the same
//! concatenated output as feeding the whole stream at once.

use crate::error::Result;

pub trait StreamFilter: Send {
    /// Short name used in logs and error messages ("gzip", "tar", ...)
    fn name(&self) -> &'static str;

    /// Consume `input` and return the output it completes.
    ///
    /// An empty `input` is valid and drains anything still buffered.
    fn feed(&mut self, input: &[u8]) -> Result<Vec<u8>>;

    /// True when no structure is left open and no input is pending
    fn finished(&self) -> bool;
}

impl<F: StreamFilter + ?Sized> StreamFilter for Box<F> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn feed(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        (**self).feed(input)
    }

    fn finished(&self) -> bool {
        (**self).finished()
    }
}

/// Feed a sequence of chunks and collect the concatenated output
pub fn feed_all<'a, F, I>(filter: &mut F, chunks: I) -> Result<Vec<u8>>
where
    F: StreamFilter + ?Sized,
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend_from_slice(&filter.feed(chunk)?);
    }
    out.extend_from_slice(&filter.feed(&[])?);
    Ok(out)
}
