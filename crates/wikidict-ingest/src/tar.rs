//! Tar concatenation filter
//!
//! Strips ustar/GNU framing from a byte stream and passes through the
//! contents of regular file entries, in archive order. Headers are assembled
//! across feed boundaries and never leak into the output.

use tracing::{debug, trace};

use crate::error::{IngestError, Result};
use crate::filter::StreamFilter;

const NAME: &str = "tar";

pub const BLOCK_SIZE: usize = 512;

const NAME_FIELD: std::ops::Range<usize> = 0..100;
const SIZE_FIELD: std::ops::Range<usize> = 124..136;
const CHECKSUM_FIELD: std::ops::Range<usize> = 148..156;
const TYPEFLAG: usize = 156;

/// Entry types whose content is file data
const REGULAR_TYPES: [u8; 3] = [b'0', 0, b'7'];

/// Position inside the archive
#[derive(Debug, Default)]
struct TarCursor {
    /// Content bytes still owed for the current entry
    remaining: u64,
    /// Zero bytes between the end of content and the next block boundary
    padding: u64,
    /// Whether the current entry's content is emitted or skipped
    emit: bool,
    /// Partial header carried over from the previous feed
    header: Vec<u8>,
}

pub struct TarFilter {
    cursor: TarCursor,
    entries: u64,
}

impl TarFilter {
    pub fn new() -> Self {
        Self {
            cursor: TarCursor::default(),
            entries: 0,
        }
    }

    /// Regular file entries seen so far
    pub fn entries(&self) -> u64 {
        self.entries
    }

    fn start_entry(&mut self) -> Result<()> {
        let header = &self.cursor.header;
        if header[SIZE_FIELD.start] == 0 {
            // End-of-archive block or an empty slot; nothing to read
            trace!("tar terminator block");
            return Ok(());
        }
        verify_checksum(header)?;

        let size = parse_size(&header[SIZE_FIELD])?;
        let typeflag = header[TYPEFLAG];
        let emit = REGULAR_TYPES.contains(&typeflag);
        if emit {
            self.entries += 1;
            debug!(
                entry = %entry_name(header),
                size,
                "tar entry"
            );
        } else {
            trace!(typeflag = %(typeflag as char), size, "skipping non-file tar entry");
        }

        self.cursor.remaining = size;
        self.cursor.padding = padding_for(size);
        self.cursor.emit = emit;
        Ok(())
    }
}

impl Default for TarFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFilter for TarFilter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn feed(&mut self, mut input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        while !input.is_empty() {
            if self.cursor.remaining > 0 {
                let n = take(self.cursor.remaining, input.len());
                if self.cursor.emit {
                    out.extend_from_slice(&input[..n]);
                }
                self.cursor.remaining -= n as u64;
                input = &input[n..];
                continue;
            }
            if self.cursor.padding > 0 {
                let n = take(self.cursor.padding, input.len());
                self.cursor.padding -= n as u64;
                input = &input[n..];
                continue;
            }

            let n = (BLOCK_SIZE - self.cursor.header.len()).min(input.len());
            self.cursor.header.extend_from_slice(&input[..n]);
            input = &input[n..];
            if self.cursor.header.len() == BLOCK_SIZE {
                self.start_entry()?;
                self.cursor.header.clear();
            }
        }

        Ok(out)
    }

    fn finished(&self) -> bool {
        self.cursor.remaining == 0 && self.cursor.padding == 0 && self.cursor.header.is_empty()
    }
}

fn take(owed: u64, available: usize) -> usize {
    usize::try_from(owed).map_or(available, |owed| owed.min(available))
}

/// Bytes needed to round `size` up to a block boundary
fn padding_for(size: u64) -> u64 {
    let block = BLOCK_SIZE as u64;
    (block - size % block) % block
}

/// Parse the size field, octal or GNU base-256
fn parse_size(field: &[u8]) -> Result<u64> {
    if field[0] & 0x80 != 0 {
        // Base-256: big-endian binary after the marker bit
        let mut value = u64::from(field[0] & 0x7f);
        for &b in &field[1..] {
            value = value
                .checked_mul(256)
                .and_then(|v| v.checked_add(u64::from(b)))
                .ok_or_else(|| IngestError::corrupt(NAME, "entry size overflows"))?;
        }
        return Ok(value);
    }
    parse_octal(field).ok_or_else(|| {
        IngestError::corrupt(
            NAME,
            format!("invalid size field {:?}", String::from_utf8_lossy(field)),
        )
    })
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let digits: &[u8] = {
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let trimmed = &field[..end];
        let start = trimmed.iter().position(|&b| b != b' ')?;
        let stop = trimmed.iter().rposition(|&b| b != b' ')?;
        &trimmed[start..=stop]
    };
    digits.iter().try_fold(0u64, |acc, &b| match b {
        b'0'..=b'7' => acc.checked_mul(8)?.checked_add(u64::from(b - b'0')),
        _ => None,
    })
}

/// Header sums are taken with the checksum field read as spaces; some old
/// writers summed signed bytes, so both variants are accepted.
fn verify_checksum(header: &[u8]) -> Result<()> {
    let stored = parse_octal(&header[CHECKSUM_FIELD])
        .ok_or_else(|| IngestError::corrupt(NAME, "unreadable header checksum"))?;

    let mut unsigned: u64 = 0;
    let mut signed: i64 = 0;
    for (i, &b) in header.iter().enumerate() {
        let b = if CHECKSUM_FIELD.contains(&i) { b' ' } else { b };
        unsigned += u64::from(b);
        signed += i64::from(b as i8);
    }

    if stored == unsigned || i64::try_from(stored).is_ok_and(|s| s == signed) {
        Ok(())
    } else {
        Err(IngestError::corrupt(
            NAME,
            format!("header checksum mismatch: stored {}, computed {}", stored, unsigned),
        ))
    }
}

fn entry_name(header: &[u8]) -> String {
    let field = &header[NAME_FIELD];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::filter::feed_all;
    use ::tar::{Builder, EntryType, Header};

    fn file_header(size: u64) -> Header {
        let mut header = Header::new_gnu();
        header.set_size(size);
        header.set_mode(0o644);
        header
    }

    fn one_file_archive() -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        builder
            .append_data(&mut file_header(10), "a.txt", &b"0123456789"[..])
            .unwrap();
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_one_file_any_split() {
        let archive = one_file_archive();
        for split in 0..=archive.len() {
            let mut filter = TarFilter::new();
            let (left, right) = archive.split_at(split);
            let out = feed_all(&mut filter, [left, right]).unwrap();
            assert_eq!(out, b"0123456789", "split at {}", split);
            assert!(filter.finished());
        }
    }

    #[test]
    fn test_header_straddling_feeds_emits_nothing_early() {
        let archive = one_file_archive();
        let mut filter = TarFilter::new();
        assert!(filter.feed(&archive[..300]).unwrap().is_empty());
        assert!(!filter.finished());
        assert_eq!(filter.feed(&archive[300..515]).unwrap(), b"012");
        assert!(!filter.finished());
        assert_eq!(filter.feed(&archive[515..]).unwrap(), b"3456789");
        assert!(filter.finished());
        assert_eq!(filter.entries(), 1);
    }

    #[test]
    fn test_concatenates_multiple_entries() {
        let first = vec![b'x'; 512];
        let second = vec![b'y'; 700];
        let mut builder = Builder::new(Vec::new());
        builder
            .append_data(&mut file_header(first.len() as u64), "part-1.xml", first.as_slice())
            .unwrap();
        builder
            .append_data(&mut file_header(0), "empty.xml", &[][..])
            .unwrap();
        builder
            .append_data(&mut file_header(second.len() as u64), "part-2.xml", second.as_slice())
            .unwrap();
        let archive = builder.into_inner().unwrap();

        let mut filter = TarFilter::new();
        let out = feed_all(&mut filter, archive.chunks(97)).unwrap();
        assert_eq!(out, [first, second].concat());
        assert_eq!(filter.entries(), 3);
        assert!(filter.finished());
    }

    #[test]
    fn test_skips_directories_and_metadata_entries() {
        let mut builder = Builder::new(Vec::new());

        let mut dir = Header::new_gnu();
        dir.set_entry_type(EntryType::Directory);
        dir.set_size(0);
        builder.append_data(&mut dir, "dump/", &[][..]).unwrap();

        let pax = b"30 mtime=1700000000.123456789\n";
        let mut ext = Header::new_ustar();
        ext.set_entry_type(EntryType::XHeader);
        ext.set_size(pax.len() as u64);
        builder.append_data(&mut ext, "PaxHeader/a.xml", &pax[..]).unwrap();

        // A name this long makes the builder emit a GNU long-name entry first
        let long_name = format!("dump/{}.xml", "n".repeat(150));
        builder
            .append_data(&mut file_header(4), long_name, &b"data"[..])
            .unwrap();
        let archive = builder.into_inner().unwrap();

        let mut filter = TarFilter::new();
        let out = feed_all(&mut filter, archive.chunks(100)).unwrap();
        assert_eq!(out, b"data");
        assert_eq!(filter.entries(), 1);
    }

    #[test]
    fn test_base256_size() {
        let content = b"hello";
        let mut header = file_header(0);
        header.set_path("big.bin").unwrap();
        {
            let bytes = header.as_mut_bytes();
            bytes[SIZE_FIELD].fill(0);
            bytes[SIZE_FIELD.start] = 0x80;
            bytes[SIZE_FIELD.end - 1] = content.len() as u8;
        }
        header.set_cksum();

        let mut archive = header.as_bytes().to_vec();
        archive.extend_from_slice(content);
        archive.resize(BLOCK_SIZE * 2, 0);
        archive.extend_from_slice(&[0; BLOCK_SIZE * 2]);

        let mut filter = TarFilter::new();
        assert_eq!(feed_all(&mut filter, archive.chunks(33)).unwrap(), content);
        assert!(filter.finished());
    }

    #[test]
    fn test_checksum_mismatch_is_corrupt() {
        let mut archive = one_file_archive();
        archive[0] = b'b';
        let mut filter = TarFilter::new();
        let err = filter.feed(&archive).unwrap_err();
        assert!(matches!(err, IngestError::CorruptStream { stage: "tar", .. }));
    }

    #[test]
    fn test_truncated_entry_is_not_finished() {
        let archive = one_file_archive();
        let mut filter = TarFilter::new();
        assert_eq!(filter.feed(&archive[..BLOCK_SIZE + 4]).unwrap(), b"0123");
        assert!(!filter.finished());
    }

    #[test]
    fn test_padding_and_octal_helpers() {
        assert_eq!(padding_for(0), 0);
        assert_eq!(padding_for(10), 502);
        assert_eq!(padding_for(512), 0);
        assert_eq!(padding_for(513), 511);
        assert_eq!(parse_octal(b"00000000012\0"), Some(10));
        assert_eq!(parse_octal(b"     12 \0\0\0\0"), Some(10));
        assert_eq!(parse_octal(b"0000009\0"), None);
        assert_eq!(parse_octal(b"\0\0\0"), None);
    }
}
