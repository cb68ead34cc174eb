//! Streaming gzip decoder
//!
//! Member framing (RFC 1952) is handled here; the deflate body goes through
//! a raw [`flate2::Decompress`]. Each member's CRC32 and length trailer is
//! checked, and any number of members may follow each other.

use flate2::{Crc, Decompress, FlushDecompress, Status};

use super::OUTPUT_WINDOW;
use crate::error::{IngestError, Result};
use crate::filter::StreamFilter;

const NAME: &str = "gzip";

const MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 8;
const FIXED_HEADER_LEN: usize = 10;
const TRAILER_LEN: usize = 8;

const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;
const RESERVED: u8 = 0xe0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between members; the next byte starts a header
    Header,
    Body,
    Trailer,
}

/// Inflate state of the member currently open
struct Member {
    inflater: Decompress,
    crc: Crc,
}

impl Member {
    fn new() -> Self {
        Self {
            inflater: Decompress::new(false),
            crc: Crc::new(),
        }
    }

    /// One inflate call; returns (bytes consumed, bytes produced, member ended)
    fn inflate(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(usize, usize, bool)> {
        let in_before = self.inflater.total_in();
        let out_before = self.inflater.total_out();
        let start = out.len();
        out.resize(start + OUTPUT_WINDOW, 0);

        let status = self
            .inflater
            .decompress(input, &mut out[start..], FlushDecompress::None)
            .map_err(|e| IngestError::corrupt(NAME, e.to_string()));

        let consumed = (self.inflater.total_in() - in_before) as usize;
        let produced = (self.inflater.total_out() - out_before) as usize;
        out.truncate(start + produced);
        let status = status?;

        self.crc.update(&out[start..]);
        Ok((consumed, produced, status == Status::StreamEnd))
    }

    fn check_trailer(&self, trailer: &[u8]) -> Result<()> {
        let expected_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let expected_len = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
        if self.crc.sum() != expected_crc {
            return Err(IngestError::corrupt(
                NAME,
                format!("CRC32 mismatch: trailer {:08x}, data {:08x}", expected_crc, self.crc.sum()),
            ));
        }
        if self.crc.amount() != expected_len {
            return Err(IngestError::corrupt(
                NAME,
                format!(
                    "length mismatch: trailer {}, data {}",
                    expected_len,
                    self.crc.amount()
                ),
            ));
        }
        Ok(())
    }
}

/// Length of the member header at the start of `buf`
///
/// `Ok(None)` means the header is not complete yet. Bytes that already
/// contradict the format are rejected without waiting for more input.
fn header_len(buf: &[u8]) -> Result<Option<usize>> {
    for (i, &magic) in MAGIC.iter().enumerate() {
        match buf.get(i) {
            Some(&b) if b != magic => {
                return Err(IngestError::corrupt(NAME, format!("bad magic byte {:#04x} at offset {}", b, i)))
            },
            Some(_) => {},
            None => return Ok(None),
        }
    }
    if let Some(&method) = buf.get(2) {
        if method != METHOD_DEFLATE {
            return Err(IngestError::corrupt(NAME, format!("unsupported compression method {}", method)));
        }
    }
    if buf.len() < FIXED_HEADER_LEN {
        return Ok(None);
    }

    let flags = buf[3];
    if flags & RESERVED != 0 {
        return Err(IngestError::corrupt(NAME, format!("reserved header flags set: {:#04x}", flags)));
    }

    let mut pos = FIXED_HEADER_LEN;
    if flags & FEXTRA != 0 {
        let Some(len) = buf.get(pos..pos + 2) else {
            return Ok(None);
        };
        pos += 2 + u16::from_le_bytes([len[0], len[1]]) as usize;
        if buf.len() < pos {
            return Ok(None);
        }
    }
    for flag in [FNAME, FCOMMENT] {
        if flags & flag != 0 {
            match buf[pos..].iter().position(|&b| b == 0) {
                Some(nul) => pos += nul + 1,
                None => return Ok(None),
            }
        }
    }
    if flags & FHCRC != 0 {
        let Some(stored) = buf.get(pos..pos + 2) else {
            return Ok(None);
        };
        let mut crc = Crc::new();
        crc.update(&buf[..pos]);
        let expected = u16::from_le_bytes([stored[0], stored[1]]);
        if (crc.sum() & 0xffff) as u16 != expected {
            return Err(IngestError::corrupt(NAME, "header CRC16 mismatch"));
        }
        pos += 2;
    }
    Ok(Some(pos))
}

/// Incremental decoder for a sequence of gzip members
pub struct GzipDecoder {
    state: State,
    member: Member,
    /// Input fed but not consumed yet
    pending: Vec<u8>,
    members: u64,
}

impl GzipDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Header,
            member: Member::new(),
            pending: Vec::new(),
            members: 0,
        }
    }

    /// Number of members fully decoded and verified so far
    pub fn members(&self) -> u64 {
        self.members
    }
}

impl Default for GzipDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFilter for GzipDecoder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn feed(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.pending.extend_from_slice(input);
        let mut out = Vec::new();
        let mut pos = 0;

        loop {
            let rest = &self.pending[pos..];
            match self.state {
                State::Header => {
                    if rest.is_empty() {
                        break;
                    }
                    let Some(len) = header_len(rest)? else {
                        break;
                    };
                    pos += len;
                    self.member = Member::new();
                    self.state = State::Body;
                },
                State::Body => {
                    let (consumed, produced, ended) = self.member.inflate(rest, &mut out)?;
                    pos += consumed;
                    if ended {
                        self.state = State::Trailer;
                    } else if consumed == 0 && produced == 0 {
                        break;
                    }
                },
                State::Trailer => {
                    if rest.len() < TRAILER_LEN {
                        break;
                    }
                    self.member.check_trailer(&rest[..TRAILER_LEN])?;
                    pos += TRAILER_LEN;
                    self.members += 1;
                    self.state = State::Header;
                },
            }
        }

        self.pending.drain(..pos);
        Ok(out)
    }

    fn finished(&self) -> bool {
        self.state == State::Header && self.pending.is_empty()
    }
}
