use quick_xml::escape::unescape;

use super::NAME;
use crate::error::{IngestError, Result};

/// An element that has just been closed
#[derive(Debug)]
pub struct ClosedElement<'a> {
    /// Slash-joined names from the root, e.g. `mediawiki/page/title`
    pub path: &'a str,
    raw_text: &'a [u8],
}

impl ClosedElement<'_> {
    /// Direct text of the element with entity references resolved
    pub fn text(&self) -> Result<String> {
        decode_text(self.raw_text, self.path)
    }
}

fn decode_text(raw: &[u8], path: &str) -> Result<String> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| IngestError::corrupt(NAME, format!("invalid UTF-8 in <{}>: {}", path, e)))?;
    let text = unescape(text)
        .map_err(|e| IngestError::corrupt(NAME, format!("bad entity in <{}>: {}", path, e)))?;
    Ok(text.into_owned())
}

#[derive(Debug)]
struct OpenElement {
    /// Length of the path before this element was pushed
    parent_len: usize,
    /// Start of this element's own name inside the path
    name_start: usize,
    text: Vec<u8>,
}

/// Restartable tokenizer reporting each element as it closes
///
/// Text runs are moved into the open element as soon as they are seen; only
/// an incomplete piece of markup is carried over to the next feed. Element
/// text is reported with surrounding whitespace trimmed, and an element that
/// only holds whitespace between its children buffers nothing.
#[derive(Debug, Default)]
pub struct Iterate {
    buffer: Vec<u8>,
    /// Bytes of input discarded before `buffer[0]`
    offset: u64,
    path: String,
    stack: Vec<OpenElement>,
}

enum Markup<'a> {
    Open { name: &'a [u8], empty: bool },
    Close { name: &'a [u8] },
    Skip,
}

impl Iterate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect `(path, text)` for every element it closes
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<(String, String)>> {
        let mut closed = Vec::new();
        self.feed_with(chunk, |element| {
            closed.push((element.path.to_string(), element.text()?));
            Ok(())
        })?;
        Ok(closed)
    }

    /// Feed a chunk, handing every element it closes to `on_close`
    pub fn feed_with<F>(&mut self, chunk: &[u8], mut on_close: F) -> Result<()>
    where
        F: FnMut(ClosedElement<'_>) -> Result<()>,
    {
        self.buffer.extend_from_slice(chunk);
        let mut pos = 0;
        let result = self.scan(&mut pos, &mut on_close);
        self.buffer.drain(..pos);
        self.offset += pos as u64;
        result
    }

    /// No open element and no partial markup buffered
    pub fn finished(&self) -> bool {
        self.buffer.is_empty() && self.stack.is_empty()
    }

    /// Depth of the innermost open element
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn scan<F>(&mut self, pos: &mut usize, on_close: &mut F) -> Result<()>
    where
        F: FnMut(ClosedElement<'_>) -> Result<()>,
    {
        while *pos < self.buffer.len() {
            let rest = &self.buffer[*pos..];
            if rest[0] != b'<' {
                let run = rest.iter().position(|&b| b == b'<').unwrap_or(rest.len());
                let text = &rest[..run];
                if let Some(top) = self.stack.last_mut() {
                    // Whitespace ahead of any content is layout between children
                    if !top.text.is_empty() || !text.iter().all(u8::is_ascii_whitespace) {
                        top.text.extend_from_slice(text);
                    }
                }
                *pos += run;
                continue;
            }

            let at = self.offset + *pos as u64;
            let Some((len, markup)) = parse_markup(rest, at)? else {
                break;
            };
            match markup {
                Markup::Skip => {},
                Markup::Open { name, empty } => {
                    let name = std::str::from_utf8(name).map_err(|_| {
                        IngestError::corrupt(NAME, format!("invalid UTF-8 in tag name at byte {}", at))
                    })?;
                    let parent_len = self.path.len();
                    if !self.path.is_empty() {
                        self.path.push('/');
                    }
                    let name_start = self.path.len();
                    self.path.push_str(name);
                    self.stack.push(OpenElement {
                        parent_len,
                        name_start,
                        text: Vec::new(),
                    });
                    if empty {
                        self.close_top(on_close)?;
                    }
                },
                Markup::Close { name } => {
                    let Some(top) = self.stack.last() else {
                        return Err(IngestError::corrupt(
                            NAME,
                            format!(
                                "unexpected </{}> at byte {} with no open element",
                                String::from_utf8_lossy(name),
                                at
                            ),
                        ));
                    };
                    let open = &self.path[top.name_start..];
                    if open.as_bytes() != name {
                        return Err(IngestError::corrupt(
                            NAME,
                            format!(
                                "mismatched </{}> at byte {}, expected </{}>",
                                String::from_utf8_lossy(name),
                                at,
                                open
                            ),
                        ));
                    }
                    self.close_top(on_close)?;
                },
            }
            *pos += len;
        }
        Ok(())
    }

    fn close_top<F>(&mut self, on_close: &mut F) -> Result<()>
    where
        F: FnMut(ClosedElement<'_>) -> Result<()>,
    {
        if let Some(top) = self.stack.pop() {
            on_close(ClosedElement {
                path: &self.path,
                raw_text: trim_ascii(&top.text),
            })?;
            self.path.truncate(top.parent_len);
        }
        Ok(())
    }
}

/// Classify the markup at the start of `buf`
///
/// Returns `None` when the markup is not complete yet.
fn parse_markup(buf: &[u8], at: u64) -> Result<Option<(usize, Markup<'_>)>> {
    const COMMENT: &[u8] = b"<!--";

    if buf.len() < 2 {
        return Ok(None);
    }
    match buf[1] {
        b'?' => Ok(find(buf, b"?>").map(|end| (end + 2, Markup::Skip))),
        b'!' => {
            let prefix = buf.len().min(COMMENT.len());
            if buf[..prefix] != COMMENT[..prefix] {
                // DOCTYPE and other declarations
                return Ok(find(buf, b">").map(|end| (end + 1, Markup::Skip)));
            }
            if prefix < COMMENT.len() {
                return Ok(None);
            }
            Ok(find(&buf[COMMENT.len()..], b"-->").map(|end| (COMMENT.len() + end + 3, Markup::Skip)))
        },
        b'/' => {
            let Some(end) = find(buf, b">") else {
                return Ok(None);
            };
            let name = trim_ascii(&buf[2..end]);
            if name.is_empty() {
                return Err(IngestError::corrupt(NAME, format!("empty end tag at byte {}", at)));
            }
            Ok(Some((end + 1, Markup::Close { name })))
        },
        _ => {
            let Some(end) = tag_end(buf) else {
                return Ok(None);
            };
            let inner = &buf[1..end];
            let empty = inner.last() == Some(&b'/');
            let name_len = inner
                .iter()
                .position(|&b| b.is_ascii_whitespace() || b == b'/')
                .unwrap_or(inner.len());
            if name_len == 0 {
                return Err(IngestError::corrupt(NAME, format!("malformed start tag at byte {}", at)));
            }
            Ok(Some((
                end + 1,
                Markup::Open {
                    name: &inner[..name_len],
                    empty,
                },
            )))
        },
    }
}

/// Index of the `>` closing a start tag, skipping quoted attribute values
fn tag_end(buf: &[u8]) -> Option<usize> {
    let mut quote = None;
    for (i, &b) in buf.iter().enumerate().skip(1) {
        match (quote, b) {
            (None, b'"' | b'\'') => quote = Some(b),
            (Some(q), _) if q == b => quote = None,
            (None, b'>') => return Some(i),
            _ => {},
        }
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &bytes[start..end]
}
