//! Record selection over the element stream
//!
//! [`Select`] watches for one target path (`mediawiki/page`) and collects
//! the text of chosen subpaths (`title`, `ns`, `redirect`, `revision/text`)
//! until the target closes, then hands the group over as a [`Record`].
//! Everything else in the document is parsed and dropped.

use std::collections::HashSet;

use super::iterate::Iterate;
use crate::error::Result;

/// Field values collected for one occurrence of the target element
///
/// A subpath may occur more than once (several revisions of a page); values
/// keep document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// First value recorded for `subpath`
    pub fn get(&self, subpath: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == subpath)
            .map(|(_, value)| value.as_str())
    }

    /// Every value recorded for `subpath`, in document order
    pub fn get_all<'a>(&'a self, subpath: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(key, _)| key == subpath)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn push(&mut self, subpath: &str, value: String) {
        self.fields.push((subpath.to_string(), value));
    }
}

/// Collects records for every occurrence of one element path
///
/// The empty subpath stands for the target element's own direct text.
#[derive(Debug)]
pub struct Select {
    iterate: Iterate,
    target: String,
    subpaths: HashSet<String>,
    current: Record,
}

impl Select {
    pub fn new<I, S>(target: impl Into<String>, subpaths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            iterate: Iterate::new(),
            target: target.into(),
            subpaths: subpaths.into_iter().map(Into::into).collect(),
            current: Record::default(),
        }
    }

    /// Feed a chunk and return the records completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        self.feed_with(chunk, |record| {
            records.push(record);
            Ok(())
        })?;
        Ok(records)
    }

    /// Feed a chunk, handing each completed record to `on_record`
    pub fn feed_with<F>(&mut self, chunk: &[u8], mut on_record: F) -> Result<()>
    where
        F: FnMut(Record) -> Result<()>,
    {
        let target = self.target.as_str();
        let subpaths = &self.subpaths;
        let current = &mut self.current;

        self.iterate.feed_with(chunk, |element| {
            if element.path == target {
                if subpaths.contains("") {
                    current.push("", element.text()?);
                }
                return on_record(std::mem::take(current));
            }
            let sub = element
                .path
                .strip_prefix(target)
                .and_then(|rest| rest.strip_prefix('/'));
            if let Some(sub) = sub {
                if subpaths.contains(sub) {
                    current.push(sub, element.text()?);
                }
            }
            Ok(())
        })
    }

    pub fn finished(&self) -> bool {
        self.iterate.finished()
    }
}
