//! Shared fixtures for integration tests
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;
use std::sync::{Arc, Mutex};

use wikidict_ingest::error::Result;
use wikidict_ingest::{DictionaryWriter, IngestError};

/// Calls made to a [`RecordingWriter`], shared with the test
#[derive(Debug, Default)]
pub struct Calls {
    pub added: Vec<(String, String)>,
    pub commits: usize,
}

/// Writer that records every call; duplicates are rejected like SQLite does
#[derive(Debug, Clone, Default)]
pub struct RecordingWriter {
    pub calls: Arc<Mutex<Calls>>,
}

impl DictionaryWriter for RecordingWriter {
    fn add(&mut self, word: &str, description: &str) -> Result<()> {
        let mut calls = self.calls.lock().unwrap();
        if calls.added.iter().any(|(w, _)| w == word) {
            return Err(IngestError::record(word, "duplicate word"));
        }
        calls.added.push((word.to_string(), description.to_string()));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.calls.lock().unwrap().commits += 1;
        Ok(())
    }
}

/// One `<page>` of an English pages-articles dump
pub fn page(title: &str, definitions: &[&str]) -> String {
    let mut text = String::from("==English==\n===Noun===\n");
    for definition in definitions {
        text.push_str("# ");
        text.push_str(definition);
        text.push('\n');
    }
    format!(
        "<page><title>{}</title><ns>0</ns><id>1</id><revision><id>2</id><text xml:space=\"preserve\">{}</text></revision></page>",
        title,
        escape(&text)
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn dump_xml(pages: &[String]) -> Vec<u8> {
    format!(
        "<?xml version=\"1.0\"?>\n<mediawiki xmlns=\"http://www.mediawiki.org/xml/export-0.10/\" xml:lang=\"en\">\n<siteinfo><sitename>Wiktionary</sitename></siteinfo>\n{}\n</mediawiki>\n",
        pages.join("\n")
    )
    .into_bytes()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// A tar archive holding a directory and one regular file
pub fn tar_with_file(name: &str, contents: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());

    let mut dir = tar::Header::new_gnu();
    dir.set_entry_type(tar::EntryType::Directory);
    dir.set_size(0);
    dir.set_mode(0o755);
    dir.set_cksum();
    builder.append_data(&mut dir, "export/", std::io::empty()).unwrap();

    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, contents).unwrap();

    builder.into_inner().unwrap()
}

/// Cut `data` into chunks whose sizes cycle through `sizes`
pub fn split<'a>(data: &'a [u8], sizes: &[usize]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::new();
    let mut rest = data;
    let mut i = 0;
    while !rest.is_empty() {
        let size = sizes[i % sizes.len()].clamp(1, rest.len());
        let (chunk, tail) = rest.split_at(size);
        chunks.push(chunk);
        rest = tail;
        i += 1;
    }
    chunks
}

pub fn owned_chunks(data: &[u8], size: usize) -> Vec<Vec<u8>> {
    data.chunks(size).map(<[u8]>::to_vec).collect()
}
