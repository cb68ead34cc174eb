//! Chunk-boundary invariance
//!
//! Every streaming component must produce the same output whether a stream
//! arrives whole or cut at arbitrary offsets.

mod common;

use common::{bzip2, dump_xml, gzip, page, split, tar_with_file};
use proptest::prelude::*;
use wikidict_ingest::decompress::{Bzip2Decoder, GzipDecoder};
use wikidict_ingest::filter::{feed_all, StreamFilter};
use wikidict_ingest::tar::TarFilter;
use wikidict_ingest::xml::{Iterate, Select};

fn sample_xml() -> Vec<u8> {
    dump_xml(&[
        page("cat", &["A small & furry [[feline]]."]),
        page("café", &["A coffee shop, ''informal''."]),
        page("dog", &["A {{l|en|canine}}."]),
    ])
}

fn chunk_sizes() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..97, 1..12)
}

fn filter_output<F: StreamFilter>(mut filter: F, chunks: &[&[u8]]) -> (Vec<u8>, bool) {
    let out = feed_all(&mut filter, chunks.iter().copied()).unwrap();
    (out, filter.finished())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn gzip_is_chunk_invariant(sizes in chunk_sizes()) {
        let xml = sample_xml();
        let compressed = gzip(&xml);
        let (out, finished) = filter_output(GzipDecoder::new(), &split(&compressed, &sizes));
        prop_assert_eq!(out, xml);
        prop_assert!(finished);
    }

    #[test]
    fn bzip2_is_chunk_invariant(sizes in chunk_sizes()) {
        let xml = sample_xml();
        let compressed = bzip2(&xml);
        let (out, finished) = filter_output(Bzip2Decoder::new(), &split(&compressed, &sizes));
        prop_assert_eq!(out, xml);
        prop_assert!(finished);
    }

    #[test]
    fn tar_is_chunk_invariant(sizes in chunk_sizes()) {
        let xml = sample_xml();
        let archive = tar_with_file("export/pages.xml", &xml);
        let (out, finished) = filter_output(TarFilter::new(), &split(&archive, &sizes));
        prop_assert_eq!(out, xml);
        prop_assert!(finished);
    }

    #[test]
    fn tar_single_file_any_split(cut in 0usize..2048, len in 1usize..2048) {
        let archive = tar_with_file("a.txt", b"0123456789");
        let cut = cut.min(archive.len());
        let (head, tail) = archive.split_at(cut);
        let rest: Vec<&[u8]> = tail.chunks(len).collect();
        let mut chunks = vec![head];
        chunks.extend(rest);
        let (out, finished) = filter_output(TarFilter::new(), &chunks);
        prop_assert_eq!(out, b"0123456789".to_vec());
        prop_assert!(finished);
    }

    #[test]
    fn truncated_gzip_is_never_finished(cut in 1usize..64) {
        let compressed = gzip(&sample_xml());
        let cut = cut.min(compressed.len() - 1);
        let mut decoder = GzipDecoder::new();
        // Truncation may surface as an error or as an unfinished decoder
        if decoder.feed(&compressed[..compressed.len() - cut]).is_ok() {
            prop_assert!(!decoder.finished());
        }
    }

    #[test]
    fn iterate_is_chunk_invariant(sizes in chunk_sizes()) {
        let xml = sample_xml();
        let whole = Iterate::new().feed(&xml).unwrap();

        let mut iterate = Iterate::new();
        let mut pieces = Vec::new();
        for chunk in split(&xml, &sizes) {
            pieces.extend(iterate.feed(chunk).unwrap());
        }
        prop_assert_eq!(pieces, whole);
        prop_assert!(iterate.finished());
    }

    #[test]
    fn select_is_chunk_invariant(sizes in chunk_sizes()) {
        let xml = sample_xml();
        let fields = ["title", "revision/text"];
        let whole = Select::new("mediawiki/page", fields).feed(&xml).unwrap();
        prop_assert_eq!(whole.len(), 3);

        let mut select = Select::new("mediawiki/page", fields);
        let mut records = Vec::new();
        for chunk in split(&xml, &sizes) {
            records.extend(select.feed(chunk).unwrap());
        }
        prop_assert_eq!(records, whole);
        prop_assert!(select.finished());
    }
}

#[test]
fn test_select_example_records() {
    let mut select = Select::new("root/a", ["", "b", "c"]);
    let records = select
        .feed(b"<root><a>T<b>1</b><c>2</c></a><a>U</a></root>")
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get(""), Some("T"));
    assert_eq!(records[0].get("b"), Some("1"));
    assert_eq!(records[0].get("c"), Some("2"));
    assert_eq!(records[1].get(""), Some("U"));
    assert_eq!(records[1].get("b"), None);
}
