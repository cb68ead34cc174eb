//! Wiktionary dump sources
//!
//! Knows where a Wiktionary edition publishes its dumps, how a dump file is
//! packaged, and how a `<page>` record becomes a dictionary entry.

pub mod definitions;

use serde::{Deserialize, Serialize};
use wikidict_common::DictionaryRecord;

use crate::decompress::Compression;
use crate::error::{IngestError, Result};
use crate::xml::{Record, Select};

pub use definitions::extract_definitions;

/// Suffix shared by every Wiktionary source name (`frwiktionary`)
pub const SOURCE_SUFFIX: &str = "wiktionary";

/// Element holding one page in a pages-articles dump
pub const PAGE_PATH: &str = "mediawiki/page";
pub const TITLE_FIELD: &str = "title";
pub const NAMESPACE_FIELD: &str = "ns";
pub const REDIRECT_FIELD: &str = "redirect";
pub const TEXT_FIELD: &str = "revision/text";

/// Main namespace; everything else is talk, templates, users, ...
const MAIN_NAMESPACE: &str = "0";

/// One Wiktionary edition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageSpec {
    /// Wiki language code, as in `frwiktionary`
    pub code: &'static str,
    pub name: &'static str,
    /// Title of the level-2 heading introducing the edition's own language
    pub section: &'static str,
}

pub const LANGUAGES: &[LanguageSpec] = &[
    LanguageSpec {
        code: "en",
        name: "English",
        section: "English",
    },
    LanguageSpec {
        code: "fr",
        name: "Français",
        section: "{{langue|fr}}",
    },
    LanguageSpec {
        code: "es",
        name: "Español",
        section: "{{lengua|es}}",
    },
];

pub fn find_language(code: &str) -> Option<&'static LanguageSpec> {
    LANGUAGES.iter().find(|lang| lang.code.eq_ignore_ascii_case(code))
}

/// A dump source named on the command line, e.g. `frwiktionary`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpSource {
    language: &'static LanguageSpec,
}

impl DumpSource {
    pub fn parse(source: &str) -> Result<Self> {
        let code = source
            .strip_suffix(SOURCE_SUFFIX)
            .ok_or_else(|| IngestError::config(format!("Could not recognize source '{}'", source)))?;
        let language = find_language(code).ok_or_else(|| {
            let known: Vec<_> = LANGUAGES.iter().map(|l| l.code).collect();
            IngestError::config(format!(
                "Unsupported Wiktionary edition '{}' (known: {})",
                code,
                known.join(", ")
            ))
        })?;
        Ok(Self { language })
    }

    pub fn language(&self) -> &'static LanguageSpec {
        self.language
    }

    /// Source name, e.g. `frwiktionary`
    pub fn name(&self) -> String {
        format!("{}{}", self.language.code, SOURCE_SUFFIX)
    }

    pub fn dump_file_name(&self) -> String {
        format!("{}-latest-pages-articles.xml.bz2", self.name())
    }

    pub fn manifest_file_name(&self) -> String {
        format!("{}-latest-md5sums.txt", self.name())
    }

    pub fn dump_url(&self, base_url: &str) -> String {
        self.latest_url(base_url, &self.dump_file_name())
    }

    pub fn manifest_url(&self, base_url: &str) -> String {
        self.latest_url(base_url, &self.manifest_file_name())
    }

    fn latest_url(&self, base_url: &str, file: &str) -> String {
        format!("{}/{}/latest/{}", base_url.trim_end_matches('/'), self.name(), file)
    }
}

/// Archive container around the XML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    None,
    Tar,
}

/// How a dump file is packaged, inferred from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpFormat {
    pub compression: Compression,
    pub container: Container,
}

impl DumpFormat {
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        let container = if lower.contains(".tar") || lower.ends_with(".tgz") || lower.ends_with(".tbz2") {
            Container::Tar
        } else {
            Container::None
        };
        Self {
            compression: Compression::from_file_name(&lower),
            container,
        }
    }
}

/// Turns `<page>` records into dictionary entries for one edition
#[derive(Debug, Clone)]
pub struct PageMapper {
    language: &'static LanguageSpec,
}

impl PageMapper {
    pub fn new(language: &'static LanguageSpec) -> Self {
        Self { language }
    }

    /// Selector producing the records this mapper expects
    pub fn selector() -> Select {
        Select::new(
            PAGE_PATH,
            [TITLE_FIELD, NAMESPACE_FIELD, REDIRECT_FIELD, TEXT_FIELD],
        )
    }

    /// Entry for a page, or `None` for pages that are not dictionary words
    pub fn map(&self, page: &Record) -> Option<DictionaryRecord> {
        let title = page.get(TITLE_FIELD)?.trim();
        if title.is_empty() {
            return None;
        }
        if page.get(NAMESPACE_FIELD).is_some_and(|ns| ns.trim() != MAIN_NAMESPACE) {
            return None;
        }
        if page.get(REDIRECT_FIELD).is_some() {
            return None;
        }
        // The last revision is the current one
        let text = page.get_all(TEXT_FIELD).last()?;
        let definitions = extract_definitions(text, self.language);
        if definitions.is_empty() {
            return None;
        }
        Some(DictionaryRecord::new(title, definitions.join("\n")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        let source = DumpSource::parse("frwiktionary").unwrap();
        assert_eq!(source.language().code, "fr");
        assert_eq!(source.name(), "frwiktionary");
        assert_eq!(
            source.dump_url("https://dumps.wikimedia.org/"),
            "https://dumps.wikimedia.org/frwiktionary/latest/frwiktionary-latest-pages-articles.xml.bz2"
        );
        assert_eq!(
            source.manifest_url("https://dumps.wikimedia.org"),
            "https://dumps.wikimedia.org/frwiktionary/latest/frwiktionary-latest-md5sums.txt"
        );

        assert!(matches!(DumpSource::parse("frwikipedia"), Err(IngestError::Config(_))));
        let err = DumpSource::parse("xxwiktionary").unwrap_err();
        assert!(err.to_string().contains("known: en, fr, es"));
    }

    #[test]
    fn test_dump_format() {
        let format = DumpFormat::from_file_name("frwiktionary-latest-pages-articles.xml.bz2");
        assert_eq!(format.compression, Compression::Bzip2);
        assert_eq!(format.container, Container::None);

        let format = DumpFormat::from_file_name("export.tar.gz");
        assert_eq!(format.compression, Compression::Gzip);
        assert_eq!(format.container, Container::Tar);

        let format = DumpFormat::from_file_name("pages.xml");
        assert_eq!(format.compression, Compression::None);
        assert_eq!(format.container, Container::None);
    }

    fn page(xml: &str) -> Record {
        let mut select = PageMapper::selector();
        let mut records = select.feed(xml.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        records.remove(0)
    }

    #[test]
    fn test_page_mapping() {
        let mapper = PageMapper::new(find_language("en").unwrap());

        let word = page(
            "<mediawiki><page><title>cat</title><ns>0</ns><revision><text>==English==\n# A feline.\n# A [[jazz]] musician.</text></revision></page></mediawiki>",
        );
        let entry = mapper.map(&word).unwrap();
        assert_eq!(entry.word, "cat");
        assert_eq!(entry.description, "A feline.\nA jazz musician.");

        let talk = page(
            "<mediawiki><page><title>Talk:cat</title><ns>1</ns><revision><text>==English==\n# x</text></revision></page></mediawiki>",
        );
        assert!(mapper.map(&talk).is_none());

        let redirect = page(
            "<mediawiki><page><title>Cat</title><ns>0</ns><redirect title=\"cat\" /><revision><text>#REDIRECT [[cat]]</text></revision></page></mediawiki>",
        );
        assert!(mapper.map(&redirect).is_none());

        let no_defs = page(
            "<mediawiki><page><title>chat</title><ns>0</ns><revision><text>==French==\n# cat</text></revision></page></mediawiki>",
        );
        assert!(mapper.map(&no_defs).is_none());
    }
}
