//! Dictionary generation runs
//!
//! [`DumpProcessor`] drives one dump through the stage pipeline:
//!
//! ```text
//! source ─▶ [decompress] ─▶ [tar] ─▶ xml select ─▶ dictionary
//!   │
//!   ├─ digest (verified at end of stream)
//!   └─ cache copy (committed only after a clean run)
//! ```
//!
//! [`GenerationOrchestrator`] adds the outer steps for a Wiktionary source:
//! resolving the freshness key from the checksum manifest, picking the
//! cached copy or the network, and keeping the cache up to date.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wikidict_common::checksum::{verify_file_checksum, Digest, Hasher};
use wikidict_common::{ChecksumAlgorithm, DictionaryRecord};

use crate::cache::{CacheStore, CacheWriter};
use crate::config::IngestConfig;
use crate::dictionary::DictionaryWriter;
use crate::error::{IngestError, Result};
use crate::fetch::{ChunkSource, FileSource, HttpFetcher};
use crate::filter::StreamFilter;
use crate::manifest::ChecksumManifest;
use crate::pipeline::{sink, ByteStage, FilterStage, Pipeline, Stage};
use crate::progress::{GenerationStats, StatsSnapshot};
use crate::queue::default_capacity;
use crate::tar::TarFilter;
use crate::wiktionary::{Container, DumpFormat, DumpSource, LanguageSpec, PageMapper};
use crate::xml::Select;

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub stats: StatsSnapshot,
    /// Digest of the raw dump bytes, when one was verified
    pub digest: Option<Digest>,
    pub from_cache: bool,
    pub cache_updated: bool,
}

/// Counts decompressed output into the run statistics
struct Metered<F> {
    inner: F,
    stats: Arc<GenerationStats>,
}

impl<F: StreamFilter> StreamFilter for Metered<F> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn feed(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let out = self.inner.feed(input)?;
        self.stats.add_decompressed_bytes(out.len());
        Ok(out)
    }

    fn finished(&self) -> bool {
        self.inner.finished()
    }
}

/// Parses page records out of XML text and maps them to entries
pub struct PageExtractStage {
    select: Select,
    mapper: PageMapper,
    stats: Arc<GenerationStats>,
}

impl PageExtractStage {
    pub fn new(language: &'static LanguageSpec, stats: Arc<GenerationStats>) -> Self {
        Self {
            select: PageMapper::selector(),
            mapper: PageMapper::new(language),
            stats,
        }
    }
}

impl Stage for PageExtractStage {
    type Input = Vec<u8>;
    type Output = DictionaryRecord;

    fn name(&self) -> &str {
        crate::xml::NAME
    }

    fn process(&mut self, input: Vec<u8>, emit: &mut dyn FnMut(DictionaryRecord)) -> Result<()> {
        let stats = &self.stats;
        let mapper = &self.mapper;
        stats.add_content_bytes(input.len());
        self.select.feed_with(&input, |page| {
            stats.page_seen();
            if let Some(entry) = mapper.map(&page) {
                emit(entry);
            }
            Ok(())
        })
    }

    fn finish(&mut self, _emit: &mut dyn FnMut(DictionaryRecord)) -> Result<()> {
        if self.select.finished() {
            Ok(())
        } else {
            Err(IngestError::incomplete(crate::xml::NAME))
        }
    }
}

/// Runs one dump through decompression, extraction and the dictionary
pub struct DumpProcessor {
    format: DumpFormat,
    language: &'static LanguageSpec,
    capacity: usize,
    expected: Option<Digest>,
    cancel: CancellationToken,
    stats: Arc<GenerationStats>,
}

impl DumpProcessor {
    pub fn new(format: DumpFormat, language: &'static LanguageSpec) -> Self {
        Self {
            format,
            language,
            capacity: default_capacity(),
            expected: None,
            cancel: CancellationToken::new(),
            stats: GenerationStats::new(),
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Verify the raw bytes against `digest` at the end of the stream
    pub fn expect_digest(mut self, digest: Digest) -> Self {
        self.expected = Some(digest);
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stats(mut self, stats: Arc<GenerationStats>) -> Self {
        self.stats = stats;
        self
    }

    fn byte_stages(&self) -> Vec<ByteStage> {
        let mut stages = Vec::new();
        if let Some(decoder) = self.format.compression.decoder() {
            stages.push(FilterStage::boxed(Metered {
                inner: decoder,
                stats: Arc::clone(&self.stats),
            }));
        }
        if self.format.container == Container::Tar {
            stages.push(FilterStage::boxed(TarFilter::new()));
        }
        stages
    }

    fn build_pipeline<W>(&self, writer: Arc<Mutex<W>>) -> Result<Pipeline<Vec<u8>>>
    where
        W: DictionaryWriter + 'static,
    {
        let mut builder = Pipeline::<Vec<u8>>::builder(self.capacity);
        for stage in self.byte_stages() {
            builder = builder.stage(stage)?;
        }

        let stats = Arc::clone(&self.stats);
        builder
            .stage(PageExtractStage::new(self.language, Arc::clone(&self.stats)))?
            .sink(sink("dictionary", move |entry: DictionaryRecord| {
                let mut writer = writer
                    .lock()
                    .map_err(|_| IngestError::Dictionary("writer lock poisoned".to_string()))?;
                match writer.add(&entry.word, &entry.description) {
                    Ok(()) => stats.word_added(),
                    Err(e) if !e.is_fatal() => {
                        debug!(word = %entry.word, error = %e, "Skipping rejected entry");
                        stats.word_rejected();
                    },
                    Err(e) => return Err(e),
                }
                Ok(())
            }))
    }

    /// Process every chunk of `source` and commit `writer` on success
    ///
    /// `cache` receives a copy of the raw bytes and is committed only when
    /// the whole run succeeded. The writer is handed back for inspection.
    pub fn run<S, W>(&self, mut source: S, writer: W, mut cache: Option<CacheWriter>) -> Result<(W, GenerationReport)>
    where
        S: ChunkSource,
        W: DictionaryWriter + 'static,
    {
        let writer = Arc::new(Mutex::new(writer));
        let pipeline = self.build_pipeline(Arc::clone(&writer))?;
        let mut hasher = self.expected.as_ref().map(|d| Hasher::new(d.algorithm()));
        let mut accepted = true;

        loop {
            if self.cancel.is_cancelled() {
                info!("Cancellation requested, stopping");
                pipeline.cancel();
                let _ = pipeline.join();
                return Err(IngestError::Cancelled);
            }
            let chunk = match source.next_chunk() {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    pipeline.cancel();
                    let _ = pipeline.join();
                    return Err(e);
                },
            };

            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&chunk);
            }
            if let Some(writer) = cache.as_mut() {
                if let Err(e) = writer.write(&chunk) {
                    warn!(error = %e, "Dump cache disabled for this run");
                    cache = None;
                }
            }
            self.stats.add_raw_bytes(chunk.len());

            if !pipeline.submit(chunk) {
                // A stage failed; join reports why
                accepted = false;
                break;
            }
        }

        let mut digest = None;
        if let (Some(hasher), Some(expected), true) = (hasher, self.expected.as_ref(), accepted) {
            let actual = hasher.finalize();
            if &actual != expected {
                pipeline.cancel();
                let _ = pipeline.join();
                return Err(IngestError::ChecksumMismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
            debug!(digest = %actual, "Dump checksum verified");
            digest = Some(actual);
        }

        pipeline.join()?;
        if self.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let mut writer = Arc::try_unwrap(writer)
            .map_err(|_| IngestError::Dictionary("writer still shared after pipeline shutdown".to_string()))?
            .into_inner()
            .map_err(|_| IngestError::Dictionary("writer lock poisoned".to_string()))?;
        writer.commit()?;

        let cache_updated = match cache {
            Some(cache) => match cache.commit() {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Could not commit dump cache");
                    false
                },
            },
            None => false,
        };

        let report = GenerationReport {
            stats: self.stats.snapshot(),
            digest,
            from_cache: false,
            cache_updated,
        };
        info!(summary = %report.stats, "Dictionary generated");
        Ok((writer, report))
    }
}

/// Generates dictionaries from Wiktionary sources
pub struct GenerationOrchestrator {
    config: IngestConfig,
    fetcher: HttpFetcher,
    cache: Option<CacheStore>,
    cancel: CancellationToken,
    stats: Arc<GenerationStats>,
}

impl GenerationOrchestrator {
    pub fn new(config: IngestConfig, cancel: CancellationToken) -> Self {
        let cache = config
            .cache_enabled
            .then(|| CacheStore::new(config.cache_dir.clone()));
        Self {
            fetcher: HttpFetcher::from_config(&config),
            config,
            cache,
            cancel,
            stats: GenerationStats::new(),
        }
    }

    /// Counters of the current run, for progress display
    pub fn stats(&self) -> Arc<GenerationStats> {
        Arc::clone(&self.stats)
    }

    /// Digest the manifest lists for the source's dump file
    pub fn expected_digest(&self, source: &DumpSource) -> Result<Digest> {
        let url = source.manifest_url(&self.config.base_url);
        let text = self.fetcher.fetch_text(&url)?;
        let manifest = ChecksumManifest::parse(&text, ChecksumAlgorithm::Md5)?;
        let file = source.dump_file_name();
        manifest.digest_for(&file).cloned().ok_or_else(|| {
            IngestError::corrupt("manifest", format!("no checksum listed for {}", file))
        })
    }

    /// Build the dictionary for `source` into `writer`
    pub fn generate<W>(&self, source: &DumpSource, writer: W) -> Result<(W, GenerationReport)>
    where
        W: DictionaryWriter + 'static,
    {
        let dump = source.dump_file_name();
        let key = self.expected_digest(source)?;
        info!(source = %source.name(), digest = %key, "Resolved dump checksum");

        let processor = DumpProcessor::new(DumpFormat::from_file_name(&dump), source.language())
            .capacity(self.config.queue_capacity)
            .expect_digest(key.clone())
            .cancel_token(self.cancel.clone())
            .stats(Arc::clone(&self.stats));

        if let Some(cache) = &self.cache {
            match cache.try_load(&dump, &key) {
                Ok(Some(file)) => match verify_file_checksum(cache.data_path(&dump), &key) {
                    Ok(()) => {
                        info!(dump = %dump, "Using cached dump");
                        let (writer, report) = processor.run(FileSource::new(file), writer, None)?;
                        return Ok((
                            writer,
                            GenerationReport {
                                from_cache: true,
                                ..report
                            },
                        ));
                    },
                    Err(e) => {
                        warn!(dump = %dump, error = %e, "Cached dump is damaged, downloading");
                        drop(file);
                        if let Err(clear_err) = cache.clear(&dump) {
                            warn!(error = %clear_err, "Could not clear cache entry");
                        }
                    },
                },
                Ok(None) => {},
                Err(e) => warn!(error = %e, "Dump cache unreadable, downloading"),
            }
        }

        let cache_writer = self.cache.as_ref().and_then(|cache| match cache.begin(&dump, &key) {
            Ok(writer) => Some(writer),
            Err(e) => {
                warn!(error = %e, "Dump will not be cached");
                None
            },
        });

        let url = source.dump_url(&self.config.base_url);
        info!(url = %url, "Downloading dump");
        let http = self.fetcher.open(&url, self.config.queue_capacity, &self.cancel)?;
        processor.run(http, writer, cache_writer)
    }
}
