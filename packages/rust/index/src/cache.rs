//! Indexed file cache: random access to documents inside large source files
//! with a bounded set of parsed documents kept resident.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, instrument, trace};

use docweave_document::Document;
use docweave_shared::{DocweaveError, IndexEntry, Result};

use crate::builder::{DocumentIndex, IndexRule, IndexStatus, build_index};

/// Residency limits. A budget of zero documents disables retention: every
/// `get` reads from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub max_documents: usize,
    pub max_bytes: Option<u64>,
}

impl CacheOptions {
    pub fn new(max_documents: usize) -> Self {
        Self {
            max_documents,
            max_bytes: None,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::new(100)
    }
}

/// A document loaded from its source range. `raw` is exactly the bytes the
/// index points at.
#[derive(Debug)]
pub struct CachedDocument {
    id: String,
    raw: Vec<u8>,
    document: Document,
}

impl CachedDocument {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Bytes charged against the residency budget.
    pub fn size(&self) -> u64 {
        self.raw.len() as u64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Successful reads from a source range.
    pub loads: u64,
    pub evictions: u64,
    pub resident_documents: usize,
    pub resident_bytes: u64,
}

// ---------------------------------------------------------------------------
// LRU
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Resident {
    entries: HashMap<String, (Arc<CachedDocument>, u64)>,
    // tick -> id, oldest first
    order: BTreeMap<u64, String>,
    tick: u64,
    bytes: u64,
}

impl Resident {
    fn touch(&mut self, id: &str) -> Option<Arc<CachedDocument>> {
        self.tick += 1;
        let tick = self.tick;
        let (doc, last) = self.entries.get_mut(id)?;
        self.order.remove(&*last);
        *last = tick;
        self.order.insert(tick, id.to_string());
        Some(Arc::clone(doc))
    }

    /// Insert `doc` as most recent and evict until within `options`.
    /// Returns the number of evictions.
    fn insert(&mut self, doc: Arc<CachedDocument>, options: &CacheOptions) -> u64 {
        self.tick += 1;
        self.bytes += doc.size();
        self.order.insert(self.tick, doc.id().to_string());
        self.entries.insert(doc.id().to_string(), (doc, self.tick));

        let mut evicted = 0;
        while self.over_budget(options) {
            let Some((_, id)) = self.order.pop_first() else {
                break;
            };
            if let Some((old, _)) = self.entries.remove(&id) {
                self.bytes -= old.size();
                trace!(id = %id, "evicted");
                evicted += 1;
            }
        }
        evicted
    }

    fn over_budget(&self, options: &CacheOptions) -> bool {
        self.entries.len() > options.max_documents
            || options.max_bytes.is_some_and(|max| self.bytes > max)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.bytes = 0;
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// A frozen [`DocumentIndex`] plus an LRU of parsed documents.
///
/// Safe to share across threads. Reads against the same source file are
/// serialized on that file's handle.
pub struct IndexedFileCache {
    name: String,
    index: DocumentIndex,
    options: CacheOptions,
    resident: Mutex<Resident>,
    handles: Vec<Mutex<Option<File>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for IndexedFileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedFileCache")
            .field("name", &self.name)
            .field("documents", &self.index.len())
            .field("options", &self.options)
            .finish()
    }
}

impl IndexedFileCache {
    pub fn new(name: impl Into<String>, index: DocumentIndex, options: CacheOptions) -> Self {
        let handles = index.files().iter().map(|_| Mutex::new(None)).collect();
        Self {
            name: name.into(),
            index,
            options,
            resident: Mutex::new(Resident::default()),
            handles,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Index `sources` with `rule` and wrap the result.
    pub fn build(
        name: impl Into<String>,
        sources: &[PathBuf],
        rule: &IndexRule,
        options: CacheOptions,
    ) -> (Self, IndexStatus) {
        let (index, status) = build_index(sources, rule);
        (Self::new(name, index, options), status)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &DocumentIndex {
        &self.index
    }

    pub fn options(&self) -> CacheOptions {
        self.options
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Number of indexed documents, resident or not.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Fetch a document, loading and parsing it from its source range on a miss.
    pub fn get(&self, id: &str) -> Result<Arc<CachedDocument>> {
        if let Some(doc) = self.resident.lock().touch(id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(doc);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let entry = self
            .index
            .get(id)
            .ok_or_else(|| DocweaveError::DocumentNotFound { id: id.to_string() })?;
        let doc = Arc::new(self.load(entry)?);
        self.loads.fetch_add(1, Ordering::Relaxed);

        if self.options.max_documents == 0 {
            return Ok(doc);
        }
        if self.options.max_bytes.is_some_and(|max| doc.size() > max) {
            debug!(id, size = doc.size(), "document exceeds byte budget, not retained");
            return Ok(doc);
        }

        let mut resident = self.resident.lock();
        // Another thread may have loaded it while the lock was released.
        if let Some(existing) = resident.touch(id) {
            return Ok(existing);
        }
        let evicted = resident.insert(Arc::clone(&doc), &self.options);
        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
        Ok(doc)
    }

    /// Drop resident documents and close file handles. The cache stays
    /// usable; later reads reopen files as needed.
    #[instrument(skip_all, fields(cache = %self.name))]
    pub fn release(&self) {
        self.resident.lock().clear();
        for handle in &self.handles {
            *handle.lock() = None;
        }
        info!("cache released");
    }

    pub fn stats(&self) -> CacheStats {
        let resident = self.resident.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            resident_documents: resident.entries.len(),
            resident_bytes: resident.bytes,
        }
    }

    fn load(&self, entry: &IndexEntry) -> Result<CachedDocument> {
        let path = self.index.file(entry.source_file_id).ok_or_else(|| {
            DocweaveError::index(format!(
                "document '{}' points at unknown source {}",
                entry.document_id, entry.source_file_id
            ))
        })?;
        let slot = self.handles.get(entry.source_file_id).ok_or_else(|| {
            DocweaveError::index(format!("no handle slot for {}", path.display()))
        })?;
        let length = usize::try_from(entry.byte_length).map_err(|_| {
            DocweaveError::index(format!(
                "document '{}' is too large to load",
                entry.document_id
            ))
        })?;

        let mut raw = vec![0u8; length];
        {
            let mut handle = slot.lock();
            if handle.is_none() {
                *handle = Some(File::open(path).map_err(|e| DocweaveError::io(path, e))?);
            }
            let file = handle
                .as_mut()
                .ok_or_else(|| DocweaveError::index("source handle unavailable"))?;
            file.seek(SeekFrom::Start(entry.byte_offset))
                .and_then(|_| file.read_exact(&mut raw))
                .map_err(|e| DocweaveError::io(path, e))?;
        }

        let document = Document::from_bytes(&raw).map_err(|e| {
            DocweaveError::index(format!(
                "document '{}' in {} at byte {}: {e}",
                entry.document_id,
                path.display(),
                entry.byte_offset
            ))
        })?;
        trace!(id = %entry.document_id, bytes = length, "loaded from source");

        Ok(CachedDocument {
            id: entry.document_id.clone(),
            raw,
            document,
        })
    }
}
