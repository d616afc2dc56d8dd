//! Positional index build over concatenated XML source files.
//!
//! Each source is streamed once. Element boundaries matching the rule are
//! recorded as byte ranges; document bodies are never turned into trees here.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use docweave_document::{Element, ElementPath, element_from_start};
use docweave_shared::{DocweaveError, IndexEntry, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Where documents start and how they are keyed.
#[derive(Debug, Clone)]
pub struct IndexRule {
    /// Elements matching this path are indexed as documents.
    pub value: ElementPath,
    /// Attribute of the matching element holding the document id.
    pub key: String,
}

impl IndexRule {
    pub fn new(value: &str, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(DocweaveError::config("index rule needs a key attribute"));
        }
        Ok(Self {
            value: ElementPath::parse(value)?,
            key,
        })
    }
}

/// A source that could not be indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSource {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of an index build. A non-empty `failed` list means the index is
/// partial; the caller decides whether that is acceptable.
#[derive(Debug, Clone, Default)]
pub struct IndexStatus {
    pub files_indexed: usize,
    pub documents: usize,
    /// Ids seen more than once; the later occurrence was kept.
    pub duplicates: usize,
    /// Matching elements without the key attribute.
    pub skipped_without_key: usize,
    pub failed: Vec<FailedSource>,
}

impl IndexStatus {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The frozen `document_id -> IndexEntry` map plus its file table.
#[derive(Debug, Clone, Default)]
pub struct DocumentIndex {
    files: Vec<PathBuf>,
    entries: HashMap<String, IndexEntry>,
}

impl DocumentIndex {
    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Path of a source by its `source_file_id`.
    pub fn file(&self, source_file_id: usize) -> Option<&Path> {
        self.files.get(source_file_id).map(PathBuf::as_path)
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }
}

/// Index every source. Sources are scanned in parallel; results are merged in
/// source order, so a later source wins for a duplicate id.
#[instrument(skip_all, fields(sources = sources.len(), value = %rule.value, key = %rule.key))]
pub fn build_index(sources: &[PathBuf], rule: &IndexRule) -> (DocumentIndex, IndexStatus) {
    let scans: Vec<Result<FileScan>> = sources
        .par_iter()
        .enumerate()
        .map(|(file_id, path)| scan_file(path, file_id, rule))
        .collect();

    let mut index = DocumentIndex {
        files: sources.to_vec(),
        entries: HashMap::new(),
    };
    let mut status = IndexStatus::default();

    for (path, scan) in sources.iter().zip(scans) {
        let scan = match scan {
            Ok(scan) => scan,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "source could not be indexed, continuing");
                status.failed.push(FailedSource {
                    path: path.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        status.files_indexed += 1;
        status.skipped_without_key += scan.skipped_without_key;
        for entry in scan.entries {
            if let Some(previous) = index.entries.get(&entry.document_id) {
                debug!(
                    id = %entry.document_id,
                    previous_file = previous.source_file_id,
                    file = entry.source_file_id,
                    "duplicate document id, keeping the later entry"
                );
                status.duplicates += 1;
            }
            index.entries.insert(entry.document_id.clone(), entry);
        }
    }

    status.documents = index.entries.len();
    if status.duplicates > 0 {
        warn!(duplicates = status.duplicates, "duplicate document ids replaced");
    }
    info!(
        files = status.files_indexed,
        failed = status.failed.len(),
        documents = status.documents,
        "index built"
    );

    (index, status)
}

struct FileScan {
    entries: Vec<IndexEntry>,
    skipped_without_key: usize,
}

struct OpenDocument {
    id: Option<String>,
    start: u64,
    depth: usize,
}

fn scan_file(path: &Path, file_id: usize, rule: &IndexRule) -> Result<FileScan> {
    let handle = File::open(path).map_err(|e| DocweaveError::io(path, e))?;
    let mut source = BufReader::new(handle);
    // quick-xml positions do not count a leading BOM; offsets must.
    let bom = skip_bom(&mut source).map_err(|e| DocweaveError::io(path, e))?;
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();

    let mut chain: Vec<Element> = Vec::new();
    let mut open: Option<OpenDocument> = None;
    let mut scan = FileScan {
        entries: Vec::new(),
        skipped_without_key: 0,
    };

    loop {
        buf.clear();
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => return Err(scan_error(path, bom + reader.buffer_position() as u64, e)),
        };
        // Position just past the event's closing '>'.
        let end = bom + reader.buffer_position() as u64;

        match event {
            Event::Start(start) => {
                if let Some(doc) = open.as_mut() {
                    doc.depth += 1;
                    continue;
                }
                let tag_start = end - (start.len() as u64 + 2);
                chain.push(element_from_start(&start).map_err(|e| scan_error(path, end, e))?);
                if rule.value.matches(&chain) {
                    open = Some(OpenDocument {
                        id: chain.last().and_then(|el| el.attr(&rule.key)).map(str::to_string),
                        start: tag_start,
                        depth: 1,
                    });
                }
            }
            Event::Empty(start) => {
                if open.is_some() {
                    continue;
                }
                // `<name ... />`: the event content excludes '<' and '/>'.
                let tag_start = end - (start.len() as u64 + 3);
                chain.push(element_from_start(&start).map_err(|e| scan_error(path, end, e))?);
                if rule.value.matches(&chain) {
                    let id = chain.last().and_then(|el| el.attr(&rule.key)).map(str::to_string);
                    record(&mut scan, path, file_id, id, tag_start, end, &rule.key);
                }
                chain.pop();
            }
            Event::End(_) => {
                if let Some(doc) = open.as_mut() {
                    doc.depth -= 1;
                    if doc.depth > 0 {
                        continue;
                    }
                    if let Some(doc) = open.take() {
                        record(&mut scan, path, file_id, doc.id, doc.start, end, &rule.key);
                    }
                }
                chain.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if open.is_some() || !chain.is_empty() {
        return Err(DocweaveError::index(format!(
            "{}: unexpected end of file inside <{}>",
            path.display(),
            chain.last().map(|el| el.name.as_str()).unwrap_or_default()
        )));
    }

    debug!(
        path = %path.display(),
        documents = scan.entries.len(),
        "source scanned"
    );
    Ok(scan)
}

/// Consume a UTF-8 byte order mark and return its length, or 0.
fn skip_bom<R: BufRead>(source: &mut R) -> std::io::Result<u64> {
    if source.fill_buf()?.starts_with(UTF8_BOM) {
        source.consume(UTF8_BOM.len());
        return Ok(UTF8_BOM.len() as u64);
    }
    Ok(0)
}

fn scan_error(path: &Path, at: u64, e: impl std::fmt::Display) -> DocweaveError {
    DocweaveError::index(format!("{}: {e} (at byte {at})", path.display()))
}

fn record(
    scan: &mut FileScan,
    path: &Path,
    file_id: usize,
    id: Option<String>,
    start: u64,
    end: u64,
    key: &str,
) {
    match id {
        Some(document_id) => scan.entries.push(IndexEntry {
            document_id,
            source_file_id: file_id,
            byte_offset: start,
            byte_length: end - start,
        }),
        None => {
            warn!(
                path = %path.display(),
                offset = start,
                key,
                "matching element has no key attribute, skipped"
            );
            scan.skipped_without_key += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "docweave-index-test-{}",
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    const COMMENTS: &str = "<?xml version=\"1.0\"?>\n<doc>\n  <members>\n    <member name=\"T:A\"><summary>Type A</summary></member>\n    <member name=\"M:A.Run\"><summary>Runs <b>A</b></summary></member>\n    <member name=\"F:A.x\" />\n  </members>\n</doc>\n";

    fn slice(path: &Path, entry: &IndexEntry) -> String {
        let bytes = std::fs::read(path).unwrap();
        let start = entry.byte_offset as usize;
        String::from_utf8(bytes[start..start + entry.byte_length as usize].to_vec()).unwrap()
    }

    #[test]
    fn records_exact_byte_ranges() {
        let dir = temp_dir();
        let file = dir.join("comments.xml");
        std::fs::write(&file, COMMENTS).unwrap();

        let rule = IndexRule::new("/doc/members/member", "name").unwrap();
        let (index, status) = build_index(&[file.clone()], &rule);

        assert!(status.is_complete());
        assert_eq!(status.documents, 3);
        assert_eq!(index.len(), 3);

        let a = index.get("T:A").unwrap();
        assert_eq!(
            slice(&file, a),
            "<member name=\"T:A\"><summary>Type A</summary></member>"
        );
        let run = index.get("M:A.Run").unwrap();
        assert_eq!(
            slice(&file, run),
            "<member name=\"M:A.Run\"><summary>Runs <b>A</b></summary></member>"
        );
        let empty = index.get("F:A.x").unwrap();
        assert_eq!(slice(&file, empty), "<member name=\"F:A.x\" />");
        assert_eq!(index.file(a.source_file_id), Some(file.as_path()));
    }

    #[test]
    fn offsets_account_for_byte_order_mark() {
        let dir = temp_dir();
        let file = dir.join("bom.xml");
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(
            b"<?xml version=\"1.0\" encoding=\"utf-8\"?>\r\n<d>\r\n<e k=\"a\">one</e>\r\n<e k=\"b\"/>\r\n</d>",
        );
        std::fs::write(&file, bytes).unwrap();

        let rule = IndexRule::new("/d/e", "k").unwrap();
        let (index, status) = build_index(&[file.clone()], &rule);

        assert!(status.is_complete());
        assert_eq!(slice(&file, index.get("a").unwrap()), "<e k=\"a\">one</e>");
        assert_eq!(slice(&file, index.get("b").unwrap()), "<e k=\"b\"/>");
    }

    #[test]
    fn nested_matches_belong_to_the_outer_document() {
        let dir = temp_dir();
        let file = dir.join("nested.xml");
        std::fs::write(&file, "<r><t id=\"outer\"><t id=\"inner\" /></t></r>").unwrap();

        let rule = IndexRule::new("//t", "id").unwrap();
        let (index, _) = build_index(&[file.clone()], &rule);
        assert!(index.contains("outer"));
        assert!(!index.contains("inner"));
        assert_eq!(
            slice(&file, index.get("outer").unwrap()),
            "<t id=\"outer\"><t id=\"inner\" /></t>"
        );
    }

    #[test]
    fn partial_failures_are_reported_and_other_files_indexed() {
        let dir = temp_dir();
        let good = dir.join("good.xml");
        let broken = dir.join("broken.xml");
        let missing = dir.join("missing.xml");
        std::fs::write(&good, COMMENTS).unwrap();
        std::fs::write(&broken, "<doc><members><member name=\"X\"></doc>").unwrap();

        let rule = IndexRule::new("/doc/members/member", "name").unwrap();
        let (index, status) = build_index(&[good.clone(), broken.clone(), missing.clone()], &rule);

        assert!(!status.is_complete());
        assert_eq!(status.files_indexed, 1);
        let failed: Vec<_> = status.failed.iter().map(|f| f.path.clone()).collect();
        assert_eq!(failed, vec![broken, missing]);
        assert_eq!(index.len(), 3);
        assert!(!index.contains("X"));
    }

    #[test]
    fn later_sources_win_duplicates() {
        let dir = temp_dir();
        let first = dir.join("first.xml");
        let second = dir.join("second.xml");
        std::fs::write(&first, "<d><e k=\"a\">1</e><e k=\"b\">2</e></d>").unwrap();
        std::fs::write(&second, "<d><e k=\"a\">3</e></d>").unwrap();

        let rule = IndexRule::new("d/e", "k").unwrap();
        let (index, status) = build_index(&[first.clone(), second.clone()], &rule);

        assert_eq!(status.duplicates, 1);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("a").unwrap().source_file_id, 1);
        assert_eq!(slice(&second, index.get("a").unwrap()), "<e k=\"a\">3</e>");
        assert_eq!(index.get("b").unwrap().source_file_id, 0);
    }

    #[test]
    fn elements_without_key_are_skipped() {
        let dir = temp_dir();
        let file = dir.join("keys.xml");
        std::fs::write(&file, "<d><e k=\"a\" /><e /><e other=\"x\">t</e></d>").unwrap();

        let rule = IndexRule::new("/d/e", "k").unwrap();
        let (index, status) = build_index(&[file], &rule);
        assert_eq!(index.len(), 1);
        assert_eq!(status.skipped_without_key, 2);
        assert!(status.is_complete());
    }

    #[test]
    fn rule_requires_key() {
        assert!(IndexRule::new("/d/e", " ").is_err());
        assert!(IndexRule::new("", "id").is_err());
    }
}
