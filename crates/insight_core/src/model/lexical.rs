//! Bundled lexical host model.
//!
//! A reference [`HostModel`](super::HostModel) over a directory snapshot so
//! the engine runs standalone (CLI, end-to-end tests) without an IDE behind
//! it. Declarations are identifiers following a declaration keyword; usages
//! are whole-token matches in other files. Heuristic by design — enough to
//! exercise the engine, not a parser.

use super::{Element, ElementKind, Location, ProjectHost, StructureModel};
use crate::error::Result;
use crate::types::CodeFile;
use ignore::WalkBuilder;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// Extensions treated as source files.
const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "tsx", "jsx", "go", "java", "kt", "c", "h", "cpp", "hpp", "cs", "rb",
    "swift",
];

/// Keywords whose following identifier is taken as a declaration.
const DECLARATION_KEYWORDS: &[&str] = &[
    "fn",
    "struct",
    "enum",
    "trait",
    "type",
    "mod",
    "const",
    "class",
    "def",
    "function",
    "interface",
];

/// Files larger than this are skipped during a scan.
const MAX_FILE_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Default)]
struct FileEntry {
    content: String,
    /// Identifier token -> 1-based line of first occurrence.
    tokens: BTreeMap<String, u32>,
    /// (name, line) pairs of detected declarations.
    declarations: Vec<(String, u32)>,
}

#[derive(Debug, Default)]
struct Snapshot {
    files: BTreeMap<String, FileEntry>,
}

/// Lexical project model over a scanned snapshot.
pub struct LexicalModel {
    root: Option<PathBuf>,
    snapshot: RwLock<Snapshot>,
}

impl LexicalModel {
    /// Scans `root`, honoring gitignore rules and skipping hidden entries.
    pub fn scan(root: &Path) -> Result<Self> {
        let model = Self {
            root: Some(root.to_path_buf()),
            snapshot: RwLock::new(Snapshot::default()),
        };
        model.rescan()?;
        Ok(model)
    }

    /// Builds a model directly from in-memory files (tests, embedding hosts).
    pub fn from_files(files: Vec<CodeFile>) -> Self {
        let mut snapshot = Snapshot::default();
        for file in files {
            snapshot
                .files
                .insert(file.path.clone(), index_content(&file.content));
        }
        Self {
            root: None,
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Re-walks the scan root and replaces the snapshot.
    ///
    /// Returns the number of files captured. A no-op for in-memory models.
    pub fn rescan(&self) -> Result<usize> {
        let Some(root) = &self.root else {
            return Ok(self.snapshot.read().unwrap_or_else(|e| e.into_inner()).files.len());
        };

        let mut fresh = Snapshot::default();
        for entry in WalkBuilder::new(root).build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable walk entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            if !is_source_file(path) {
                continue;
            }
            if entry.metadata().map(|m| m.len()).unwrap_or(0) > MAX_FILE_BYTES {
                debug!(path = %path.display(), "skipping oversized file");
                continue;
            }
            let Ok(content) = fs::read_to_string(path) else {
                // Binary or non-UTF-8 content.
                continue;
            };
            let rel = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            fresh.files.insert(rel, index_content(&content));
        }

        let count = fresh.files.len();
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = fresh;
        Ok(count)
    }

    /// Replaces or inserts one file in the snapshot.
    ///
    /// Elements captured from the previous content may become invalid.
    pub fn update_file(&self, path: &str, content: &str) {
        self.snapshot
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .files
            .insert(path.to_string(), index_content(content));
    }

    /// Drops one file from the snapshot.
    pub fn remove_file(&self, path: &str) {
        self.snapshot
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .files
            .remove(path);
    }
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Tokenizes `content` into identifier tokens and declaration pairs.
fn index_content(content: &str) -> FileEntry {
    let mut tokens: BTreeMap<String, u32> = BTreeMap::new();
    let mut declarations: Vec<(String, u32)> = Vec::new();

    for (line_idx, line) in content.lines().enumerate() {
        let line_no = (line_idx + 1) as u32;
        let mut previous: Option<&str> = None;
        for token in identifier_tokens(line) {
            if DECLARATION_KEYWORDS.contains(&token) {
                previous = Some(token);
                continue;
            }
            if token.len() >= 2 {
                tokens.entry(token.to_string()).or_insert(line_no);
                if previous.is_some() {
                    declarations.push((token.to_string(), line_no));
                }
            }
            previous = None;
        }
    }

    FileEntry {
        content: content.to_string(),
        tokens,
        declarations,
    }
}

/// Splits a line into identifier tokens (`[A-Za-z_][A-Za-z0-9_]*`).
fn identifier_tokens(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| {
            !t.is_empty()
                && t.chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        })
}

impl StructureModel for LexicalModel {
    fn element_tree(&self, path: &str) -> Result<Vec<Element>> {
        let snapshot = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = snapshot.files.get(path) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        let mut declared: BTreeSet<&str> = BTreeSet::new();
        for (name, line) in &entry.declarations {
            declared.insert(name.as_str());
            out.push(Element {
                file: path.to_string(),
                key: format!("{}#decl:{}@{}", path, name, line),
                name: name.clone(),
                kind: ElementKind::Declaration,
                line: *line,
            });
        }
        for (token, line) in &entry.tokens {
            if declared.contains(token.as_str()) {
                continue;
            }
            out.push(Element {
                file: path.to_string(),
                key: format!("{}#ref:{}", path, token),
                name: token.clone(),
                kind: ElementKind::Reference,
                line: *line,
            });
        }
        Ok(out)
    }

    fn resolve_reference(&self, element: &Element) -> Result<Option<Location>> {
        if element.kind != ElementKind::Reference {
            return Ok(None);
        }
        let snapshot = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        for (path, entry) in &snapshot.files {
            if let Some((_, line)) = entry
                .declarations
                .iter()
                .find(|(name, _)| name == &element.name)
            {
                return Ok(Some(Location {
                    file: path.clone(),
                    line: *line,
                }));
            }
        }
        Ok(None)
    }

    fn find_usages(&self, element: &Element) -> Result<Vec<Location>> {
        if element.kind != ElementKind::Declaration {
            return Ok(Vec::new());
        }
        let snapshot = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::new();
        for (path, entry) in &snapshot.files {
            if let Some(line) = entry.tokens.get(&element.name) {
                out.push(Location {
                    file: path.clone(),
                    line: *line,
                });
            }
        }
        Ok(out)
    }

    fn is_valid(&self, element: &Element) -> bool {
        let snapshot = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = snapshot.files.get(&element.file) else {
            return false;
        };
        match element.kind {
            ElementKind::Declaration => entry
                .declarations
                .iter()
                .any(|(name, _)| name == &element.name),
            ElementKind::Reference => entry.tokens.contains_key(&element.name),
        }
    }
}

impl ProjectHost for LexicalModel {
    fn files(&self) -> Vec<String> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .files
            .keys()
            .cloned()
            .collect()
    }

    fn read(&self, path: &str) -> Option<CodeFile> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .files
            .get(path)
            .map(|entry| CodeFile::new(path, entry.content.clone()))
    }

    fn contains(&self, path: &str) -> bool {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .files
            .contains_key(path)
    }
}
