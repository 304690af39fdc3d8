//! Filesystem document loading.
//!
//! PDFs yield one document per page; Markdown (reduced to its text) and
//! plain-text formats yield one document per file. A file that fails to load is recorded in the outcome and
//! the rest of the batch carries on.

use std::fs;
use std::path::{Path, PathBuf};

use pulldown_cmark::{Event, Parser, TagEnd};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::{metadata_keys, Document, DomainError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Markdown,
    PlainText,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "md" => Some(Self::Markdown),
            "txt" | "log" | "csv" => Some(Self::PlainText),
            _ => None,
        }
    }

    fn content_type(&self, path: &Path) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Markdown => "text/markdown",
            Self::PlainText => match path.extension().and_then(|e| e.to_str()) {
                Some(e) if e.eq_ignore_ascii_case("csv") => "text/csv",
                _ => "text/plain",
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Result of a batch load: what loaded, what failed, what was not a supported type.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub documents: Vec<Document>,
    pub failures: Vec<LoadFailure>,
    pub skipped: Vec<PathBuf>,
}

impl LoadOutcome {
    fn record(&mut self, path: &Path) {
        let Some(kind) = FileKind::from_path(path) else {
            debug!(path = %path.display(), "skipping unsupported file");
            self.skipped.push(path.to_path_buf());
            return;
        };

        match load_file(path, kind) {
            Ok(docs) => {
                debug!(path = %path.display(), documents = docs.len(), "loaded file");
                self.documents.extend(docs);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load file");
                self.failures.push(LoadFailure {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
            }
        }
    }
}

impl std::fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} documents loaded, {} files failed, {} files skipped",
            self.documents.len(),
            self.failures.len(),
            self.skipped.len()
        )
    }
}

/// Recursively loads every supported file under `dir`.
pub fn load_from_directory(dir: &Path) -> Result<LoadOutcome, DomainError> {
    if !dir.is_dir() {
        return Err(DomainError::validation(format!(
            "not a directory: {}",
            dir.display()
        )));
    }

    let mut outcome = LoadOutcome::default();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() => outcome.record(entry.path()),
            Ok(_) => {}
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                warn!(path = %path.display(), error = %e, "failed to read directory entry");
                outcome.failures.push(LoadFailure {
                    path,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(dir = %dir.display(), "{outcome}");
    Ok(outcome)
}

pub fn load_from_files<P: AsRef<Path>>(paths: &[P]) -> LoadOutcome {
    let mut outcome = LoadOutcome::default();
    for path in paths {
        outcome.record(path.as_ref());
    }
    info!("{outcome}");
    outcome
}

fn load_file(path: &Path, kind: FileKind) -> Result<Vec<Document>, DomainError> {
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let source = path.display().to_string();

    let base = |content: String| {
        let mut doc = Document::new(file_name.clone(), content)
            .with_content_type(kind.content_type(path))
            .with_source(source.clone());
        doc.metadata.insert(
            metadata_keys::FILE_NAME.to_string(),
            serde_json::Value::String(file_name.clone()),
        );
        doc
    };

    match kind {
        FileKind::Pdf => Ok(extract_pdf_pages(path)?
            .into_iter()
            .enumerate()
            .map(|(page, text)| base(text).with_page(page))
            .collect()),
        FileKind::Markdown => Ok(vec![base(markdown_to_text(&read_text(path)?))]),
        FileKind::PlainText => Ok(vec![base(read_text(path)?)]),
    }
}

fn read_text(path: &Path) -> Result<String, DomainError> {
    fs::read_to_string(path).map_err(|e| DomainError::validation(format!("unreadable text: {e}")))
}

/// Drops Markdown syntax, keeping the text. Blocks end in a blank line and
/// list items in a line break, so the splitter still sees the structure.
fn markdown_to_text(markdown: &str) -> String {
    let mut text = String::with_capacity(markdown.len());
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak => text.push(' '),
            Event::HardBreak => text.push('\n'),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock) => {
                end_block(&mut text, "\n\n")
            }
            Event::End(TagEnd::Item) => end_block(&mut text, "\n"),
            _ => {}
        }
    }
    text.trim_end().to_string()
}

fn end_block(text: &mut String, separator: &str) {
    let kept = text.trim_end_matches(|c: char| c == ' ' || c == '\n').len();
    text.truncate(kept);
    if !text.is_empty() {
        text.push_str(separator);
    }
}

/// The PDF parser panics on some malformed inputs; that is treated as a load failure.
fn extract_pdf_pages(path: &Path) -> Result<Vec<String>, DomainError> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_by_pages(path)) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(DomainError::validation(format!("unreadable pdf: {e}"))),
        Err(_) => Err(DomainError::validation("pdf parser crashed")),
    }
}
