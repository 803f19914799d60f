
use std::path::Path;

use tracing::{debug, warn};

use crate::{RagError, Result};

/// Raw text pulled from one page of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Page text as extracted
    pub text: String,
    /// Name of the document the text came from
    pub source: String,
    /// 1-based page number
    pub page: u32,
}

/// Load a document into per-page segments.
///
/// `.txt` and `.md` files become a single segment; everything else is parsed
/// as PDF.
#[inline]
pub fn load_document(path: &Path) -> Result<Vec<Segment>> {
    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| RagError::Load(format!("Not a file path: {}", path.display())))?;

    let is_plain_text = path.extension().is_some_and(|ext| {
        ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("md")
    });

    if is_plain_text {
        load_plain_text(path, source)
    } else {
        load_pdf(path, source)
    }
}

fn load_plain_text(path: &Path, source: String) -> Result<Vec<Segment>> {
    let bytes = std::fs::read(path)
        .map_err(|e| RagError::Load(format!("Failed to read {}: {}", path.display(), e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| RagError::Load(format!("{} is not valid UTF-8 text", path.display())))?;

    debug!("Loaded plain text document {} ({} bytes)", source, text.len());
    Ok(vec![Segment {
        text,
        source,
        page: 1,
    }])
}

fn load_pdf(path: &Path, source: String) -> Result<Vec<Segment>> {
    let document = lopdf::Document::load(path)
        .map_err(|e| RagError::Load(format!("Failed to parse PDF {}: {}", path.display(), e)))?;

    let pages = document.get_pages();
    if pages.is_empty() {
        return Err(RagError::Load(format!(
            "PDF {} contains no pages",
            path.display()
        )));
    }

    let mut segments = Vec::with_capacity(pages.len());
    let mut failed_pages = 0;

    for page_number in pages.keys().copied() {
        match document.extract_text(&[page_number]) {
            Ok(text) => segments.push(Segment {
                text,
                source: source.clone(),
                page: page_number,
            }),
            Err(e) => {
                warn!(
                    "Could not extract text from page {} of {}: {}",
                    page_number, source, e
                );
                failed_pages += 1;
            }
        }
    }

    if segments.is_empty() {
        return Err(RagError::Load(format!(
            "Could not extract text from any of the {} pages of {}",
            failed_pages,
            path.display()
        )));
    }

    debug!(
        "Loaded PDF {} ({} pages, {} unreadable)",
        source,
        segments.len(),
        failed_pages
    );
    Ok(segments)
}
