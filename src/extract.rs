//! Multi-format text extraction for uploaded documents (PDF, DOCX, TXT).
//!
//! Format dispatch is by file extension. [`extract_batch`] concatenates the
//! text of every file in input order; a file that fails to extract is
//! recorded as a [`FileFailure`] and contributes nothing, so one corrupt
//! upload never sinks the rest of the batch.

use std::io::Read;

use quick_xml::events::Event;

use crate::config::ExtractionConfig;
use crate::models::{DocumentFormat, UploadedFile};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Path of the main document part inside a DOCX archive.
const DOCX_DOCUMENT_PART: &str = "word/document.xml";

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type (expected .pdf, .docx, or .txt)")]
    UnsupportedFormat,
    #[error("file is {size} bytes, over the {limit}-byte limit")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("text file is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A file that could not be extracted.
#[derive(Debug)]
pub struct FileFailure {
    pub filename: String,
    pub error: ExtractError,
}

/// A file that was extracted successfully.
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    pub filename: String,
    pub format: DocumentFormat,
    /// Characters contributed to the combined text.
    pub chars: usize,
}

/// Result of extracting a batch of files.
#[derive(Debug, Default)]
pub struct Extraction {
    pub text: String,
    pub extracted: Vec<ExtractedFile>,
    pub failures: Vec<FileFailure>,
}

impl Extraction {
    /// True when the batch produced no usable text.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Extract and concatenate text from every file, in input order.
pub fn extract_batch(files: &[UploadedFile], config: &ExtractionConfig) -> Extraction {
    let mut out = Extraction::default();

    for file in files {
        match extract_file(file, config) {
            Ok((format, text)) => {
                tracing::info!(
                    file = %file.filename,
                    format = format.as_str(),
                    chars = text.chars().count(),
                    "Extracted text"
                );
                out.extracted.push(ExtractedFile {
                    filename: file.filename.clone(),
                    format,
                    chars: text.chars().count(),
                });
                out.text.push_str(&text);
            }
            Err(error) => {
                tracing::warn!(file = %file.filename, error = %error, "Failed to extract text");
                out.failures.push(FileFailure {
                    filename: file.filename.clone(),
                    error,
                });
            }
        }
    }

    out
}

fn extract_file(
    file: &UploadedFile,
    config: &ExtractionConfig,
) -> Result<(DocumentFormat, String), ExtractError> {
    let format = file.format().ok_or(ExtractError::UnsupportedFormat)?;
    let size = file.bytes.len() as u64;
    if size > config.max_file_bytes {
        return Err(ExtractError::FileTooLarge {
            size,
            limit: config.max_file_bytes,
        });
    }
    let text = extract_text(&file.bytes, format)?;
    Ok((format, text))
}

/// Extract plain text from the bytes of a single document.
pub fn extract_text(bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractError> {
    match format {
        DocumentFormat::Pdf => extract_pdf(bytes),
        DocumentFormat::Docx => extract_docx(bytes),
        DocumentFormat::Text => Ok(String::from_utf8(bytes.to_vec())?),
    }
}

/// Page-by-page extraction, pages joined in order with no separator.
///
/// pdf-extract panics on some malformed inputs; the panic is caught and
/// turned into an error for this file only. The process-wide panic hook
/// still runs first, so the default hook prints a panic message to
/// stderr ahead of the per-file error.
fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));
    match result {
        Ok(Ok(pages)) => Ok(pages.concat()),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "parser panicked".to_string()
            };
            Err(ExtractError::Pdf(msg))
        }
    }
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Docx(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Docx(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, DOCX_DOCUMENT_PART, MAX_XML_ENTRY_BYTES)?;
    extract_paragraphs(&xml)
}

/// Walk `word/document.xml` and emit each `<w:p>` followed by `\n`.
///
/// Run text (`<w:t>`) is kept verbatim; `<w:tab/>` becomes `\t` and
/// `<w:br/>`/`<w:cr/>` become `\n`. Tab-stop definitions inside paragraph
/// properties (`<w:pPr><w:tabs>`) are not content and are skipped.
fn extract_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_text = false;
    let mut in_props = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"pPr" => in_props = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"pPr" => in_props = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" => out.push('\n'),
                b"tab" if !in_props => out.push('\t'),
                b"br" | b"cr" if !in_props => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
