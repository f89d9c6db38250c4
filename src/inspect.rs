//! Offline dry run of the ingestion half of the pipeline.
//!
//! `healthdoc inspect` extracts and chunks files exactly as `chat` would,
//! without credentials or network calls, and prints what each file
//! yielded and how the combined text was chunked. Useful for checking
//! that a scanned PDF actually carries a text layer before paying for
//! embeddings.

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::console::OutputMode;
use crate::extract::extract_batch;
use crate::files::collect_files;
use crate::models::UploadedFile;

#[derive(Debug, Serialize)]
pub struct FileStatus {
    pub filename: String,
    pub ok: bool,
    /// Characters extracted; 0 on failure.
    pub chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub files: Vec<FileStatus>,
    pub total_chars: usize,
    pub chunks: usize,
    pub min_chunk_chars: usize,
    pub max_chunk_chars: usize,
    pub mean_chunk_chars: usize,
}

/// Extract and chunk `files` and summarize the result.
pub fn inspect(files: &[UploadedFile], config: &Config) -> InspectReport {
    let mut statuses: Vec<FileStatus> = Vec::with_capacity(files.len());
    let mut text = String::new();

    for file in files {
        let single = extract_batch(std::slice::from_ref(file), &config.extraction);
        let error = single.failures.first().map(|f| f.error.to_string());
        statuses.push(FileStatus {
            filename: file.filename.clone(),
            ok: error.is_none(),
            chars: single.text.chars().count(),
            error,
        });
        text.push_str(&single.text);
    }

    let chunks = chunk_text(&text, &config.chunking);
    let sizes: Vec<usize> = chunks.iter().map(|c| c.text.chars().count()).collect();

    InspectReport {
        files: statuses,
        total_chars: text.chars().count(),
        chunks: sizes.len(),
        min_chunk_chars: sizes.iter().copied().min().unwrap_or(0),
        max_chunk_chars: sizes.iter().copied().max().unwrap_or(0),
        mean_chunk_chars: if sizes.is_empty() {
            0
        } else {
            sizes.iter().sum::<usize>() / sizes.len()
        },
    }
}

/// Run `healthdoc inspect`.
pub fn run_inspect(config: &Config, paths: &[PathBuf], mode: OutputMode) -> Result<()> {
    let files = collect_files(paths)?;
    let report = inspect(&files, config);

    if mode == OutputMode::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("HealthDoc — Inspect");
    println!("===================");
    println!();
    if report.files.is_empty() {
        println!("  (no files)");
    }
    for status in &report.files {
        match &status.error {
            None => println!("  ok      {:<40} {:>8} chars", status.filename, status.chars),
            Some(err) => println!("  FAILED  {:<40} {}", status.filename, err),
        }
    }
    println!();
    println!("  Text:        {} chars", report.total_chars);
    println!(
        "  Chunks:      {} (size {}, overlap {})",
        report.chunks, config.chunking.chunk_size, config.chunking.chunk_overlap
    );
    if report.chunks > 0 {
        println!(
            "  Chunk chars: min {} / mean {} / max {}",
            report.min_chunk_chars, report.mean_chunk_chars, report.max_chunk_chars
        );
    } else {
        println!("  No extractable text.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_each_file_in_order() {
        let files = vec![
            UploadedFile::new("notes.txt", "hello world"),
            UploadedFile::new("broken.docx", "not a zip"),
            UploadedFile::new("more.txt", "!"),
        ];
        let report = inspect(&files, &Config::default());

        assert_eq!(report.files.len(), 3);
        assert!(report.files[0].ok);
        assert_eq!(report.files[0].chars, 11);
        assert!(!report.files[1].ok);
        assert!(report.files[1].error.as_deref().unwrap().contains("DOCX"));
        assert!(report.files[2].ok);
        assert_eq!(report.total_chars, 12);
        assert_eq!(report.chunks, 1);
        assert_eq!(report.max_chunk_chars, 12);
    }

    #[test]
    fn empty_input_has_no_chunks() {
        let report = inspect(&[], &Config::default());
        assert!(report.files.is_empty());
        assert_eq!(report.chunks, 0);
        assert_eq!(report.mean_chunk_chars, 0);
    }
}
