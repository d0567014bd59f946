//! `mda chunk`: split a markdown file and write one file per chunk.
//!
//! Chunk files are named `<source file name>_chunk_<n>.md` with a 1-based
//! `n`, e.g. `Spec.md_chunk_1.md`. Existing files with the same name are
//! overwritten. Writes are not atomic as a set: if one fails, the files
//! written before it stay on disk and the error propagates.

use anyhow::{bail, Context, Result};
use md_assist_core::chunk::{pack_paragraphs, summarize};
use md_assist_core::models::Chunk;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Name of the file holding the chunk at zero-based `index`.
pub fn chunk_file_name(source: &Path, index: usize) -> String {
    let stem = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    format!("{}_chunk_{}.md", stem, index + 1)
}

/// Read and pack a source document.
pub fn chunk_document(path: &Path, max_words: usize) -> Result<Vec<Chunk>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))?;
    Ok(pack_paragraphs(&text, max_words))
}

/// Write each chunk to its own file under `out_dir`.
///
/// Returns the written paths in chunk order.
pub fn write_chunks(source: &Path, chunks: &[Chunk], out_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let mut written = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let path = out_dir.join(chunk_file_name(source, chunk.index));
        std::fs::write(&path, &chunk.text)
            .with_context(|| format!("Failed to write chunk file: {}", path.display()))?;
        println!("Chunk {} saved to {}", chunk.index + 1, path.display());
        written.push(path);
    }
    Ok(written)
}

#[derive(Serialize)]
struct DryRunReport<'a> {
    source: String,
    max_words: usize,
    stats: md_assist_core::models::ChunkStats,
    chunks: Vec<DryRunChunk<'a>>,
}

#[derive(Serialize)]
struct DryRunChunk<'a> {
    file: String,
    word_count: usize,
    oversized: bool,
    preview: &'a str,
}

fn preview(text: &str) -> &str {
    let line = text.lines().next().unwrap_or("");
    match line.char_indices().nth(60) {
        Some((i, _)) => &line[..i],
        None => line,
    }
}

/// Entry point for `mda chunk`.
///
/// CLI overrides take precedence over `[chunking]` settings.
pub fn run_chunk(
    config: &Config,
    path: &Path,
    max_words: Option<usize>,
    out_dir: Option<PathBuf>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let max_words = max_words.unwrap_or(config.chunking.max_words);
    if max_words == 0 {
        bail!("--max-words must be > 0");
    }
    let out_dir = out_dir
        .or_else(|| config.chunking.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let chunks = chunk_document(path, max_words)?;
    let stats = summarize(&chunks, max_words);

    for chunk in chunks.iter().filter(|c| c.is_oversized(max_words)) {
        tracing::warn!(
            chunk = chunk.index + 1,
            words = chunk.word_count,
            max_words,
            "single paragraph exceeds the word budget; kept as one chunk"
        );
    }

    if dry_run {
        if json {
            let report = DryRunReport {
                source: path.display().to_string(),
                max_words,
                stats,
                chunks: chunks
                    .iter()
                    .map(|c| DryRunChunk {
                        file: chunk_file_name(path, c.index),
                        word_count: c.word_count,
                        oversized: c.is_oversized(max_words),
                        preview: preview(&c.text),
                    })
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("Dry run for {} (max {} words):", path.display(), max_words);
            for c in &chunks {
                let marker = if c.is_oversized(max_words) { "  (oversized)" } else { "" };
                println!(
                    "  {}  {} words{}",
                    chunk_file_name(path, c.index),
                    c.word_count,
                    marker
                );
            }
            println!(
                "chunks: {}  words: {}  largest: {}  oversized: {}",
                stats.chunks, stats.total_words, stats.largest_chunk_words, stats.oversized_chunks
            );
        }
        return Ok(());
    }

    let written = write_chunks(path, &chunks, &out_dir)?;
    tracing::info!(
        source = %path.display(),
        chunks = written.len(),
        out_dir = %out_dir.display(),
        "chunking complete"
    );
    Ok(())
}
