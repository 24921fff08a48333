//! Boundary-respecting text chunker.
//!
//! Splits file content into [`Chunk`]s that respect a configurable
//! `max_chars` limit, preferring to close a chunk at a blank-line boundary
//! once `min_chars` is reached. Chunks are runs of whole lines — a line is
//! never split — so `(start_line, end_line)` are exact and concatenating a
//! file's chunks in ordinal order reproduces its content byte-for-byte.
//!
//! Each chunk receives a deterministic UUID derived from its source path,
//! ordinal, and a SHA-256 hash of its text: re-chunking identical content
//! with identical configuration yields byte-identical chunks, which the
//! fingerprint-keyed index relies on for reuse.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, FileRecord};

/// Split one file into chunks. Binary and zero-byte files produce none;
/// any other file produces at least one.
pub fn chunk_file(file: &FileRecord, config: &ChunkingConfig) -> Vec<Chunk> {
    if file.is_binary || file.content.is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut buf = String::new();
    let mut start_line: u64 = 1;
    let mut line: u64 = 0;

    for piece in file.content.split_inclusive('\n') {
        line += 1;

        // Close out before a line that would push past the limit; a single
        // oversize line becomes its own chunk rather than being split.
        if !buf.is_empty() && buf.len() + piece.len() > config.max_chars {
            let ordinal = chunks.len() as u64;
            chunks.push(make_chunk(
                &file.path,
                ordinal,
                start_line,
                line - 1,
                std::mem::take(&mut buf),
            ));
            start_line = line;
        }

        buf.push_str(piece);

        let at_blank_boundary = piece.trim().is_empty();
        if (at_blank_boundary && buf.len() >= config.min_chars) || buf.len() >= config.max_chars {
            let ordinal = chunks.len() as u64;
            chunks.push(make_chunk(
                &file.path,
                ordinal,
                start_line,
                line,
                std::mem::take(&mut buf),
            ));
            start_line = line + 1;
        }
    }

    // Flush remaining
    if !buf.is_empty() {
        let ordinal = chunks.len() as u64;
        chunks.push(make_chunk(&file.path, ordinal, start_line, line, buf));
    }

    chunks
}

/// Reassemble a file's content from its chunks (ordinal order assumed).
/// Inverse of [`chunk_file`] for non-binary, non-empty files.
pub fn reassemble(chunks: &[Chunk]) -> String {
    chunks.iter().map(|c| c.text.as_str()).collect()
}

fn make_chunk(path: &str, ordinal: u64, start_line: u64, end_line: u64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let name = format!("{path}#{ordinal}#{hash}");
    Chunk {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string(),
        source_file: path.to_string(),
        start_line,
        end_line,
        text,
        ordinal,
    }
}
