//! Ingestion-dump parser.
//!
//! The ingestion collaborator produces a single flat text dump: a preamble
//! (summary and directory tree) followed by one section per file. Each
//! section is announced by a three-line frame:
//!
//! ```text
//! ================================================
//! FILE: relative/path.py
//! ================================================
//! <verbatim content lines>
//! ```
//!
//! The boundary is the *full* frame, never a bare separator. A line of
//! `=` characters inside file content does not start a new section unless
//! the next line is a `FILE:` header and the line after that is another
//! separator. A separator + header without its closing separator is
//! ambiguous framing and fails with [`RepoLensError::Parse`] at the
//! header's byte offset rather than silently corrupting a file body.
//!
//! Binary or excluded files appear as a section whose entire body is the
//! marker line `[binary]`; they become metadata-only stubs with empty
//! content. Parsing is all-or-nothing: any error discards every partial
//! record.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::error::{RepoLensError, Result};
use crate::models::{FileRecord, Lang};

const FILE_HEADER: &str = "FILE: ";
const BINARY_MARKER: &str = "[binary]";
const MIN_SEPARATOR_LEN: usize = 16;

/// Content hash of an ingestion dump, used as the snapshot fingerprint.
pub fn fingerprint(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Parse an ingestion dump into file records, in dump order.
pub fn parse_dump(raw: &str) -> Result<Vec<FileRecord>> {
    let lines = split_lines(raw);

    let frames = find_frames(&lines)?;
    if frames.is_empty() {
        return Err(RepoLensError::Parse {
            reason: "no file sections found in ingestion text".to_string(),
            offset: 0,
        });
    }

    let mut records = Vec::with_capacity(frames.len());
    let mut seen: HashSet<String> = HashSet::new();

    for (idx, frame) in frames.iter().enumerate() {
        let (header_offset, header) = lines[frame.header_line];
        let path = normalize_path(&header[FILE_HEADER.len()..], header_offset)?;

        if !seen.insert(path.clone()) {
            return Err(RepoLensError::Parse {
                reason: format!("duplicate file path: {path}"),
                offset: header_offset,
            });
        }

        let body_start = frame.header_line + 2;
        let body_end = frames
            .get(idx + 1)
            .map(|next| next.separator_line)
            .unwrap_or(lines.len());

        let mut body: Vec<&str> = lines[body_start.min(lines.len())..body_end]
            .iter()
            .map(|(_, l)| *l)
            .collect();
        // Inter-section padding.
        while body.last().is_some_and(|l| l.trim().is_empty()) {
            body.pop();
        }

        let is_binary = body.len() == 1 && body[0].trim() == BINARY_MARKER;
        let content = if is_binary { String::new() } else { body.join("\n") };
        let line_count = if content.is_empty() { 0 } else { content.lines().count() as u64 };

        records.push(FileRecord {
            size_bytes: content.len() as u64,
            line_count,
            language: Lang::from_path(&path),
            is_binary,
            path,
            content,
        });
    }

    Ok(records)
}

/// A validated section frame: separator, `FILE:` header, separator.
struct Frame {
    separator_line: usize,
    header_line: usize,
}

fn find_frames(lines: &[(usize, &str)]) -> Result<Vec<Frame>> {
    let mut frames = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if is_separator(lines[i].1) {
            let header = lines.get(i + 1);
            if header.is_some_and(|(_, l)| l.starts_with(FILE_HEADER)) {
                let closing = lines.get(i + 2);
                if closing.is_some_and(|(_, l)| is_separator(l)) {
                    frames.push(Frame {
                        separator_line: i,
                        header_line: i + 1,
                    });
                    i += 3;
                    continue;
                }
                // Only a real boundary may carry a FILE: header between
                // separators; a half-open frame is indistinguishable from
                // corruption.
                return Err(RepoLensError::Parse {
                    reason: "unterminated file header frame (missing closing separator)"
                        .to_string(),
                    offset: header.map(|(o, _)| *o).unwrap_or(0),
                });
            }
        }
        i += 1;
    }
    Ok(frames)
}

fn is_separator(line: &str) -> bool {
    let t = line.trim_end();
    t.len() >= MIN_SEPARATOR_LEN && t.bytes().all(|b| b == b'=')
}

/// Normalize to a repository-relative forward-slash path.
fn normalize_path(raw: &str, offset: usize) -> Result<String> {
    let cleaned = raw.trim().replace('\\', "/");
    let cleaned = cleaned.trim_start_matches("./").trim_start_matches('/');

    if cleaned.is_empty() {
        return Err(RepoLensError::Parse {
            reason: "empty file path in section header".to_string(),
            offset,
        });
    }
    if cleaned.split('/').any(|seg| seg == "..") {
        return Err(RepoLensError::Parse {
            reason: format!("path escapes repository root: {cleaned}"),
            offset,
        });
    }
    Ok(cleaned.to_string())
}

/// Split into lines with the byte offset of each line start. Line
/// terminators (`\n`, `\r\n`) are stripped.
fn split_lines(raw: &str) -> Vec<(usize, &str)> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for piece in raw.split_inclusive('\n') {
        let line = piece.strip_suffix('\n').unwrap_or(piece);
        let line = line.strip_suffix('\r').unwrap_or(line);
        lines.push((offset, line));
        offset += piece.len();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEP: &str = "================================================";

    fn dump(sections: &[(&str, &str)]) -> String {
        let mut out = String::from("Summary\nrepo: example\n\nDirectory structure:\n└── src/\n\n");
        for (path, body) in sections {
            out.push_str(SEP);
            out.push('\n');
            out.push_str("FILE: ");
            out.push_str(path);
            out.push('\n');
            out.push_str(SEP);
            out.push('\n');
            out.push_str(body);
            out.push_str("\n\n");
        }
        out
    }

    #[test]
    fn test_parses_sections_in_order() {
        let raw = dump(&[
            ("src/app.py", "import os\n\ndef main():\n    pass"),
            ("README.md", "# Example"),
        ]);
        let records = parse_dump(&raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, "src/app.py");
        assert_eq!(records[0].content, "import os\n\ndef main():\n    pass");
        assert_eq!(records[0].language, Lang::Python);
        assert_eq!(records[0].line_count, 4);
        assert_eq!(records[1].path, "README.md");
    }

    #[test]
    fn test_preamble_skipped() {
        let raw = dump(&[("a.txt", "hello")]);
        let records = parse_dump(&raw).unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].content.contains("Directory structure"));
    }

    #[test]
    fn test_zero_byte_file() {
        let raw = dump(&[("empty.txt", "")]);
        let records = parse_dump(&raw).unwrap();
        assert_eq!(records[0].content, "");
        assert_eq!(records[0].size_bytes, 0);
        assert_eq!(records[0].line_count, 0);
        assert!(!records[0].is_binary);
    }

    #[test]
    fn test_binary_stub() {
        let raw = dump(&[("logo.png", "[binary]")]);
        let records = parse_dump(&raw).unwrap();
        assert!(records[0].is_binary);
        assert_eq!(records[0].content, "");
        assert_eq!(records[0].size_bytes, 0);
    }

    #[test]
    fn test_separator_inside_content_is_not_a_boundary() {
        let body = format!("before\n{SEP}\nafter");
        let raw = dump(&[("notes.md", &body), ("b.txt", "x")]);
        let records = parse_dump(&raw).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].content.contains(SEP));
        assert!(records[0].content.ends_with("after"));
    }

    #[test]
    fn test_half_open_frame_is_an_error() {
        // A separator + FILE: header inside content, without the closing
        // separator, must fail rather than corrupt the body.
        let body = format!("code\n{SEP}\nFILE: fake.txt\nmore code");
        let raw = dump(&[("a.py", &body)]);
        let err = parse_dump(&raw).unwrap_err();
        match err {
            RepoLensError::Parse { reason, offset } => {
                assert!(reason.contains("unterminated"));
                assert!(offset > 0);
            }
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let raw = dump(&[("a.txt", "one"), ("a.txt", "two")]);
        assert!(matches!(
            parse_dump(&raw),
            Err(RepoLensError::Parse { .. })
        ));
    }

    #[test]
    fn test_path_escape_rejected() {
        let raw = dump(&[("../etc/passwd", "x")]);
        assert!(matches!(
            parse_dump(&raw),
            Err(RepoLensError::Parse { .. })
        ));
    }

    #[test]
    fn test_backslash_paths_normalized() {
        let raw = dump(&[("src\\lib\\util.rs", "fn f() {}")]);
        let records = parse_dump(&raw).unwrap();
        assert_eq!(records[0].path, "src/lib/util.rs");
        assert_eq!(records[0].language, Lang::Rust);
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(parse_dump("").is_err());
        assert!(parse_dump("just a summary, no sections\n").is_err());
    }

    #[test]
    fn test_fingerprint_is_content_addressed() {
        let a = dump(&[("a.txt", "same")]);
        let b = dump(&[("a.txt", "same")]);
        let c = dump(&[("a.txt", "different")]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[test]
    fn test_crlf_dump() {
        let raw = dump(&[("a.txt", "line one\nline two")]).replace('\n', "\r\n");
        let records = parse_dump(&raw).unwrap();
        assert_eq!(records[0].content, "line one\nline two");
    }
}
