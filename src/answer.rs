//! Grounded answer synthesis.
//!
//! Assembles retrieved chunks into a bounded context window, prompts the
//! inference service to answer strictly from that context with
//! `[path:start-end]` citations, and post-processes the reply into an
//! attributed [`Answer`]. Confidence comes from the top retrieval score,
//! never from the model's own claims. When retrieval returns nothing
//! above threshold, synthesis short-circuits without invoking the
//! service at all.

use tracing::debug;

use crate::config::SynthesisConfig;
use crate::error::{RepoLensError, Result};
use crate::inference::InferenceService;
use crate::models::{Answer, Retrieved};

const NO_CONTEXT_TEXT: &str =
    "No relevant context was found in the indexed repository for this question.";

/// Answer a question from already-retrieved chunks.
pub async fn synthesize(
    service: &dyn InferenceService,
    config: &SynthesisConfig,
    question: &str,
    retrieved: &[Retrieved],
) -> Result<Answer> {
    if retrieved.is_empty() {
        return Ok(no_context_answer());
    }

    let context = build_context(retrieved, config.context_budget_chars);
    let prompt = build_prompt(question, &context);
    debug!(
        chunks = retrieved.len(),
        context_chars = context.len(),
        "invoking completion"
    );

    let raw = service
        .complete(&prompt)
        .await
        .map_err(RepoLensError::Inference)?;

    Ok(parse_answer(&raw, retrieved))
}

/// The short-circuit result for empty retrieval.
pub fn no_context_answer() -> Answer {
    Answer {
        answer_text: NO_CONTEXT_TEXT.to_string(),
        cited_sources: Vec::new(),
        confidence: 0.0,
        grounded: false,
    }
}

/// Concatenate retrieved chunks under the character budget, dropping the
/// lowest-ranked first. The top chunk is always represented, truncated if
/// it alone exceeds the budget.
pub fn build_context(retrieved: &[Retrieved], budget_chars: usize) -> String {
    let mut out = String::new();

    for (rank, r) in retrieved.iter().enumerate() {
        let header = format!(
            "--- {} (lines {}-{}) ---\n",
            r.chunk.source_file, r.chunk.start_line, r.chunk.end_line
        );
        let block_len = header.len() + r.chunk.text.len() + 1;

        if out.len() + block_len > budget_chars {
            if rank == 0 {
                out.push_str(&header);
                out.push_str(truncate_at_char_boundary(
                    &r.chunk.text,
                    budget_chars.saturating_sub(header.len()),
                ));
                out.push('\n');
            }
            break;
        }

        out.push_str(&header);
        out.push_str(&r.chunk.text);
        out.push('\n');
    }

    out
}

/// The grounding prompt sent to the completion endpoint.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are answering a question about a source code repository.\n\
         Use ONLY the context excerpts below. If the context does not \
         contain the answer, say so plainly.\n\
         Cite the excerpts supporting each claim as [path:start-end], \
         matching the excerpt headers.\n\n\
         Context:\n{context}\n\
         Question: {question}\n\
         Answer:"
    )
}

/// Extract `[path:start-end]` citations the model actually used; falls
/// back to the retrieved files when the reply cites nothing recognizable.
pub fn parse_answer(raw: &str, retrieved: &[Retrieved]) -> Answer {
    let mut cited = Vec::new();
    for candidate in bracketed_spans(raw) {
        let path = candidate.split(':').next().unwrap_or("");
        let known = retrieved.iter().any(|r| r.chunk.source_file == path);
        if known && !cited.iter().any(|c| c == candidate) {
            cited.push(candidate.to_string());
        }
    }

    if cited.is_empty() {
        for r in retrieved {
            let fallback = format!(
                "{}:{}-{}",
                r.chunk.source_file, r.chunk.start_line, r.chunk.end_line
            );
            if !cited.contains(&fallback) {
                cited.push(fallback);
            }
        }
    }

    let top_score = retrieved.first().map(|r| r.score).unwrap_or(0.0);

    Answer {
        answer_text: raw.trim().to_string(),
        cited_sources: cited,
        confidence: top_score.clamp(0.0, 1.0),
        grounded: true,
    }
}

fn bracketed_spans(text: &str) -> impl Iterator<Item = &str> {
    text.split('[').skip(1).filter_map(|rest| {
        let inner = rest.split(']').next()?;
        // Citations are single-line `path:lines` spans, not arbitrary
        // bracketed prose.
        if inner.contains(':') && !inner.contains('\n') {
            Some(inner.trim())
        } else {
            None
        }
    })
}

fn truncate_at_char_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn retrieved(file: &str, start: u64, end: u64, text: &str, score: f32) -> Retrieved {
        Retrieved {
            chunk: Chunk {
                id: format!("{file}:{start}"),
                source_file: file.to_string(),
                start_line: start,
                end_line: end,
                text: text.to_string(),
                ordinal: 0,
            },
            score,
        }
    }

    #[test]
    fn test_context_respects_budget_lowest_rank_dropped() {
        let items = vec![
            retrieved("a.py", 1, 5, &"x".repeat(100), 0.9),
            retrieved("b.py", 1, 5, &"y".repeat(100), 0.5),
            retrieved("c.py", 1, 5, &"z".repeat(100), 0.2),
        ];
        let context = build_context(&items, 300);
        assert!(context.contains("a.py"));
        assert!(context.contains("b.py"));
        assert!(!context.contains("c.py"));
    }

    #[test]
    fn test_top_chunk_truncated_when_over_budget() {
        let items = vec![retrieved("big.py", 1, 200, &"q".repeat(5000), 0.8)];
        let context = build_context(&items, 500);
        assert!(context.contains("big.py"));
        assert!(context.len() <= 501);
    }

    #[test]
    fn test_parse_extracts_known_citations() {
        let items = vec![
            retrieved("src/auth.py", 10, 30, "def login(): ...", 0.82),
            retrieved("src/db.py", 1, 20, "conn = ...", 0.4),
        ];
        let raw = "Login happens in `login` [src/auth.py:10-30]. \
                   Storage is separate [src/db.py:1-20]. [not a citation]";
        let answer = parse_answer(raw, &items);
        assert_eq!(
            answer.cited_sources,
            vec!["src/auth.py:10-30", "src/db.py:1-20"]
        );
        assert!((answer.confidence - 0.82).abs() < 1e-6);
        assert!(answer.grounded);
    }

    #[test]
    fn test_parse_falls_back_to_retrieved_files() {
        let items = vec![retrieved("main.rs", 1, 9, "fn main() {}", 0.6)];
        let answer = parse_answer("The entry point is main().", &items);
        assert_eq!(answer.cited_sources, vec!["main.rs:1-9"]);
    }

    #[test]
    fn test_confidence_clamped() {
        let items = vec![retrieved("a.rs", 1, 1, "x", 1.7)];
        let answer = parse_answer("ok", &items);
        assert_eq!(answer.confidence, 1.0);
    }

    #[test]
    fn test_no_context_answer_shape() {
        let answer = no_context_answer();
        assert!(!answer.grounded);
        assert_eq!(answer.confidence, 0.0);
        assert!(answer.cited_sources.is_empty());
    }

    #[test]
    fn test_prompt_mentions_context_and_question() {
        let prompt = build_prompt("what is x?", "--- a.py (lines 1-2) ---\nx = 1\n");
        assert!(prompt.contains("what is x?"));
        assert!(prompt.contains("a.py"));
        assert!(prompt.contains("ONLY"));
    }
}
