//! Block-aware document chunker.
//!
//! Packs the blocks of a [`ConvertedDocument`] into chunks that respect a
//! configurable `max_tokens` limit, splitting on block boundaries to keep
//! each chunk semantically coherent. Chunks carry the heading hierarchy
//! they appeared under; `contextualize` prefixes that hierarchy onto the
//! chunk text before embedding.

use serde::{Deserialize, Serialize};

use crate::convert::{Block, ConvertedDocument};

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// One ordered fragment of a document. Emission order defines the chunk
/// index downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocChunk {
    pub headings: Vec<String>,
    pub text: String,
}

pub struct Chunker {
    max_chars: usize,
}

impl Chunker {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_chars: max_tokens.max(1) * CHARS_PER_TOKEN,
        }
    }

    /// Split a document into ordered chunks. Always returns at least one
    /// chunk for a non-empty document.
    pub fn chunk(&self, doc: &ConvertedDocument) -> Vec<DocChunk> {
        let mut chunks = Vec::new();
        let mut headings: Vec<(u8, String)> = Vec::new();
        let mut buf = String::new();
        let mut buf_headings: Vec<String> = Vec::new();

        for block in &doc.blocks {
            match block {
                Block::Heading { level, text } => {
                    // A heading starts a new context; flush what we have.
                    flush(&mut chunks, &mut buf, &mut buf_headings);
                    while headings
                        .last()
                        .map(|(l, _)| *l >= *level)
                        .unwrap_or(false)
                    {
                        headings.pop();
                    }
                    headings.push((*level, text.clone()));
                }
                Block::Paragraph { text } | Block::Code { text, .. } => {
                    self.push_text(&mut chunks, &mut buf, &mut buf_headings, &headings, text);
                }
            }
        }

        flush(&mut chunks, &mut buf, &mut buf_headings);

        // A document of only headings still yields one chunk.
        if chunks.is_empty() {
            if let Some((_, last)) = headings.last() {
                chunks.push(DocChunk {
                    headings: headings[..headings.len() - 1]
                        .iter()
                        .map(|(_, t)| t.clone())
                        .collect(),
                    text: last.clone(),
                });
            }
        }

        chunks
    }

    /// Rewrite a chunk's text with its surrounding heading context.
    pub fn contextualize(&self, chunk: &DocChunk) -> String {
        if chunk.headings.is_empty() {
            return chunk.text.clone();
        }
        format!("{}\n\n{}", chunk.headings.join(" > "), chunk.text)
    }

    fn push_text(
        &self,
        chunks: &mut Vec<DocChunk>,
        buf: &mut String,
        buf_headings: &mut Vec<String>,
        headings: &[(u8, String)],
        text: &str,
    ) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }

        let current: Vec<String> = headings.iter().map(|(_, t)| t.clone()).collect();
        if buf.is_empty() {
            *buf_headings = current;
        }

        let would_be = if buf.is_empty() {
            trimmed.len()
        } else {
            buf.len() + 2 + trimmed.len()
        };

        if would_be > self.max_chars && !buf.is_empty() {
            flush(chunks, buf, buf_headings);
            *buf_headings = headings.iter().map(|(_, t)| t.clone()).collect();
        }

        // A single oversized block is hard-split at whitespace boundaries.
        if trimmed.len() > self.max_chars {
            flush(chunks, buf, buf_headings);
            let ctx: Vec<String> = headings.iter().map(|(_, t)| t.clone()).collect();
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = floor_char_boundary(remaining, remaining.len().min(self.max_chars));
                let actual = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                chunks.push(DocChunk {
                    headings: ctx.clone(),
                    text: remaining[..actual].trim().to_string(),
                });
                remaining = &remaining[actual..];
            }
            return;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(trimmed);
    }
}

fn flush(chunks: &mut Vec<DocChunk>, buf: &mut String, buf_headings: &mut Vec<String>) {
    if !buf.is_empty() {
        chunks.push(DocChunk {
            headings: std::mem::take(buf_headings),
            text: std::mem::take(buf),
        });
    }
}

/// Largest index <= `at` that falls on a char boundary.
fn floor_char_boundary(s: &str, mut at: usize) -> usize {
    while at > 0 && !s.is_char_boundary(at) {
        at -= 1;
    }
    at
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{DocumentConverter, StandardConverter};

    fn doc(text: &str) -> ConvertedDocument {
        StandardConverter.convert_markdown("test.md", text).unwrap()
    }

    #[test]
    fn small_document_single_chunk() {
        let chunker = Chunker::new(700);
        let chunks = chunker.chunk(&doc("Hello, world!"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn paragraphs_pack_until_limit() {
        let chunker = Chunker::new(5); // 20 chars
        let chunks = chunker.chunk(&doc(
            "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.",
        ));
        assert!(chunks.len() > 1);
    }

    #[test]
    fn heading_hierarchy_is_carried() {
        let chunker = Chunker::new(700);
        let chunks = chunker.chunk(&doc(
            "# Top\n\n## Nested\n\nbody text here\n\n## Sibling\n\nmore text",
        ));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].headings, vec!["Top", "Nested"]);
        assert_eq!(chunks[1].headings, vec!["Top", "Sibling"]);
    }

    #[test]
    fn contextualize_prefixes_heading_trail() {
        let chunker = Chunker::new(700);
        let chunks = chunker.chunk(&doc("# Top\n\n## Nested\n\nbody"));
        let text = chunker.contextualize(&chunks[0]);
        assert_eq!(text, "Top > Nested\n\nbody");
    }

    #[test]
    fn contextualize_without_headings_is_identity() {
        let chunker = Chunker::new(700);
        let chunk = DocChunk {
            headings: vec![],
            text: "plain".to_string(),
        };
        assert_eq!(chunker.contextualize(&chunk), "plain");
    }

    #[test]
    fn oversized_block_is_hard_split() {
        let chunker = Chunker::new(5); // 20 chars
        let long = "word ".repeat(20);
        let chunks = chunker.chunk(&doc(&long));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.len() <= 20);
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let chunker = Chunker::new(5);
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let a = chunker.chunk(&doc(text));
        let b = chunker.chunk(&doc(text));
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.headings, y.headings);
        }
    }
}
