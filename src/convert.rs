//! Document conversion.
//!
//! Turns raw markdown (or scraped HTML for URL sources) into a
//! block-structured [`ConvertedDocument`] and derives the export
//! projections stored on a document record: markdown, HTML, plain text,
//! and a doctag stream.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// One structural element of a converted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph { text: String },
    Code { language: String, text: String },
}

/// A structured document produced by conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertedDocument {
    pub name: String,
    pub blocks: Vec<Block>,
}

impl ConvertedDocument {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn export_markdown(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Heading { level, text } => {
                    out.push_str(&"#".repeat(*level as usize));
                    out.push(' ');
                    out.push_str(text);
                    out.push_str("\n\n");
                }
                Block::Paragraph { text } => {
                    out.push_str(text);
                    out.push_str("\n\n");
                }
                Block::Code { language, text } => {
                    out.push_str("```");
                    out.push_str(language);
                    out.push('\n');
                    out.push_str(text);
                    if !text.ends_with('\n') {
                        out.push('\n');
                    }
                    out.push_str("```\n\n");
                }
            }
        }
        out.trim_end().to_string()
    }

    pub fn export_html(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Heading { level, text } => {
                    out.push_str(&format!("<h{l}>{}</h{l}>\n", escape_html(text), l = level));
                }
                Block::Paragraph { text } => {
                    out.push_str(&format!("<p>{}</p>\n", escape_html(text)));
                }
                Block::Code { language, text } => {
                    if language.is_empty() {
                        out.push_str(&format!("<pre><code>{}</code></pre>\n", escape_html(text)));
                    } else {
                        out.push_str(&format!(
                            "<pre><code class=\"language-{}\">{}</code></pre>\n",
                            language,
                            escape_html(text)
                        ));
                    }
                }
            }
        }
        out
    }

    pub fn export_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Heading { text, .. }
                | Block::Paragraph { text }
                | Block::Code { text, .. } => {
                    out.push_str(text);
                    out.push_str("\n\n");
                }
            }
        }
        out.trim_end().to_string()
    }

    /// Tag stream export: one tagged element per block, wrapped in a
    /// document element.
    pub fn export_doctags(&self) -> String {
        let mut out = format!("<document name=\"{}\">\n", escape_html(&self.name));
        for block in &self.blocks {
            match block {
                Block::Heading { level, text } => {
                    out.push_str(&format!(
                        "<heading_{l}>{}</heading_{l}>\n",
                        escape_html(text),
                        l = level
                    ));
                }
                Block::Paragraph { text } => {
                    out.push_str(&format!("<paragraph>{}</paragraph>\n", escape_html(text)));
                }
                Block::Code { language, text } => {
                    out.push_str(&format!(
                        "<code lang=\"{}\">{}</code>\n",
                        language,
                        escape_html(text)
                    ));
                }
            }
        }
        out.push_str("</document>\n");
        out
    }
}

/// Converts raw sources into structured documents. Pure: same input,
/// same output; failures are ordinary errors.
pub trait DocumentConverter: Send + Sync {
    fn convert_markdown(&self, name: &str, text: &str) -> Result<ConvertedDocument>;
    fn convert_html(&self, name: &str, html: &str) -> Result<ConvertedDocument>;
}

/// Default converter: a line-oriented markdown reader and a scraper-based
/// HTML extractor.
pub struct StandardConverter;

impl DocumentConverter for StandardConverter {
    fn convert_markdown(&self, name: &str, text: &str) -> Result<ConvertedDocument> {
        let blocks = parse_markdown(text);
        if blocks.is_empty() {
            return Err(anyhow!("no convertible content in '{}'", name));
        }
        Ok(ConvertedDocument {
            name: name.to_string(),
            blocks,
        })
    }

    fn convert_html(&self, name: &str, html: &str) -> Result<ConvertedDocument> {
        let blocks = parse_html(html)?;
        if blocks.is_empty() {
            return Err(anyhow!("no convertible content in '{}'", name));
        }
        Ok(ConvertedDocument {
            name: name.to_string(),
            blocks,
        })
    }
}

/// Line-oriented markdown parsing: front matter is skipped, fenced code
/// is kept verbatim, headings split sections, blank lines split
/// paragraphs.
fn parse_markdown(text: &str) -> Vec<Block> {
    let mut lines = text.lines().peekable();

    // Front matter is rendering metadata, not content
    if lines.peek() == Some(&"---") {
        let mut consumed: Vec<&str> = vec![lines.next().unwrap_or_default()];
        let mut closed = false;
        for line in lines.by_ref() {
            consumed.push(line);
            if line == "---" {
                closed = true;
                break;
            }
        }
        if !closed {
            // Not front matter after all; reparse the consumed lines
            return parse_markdown_body(consumed.into_iter());
        }
    }

    parse_markdown_body(lines)
}

fn parse_markdown_body<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut code: Option<(String, Vec<String>)> = None;

    for line in lines {
        push_markdown_line(line, &mut blocks, &mut paragraph, &mut code);
    }
    flush_paragraph(&mut blocks, &mut paragraph);
    flush_code(&mut blocks, &mut code);

    blocks
}

fn push_markdown_line(
    line: &str,
    blocks: &mut Vec<Block>,
    paragraph: &mut Vec<String>,
    code: &mut Option<(String, Vec<String>)>,
) {
    if let Some((language, body)) = code {
        if line.trim_end() == "```" {
            blocks.push(Block::Code {
                language: language.clone(),
                text: body.join("\n"),
            });
            *code = None;
        } else {
            body.push(line.to_string());
        }
        return;
    }

    if let Some(fence) = line.strip_prefix("```") {
        flush_paragraph(blocks, paragraph);
        *code = Some((fence.trim().to_string(), Vec::new()));
        return;
    }

    if let Some((level, text)) = parse_heading(line) {
        flush_paragraph(blocks, paragraph);
        blocks.push(Block::Heading { level, text });
        return;
    }

    if line.trim().is_empty() {
        flush_paragraph(blocks, paragraph);
    } else {
        paragraph.push(line.trim().to_string());
    }
}

fn parse_heading(line: &str) -> Option<(u8, String)> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    let text = rest.strip_prefix(' ')?;
    Some((hashes as u8, text.trim().to_string()))
}

fn flush_paragraph(blocks: &mut Vec<Block>, paragraph: &mut Vec<String>) {
    if !paragraph.is_empty() {
        blocks.push(Block::Paragraph {
            text: paragraph.join("\n"),
        });
        paragraph.clear();
    }
}

fn flush_code(blocks: &mut Vec<Block>, code: &mut Option<(String, Vec<String>)>) {
    // Unterminated fence at end of input still yields its content
    if let Some((language, body)) = code.take() {
        blocks.push(Block::Code {
            language,
            text: body.join("\n"),
        });
    }
}

/// Extract headings, paragraphs, list items, and pre blocks from HTML in
/// document order.
fn parse_html(html: &str) -> Result<Vec<Block>> {
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse("h1, h2, h3, h4, h5, h6, p, li, pre")
        .map_err(|e| anyhow!("selector parse failed: {}", e))?;

    let mut blocks = Vec::new();

    for element in document.select(&selector) {
        let text = element.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }

        let tag = element.value().name();
        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = tag.as_bytes()[1] - b'0';
                blocks.push(Block::Heading { level, text });
            }
            "pre" => blocks.push(Block::Code {
                language: String::new(),
                text,
            }),
            _ => blocks.push(Block::Paragraph { text }),
        }
    }

    Ok(blocks)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_headings_paragraphs_and_code() {
        let converter = StandardConverter;
        let doc = converter
            .convert_markdown(
                "note.md",
                "# Title\n\nFirst paragraph\nstill first.\n\n```rust\nfn main() {}\n```\n\nSecond paragraph.\n",
            )
            .unwrap();

        assert_eq!(
            doc.blocks,
            vec![
                Block::Heading {
                    level: 1,
                    text: "Title".to_string()
                },
                Block::Paragraph {
                    text: "First paragraph\nstill first.".to_string()
                },
                Block::Code {
                    language: "rust".to_string(),
                    text: "fn main() {}".to_string()
                },
                Block::Paragraph {
                    text: "Second paragraph.".to_string()
                },
            ]
        );
    }

    #[test]
    fn front_matter_is_skipped() {
        let converter = StandardConverter;
        let doc = converter
            .convert_markdown("x.md", "---\nid: abc\nversion: 1\n---\n\n# Body\n\ntext\n")
            .unwrap();

        assert_eq!(
            doc.blocks[0],
            Block::Heading {
                level: 1,
                text: "Body".to_string()
            }
        );
        assert!(!doc.export_text().contains("id: abc"));
    }

    #[test]
    fn empty_input_is_an_error() {
        let converter = StandardConverter;
        assert!(converter.convert_markdown("empty.md", "\n\n\n").is_err());
    }

    #[test]
    fn html_extraction_preserves_order() {
        let converter = StandardConverter;
        let doc = converter
            .convert_html(
                "page",
                "<html><body><h1>Top</h1><p>One</p><h2>Sub</h2><p>Two</p></body></html>",
            )
            .unwrap();

        assert_eq!(
            doc.blocks,
            vec![
                Block::Heading {
                    level: 1,
                    text: "Top".to_string()
                },
                Block::Paragraph {
                    text: "One".to_string()
                },
                Block::Heading {
                    level: 2,
                    text: "Sub".to_string()
                },
                Block::Paragraph {
                    text: "Two".to_string()
                },
            ]
        );
    }

    #[test]
    fn exports_are_deterministic() {
        let converter = StandardConverter;
        let doc = converter
            .convert_markdown("note.md", "# A\n\nbody & <tag>\n")
            .unwrap();

        assert_eq!(doc.export_markdown(), "# A\n\nbody & <tag>");
        assert_eq!(doc.export_text(), "A\n\nbody & <tag>");
        assert!(doc.export_html().contains("<p>body &amp; &lt;tag&gt;</p>"));
        assert!(doc.export_doctags().contains("<heading_1>A</heading_1>"));
        let json = doc.to_json().unwrap();
        assert_eq!(json, doc.to_json().unwrap());
    }
}
