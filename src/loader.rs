//! Format-specific document loaders.
//!
//! Each [`Loader`] variant turns one file into a [`Document`]. The loader
//! is chosen by an explicit [`DocumentFormat`] hint when one is given,
//! otherwise by file extension:
//!
//! | Extension | Loader |
//! |-----------|--------|
//! | `.md`, `.markdown` | [`MarkdownLoader`] |
//! | `.json` | [`StructuredLoader`] |
//! | anything else | [`PlainTextLoader`] |

use std::path::Path;

use crate::error::{KbError, Result};
use crate::models::{Document, DocumentFormat};

/// Reads a file into a [`Document`].
pub trait Loader: Send + Sync {
    fn format(&self) -> DocumentFormat;

    fn load(&self, path: &Path) -> Result<Document>;
}

/// Loads UTF-8 text verbatim.
pub struct PlainTextLoader;

impl Loader for PlainTextLoader {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::PlainText
    }

    fn load(&self, path: &Path) -> Result<Document> {
        let text = read_text(path)?;
        Ok(Document::new(source_id(path), text).with_format(self.format()))
    }
}

/// Loads markdown and reduces it to prose.
///
/// Heading, emphasis, blockquote, and list-bullet markers, inline code
/// backticks, code fences, and link/image syntax are removed; link text
/// is kept. Runs of blank lines collapse to one.
pub struct MarkdownLoader;

impl Loader for MarkdownLoader {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Markdown
    }

    fn load(&self, path: &Path) -> Result<Document> {
        let raw = read_text(path)?;
        Ok(Document::new(source_id(path), strip_markdown(&raw)).with_format(self.format()))
    }
}

/// Loads a JSON record. The file must parse; its text is indexed as-is.
pub struct StructuredLoader;

impl Loader for StructuredLoader {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Structured
    }

    fn load(&self, path: &Path) -> Result<Document> {
        let text = read_text(path)?;
        serde_json::from_str::<serde_json::Value>(&text)
            .map_err(|e| KbError::load(path, format!("invalid JSON: {}", e)))?;
        Ok(Document::new(source_id(path), text).with_format(self.format()))
    }
}

/// Detect a document's format from its extension.
pub fn detect_format(path: &Path) -> DocumentFormat {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "md" | "markdown" => DocumentFormat::Markdown,
        "json" => DocumentFormat::Structured,
        _ => DocumentFormat::PlainText,
    }
}

/// Return the loader for `format`.
pub fn loader_for(format: DocumentFormat) -> &'static dyn Loader {
    match format {
        DocumentFormat::PlainText => &PlainTextLoader,
        DocumentFormat::Markdown => &MarkdownLoader,
        DocumentFormat::Structured => &StructuredLoader,
    }
}

/// Load `path`, using `hint` if given and the extension otherwise.
pub fn load_document(path: &Path, hint: Option<DocumentFormat>) -> Result<Document> {
    let format = hint.unwrap_or_else(|| detect_format(path));
    loader_for(format).load(path)
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| KbError::load(path, e))?;
    String::from_utf8(bytes).map_err(|_| KbError::load(path, "file is not valid UTF-8"))
}

fn source_id(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Reduce markdown to plain prose.
pub fn strip_markdown(src: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut in_fence = false;

    for line in src.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            lines.push(line.to_string());
            continue;
        }
        if is_rule(trimmed) {
            continue;
        }

        let mut body = trimmed;
        while let Some(rest) = body.strip_prefix('>') {
            body = rest.trim_start();
        }
        let hashes = body.chars().take_while(|c| *c == '#').count();
        if hashes > 0 && hashes <= 6 && body[hashes..].starts_with(' ') {
            body = body[hashes..].trim_start();
        }
        for bullet in ["- ", "* ", "+ "] {
            if let Some(rest) = body.strip_prefix(bullet) {
                body = rest;
                break;
            }
        }

        lines.push(strip_inline(body));
    }

    let mut out = String::new();
    let mut blank_run = false;
    for line in lines {
        if line.trim().is_empty() {
            if !blank_run && !out.is_empty() {
                out.push('\n');
            }
            blank_run = true;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line.trim_end());
        blank_run = false;
    }
    out.truncate(out.trim_end().len());
    out
}

fn is_rule(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && (compact.chars().all(|c| c == '-')
            || compact.chars().all(|c| c == '*')
            || compact.chars().all(|c| c == '_'))
}

/// Drop emphasis markers, backticks and link/image syntax from one line.
fn strip_inline(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '!' if chars.get(i + 1) == Some(&'[') => {
                i += 1;
            }
            '[' => {
                if let Some((text, next)) = parse_link(&chars, i) {
                    out.push_str(&strip_inline(&text));
                    i = next;
                    continue;
                }
                out.push('[');
                i += 1;
            }
            '*' | '`' => {
                i += 1;
            }
            '_' if is_emphasis_underscore(&chars, i) => {
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Parse `[text](target)` starting at `open`; returns the text and the
/// index just past the closing parenthesis.
fn parse_link(chars: &[char], open: usize) -> Option<(String, usize)> {
    let close = open + chars[open..].iter().position(|c| *c == ']')?;
    if chars.get(close + 1) != Some(&'(') {
        return None;
    }
    let end = close + 1 + chars[close + 1..].iter().position(|c| *c == ')')?;
    let text: String = chars[open + 1..close].iter().collect();
    Some((text, end + 1))
}

/// `_` counts as emphasis only at a word edge, so `snake_case` survives.
fn is_emphasis_underscore(chars: &[char], i: usize) -> bool {
    let before = i.checked_sub(1).map(|j| chars[j]);
    let after = chars.get(i + 1).copied();
    let word = |c: Option<char>| c.map(|c| c.is_alphanumeric()).unwrap_or(false);
    !(word(before) && word(after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("a/spec.md")), DocumentFormat::Markdown);
        assert_eq!(detect_format(Path::new("README.MARKDOWN")), DocumentFormat::Markdown);
        assert_eq!(detect_format(Path::new("ui.json")), DocumentFormat::Structured);
        assert_eq!(detect_format(Path::new("notes.txt")), DocumentFormat::PlainText);
        assert_eq!(detect_format(Path::new("Makefile")), DocumentFormat::PlainText);
    }

    #[test]
    fn test_strip_markdown() {
        let md = "# Checkout\n\nThe **discount** code `SAVE15` gives _15%_ off.\n\n\n\n\
                  > See [pricing rules](https://x.test/rules) and ![logo](logo.png).\n\n\
                  - shipping_method is required\n---\n```js\nconst a = 1;\n```\n";
        let text = strip_markdown(md);
        assert_eq!(
            text,
            "Checkout\n\nThe discount code SAVE15 gives 15% off.\n\n\
             See pricing rules and logo.\n\nshipping_method is required\nconst a = 1;"
        );
    }

    #[test]
    fn test_plain_text_loaded_verbatim() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        fs::write(&path, "  # not a heading\n**raw**").unwrap();
        let doc = load_document(&path, None).unwrap();
        assert_eq!(doc.text, "  # not a heading\n**raw**");
        assert_eq!(doc.format, Some(DocumentFormat::PlainText));
        assert!(doc.source.ends_with("notes.txt"));
    }

    #[test]
    fn test_hint_overrides_extension() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("guide.txt");
        fs::write(&path, "## Title").unwrap();
        let doc = load_document(&path, Some(DocumentFormat::Markdown)).unwrap();
        assert_eq!(doc.text, "Title");
    }

    #[test]
    fn test_structured_rejects_invalid_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ui.json");
        fs::write(&path, "{ \"button\": ").unwrap();
        let err = load_document(&path, None).unwrap_err();
        assert!(matches!(err, KbError::Load { .. }));
    }

    #[test]
    fn test_structured_keeps_raw_text() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ui.json");
        let raw = "{\n  \"pay_button\": \"#pay-now\"\n}";
        fs::write(&path, raw).unwrap();
        assert_eq!(load_document(&path, None).unwrap().text, raw);
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = load_document(Path::new("/nonexistent/qa/file.md"), None).unwrap_err();
        assert!(matches!(err, KbError::Load { .. }));
    }

    #[test]
    fn test_non_utf8_is_load_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.txt");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let err = load_document(&path, None).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }
}
