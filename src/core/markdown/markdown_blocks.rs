// =============================================================================
// MARKDOWN BLOCKS
// =============================================================================
//
// Turns the Markdown the model writes into a small block model that a rich
// document store can render: headings 1-4, bullets, numbered items,
// paragraphs and blank lines, each with bold/italic spans.
//
// Span offsets are UTF-16 code units into the block's *output* text, which is
// what document APIs index by. They are computed in a single left-to-right
// pass while the markers are being removed, so an offset never refers to the
// source string.

/// Kind of a rendered block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Heading level 1..=4.
    Heading(u8),
    Bullet,
    Numbered,
    Paragraph,
    Blank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineStyle {
    Bold,
    Italic,
}

/// A styled range `[start, end)` in UTF-16 units of the block text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineSpan {
    pub start: usize,
    pub end: usize,
    pub style: InlineStyle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// Text with all Markdown markers removed.
    pub text: String,
    pub spans: Vec<InlineSpan>,
}

/// Parses Markdown line by line into blocks.
pub fn parse_markdown(source: &str) -> Vec<Block> {
    source.lines().map(parse_line).collect()
}

/// Plain text of all blocks, one line each, as a document body holds it.
pub fn joined_text(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        out.push_str(&block.text);
        out.push('\n');
    }
    out
}

/// UTF-16 length of a string.
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

fn parse_line(line: &str) -> Block {
    if line.trim().is_empty() {
        return Block {
            kind: BlockKind::Blank,
            text: String::new(),
            spans: Vec::new(),
        };
    }

    let (kind, content) = classify(line);
    let (text, spans) = parse_inline(content);
    Block { kind, text, spans }
}

fn classify(line: &str) -> (BlockKind, &str) {
    for level in (1..=4u8).rev() {
        let prefix = format!("{} ", "#".repeat(level as usize));
        if let Some(rest) = line.strip_prefix(prefix.as_str()) {
            return (BlockKind::Heading(level), rest);
        }
    }

    let trimmed = line.trim_start();
    for marker in ['-', '*'] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            if rest.starts_with(char::is_whitespace) {
                return (BlockKind::Bullet, rest.trim_start());
            }
        }
    }

    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(rest) = trimmed[digits..].strip_prefix(". ") {
            return (BlockKind::Numbered, rest.trim_start());
        }
    }

    (BlockKind::Paragraph, line)
}

/// Strips `**bold**` and `*italic*` markers, returning the plain text and the
/// spans in output coordinates. Unmatched markers are kept literally.
pub fn parse_inline(source: &str) -> (String, Vec<InlineSpan>) {
    let mut text = String::with_capacity(source.len());
    let mut spans = Vec::new();
    let mut offset = 0usize;
    let mut rest = source;

    while !rest.is_empty() {
        if let Some((marker, style)) = opening_marker(rest) {
            let body = &rest[marker.len()..];
            if let Some(close) = body.find(marker) {
                let inner = &body[..close];
                if is_emphasis_body(inner) {
                    let width = utf16_len(inner);
                    spans.push(InlineSpan {
                        start: offset,
                        end: offset + width,
                        style,
                    });
                    text.push_str(inner);
                    offset += width;
                    rest = &body[close + marker.len()..];
                    continue;
                }
            }
        }

        let Some(ch) = rest.chars().next() else {
            break;
        };
        text.push(ch);
        offset += ch.len_utf16();
        rest = &rest[ch.len_utf8()..];
    }

    (text, spans)
}

fn opening_marker(rest: &str) -> Option<(&'static str, InlineStyle)> {
    if rest.starts_with("**") {
        Some(("**", InlineStyle::Bold))
    } else if rest.starts_with('*') {
        Some(("*", InlineStyle::Italic))
    } else {
        None
    }
}

fn is_emphasis_body(inner: &str) -> bool {
    !inner.is_empty()
        && !inner.starts_with(char::is_whitespace)
        && !inner.ends_with(char::is_whitespace)
        && !inner.contains('*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_block_kinds() {
        let blocks = parse_markdown("# Title\n## Sub\n#### Deep\n- item\n* star\n3. third\n\nplain");
        let kinds: Vec<BlockKind> = blocks.iter().map(|b| b.kind).collect();

        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading(1),
                BlockKind::Heading(2),
                BlockKind::Heading(4),
                BlockKind::Bullet,
                BlockKind::Bullet,
                BlockKind::Numbered,
                BlockKind::Blank,
                BlockKind::Paragraph,
            ]
        );
        assert_eq!(blocks[0].text, "Title");
        assert_eq!(blocks[3].text, "item");
        assert_eq!(blocks[5].text, "third");
    }

    #[test]
    fn bold_is_not_mistaken_for_a_bullet() {
        let blocks = parse_markdown("**Topic:** rust");
        assert_eq!(blocks[0].kind, BlockKind::Paragraph);
        assert_eq!(blocks[0].text, "Topic: rust");
        assert_eq!(
            blocks[0].spans,
            vec![InlineSpan {
                start: 0,
                end: 6,
                style: InlineStyle::Bold
            }]
        );
    }

    #[test]
    fn later_spans_account_for_removed_markers() {
        let (text, spans) = parse_inline("a **bb** c *dd* e");

        assert_eq!(text, "a bb c dd e");
        assert_eq!(&text[spans[0].start..spans[0].end], "bb");
        assert_eq!(spans[0].style, InlineStyle::Bold);
        assert_eq!(&text[spans[1].start..spans[1].end], "dd");
        assert_eq!(spans[1].style, InlineStyle::Italic);
    }

    #[test]
    fn offsets_are_utf16_units() {
        let (text, spans) = parse_inline("動画 **スライド** 😀 *x*");

        assert_eq!(text, "動画 スライド 😀 x");
        assert_eq!(spans[0].start, 3);
        assert_eq!(spans[0].end, 7);
        // The emoji is two UTF-16 units wide.
        assert_eq!(spans[1].start, 11);
        assert_eq!(spans[1].end, 12);
    }

    #[test]
    fn unmatched_markers_stay_literal() {
        let (text, spans) = parse_inline("2 * 3 = 6 and **open");
        assert_eq!(text, "2 * 3 = 6 and **open");
        assert!(spans.is_empty());
    }

    #[test]
    fn joined_text_is_one_line_per_block() {
        let blocks = parse_markdown("# A\n\nb");
        assert_eq!(joined_text(&blocks), "A\n\nb\n");
    }
}
