// Splits a generated script into per-slide speaker notes.
//
// A line starting with `@@ Slide <n>` opens section n. Everything up to the
// next header belongs to it. Anything after the number on the header line is
// ignored, text before the first header is dropped.

const HEADER: &str = "@@ Slide";

/// A note for one slide, numbered from 1 as in the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSection {
    pub slide_number: usize,
    pub text: String,
}

impl NoteSection {
    /// Zero-based slide index, or `None` for the nonsensical slide 0.
    pub fn slide_index(&self) -> Option<usize> {
        self.slide_number.checked_sub(1)
    }
}

/// Parses every section with a non-empty body, in script order.
pub fn parse_note_sections(script: &str) -> Vec<NoteSection> {
    let mut sections = Vec::new();
    let mut current: Option<(usize, Vec<&str>)> = None;

    for line in script.lines() {
        if let Some(number) = header_number(line) {
            if let Some((n, body)) = current.take() {
                push_section(&mut sections, n, &body);
            }
            current = Some((number, Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }

    if let Some((n, body)) = current {
        push_section(&mut sections, n, &body);
    }

    sections
}

fn header_number(line: &str) -> Option<usize> {
    let rest = line.trim_start().strip_prefix(HEADER)?;
    let rest = rest.trim_start();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn push_section(sections: &mut Vec<NoteSection>, slide_number: usize, body: &[&str]) {
    let text = body.join("\n").trim().to_string();
    if !text.is_empty() {
        sections.push(NoteSection { slide_number, text });
    }
}
