// Prompt construction for the two generative stages.
// Built-in templates can be replaced by files (see `PromptTemplates`), the
// placeholders are filled in with plain string replacement.

use crate::core::pipeline::{PipelineError, SlideContent};
use std::path::Path;

const NOTES_TEMPLATE: &str = "Write speaker notes (a script to be read aloud) for the slide deck below.

Output rules:
- Start every slide with a line of the form `@@ Slide <number>`.
- Do not use `#` headings.
- No preamble, closing summary or commentary; only the script.

Output format (strict):
@@ Slide 1
What to say for slide 1, addressed to the viewer,
with background, concrete examples and extra detail.

@@ Slide 2
What to say for slide 2.

(continue for every slide)

Tone:
- Easy to follow for a teenager or a first-year professional.
- Natural spoken language that can be read out as-is in a video.
- About one to two minutes per slide.

---

Slide content:
{slides}";

const BLOG_TEMPLATE: &str = "You are an editor who combines a video, its slides and its script into one multimedia article.
Write a blog article from the input below.

**Input**
* **Video URL:** [paste the video URL here]
* **Slide URL:** {slide_url}
* **Script:**
    \"\"\"
{script}
    \"\"\"

---

**Rules**
1. **Order:** open with the video, support it with the slides, then give the full text.
2. **Audience:** web readers who prefer watching as well as those who prefer reading.
3. **Links:** the video and slides follow the script; introduce each so they point to one another.

**Output format**
## Title ideas
(three suggestions)

## 1. AI summary
* **Topic:** [keywords]
* **Summary:** (140 characters max)

## 2. Watch the video (recommended)
**[Play the video]**

## 3. Key points on slides
**[Open the slides]**

## 4. Full write-up
(the script reworked for a blog)

## 5. Deeper analysis

## 6. Editor's note
";

/// Optional template overrides loaded from disk at startup.
#[derive(Debug, Clone, Default)]
pub struct PromptTemplates {
    /// Must contain `{slides}`.
    pub notes: Option<String>,
    /// May contain `{slide_url}` and `{script}`.
    pub blog: Option<String>,
}

/// What the blog stage could find out about the script document.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptInput {
    Text(String),
    /// The document exists in the ledger but could not be read.
    Unreadable { document_id: String, reason: String },
    Missing,
}

impl PromptTemplates {
    /// Reads the override files that are configured. A notes template without
    /// `{slides}` would never see the deck, so it is rejected.
    pub async fn load(notes: Option<&Path>, blog: Option<&Path>) -> Result<Self, PipelineError> {
        let mut errors = Vec::new();
        let notes = read_template(notes, &mut errors).await;
        let blog = read_template(blog, &mut errors).await;

        if let Some(template) = &notes {
            if !template.contains("{slides}") {
                errors.push("notes prompt template has no {slides} placeholder".to_string());
            }
        }

        if errors.is_empty() {
            Ok(Self { notes, blog })
        } else {
            Err(PipelineError::ConfigInvalid(errors))
        }
    }

    pub fn speaker_notes(&self, slides: &[SlideContent]) -> String {
        let template = self.notes.as_deref().unwrap_or(NOTES_TEMPLATE);
        template.replace("{slides}", &slide_digest(slides))
    }

    pub fn blog(&self, slide_url: Option<&str>, script: &ScriptInput) -> String {
        let template = self.blog.as_deref().unwrap_or(BLOG_TEMPLATE);

        let slide_url = slide_url.unwrap_or("[no slide URL available]");
        let script = match script {
            ScriptInput::Text(text) => text.clone(),
            ScriptInput::Unreadable {
                document_id,
                reason,
            } => format!(
                "[script document {} could not be read: {}]",
                document_id, reason
            ),
            ScriptInput::Missing => "[no script document available]".to_string(),
        };

        template
            .replace("{slide_url}", slide_url)
            .replace("{script}", &script)
    }
}

async fn read_template(path: Option<&Path>, errors: &mut Vec<String>) -> Option<String> {
    let path = path?;
    match tokio::fs::read_to_string(path).await {
        Ok(text) => {
            tracing::info!(path = %path.display(), "Loaded prompt template");
            Some(text)
        }
        Err(e) => {
            errors.push(format!("cannot read prompt template {}: {}", path.display(), e));
            None
        }
    }
}

/// Flattens a deck into the text block the model sees.
pub fn slide_digest(slides: &[SlideContent]) -> String {
    let mut out = String::new();

    for (index, slide) in slides.iter().enumerate() {
        out.push_str(&format!("\n=== Slide {} ===\n", index + 1));

        for text in &slide.shape_texts {
            if !text.trim().is_empty() {
                out.push_str(text);
                out.push('\n');
            }
        }

        for table in &slide.tables {
            for row in table {
                for cell in row {
                    if !cell.trim().is_empty() {
                        out.push_str(cell);
                        out.push(' ');
                    }
                }
                out.push('\n');
            }
        }

        out.push('\n');
    }

    out
}
