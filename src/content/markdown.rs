use pulldown_cmark::{Event, Options, Parser, html};
use tracing::warn;

/// Inputs larger than this are not parsed.
pub const MAX_MARKDOWN_BYTES: usize = 512 * 1024;

/// GitHub-flavoured markdown to HTML, single newlines kept as `<br>`.
///
/// Oversized input degrades to the text with newlines turned into `<br>`.
pub fn markdown_to_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if text.len() > MAX_MARKDOWN_BYTES {
        warn!(
            target: "uiflow::content",
            bytes = text.len(),
            limit = MAX_MARKDOWN_BYTES,
            "Markdown too large, rendering as plain text"
        );
        return text.replace('\n', "<br>");
    }

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(text, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_and_breaks() {
        let html = markdown_to_html("# Title\nline one\nline two");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("line one<br />"));
    }

    #[test]
    fn test_gfm_extensions() {
        let html = markdown_to_html("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n\n- [x] done");
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("checkbox"));
    }

    #[test]
    fn test_oversized_input_degrades() {
        let big = format!("{}\nend", "a".repeat(MAX_MARKDOWN_BYTES));
        let out = markdown_to_html(&big);
        assert!(out.ends_with("<br>end"));
        assert!(!out.contains("<p>"));
    }

    #[test]
    fn test_empty() {
        assert_eq!(markdown_to_html(""), "");
    }
}
