//! Content descriptors rendered for display by actions.
//!
//! Text mode substitutes `{{ }}` placeholders. Function mode runs a user
//! snippet with the execution context as its only argument; the snippet
//! returns `{type, content}` and markdown output is converted to HTML.

mod markdown;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::expression::{UserCode, Value, compile_str};
use crate::runtime::ExecutionContext;

pub use markdown::{MAX_MARKDOWN_BYTES, markdown_to_html};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    #[default]
    Text,
    Function,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentConfig {
    pub content_type: ContentMode,
    pub content: String,
    pub content_function: String,
}

impl ContentConfig {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn function(code: impl Into<String>) -> Self {
        Self {
            content_type: ContentMode::Function,
            content_function: code.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentType {
    Html,
    Md,
    Text,
}

impl ContentType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "HTML" => Some(Self::Html),
            "MD" => Some(Self::Md),
            "TEXT" => Some(Self::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContentResult {
    #[serde(rename = "type")]
    pub kind: ContentType,
    pub content: String,
}

impl ContentResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: ContentType::Text,
            content: content.into(),
        }
    }

    pub fn html(content: impl Into<String>) -> Self {
        Self {
            kind: ContentType::Html,
            content: content.into(),
        }
    }

    pub fn is_html(&self) -> bool {
        self.kind == ContentType::Html
    }

    /// Content suitable for a plain-text sink.
    pub fn plain_text(&self) -> String {
        match self.kind {
            ContentType::Html => strip_html(&self.content),
            _ => self.content.clone(),
        }
    }
}

/// Resolve `config` against `ctx`. Never fails: function errors come back as
/// a `TEXT` result describing the failure.
pub fn render(config: &ContentConfig, ctx: &ExecutionContext) -> ContentResult {
    if config.content_type == ContentMode::Function && !config.content_function.trim().is_empty() {
        return match run_function(&config.content_function, ctx) {
            Ok(result) => result,
            Err(reason) => {
                warn!(target: "uiflow::content", %reason, "Content function failed");
                ContentResult::text(format!("Function execution failed: {reason}"))
            }
        };
    }

    let content = if config.content.contains("{{") {
        compile_str(&config.content, ctx)
    } else {
        config.content.clone()
    };
    ContentResult::text(content)
}

fn run_function(code: &str, ctx: &ExecutionContext) -> Result<ContentResult, String> {
    let snippet = UserCode::parse(code, &["context"], None).map_err(|e| e.to_string())?;
    debug!(target: "uiflow::content", shape = ?snippet.shape(), "Running content function");
    let output = snippet
        .invoke(vec![Value::from_json(&ctx.data())])
        .map_err(|e| e.to_string())?;
    let output = output.try_to_json().map_err(|e| e.to_string())?.unwrap_or(Json::Null);
    let result = validate(&output)?;
    Ok(match result.kind {
        ContentType::Md => ContentResult::html(markdown_to_html(&result.content)),
        _ => result,
    })
}

fn validate(output: &Json) -> Result<ContentResult, String> {
    let Json::Object(map) = output else {
        return Err(
            "function must return an object: {type: \"HTML\"|\"MD\"|\"TEXT\", content: \"...\"}".into(),
        );
    };
    let raw_type = map.get("type").and_then(Json::as_str).unwrap_or_default();
    let kind = ContentType::parse(raw_type).ok_or_else(|| {
        format!("invalid content type \"{raw_type}\", expected one of HTML, MD, TEXT")
    })?;
    let content = match map.get("content") {
        None | Some(Json::Null) => return Err("content must not be empty".into()),
        Some(Json::String(s)) => s.clone(),
        Some(other) => {
            return Err(format!(
                "content must be a string, got {}",
                json_type_name(other)
            ));
        }
    };
    Ok(ContentResult { kind, content })
}

fn json_type_name(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) | Json::Object(_) => "object",
    }
}

/// Remove tags and decode the common entities.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorResult;
    use crate::testing::test_context;
    use serde_json::json;

    #[test]
    fn test_text_mode_compiles_placeholders() {
        let mut ctx = test_context("onClick", json!({"name": "Ada"}));
        ctx.executors.push(ExecutorResult::ok("echo", json!({"n": 3})));
        let out = render(
            &ContentConfig::text("Hi {{$context.trigger.name}}, n={{$context.executors[0].data.n}}"),
            &ctx,
        );
        assert_eq!(out, ContentResult::text("Hi Ada, n=3"));
    }

    #[test]
    fn test_text_mode_is_literal_without_placeholders() {
        let ctx = test_context("onClick", json!({}));
        let out = render(&ContentConfig::text("<b>as is</b>"), &ctx);
        assert_eq!(out.kind, ContentType::Text);
        assert_eq!(out.content, "<b>as is</b>");
    }

    #[test]
    fn test_blank_function_falls_back_to_text() {
        let ctx = test_context("onClick", json!({}));
        let config = ContentConfig {
            content_type: ContentMode::Function,
            content: "fallback".into(),
            content_function: "   ".into(),
        };
        assert_eq!(render(&config, &ctx), ContentResult::text("fallback"));
    }

    #[test]
    fn test_function_shapes() {
        let ctx = test_context("onClick", json!({"v": 2}));
        for code in [
            "(context) => ({ type: 'TEXT', content: 'v=' + context.trigger.v })",
            "context => ({ type: 'TEXT', content: 'v=' + context.trigger.v })",
            "function render(context) { return { type: 'TEXT', content: 'v=' + context.trigger.v } }",
            "function (context) { return { type: 'TEXT', content: 'v=' + context.trigger.v } }",
            "return { type: 'TEXT', content: 'v=' + context.trigger.v }",
        ] {
            assert_eq!(render(&ContentConfig::function(code), &ctx), ContentResult::text("v=2"), "{code}");
        }
    }

    #[test]
    fn test_markdown_result_becomes_html() {
        let ctx = test_context("onClick", json!({}));
        let out = render(
            &ContentConfig::function("() => ({ type: 'MD', content: '# h' })"),
            &ctx,
        );
        assert_eq!(out.kind, ContentType::Html);
        assert!(out.content.contains("<h1>"), "{}", out.content);
    }

    #[test]
    fn test_invalid_function_output_is_reported() {
        let ctx = test_context("onClick", json!({}));
        let cases = [
            ("() => 42", "must return an object"),
            ("() => ({ type: 'PDF', content: 'x' })", "invalid content type"),
            ("() => ({ type: 'TEXT' })", "must not be empty"),
            ("() => ({ type: 'TEXT', content: 5 })", "must be a string"),
            ("() => { throw new Error('boom') }", "boom"),
            ("(((", "syntax error"),
        ];
        for (code, needle) in cases {
            let out = render(&ContentConfig::function(code), &ctx);
            assert_eq!(out.kind, ContentType::Text);
            assert!(out.content.starts_with("Function execution failed: "), "{}", out.content);
            assert!(out.content.contains(needle), "{code}: {}", out.content);
        }
    }

    #[test]
    fn test_runaway_nesting_is_reported() {
        let ctx = test_context("onClick", json!({}));
        let code = "() => { let a = []; for (let i = 0; i < 20000; i++) { a = [a] } \
                    return { type: 'TEXT', content: JSON.stringify(a) } }";
        let out = render(&ContentConfig::function(code), &ctx);
        assert_eq!(out.kind, ContentType::Text);
        assert!(out.content.starts_with("Function execution failed: "), "{}", out.content);
        assert!(out.content.contains("nested deeper"), "{}", out.content);

        let parens = format!("() => {}1{}", "(".repeat(500), ")".repeat(500));
        let out = render(&ContentConfig::function(&parens), &ctx);
        assert!(out.content.contains("nested too deeply"), "{}", out.content);
    }

    #[test]
    fn test_function_sees_no_ambient_globals() {
        let ctx = test_context("onClick", json!({}));
        let out = render(
            &ContentConfig::function("() => ({ type: 'TEXT', content: typeof $context + typeof window })"),
            &ctx,
        );
        assert_eq!(out.content, "undefinedundefined");
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<p>a &amp; <b>b</b></p>"), "a & b");
        assert_eq!(strip_html("plain"), "plain");
        assert_eq!(ContentResult::html("<i>x</i>").plain_text(), "x");
    }

    #[test]
    fn test_config_serde_defaults() {
        let c: ContentConfig = serde_json::from_value(json!({"content": "x"})).unwrap();
        assert_eq!(c.content_type, ContentMode::Text);
        let c: ContentConfig =
            serde_json::from_value(json!({"contentType": "function", "contentFunction": "f"})).unwrap();
        assert_eq!(c.content_type, ContentMode::Function);
        assert_eq!(
            serde_json::to_value(ContentResult::html("a")).unwrap(),
            json!({"type": "HTML", "content": "a"})
        );
    }
}
