use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct Hypothesis {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    partial: Option<String>,
}

/// Pull the recognized text out of a JSON hypothesis.
///
/// Uses `text`, falling back to `partial` when `text` is absent or empty.
/// Anything unparseable yields an empty string.
pub fn extract_text(raw: &str) -> String {
    let Ok(hypothesis) = serde_json::from_str::<Hypothesis>(raw) else {
        return String::new();
    };
    match hypothesis.text {
        Some(text) if !text.is_empty() => text,
        _ => hypothesis.partial.unwrap_or_default(),
    }
}

/// True for a JSON object carrying a `partial` key.
pub(crate) fn is_partial(raw: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|value| value.as_object().map(|obj| obj.contains_key("partial")))
        .unwrap_or(false)
}
