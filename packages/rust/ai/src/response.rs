//! Cleanup of model output before it is trusted.
//!
//! Models frequently wrap answers in Markdown code fences or add a sentence
//! before the JSON they were asked for. These helpers recover the payload.

use serde::de::DeserializeOwned;

use crate::AiError;

/// Remove a surrounding Markdown code fence (```` ```json ```` / ```` ```html ````).
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `html`, ...) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// The outermost `{ ... }` span of `text`, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let body = strip_code_fences(text);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

/// Parse the JSON object embedded in a model response.
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, AiError> {
    let json = extract_json_object(text)
        .ok_or_else(|| AiError::Malformed("response contains no JSON object".into()))?;
    serde_json::from_str(json).map_err(|e| AiError::Malformed(format!("invalid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_with_info_string() {
        let text = "```html\n<p>Hello</p>\n```";
        assert_eq!(strip_code_fences(text), "<p>Hello</p>");
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(strip_code_fences("  <p>Hi</p>\n"), "<p>Hi</p>");
    }

    #[test]
    fn unterminated_fence() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn extracts_json_from_chatter() {
        let text = "Sure! Here is the outline:\n```json\n{\"chapters\": [{\"title\": \"A\"}]}\n```\nEnjoy.";
        assert_eq!(
            extract_json_object(text),
            Some("{\"chapters\": [{\"title\": \"A\"}]}")
        );
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn parse_reports_malformed() {
        #[derive(serde::Deserialize)]
        struct Shape {
            #[allow(dead_code)]
            chapters: Vec<String>,
        }
        let err = parse_json_response::<Shape>("{\"chapters\": 5}").err().unwrap();
        assert!(matches!(err, AiError::Malformed(_)));
        let err = parse_json_response::<Shape>("nothing").err().unwrap();
        assert!(matches!(err, AiError::Malformed(_)));
    }
}
