use serde::Deserialize;
use tracing::debug;

/// Instructions sent as the system prompt when structured answers are enabled
pub const STRUCTURED_SYSTEM_PROMPT: &str = "You must respond ONLY in valid JSON.\n\
The JSON must contain exactly these fields:\n\
- reasoning\n\
- answer\n\
Do not include any extra text outside JSON.";

/// A model reply split into its reasoning and answer parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredAnswer {
    pub answer: String,
    pub reasoning: Option<String>,
}

#[derive(Deserialize)]
struct RawAnswer {
    answer: String,
    #[serde(default)]
    reasoning: Option<String>,
}

impl StructuredAnswer {
    /// Unwrap `{"reasoning": ..., "answer": ...}` replies; anything else is
    /// taken verbatim as the answer.
    pub fn parse(reply: &str) -> Self {
        let body = strip_json_fence(reply.trim());

        if body.starts_with('{') {
            match serde_json::from_str::<RawAnswer>(body) {
                Ok(raw) => {
                    debug!("Parsed structured answer");
                    return Self {
                        answer: raw.answer,
                        reasoning: raw.reasoning.filter(|r| !r.trim().is_empty()),
                    };
                }
                Err(e) => debug!(error = %e, "Reply is not a structured answer, using raw text"),
            }
        }

        Self {
            answer: reply.to_string(),
            reasoning: None,
        }
    }
}

fn strip_json_fence(text: &str) -> &str {
    let Some(rest) = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
    else {
        return text;
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_reply() {
        let reply = r#"{"reasoning": "use pathlib", "answer": "<python_code>print(1)</python_code>"}"#;
        let parsed = StructuredAnswer::parse(reply);
        assert_eq!(parsed.answer, "<python_code>print(1)</python_code>");
        assert_eq!(parsed.reasoning.as_deref(), Some("use pathlib"));
    }

    #[test]
    fn test_parse_fenced_structured_reply() {
        let reply = "```json\n{\"answer\": \"done\"}\n```";
        let parsed = StructuredAnswer::parse(reply);
        assert_eq!(parsed.answer, "done");
        assert_eq!(parsed.reasoning, None);
    }

    #[test]
    fn test_plain_text_reply_is_the_answer() {
        let reply = "<python_code>x = {'a': 1}</python_code>";
        let parsed = StructuredAnswer::parse(reply);
        assert_eq!(parsed.answer, reply);
        assert_eq!(parsed.reasoning, None);
    }

    #[test]
    fn test_json_without_answer_field_is_kept_verbatim() {
        let reply = r#"{"code": "print(1)"}"#;
        let parsed = StructuredAnswer::parse(reply);
        assert_eq!(parsed.answer, reply);
    }
}
