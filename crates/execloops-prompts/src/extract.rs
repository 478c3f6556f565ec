use html_escape::decode_html_entities;
use thiserror::Error;
use tracing::debug;

/// Tag wrapping the generated code
pub const CODE_TAG: &str = "python_code";
/// Tag wrapping the dependency list
pub const REQUIREMENTS_TAG: &str = "requirements";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExtractError {
    #[error("No <{0}> block found in model response")]
    MissingBlock(&'static str),

    #[error("<{0}> block is never closed")]
    Unterminated(&'static str),
}

/// Code and dependency list pulled out of a model response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    pub code: String,
    pub requirements: String,
}

impl GeneratedCode {
    /// Extract the code and requirements blocks from a model response
    ///
    /// Expected format:
    /// ```text
    /// <python_code>
    /// import os
    /// print(os.getcwd())
    /// </python_code>
    ///
    /// <requirements>
    /// numpy
    /// </requirements>
    /// ```
    ///
    /// Tag names match case-insensitively and may carry attributes. The first
    /// block of each kind wins. HTML entities such as `&lt;` are decoded.
    pub fn extract(response: &str) -> Result<Self, ExtractError> {
        debug!(response_len = response.len(), "Extracting generated code");

        let code = find_block(response, CODE_TAG)?;
        let requirements = find_block(response, REQUIREMENTS_TAG)?;

        Ok(Self {
            code: decode_html_entities(strip_fence(code)).into_owned(),
            requirements: decode_html_entities(strip_fence(requirements)).into_owned(),
        })
    }

    /// Package specifiers listed in the requirements block
    pub fn packages(&self) -> Vec<&str> {
        self.requirements
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect()
    }

    pub fn code_lines(&self) -> usize {
        self.code.lines().count()
    }
}

/// Return the text between `<tag ...>` and `</tag>`
fn find_block<'a>(text: &'a str, tag: &'static str) -> Result<&'a str, ExtractError> {
    // ASCII lowercasing keeps byte offsets aligned with `text`
    let lower = text.to_ascii_lowercase();
    let open = format!("<{}", tag);
    let close = format!("</{}", tag);

    let mut search_from = 0;
    let content_start = loop {
        let Some(pos) = lower[search_from..].find(&open) else {
            return Err(ExtractError::MissingBlock(tag));
        };
        let after_name = search_from + pos + open.len();
        match lower[after_name..].chars().next() {
            Some('>') => break after_name + 1,
            Some(c) if c.is_ascii_whitespace() => match lower[after_name..].find('>') {
                Some(end) => break after_name + end + 1,
                None => return Err(ExtractError::Unterminated(tag)),
            },
            // A longer tag name such as <python_code_v2>
            _ => search_from = after_name,
        }
    };

    let mut search_from = content_start;
    loop {
        let Some(pos) = lower[search_from..].find(&close) else {
            return Err(ExtractError::Unterminated(tag));
        };
        let content_end = search_from + pos;
        let rest = lower[content_end + close.len()..].trim_start();
        if rest.starts_with('>') {
            return Ok(trim_blank_lines(&text[content_start..content_end]));
        }
        search_from = content_end + close.len();
    }
}

fn trim_blank_lines(s: &str) -> &str {
    let s = s.trim_end();
    let mut start = 0;
    for line in s.split_inclusive('\n') {
        if line.trim().is_empty() {
            start += line.len();
        } else {
            break;
        }
    }
    &s[start..]
}

/// Drop a markdown code fence the model put inside the block
fn strip_fence(block: &str) -> &str {
    let trimmed = block.trim();
    if !trimmed.starts_with("```") || !trimmed.ends_with("```") || trimmed.len() < 6 {
        return block;
    }
    let without_close = &trimmed[..trimmed.len() - 3];
    match without_close.find('\n') {
        Some(first_newline) => trim_blank_lines(&without_close[first_newline + 1..]),
        None => block,
    }
}
