/// Upper bound on the error text embedded in a fix prompt
pub const MAX_ERROR_OUTPUT_LEN: usize = 12_000;

/// Upper bound on the failing code embedded in a fix prompt
pub const MAX_CODE_LEN: usize = 40_000;

const DEFAULT_TEMPLATE: &str = r#"
Do this with python code.
- Use html format and write python code inside <python_code> block shown below.
- Also, provide libraries to install in requirements.txt under <requirements> block. Use standard Python libraries when possible.
- Use the code snippet shown inside <python_code> block, but make necessary changes as indicated by the comment.
- You do not need to explain the code. Simply provide the code inside the <python_code> block.

<python_code>
import os
# import other necessary libraries

# write your code below.
...
</python_code>

<requirements>
numpy
...
</requirements>
"#;

/// Prompt templates for code generation
pub struct CodePrompts;

impl CodePrompts {
    /// Instructions appended to the user's request on the first attempt
    pub fn default_template() -> &'static str {
        DEFAULT_TEMPLATE
    }

    /// Build the first-attempt prompt
    pub fn initial_prompt(request: &str, template: &str) -> String {
        format!("{} \n {}", request, template)
    }

    /// Build the prompt asking the model to repair code that failed to run
    pub fn fix_prompt(original_request: &str, code: &str, error_output: &str) -> String {
        format!(
            r#"
The following Python code failed to execute properly. Please fix the issues and provide corrected code.

Original request: {request}

<errored_python_code>
{code}
</errored_python_code>

Error output:
{error}

Requirements:
- Fix all the errors shown above.
- Provide the fixed python code inside <python_code> block shown below.
- Provide the fixed requirements.txt under <requirements> block shown below, to include necessary python libraries.
- No need to give any explanations. Simply fill python_code and requirements block below.

<python_code>
import ...
</python_code>

<requirements>
numpy
</requirements>
"#,
            request = original_request,
            code = truncate_head(code, MAX_CODE_LEN),
            error = truncate_tail(error_output, MAX_ERROR_OUTPUT_LEN),
        )
    }
}

/// Keep the beginning of `output`, cutting at a line boundary when possible
fn truncate_head(output: &str, max_len: usize) -> &str {
    if output.len() <= max_len {
        return output;
    }
    let cut = floor_char_boundary(output, max_len);
    match output[..cut].rfind('\n') {
        Some(pos) => &output[..pos],
        None => &output[..cut],
    }
}

/// Keep the end of `output`, where tracebacks put the actual error
fn truncate_tail(output: &str, max_len: usize) -> &str {
    if output.len() <= max_len {
        return output;
    }
    let mut cut = output.len() - max_len;
    while !output.is_char_boundary(cut) {
        cut += 1;
    }
    match output[cut..].find('\n') {
        Some(pos) if cut + pos + 1 < output.len() => &output[cut + pos + 1..],
        _ => &output[cut..],
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
