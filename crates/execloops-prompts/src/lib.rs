mod extract;
mod templates;

pub use extract::{ExtractError, GeneratedCode, CODE_TAG, REQUIREMENTS_TAG};
pub use templates::{CodePrompts, MAX_CODE_LEN, MAX_ERROR_OUTPUT_LEN};
