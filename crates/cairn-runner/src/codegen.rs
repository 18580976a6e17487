//! The Generating phase of the Lifecycle Runner (spec §4.6): calls the
//! language-model client with a fixed prompt, strips markdown fences
//! from the response, and validates the result before it is allowed to
//! reach the sandbox.

use std::sync::Arc;

use regex::Regex;

use cairn_core::{Error, Result};

use crate::llm_client::LlmClient;
use crate::script_sandbox::parse_script;

/// Enumerates the callable functions and forbidden constructs verbatim,
/// matching the original generator's instructions to the model.
pub const PROMPT_TEMPLATE: &str = r#"You are writing a short script to accomplish the following task:

{task}

You have access to these functions only:
- read_file(path) -> file contents as text
- write_file(path, content) -> true
- list_dir(path) -> list of names
- file_exists(path) -> true/false
- search_files(pattern) -> list of matching paths
- search_content(pattern, path=".") -> list of {file, line, text}
- ask_llm(prompt, context="") -> LLM response text
- submit_result(summary, changed_files) -> true
- log(message) -> true

You CANNOT: import anything, define classes, use open(), use print().

Always call submit_result() at the end.

Respond with only the script, one statement per line."#;

pub fn render_prompt(task: &str) -> String {
    PROMPT_TEMPLATE.replace("{task}", task)
}

/// Strip a leading/trailing Markdown code-fence line if present.
pub fn extract_code(raw: &str) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();
    if lines.first().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n")
}

fn forbidden_patterns() -> &'static [(&'static str, &'static str)] {
    &[
        (r"\bimport\b", "import"),
        (r"\bopen\s*\(", "open("),
        (r"\beval\s*\(", "eval("),
        (r"\bexec\s*\(", "exec("),
        (r"__import__", "__import__"),
    ]
}

/// Static validation of generated code, before it ever reaches the
/// sandbox: must parse as the sandbox's accepted grammar, must not
/// contain any forbidden construct, must call `submit_result`.
pub fn validate_code(code: &str) -> Result<()> {
    for (pattern, label) in forbidden_patterns() {
        let re = Regex::new(pattern).expect("static regex is valid");
        if re.is_match(code) {
            return Err(Error::ValidationError(format!(
                "generated code contains forbidden construct: {label}"
            )));
        }
    }
    if !code.contains("submit_result(") {
        return Err(Error::ValidationError(
            "generated code never calls submit_result()".into(),
        ));
    }
    parse_script(code).map_err(|e| Error::ValidationError(format!("syntax error: {e}")))?;
    Ok(())
}

pub struct CodeGenerator {
    llm: Arc<dyn LlmClient>,
}

impl CodeGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Generate and validate code for `task`. Returns the extracted,
    /// pre-validated script on success.
    pub async fn generate(&self, task: &str) -> Result<String> {
        let prompt = render_prompt(task);
        let raw = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|e| Error::GenerationError(e.to_string()))?;
        let code = extract_code(&raw);
        validate_code(&code)?;
        Ok(code)
    }
}
