use tracing::debug;

use skein_tools::schema;

/// Validates a node's final answer against its declared output contract.
pub struct OutputValidator {
    /// Maximum allowed output length (characters).
    pub max_length: usize,
    /// Optional JSON schema the cleaned output must satisfy.
    pub schema: Option<serde_json::Value>,
}

/// Result of output validation.
#[derive(Debug, Clone)]
pub enum ValidationResult {
    /// Output is valid; carries the value to commit.
    Valid(serde_json::Value),
    /// Output has issues.
    Invalid { issues: Vec<String> },
}

impl OutputValidator {
    /// Create a validator with defaults (100K max length, no schema).
    pub fn new() -> Self {
        Self {
            max_length: 100_000,
            schema: None,
        }
    }

    pub fn with_schema(schema: Option<serde_json::Value>) -> Self {
        Self {
            schema,
            ..Self::new()
        }
    }

    /// Validate the output and return the value to commit.
    ///
    /// With a schema the cleaned output must parse as JSON and satisfy it.
    /// Without one, output that cleans up to a JSON object or array is kept
    /// as JSON and anything else is kept as trimmed text.
    pub fn validate(&self, output: &str) -> ValidationResult {
        let mut issues = Vec::new();

        if output.len() > self.max_length {
            issues.push(format!(
                "Output exceeds max length: {} > {}",
                output.len(),
                self.max_length
            ));
        }

        let cleaned = OutputCleaner::heuristic_repair(output);
        let parsed = serde_json::from_str::<serde_json::Value>(&cleaned);

        let value = match (&self.schema, parsed) {
            (Some(schema), Ok(val)) => {
                if let Err(errors) = schema::validate(schema, &val) {
                    issues.extend(errors);
                }
                val
            }
            (Some(_), Err(e)) => {
                issues.push(format!("Output is not valid JSON: {}", e));
                serde_json::Value::Null
            }
            (None, Ok(val)) if val.is_object() || val.is_array() => {
                if cleaned != output.trim() {
                    debug!("Repaired JSON output before committing");
                }
                val
            }
            (None, _) => serde_json::Value::String(output.trim().to_string()),
        };

        if issues.is_empty() {
            ValidationResult::Valid(value)
        } else {
            ValidationResult::Invalid { issues }
        }
    }
}

impl Default for OutputValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Heuristic repair of malformed model output.
pub struct OutputCleaner;

impl OutputCleaner {
    /// Apply heuristic repairs to output.
    /// - Strips markdown code fences
    /// - Balances JSON braces
    /// - Trims whitespace
    pub fn heuristic_repair(output: &str) -> String {
        let mut result = strip_code_fences(output);
        result = result.trim().to_string();

        if result.starts_with('{') || result.starts_with('[') {
            result = balance_braces(&result);
        }

        result
    }
}

/// Strip markdown code fences from text.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();

    // Try ```json ... ``` first
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    // Try ``` ... ```
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        // Skip optional language tag on same line
        let content_start = after.find('\n').map_or(0, |p| p + 1);
        let after = &after[content_start..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    trimmed.to_string()
}

/// Balance JSON braces/brackets by appending missing closers.
fn balance_braces(text: &str) -> String {
    let mut brace_depth: i32 = 0;
    let mut bracket_depth: i32 = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for ch in text.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match ch {
            '{' => brace_depth += 1,
            '}' => brace_depth -= 1,
            '[' => bracket_depth += 1,
            ']' => bracket_depth -= 1,
            _ => {}
        }
    }

    let mut result = text.to_string();
    for _ in 0..bracket_depth {
        result.push(']');
    }
    for _ in 0..brace_depth {
        result.push('}');
    }
    result
}
