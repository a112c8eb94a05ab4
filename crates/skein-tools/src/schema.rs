//! Minimal JSON-schema checks for tool input.
//!
//! Covers the subset tools declare: `type` (single or list), `properties`,
//! `required`, `enum`, and `items`. Unknown keywords are ignored.

use serde_json::Value;

/// Validate `value` against `schema`, returning every issue found.
pub fn validate(schema: &Value, value: &Value) -> Result<(), Vec<String>> {
    let mut issues = Vec::new();
    check(schema, value, "input", &mut issues);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn check(schema: &Value, value: &Value, path: &str, issues: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(|t| t.as_str()).collect(),
            _ => vec![],
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(t, value)) {
            issues.push(format!(
                "{}: expected {}, got {}",
                path,
                allowed.join(" | "),
                type_name(value)
            ));
            return;
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            let rendered: Vec<String> = options.iter().map(|o| o.to_string()).collect();
            issues.push(format!(
                "{}: {} is not one of [{}]",
                path,
                value,
                rendered.join(", ")
            ));
        }
    }

    if let Some(obj) = value.as_object() {
        if let Some(Value::Array(required)) = schema.get("required") {
            for key in required.iter().filter_map(|k| k.as_str()) {
                if !obj.contains_key(key) {
                    issues.push(format!("{}: missing required property '{}'", path, key));
                }
            }
        }
        if let Some(Value::Object(props)) = schema.get("properties") {
            for (key, prop_schema) in props {
                if let Some(v) = obj.get(key) {
                    check(prop_schema, v, &format!("{}.{}", path, key), issues);
                }
            }
        }
    }

    if let (Some(items), Some(arr)) = (schema.get("items"), value.as_array()) {
        for (i, v) in arr.iter().enumerate() {
            check(items, v, &format!("{}[{}]", path, i), issues);
        }
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
