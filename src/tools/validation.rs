//! Tool input parsing with readable validation errors

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::OnceLock;

use regex::Regex;

use crate::core::{FrameworkError, FrameworkResult};

/// Deserialize tool input, mapping serde errors to readable messages
pub fn parse_input<T: DeserializeOwned>(input: &Value) -> FrameworkResult<T> {
    if !input.is_object() {
        return Err(FrameworkError::Validation(
            "Tool input must be a JSON object".to_string(),
        ));
    }
    serde_json::from_value(input.clone())
        .map_err(|e| FrameworkError::Validation(humanize(&e.to_string())))
}

struct Patterns {
    missing: Regex,
    unknown: Regex,
    invalid_type: Regex,
    invalid_value: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        missing: Regex::new(r"missing field `([^`]+)`").expect("valid regex"),
        unknown: Regex::new(r"unknown field `([^`]+)`").expect("valid regex"),
        invalid_type: Regex::new(r"invalid type: (.+?), expected (.+?)(?: at line.*)?$")
            .expect("valid regex"),
        invalid_value: Regex::new(r"unknown variant `([^`]+)`, expected (.+?)(?: at line.*)?$")
            .expect("valid regex"),
    })
}

/// Turn a serde error message into a sentence for the model
fn humanize(message: &str) -> String {
    let p = patterns();
    if let Some(c) = p.missing.captures(message) {
        return format!("The required parameter `{}` is missing", &c[1]);
    }
    if let Some(c) = p.unknown.captures(message) {
        return format!("An unexpected parameter `{}` was provided", &c[1]);
    }
    if let Some(c) = p.invalid_value.captures(message) {
        return format!("The value `{}` is not allowed, expected {}", &c[1], &c[2]);
    }
    if let Some(c) = p.invalid_type.captures(message) {
        return format!("A parameter has the wrong type: expected {}, got {}", &c[2], &c[1]);
    }
    message.to_string()
}
