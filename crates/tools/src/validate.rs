//! Schema validation and input sanitization.
//!
//! `validate_input` checks caller-supplied arguments against a tool's
//! declared contract; `sanitize_input` fills defaults and coerces accepted
//! alternate representations into canonical types. Both are pure functions.
//!
//! The executor runs them in that order immediately before invocation, so
//! tool bodies always receive canonical, contract-conforming input.

use agentry_core::error::ValidationError;
use agentry_core::tool::{InputMap, Parameter, ParameterType, ToolSchema};

/// Validate input parameters against a schema.
///
/// Required-parameter and unknown-parameter checks are exhaustive over their
/// respective passes; per-value content checks stop at the first violation.
pub fn validate_input(schema: &ToolSchema, input: &InputMap) -> Result<(), ValidationError> {
    for param in &schema.parameters {
        if param.required && !input.contains_key(&param.name) {
            return Err(ValidationError::new(
                &param.name,
                "required parameter missing",
                None,
            ));
        }
    }

    for (key, value) in input {
        let Some(param) = schema.parameter(key) else {
            return Err(ValidationError::new(key, "unknown parameter", Some(value.clone())));
        };
        validate_parameter(param, value)?;
    }

    Ok(())
}

fn validate_parameter(param: &Parameter, value: &serde_json::Value) -> Result<(), ValidationError> {
    if value.is_null() {
        if param.required {
            return Err(ValidationError::new(
                &param.name,
                "required parameter cannot be null",
                Some(value.clone()),
            ));
        }
        return Ok(());
    }

    match param.param_type {
        ParameterType::String => validate_string(param, value),
        ParameterType::Number => validate_number(param, value),
        ParameterType::Boolean => validate_boolean(param, value),
        ParameterType::Object => {
            if value.is_object() {
                Ok(())
            } else {
                Err(ValidationError::new(&param.name, "expected object value", Some(value.clone())))
            }
        }
        ParameterType::Array => {
            if value.is_array() {
                Ok(())
            } else {
                Err(ValidationError::new(&param.name, "expected array value", Some(value.clone())))
            }
        }
    }
}

fn validate_string(param: &Parameter, value: &serde_json::Value) -> Result<(), ValidationError> {
    let Some(s) = value.as_str() else {
        return Err(ValidationError::new(&param.name, "expected string value", Some(value.clone())));
    };

    if !param.enum_values.is_empty() && !param.enum_values.iter().any(|e| e == s) {
        return Err(ValidationError::new(
            &param.name,
            format!("value must be one of: {}", param.enum_values.join(", ")),
            Some(value.clone()),
        ));
    }

    if let Some(pattern) = &param.pattern {
        let re = regex::Regex::new(pattern).map_err(|_| {
            ValidationError::new(
                &param.name,
                format!("invalid regex pattern: {pattern}"),
                Some(value.clone()),
            )
        })?;
        if !re.is_match(s) {
            return Err(ValidationError::new(
                &param.name,
                format!("value does not match pattern: {pattern}"),
                Some(value.clone()),
            ));
        }
    }

    Ok(())
}

fn validate_number(param: &Parameter, value: &serde_json::Value) -> Result<(), ValidationError> {
    let num = match numeric_value(value) {
        Some(n) => n,
        None => {
            return Err(ValidationError::new(
                &param.name,
                "expected number value",
                Some(value.clone()),
            ));
        }
    };

    if let Some(min) = param.minimum
        && num < min
    {
        return Err(ValidationError::new(
            &param.name,
            format!("value must be >= {min}"),
            Some(value.clone()),
        ));
    }

    if let Some(max) = param.maximum
        && num > max
    {
        return Err(ValidationError::new(
            &param.name,
            format!("value must be <= {max}"),
            Some(value.clone()),
        ));
    }

    Ok(())
}

fn validate_boolean(param: &Parameter, value: &serde_json::Value) -> Result<(), ValidationError> {
    match value {
        serde_json::Value::Bool(_) => Ok(()),
        serde_json::Value::String(s) if is_bool_string(s) => Ok(()),
        _ => Err(ValidationError::new(&param.name, "expected boolean value", Some(value.clone()))),
    }
}

/// Numbers are accepted natively or from numeric-looking strings.
fn numeric_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn is_bool_string(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "false")
}

/// Sanitize and convert input parameters.
///
/// Fills defaults for absent optional parameters and coerces accepted
/// alternate representations (numeric string → number, boolean string →
/// boolean, any scalar → string) into canonical types. Unknown keys are
/// dropped; `validate_input` has already rejected them on the happy path.
pub fn sanitize_input(schema: &ToolSchema, input: &InputMap) -> Result<InputMap, ValidationError> {
    let mut sanitized = InputMap::new();

    for param in &schema.parameters {
        let value = match input.get(&param.name) {
            Some(v) => v,
            None => {
                if let Some(default) = &param.default {
                    sanitized.insert(param.name.clone(), default.clone());
                }
                // Missing required parameters are validation's concern.
                continue;
            }
        };

        let converted = convert_value(param, value)?;
        sanitized.insert(param.name.clone(), converted);
    }

    Ok(sanitized)
}

fn convert_value(
    param: &Parameter,
    value: &serde_json::Value,
) -> Result<serde_json::Value, ValidationError> {
    if value.is_null() {
        return Ok(serde_json::Value::Null);
    }

    match param.param_type {
        ParameterType::String => Ok(match value {
            serde_json::Value::String(s) => serde_json::Value::String(s.clone()),
            other => serde_json::Value::String(other.to_string()),
        }),
        ParameterType::Number => match numeric_value(value) {
            Some(n) => {
                // Keep native numbers untouched; promote strings.
                if value.is_number() {
                    Ok(value.clone())
                } else {
                    Ok(serde_json::json!(n))
                }
            }
            None => Err(ValidationError::new(
                &param.name,
                "cannot convert to number",
                Some(value.clone()),
            )),
        },
        ParameterType::Boolean => match value {
            serde_json::Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            serde_json::Value::String(s) => match s.to_lowercase().as_str() {
                "true" => Ok(serde_json::Value::Bool(true)),
                "false" => Ok(serde_json::Value::Bool(false)),
                _ => Err(ValidationError::new(
                    &param.name,
                    "cannot convert to boolean",
                    Some(value.clone()),
                )),
            },
            _ => Err(ValidationError::new(
                &param.name,
                "cannot convert to boolean",
                Some(value.clone()),
            )),
        },
        ParameterType::Object | ParameterType::Array => Ok(value.clone()),
    }
}
