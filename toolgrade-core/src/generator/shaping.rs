use serde_json::{Map, Value as JsonValue};

use crate::{ExpectedOutcome, ResponseStatus, RuleKind, TestCase, ToolDefinition, ValidationRule};

use super::{GenerationError, GeneratorOptions};

const DESCRIPTION_KEYS: &[&str] = &["description", "name", "title"];
const INPUT_KEYS: &[&str] = &["inputs", "input", "arguments", "args", "parameters"];
const OUTCOME_KEYS: &[&str] = &["expectedOutcome", "expected_outcome", "expected"];
const RULE_LIST_KEYS: &[&str] = &["validationRules", "validation_rules", "rules"];
const RULE_KIND_KEYS: &[&str] = &["type", "kind"];
const TARGET_KEYS: &[&str] = &["target", "path", "field"];
const VALUE_KEYS: &[&str] = &["value", "expected", "predicate"];

/// Turns the model's JSON reply into a [`TestCase`].
pub(super) fn shape_case(
    tool: &ToolDefinition,
    context: &str,
    raw: JsonValue,
    options: &GeneratorOptions,
) -> Result<TestCase, GenerationError> {
    let object = match raw {
        JsonValue::Object(object) => object,
        JsonValue::Array(items) => match items.into_iter().next() {
            Some(JsonValue::Object(object)) => object,
            _ => return Err(GenerationError::InvalidCase("expected a JSON object".to_string())),
        },
        _ => return Err(GenerationError::InvalidCase("expected a JSON object".to_string())),
    };

    let inputs = match lookup(&object, INPUT_KEYS) {
        None | Some(JsonValue::Null) => {
            let required = tool.required_fields();
            if !required.is_empty() {
                return Err(GenerationError::InvalidCase(format!(
                    "`inputs` is missing but the tool requires {}",
                    required.join(", ")
                )));
            }
            Map::new()
        }
        Some(JsonValue::Object(inputs)) => inputs.clone(),
        Some(other) => {
            return Err(GenerationError::InvalidCase(format!(
                "`inputs` must be an object, got {other}"
            )))
        }
    };
    let expected_outcome = shape_outcome(tool, lookup(&object, OUTCOME_KEYS))?;
    if expected_outcome.status == ResponseStatus::Success && options.enforce_input_schema {
        check_inputs(tool, &inputs)?;
    }
    let description = lookup(&object, DESCRIPTION_KEYS)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|description| !description.is_empty())
        .unwrap_or(context)
        .to_string();

    Ok(TestCase {
        id: uuid::Uuid::new_v4().to_string(),
        tool_name: tool.name.clone(),
        description,
        inputs,
        natural_language_context: context.to_string(),
        expected_outcome,
    })
}

fn shape_outcome(
    tool: &ToolDefinition,
    raw: Option<&JsonValue>,
) -> Result<ExpectedOutcome, GenerationError> {
    let outcome = match raw {
        Some(JsonValue::Object(outcome)) => outcome,
        None | Some(JsonValue::Null) => {
            return Err(GenerationError::InvalidCase(
                "`expectedOutcome` is missing".to_string(),
            ))
        }
        Some(other) => {
            return Err(GenerationError::InvalidCase(format!(
                "`expectedOutcome` must be an object, got {other}"
            )))
        }
    };
    let status = match outcome.get("status") {
        None | Some(JsonValue::Null) => {
            return Err(GenerationError::InvalidCase(
                "expected status is missing".to_string(),
            ))
        }
        Some(JsonValue::String(status)) => parse_status(status).ok_or_else(|| {
            GenerationError::InvalidCase(format!("unknown expected status '{status}'"))
        })?,
        Some(other) => {
            return Err(GenerationError::InvalidCase(format!(
                "expected status must be a string, got {other}"
            )))
        }
    };
    let validation_rules = lookup(outcome, RULE_LIST_KEYS)
        .and_then(JsonValue::as_array)
        .map(|rules| {
            rules
                .iter()
                .filter_map(|rule| shape_rule(tool, rule))
                .collect()
        })
        .unwrap_or_default();
    Ok(ExpectedOutcome {
        status,
        validation_rules,
    })
}

fn parse_status(status: &str) -> Option<ResponseStatus> {
    match status.trim().to_ascii_lowercase().as_str() {
        "success" | "ok" | "pass" | "passed" => Some(ResponseStatus::Success),
        "error" | "failure" | "fail" | "failed" => Some(ResponseStatus::Error),
        _ => None,
    }
}

fn shape_rule(tool: &ToolDefinition, raw: &JsonValue) -> Option<ValidationRule> {
    let JsonValue::Object(rule) = raw else {
        log::warn!("tool '{}': dropping non-object validation rule {raw}", tool.name);
        return None;
    };
    let kind_label = lookup(rule, RULE_KIND_KEYS)
        .and_then(JsonValue::as_str)
        .unwrap_or_default();
    let Some(kind) = parse_rule_kind(kind_label) else {
        log::warn!(
            "tool '{}': dropping validation rule with unknown type '{kind_label}'",
            tool.name
        );
        return None;
    };
    Some(ValidationRule {
        kind,
        target: lookup(rule, TARGET_KEYS)
            .and_then(JsonValue::as_str)
            .map(str::to_string),
        value: lookup(rule, VALUE_KEYS).filter(|value| !value.is_null()).cloned(),
        message: rule
            .get("message")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

pub(super) fn parse_rule_kind(label: &str) -> Option<RuleKind> {
    let normalized: String = label
        .chars()
        .filter(|ch| !matches!(ch, '_' | '-' | ' '))
        .collect::<String>()
        .to_ascii_lowercase();
    match normalized.as_str() {
        "contains" | "includes" => Some(RuleKind::Contains),
        "matches" | "regex" | "equals" => Some(RuleKind::Matches),
        "hasproperty" => Some(RuleKind::HasProperty),
        "custom" => Some(RuleKind::Custom),
        _ => None,
    }
}

fn check_inputs(tool: &ToolDefinition, inputs: &Map<String, JsonValue>) -> Result<(), GenerationError> {
    let schema = JsonValue::Object(tool.input_schema.clone());
    let validator = match jsonschema::validator_for(&schema) {
        Ok(validator) => validator,
        Err(error) => {
            log::debug!(
                "tool '{}': input schema does not compile, skipping input check: {error}",
                tool.name
            );
            return Ok(());
        }
    };
    let instance = JsonValue::Object(inputs.clone());
    let errors: Vec<String> = validator
        .iter_errors(&instance)
        .map(|error| error.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(GenerationError::InvalidInputs(errors.join("; ")))
    }
}

fn lookup<'a>(object: &'a Map<String, JsonValue>, keys: &[&str]) -> Option<&'a JsonValue> {
    keys.iter().find_map(|key| object.get(*key))
}
