use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use regex::RegexBuilder;
use serde_json::Value as JsonValue;

use crate::{RuleKind, ValidationRule};

use super::path::{resolve_path, type_name};
use super::predicates::CustomPredicate;

/// Outcome of evaluating one rule.
#[derive(Debug, PartialEq)]
pub(super) enum RuleVerdict {
    Pass,
    Fail(String),
    /// The rule lacks the target or value it needs and is ignored.
    Skip,
}

pub(super) fn evaluate_rule(
    rule: &ValidationRule,
    data: &JsonValue,
    predicates: &BTreeMap<String, CustomPredicate>,
) -> RuleVerdict {
    match rule.kind {
        RuleKind::Contains => {
            let (Some(target), Some(expected)) = (rule_target(rule), rule.value.as_ref()) else {
                return RuleVerdict::Skip;
            };
            verdict(rule, check_contains(data, target, expected))
        }
        RuleKind::Matches => {
            let (Some(target), Some(expected)) = (rule_target(rule), rule.value.as_ref()) else {
                return RuleVerdict::Skip;
            };
            verdict(rule, check_matches(data, target, expected))
        }
        RuleKind::HasProperty => {
            let Some(target) = rule_target(rule) else {
                return RuleVerdict::Skip;
            };
            let result = match resolve_path(data, target) {
                Some(_) => Ok(()),
                None => Err(format!("property '{target}' is missing")),
            };
            verdict(rule, result)
        }
        RuleKind::Custom => verdict(rule, check_custom(rule, data, predicates)),
    }
}

fn rule_target(rule: &ValidationRule) -> Option<&str> {
    rule.target
        .as_deref()
        .map(str::trim)
        .filter(|target| !target.is_empty())
}

fn verdict(rule: &ValidationRule, result: Result<(), String>) -> RuleVerdict {
    match result {
        Ok(()) => RuleVerdict::Pass,
        Err(detail) => RuleVerdict::Fail(failure_message(rule, &detail)),
    }
}

fn failure_message(rule: &ValidationRule, detail: &str) -> String {
    let message = rule.message.trim();
    if message.is_empty() {
        format!("{} rule failed: {detail}", rule.kind.as_str())
    } else {
        format!("{message} ({detail})")
    }
}

fn check_contains(data: &JsonValue, target: &str, expected: &JsonValue) -> Result<(), String> {
    let Some(actual) = resolve_path(data, target) else {
        return Err(format!("'{target}' is absent"));
    };
    match actual {
        JsonValue::String(text) => {
            let needle = match expected {
                JsonValue::String(needle) => needle.clone(),
                other => other.to_string(),
            };
            if text.contains(&needle) {
                Ok(())
            } else {
                Err(format!("'{target}' does not contain {needle:?}"))
            }
        }
        JsonValue::Array(items) => {
            if items.contains(expected) {
                Ok(())
            } else {
                Err(format!("'{target}' has no element equal to {expected}"))
            }
        }
        other => Err(format!(
            "'{target}' is {}, expected a string or array",
            type_name(other)
        )),
    }
}

fn check_matches(data: &JsonValue, target: &str, expected: &JsonValue) -> Result<(), String> {
    let actual = resolve_path(data, target);
    if let Some(pattern) = expected.as_str().and_then(regex_literal) {
        let regex = pattern.compile()?;
        return match actual {
            Some(JsonValue::String(text)) if regex.is_match(text) => Ok(()),
            Some(JsonValue::String(text)) => Err(format!(
                "'{target}' value {text:?} does not match /{}/",
                pattern.source
            )),
            Some(other) => Err(format!(
                "'{target}' is {}, expected a string",
                type_name(other)
            )),
            None => Err(format!("'{target}' is absent")),
        };
    }
    match actual {
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(format!("'{target}' is {actual}, expected {expected}")),
        None => Err(format!("'{target}' is absent")),
    }
}

fn check_custom(
    rule: &ValidationRule,
    data: &JsonValue,
    predicates: &BTreeMap<String, CustomPredicate>,
) -> Result<(), String> {
    let Some(name) = rule.value.as_ref().and_then(JsonValue::as_str) else {
        return Err("custom rule does not name a predicate".to_string());
    };
    let Some(predicate) = predicates.get(name) else {
        return Err(format!("unknown predicate '{name}'"));
    };
    match catch_unwind(AssertUnwindSafe(|| predicate(data))) {
        Ok(Ok(true)) => Ok(()),
        Ok(Ok(false)) => Err(format!("predicate '{name}' returned false")),
        Ok(Err(error)) => Err(format!("predicate '{name}' failed: {error}")),
        Err(payload) => Err(format!(
            "predicate '{name}' panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[derive(Debug, PartialEq)]
pub(super) struct RegexLiteral<'a> {
    pub(super) source: &'a str,
    pub(super) flags: &'a str,
}

impl RegexLiteral<'_> {
    fn compile(&self) -> Result<regex::Regex, String> {
        let mut builder = RegexBuilder::new(self.source);
        for flag in self.flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                _ => &mut builder,
            };
        }
        builder
            .build()
            .map_err(|error| format!("invalid regex /{}/: {error}", self.source))
    }
}

/// Parses `/source/flags`; anything else is a plain literal.
pub(super) fn regex_literal(value: &str) -> Option<RegexLiteral<'_>> {
    let rest = value.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let (source, flags) = (&rest[..end], &rest[end + 1..]);
    if source.is_empty() || !flags.chars().all(|flag| "imsx".contains(flag)) {
        return None;
    }
    Some(RegexLiteral { source, flags })
}
