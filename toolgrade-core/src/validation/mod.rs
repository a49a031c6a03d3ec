//! Rule-based grading of tool responses against generated expectations.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{ResponseStatus, TestCase, ToolResponse};

mod path;
mod predicates;
mod rules;

pub use path::resolve_path;
pub use predicates::{builtin_predicates, CustomPredicate};

pub(crate) use rules::panic_message;

#[cfg(test)]
#[path = "../../tests/internal/validation_tests.rs"]
mod tests;

/// Verdict for one response.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ValidationOutcome {
    /// True when `errors` is empty.
    pub valid: bool,
    /// Every failed check, in rule order.
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Evaluates a [`ToolResponse`] against a [`TestCase`]'s expected outcome.
///
/// Validation is pure: it reads its arguments and the registered predicates
/// and nothing else.
///
/// ```
/// use serde_json::json;
/// use toolgrade_core::{
///     ExpectedOutcome, ResponseStatus, ResponseValidator, TestCase, ToolResponse, ValidationRule,
/// };
///
/// let case = TestCase {
///     id: "t-1".to_string(),
///     tool_name: "greet".to_string(),
///     description: "greets by name".to_string(),
///     inputs: serde_json::Map::new(),
///     natural_language_context: "say hello to Ada".to_string(),
///     expected_outcome: ExpectedOutcome {
///         status: ResponseStatus::Success,
///         validation_rules: vec![ValidationRule::contains(
///             "greeting",
///             json!("Ada"),
///             "greeting names the user",
///         )],
///     },
/// };
/// let response = ToolResponse::success(json!({ "greeting": "hello Ada" }));
/// assert!(ResponseValidator::default().validate(&response, &case).valid);
/// ```
#[derive(Clone)]
pub struct ResponseValidator {
    predicates: BTreeMap<String, CustomPredicate>,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self {
            predicates: builtin_predicates(),
        }
    }
}

impl fmt::Debug for ResponseValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseValidator")
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ResponseValidator {
    /// A validator with no predicates registered, not even the built-ins.
    pub fn empty() -> Self {
        Self {
            predicates: BTreeMap::new(),
        }
    }

    /// Registers a named predicate for `custom` rules, replacing any previous one.
    pub fn with_predicate<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&JsonValue) -> Result<bool, String> + Send + Sync + 'static,
    {
        self.predicates.insert(name.into(), Arc::new(predicate));
        self
    }

    /// Names of registered predicates.
    pub fn predicate_names(&self) -> impl Iterator<Item = &str> {
        self.predicates.keys().map(String::as_str)
    }

    /// Grades `response` against `case.expected_outcome`.
    ///
    /// A status mismatch yields exactly one error and skips the rules. An
    /// expected error is satisfied by the status alone. Otherwise every rule
    /// runs and all failures are collected.
    pub fn validate(&self, response: &ToolResponse, case: &TestCase) -> ValidationOutcome {
        let expected = case.expected_outcome.status;
        if response.status != expected {
            return ValidationOutcome::from_errors(vec![status_mismatch(expected, response)]);
        }
        if expected == ResponseStatus::Error {
            return ValidationOutcome::from_errors(Vec::new());
        }
        let null = JsonValue::Null;
        let data = response.data.as_ref().unwrap_or(&null);
        let errors = case
            .expected_outcome
            .validation_rules
            .iter()
            .filter_map(|rule| match rules::evaluate_rule(rule, data, &self.predicates) {
                rules::RuleVerdict::Fail(message) => Some(message),
                rules::RuleVerdict::Pass | rules::RuleVerdict::Skip => None,
            })
            .collect();
        ValidationOutcome::from_errors(errors)
    }
}

fn status_mismatch(expected: ResponseStatus, response: &ToolResponse) -> String {
    let mut message = format!("expected status '{expected}' but tool returned '{}'", response.status);
    if let Some(error) = &response.error {
        message.push_str(": ");
        message.push_str(&error.message);
    }
    message
}
