//! Test case synthesis through a [`LanguageModel`].

use std::fmt;

use crate::llm::{extract_json, LanguageModel, ModelError};
use crate::{TestCase, ToolDefinition};

mod prompts;
mod shaping;

#[cfg(test)]
#[path = "../../tests/internal/generator_tests.rs"]
mod tests;

/// Why one generation unit produced no test case.
#[derive(Debug)]
pub enum GenerationError {
    /// The model call itself failed.
    Model(ModelError),
    /// The reply contained no parseable JSON.
    MissingJson,
    /// The JSON did not describe a usable test case.
    InvalidCase(String),
    /// Inputs for an expected-success case violate the tool's input schema.
    InvalidInputs(String),
    /// The context round returned no text.
    EmptyContext,
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::Model(error) => write!(f, "{error}"),
            GenerationError::MissingJson => f.write_str("model reply contained no JSON"),
            GenerationError::InvalidCase(reason) => write!(f, "invalid test case: {reason}"),
            GenerationError::InvalidInputs(reason) => {
                write!(f, "generated inputs violate the input schema: {reason}")
            }
            GenerationError::EmptyContext => f.write_str("model returned an empty request"),
        }
    }
}

impl std::error::Error for GenerationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GenerationError::Model(error) => Some(error),
            _ => None,
        }
    }
}

impl From<ModelError> for GenerationError {
    fn from(error: ModelError) -> Self {
        GenerationError::Model(error)
    }
}

/// Knobs for case shaping.
#[derive(Clone, Debug)]
pub struct GeneratorOptions {
    /// Reject expected-success cases whose inputs fail the tool's input schema.
    pub enforce_input_schema: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            enforce_input_schema: true,
        }
    }
}

/// Produces test cases for one tool at a time. Holds no server connection.
pub struct TestGenerator<M> {
    model: M,
    options: GeneratorOptions,
}

impl<M: LanguageModel> TestGenerator<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            options: GeneratorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GeneratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Generates up to `count` cases for `tool`, in unit order.
    ///
    /// A unit that fails is logged and skipped, so the result may be shorter
    /// than `count`. Nothing is fabricated in its place.
    pub async fn generate(&self, tool: &ToolDefinition, count: usize) -> Vec<TestCase> {
        let mut cases = Vec::with_capacity(count);
        for unit in 0..count {
            match self.generate_unit(tool, unit, count).await {
                Ok(case) => {
                    log::debug!(
                        "tool '{}': generated test {} ({})",
                        tool.name,
                        case.id,
                        case.description
                    );
                    cases.push(case);
                }
                Err(error) => log::warn!(
                    "tool '{}': test generation unit {}/{count} failed: {error}",
                    tool.name,
                    unit + 1
                ),
            }
        }
        cases
    }

    /// Runs the context round and the case round for a single unit.
    pub async fn generate_unit(
        &self,
        tool: &ToolDefinition,
        unit: usize,
        count: usize,
    ) -> Result<TestCase, GenerationError> {
        let context = self
            .model
            .complete(
                prompts::CONTEXT_SYSTEM,
                &prompts::context_prompt(tool, unit, count),
            )
            .await?;
        let context = clean_context(&context);
        if context.is_empty() {
            return Err(GenerationError::EmptyContext);
        }
        let reply = self
            .model
            .complete(prompts::CASE_SYSTEM, &prompts::case_prompt(tool, &context))
            .await?;
        let raw = extract_json(&reply).ok_or(GenerationError::MissingJson)?;
        shaping::shape_case(tool, &context, raw, &self.options)
    }
}

fn clean_context(text: &str) -> String {
    let text = text.trim();
    text.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(text)
        .trim()
        .to_string()
}
