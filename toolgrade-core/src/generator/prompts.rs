use crate::ToolDefinition;

pub(super) const CONTEXT_SYSTEM: &str = "You write realistic requests that a person might \
send to an assistant which can call software tools. Reply with the request only, as plain \
text, without quotes or commentary.";

pub(super) const CASE_SYSTEM: &str = "You design automated tests for software tools. Reply \
with a single JSON object and nothing else.";

pub(super) fn context_prompt(tool: &ToolDefinition, unit: usize, count: usize) -> String {
    let mut prompt = format!(
        "Write one request a user could make that requires calling the tool below.\n\n{}\n",
        describe_tool(tool)
    );
    if count > 1 {
        prompt.push_str(&format!(
            "\nThis is request {} of {count}; vary the scenario from the others, and make \
             roughly one in four requests probe invalid or edge-case usage.\n",
            unit + 1
        ));
    }
    prompt
}

pub(super) fn case_prompt(tool: &ToolDefinition, context: &str) -> String {
    format!(
        "{tool}\n\nUser request:\n{context}\n\n\
         Produce the tool call that serves this request and how its result should be checked, \
         as JSON of the form:\n\
         {{\n  \"description\": \"what this test checks\",\n  \
         \"inputs\": {{ \"<parameter>\": <value> }},\n  \
         \"expectedOutcome\": {{\n    \"status\": \"success\" | \"error\",\n    \
         \"validationRules\": [\n      {{ \"type\": \"contains\" | \"matches\" | \"hasProperty\", \
         \"target\": \"dotted.path\", \"value\": <expected>, \"message\": \"why\" }}\n    ]\n  }}\n}}\n\n\
         Rules:\n\
         - `inputs` must satisfy the parameter schema unless status is \"error\".\n\
         - `target` is a dotted path into the JSON result; use numeric segments for array items.\n\
         - `matches` takes either an exact JSON value or a \"/regex/\" string.\n\
         - Only add rules you are confident hold for a correct implementation.",
        tool = describe_tool(tool)
    )
}

fn describe_tool(tool: &ToolDefinition) -> String {
    let mut text = format!("Tool: {}\n", tool.name);
    if !tool.description.trim().is_empty() {
        text.push_str(&format!("Description: {}\n", tool.description.trim()));
    }
    let fields = tool.fields();
    if fields.is_empty() {
        text.push_str("Parameters: none\n");
    } else {
        text.push_str("Parameters:\n");
        for field in fields {
            text.push_str(&format!(
                "- {}: {}{}",
                field.name,
                field.kind.as_deref().unwrap_or("any"),
                if field.required { " (required)" } else { "" }
            ));
            if let Some(description) = field.description {
                text.push_str(&format!(" - {description}"));
            }
            text.push('\n');
        }
    }
    let schema = serde_json::to_string(&tool.input_schema).unwrap_or_default();
    text.push_str(&format!("Input schema: {schema}"));
    text
}
