use serde_json::Value as JsonValue;

/// Resolves a dotted path such as `data.items.0.name` against a JSON tree.
///
/// Numeric segments index arrays. A missing segment, an empty segment, or
/// traversal through a scalar yields `None`.
pub fn resolve_path<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.').try_fold(value, |current, segment| {
        if segment.is_empty() {
            return None;
        }
        match current {
            JsonValue::Object(map) => map.get(segment),
            JsonValue::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        }
    })
}

pub(super) fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
