use serde_json::Value as JsonValue;

/// Finds the first parseable JSON object or array in free-form model output.
///
/// Fenced code blocks are tried first; after that every `{` or `[` is tried
/// as the start of a value, ignoring whatever follows it.
pub fn extract_json(text: &str) -> Option<JsonValue> {
    fenced_blocks(text)
        .find_map(|block| {
            serde_json::from_str::<JsonValue>(block.trim())
                .ok()
                .filter(is_container)
        })
        .or_else(|| first_embedded_value(text))
}

fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    text.split("```")
        .skip(1)
        .step_by(2)
        .map(|block| match block.split_once('\n') {
            Some((tag, body)) if !tag.trim_start().starts_with(['{', '[']) => body,
            _ => block,
        })
}

fn first_embedded_value(text: &str) -> Option<JsonValue> {
    text.char_indices()
        .filter(|(_, ch)| matches!(ch, '{' | '['))
        .find_map(|(index, _)| {
            let mut stream =
                serde_json::Deserializer::from_str(&text[index..]).into_iter::<JsonValue>();
            match stream.next() {
                Some(Ok(value)) => Some(value),
                _ => None,
            }
        })
}

fn is_container(value: &JsonValue) -> bool {
    value.is_object() || value.is_array()
}
