use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

/// Caller-registered check over the full response data.
///
/// `Ok(false)` and `Err` both fail the rule; `Err` text is reported.
pub type CustomPredicate = Arc<dyn Fn(&JsonValue) -> Result<bool, String> + Send + Sync>;

/// Predicates available to every validator by default.
pub fn builtin_predicates() -> BTreeMap<String, CustomPredicate> {
    let mut predicates: BTreeMap<String, CustomPredicate> = BTreeMap::new();
    predicates.insert("non_empty".to_string(), Arc::new(|data| Ok(non_empty(data))));
    predicates.insert("is_object".to_string(), Arc::new(|data| Ok(data.is_object())));
    predicates.insert("is_array".to_string(), Arc::new(|data| Ok(data.is_array())));
    predicates.insert("is_string".to_string(), Arc::new(|data| Ok(data.is_string())));
    predicates.insert("is_number".to_string(), Arc::new(|data| Ok(data.is_number())));
    predicates
}

fn non_empty(data: &JsonValue) -> bool {
    match data {
        JsonValue::Null => false,
        JsonValue::String(text) => !text.trim().is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
        JsonValue::Bool(_) | JsonValue::Number(_) => true,
    }
}
