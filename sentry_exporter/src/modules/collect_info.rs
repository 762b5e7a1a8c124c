use serde_json::{Map, Value};

// The instrumented application serializes its local variables with an extra
// layer of single quotes around every string ("'value'" instead of "value").
// Strip exactly one layer, recursing through objects and arrays; every other
// scalar passes through untouched.
pub fn strip_quoted_strings(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| (key.clone(), strip_quoted_strings(val)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_quoted_strings).collect()),
        Value::String(s) => {
            if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
                Value::String(s[1..s.len() - 1].to_string())
            } else {
                value.clone()
            }
        }
        other => other.clone(),
    }
}

// Walk an event's entries -> threads -> stack frames looking for the first
// frame whose local variables contain a "body" entry, and return its
// normalized value. Only the first qualifying frame is ever used; the scan
// short-circuits across all three levels. Events with no qualifying frame
// yield an empty object.
pub fn extract_collect_info(entries: &[Value]) -> Value {
    for entry in entries {
        let threads = entry
            .get("data")
            .and_then(|data| data.get("values"))
            .and_then(Value::as_array)
            .map(|values| values.as_slice())
            .unwrap_or(&[]);

        for thread in threads {
            // A missing or null stacktrace means the thread has no frames
            let frames = thread
                .get("stacktrace")
                .and_then(|stacktrace| stacktrace.get("frames"))
                .and_then(Value::as_array)
                .map(|frames| frames.as_slice())
                .unwrap_or(&[]);

            for frame in frames {
                if let Some(body) = frame.get("vars").and_then(|vars| vars.get("body")) {
                    return strip_quoted_strings(body);
                }
            }
        }
    }

    Value::Object(Map::new())
}
