//! Pretty JSON layout used for documents written to disk.
//!
//! Objects and nested arrays are indented like `serde_json::to_string_pretty`, but an
//! array holding only scalars stays on one line, so a shot log reads as
//! `"3": ["red", "blue", "red"]` instead of one entry per line.

use serde_json::Value;

const INDENT: &str = "  ";

/// Render `value` with scalar arrays collapsed onto a single line.
pub fn to_document_string(value: &Value) -> serde_json::Result<String> {
    let mut out = String::new();
    write_value(&mut out, value, 0)?;
    out.push('\n');
    Ok(out)
}

fn write_value(out: &mut String, value: &Value, depth: usize) -> serde_json::Result<()> {
    match value {
        Value::Object(map) if !map.is_empty() => {
            out.push_str("{\n");
            let last = map.len() - 1;
            for (index, (key, item)) in map.iter().enumerate() {
                push_indent(out, depth + 1);
                out.push_str(&serde_json::to_string(key)?);
                out.push_str(": ");
                write_value(out, item, depth + 1)?;
                if index < last {
                    out.push(',');
                }
                out.push('\n');
            }
            push_indent(out, depth);
            out.push('}');
        }
        Value::Array(items) if items.iter().all(is_scalar) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                out.push_str(&serde_json::to_string(item)?);
            }
            out.push(']');
        }
        Value::Array(items) => {
            out.push_str("[\n");
            let last = items.len() - 1;
            for (index, item) in items.iter().enumerate() {
                push_indent(out, depth + 1);
                write_value(out, item, depth + 1)?;
                if index < last {
                    out.push(',');
                }
                out.push('\n');
            }
            push_indent(out, depth);
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shot_log_arrays_stay_on_one_line() {
        let document = json!({
            "progress": {
                "shotLog": {"1": ["red", "blue", "red"], "2": []},
                "sections": [{"a": 1}]
            }
        });

        let text = to_document_string(&document).unwrap();
        assert!(text.contains("\"1\": [\"red\", \"blue\", \"red\"]"));
        assert!(text.contains("\"2\": []"));
        assert!(text.contains("[\n"));
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, document);
    }

    #[test]
    fn empty_object_is_compact() {
        assert_eq!(to_document_string(&json!({})).unwrap(), "{}\n");
    }
}
