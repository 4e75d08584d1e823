pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::{Map, Value};

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Scalar fields of `map` with nested objects flattened to dotted keys.
/// Arrays of objects are left out; they are rendered as their own tables.
pub(crate) fn flatten_fields(map: &Map<String, Value>) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    flatten_into("", map, &mut out);
    out
}

fn flatten_into(prefix: &str, map: &Map<String, Value>, out: &mut Vec<(String, Value)>) {
    for (key, val) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match val {
            Value::Object(inner) => flatten_into(&name, inner, out),
            Value::Array(items) if is_record_array(items) => {}
            _ => out.push((name, val.clone())),
        }
    }
}

/// Arrays of objects anywhere under `map`, keyed by their dotted path.
pub(crate) fn record_arrays(map: &Map<String, Value>) -> Vec<(String, &[Value])> {
    let mut out = Vec::new();
    collect_arrays("", map, &mut out);
    out
}

fn collect_arrays<'a>(prefix: &str, map: &'a Map<String, Value>, out: &mut Vec<(String, &'a [Value])>) {
    for (key, val) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match val {
            Value::Object(inner) => collect_arrays(&name, inner, out),
            Value::Array(items) if is_record_array(items) => out.push((name, items.as_slice())),
            _ => {}
        }
    }
}

fn is_record_array(items: &[Value]) -> bool {
    matches!(items.first(), Some(Value::Object(_)))
}
