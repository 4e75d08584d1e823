use serde_json::Value;

/// Key answer fields in order of priority. Dotted paths reach into nested
/// sections of the valuation output.
const PRIORITY_KEYS: [&str; 11] = [
    "valuation.value_per_share",
    "value_per_share",
    "value_per_share.p50",
    "enterprise_value",
    "materiality",
    "wacc",
    "template",
    "sbc_pct_revenue",
    "total_sbc",
    "succeeded",
    "base_case_value",
];

/// Print just the key answer value from the output.
pub fn print_minimal(value: &Value) {
    println!("{}", minimal_answer(value));
}

fn minimal_answer(value: &Value) -> String {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Value::Object(map) = result_obj {
        for key in PRIORITY_KEYS {
            if let Some(val) = lookup(result_obj, key) {
                if !val.is_null() && !val.is_object() {
                    return format_minimal(val);
                }
            }
        }

        if let Some((key, val)) = map.iter().next() {
            return format!("{}: {}", key, format_minimal(val));
        }
    }

    format_minimal(result_obj)
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |node, key| node.get(key))
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dcf_reports_value_per_share() {
        let out = json!({
            "result": {
                "wacc_used": "0.09",
                "valuation": { "enterprise_value": "1500", "value_per_share": "15" }
            }
        });
        assert_eq!(minimal_answer(&out), "15");
    }

    #[test]
    fn test_monte_carlo_reports_median() {
        let out = json!({ "result": { "value_per_share": { "p50": 21.5 }, "mean": 22.0 } });
        assert_eq!(minimal_answer(&out), "21.5");
    }

    #[test]
    fn test_falls_back_to_first_field() {
        let out = json!({ "result": { "alpha": 1 } });
        assert_eq!(minimal_answer(&out), "alpha: 1");
    }
}
