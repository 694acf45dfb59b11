use serde_json::Value;

/// Print just the key answer value from the output.
///
/// Backsolve results print the solved input (equity value or implied
/// volatility, per the request's target), allocations print the allocated
/// total, and breakpoint results print the interval count.
pub fn print_minimal(value: &Value) {
    println!("{}", render(value));
}

fn render(value: &Value) -> String {
    // Try to extract the "result" envelope
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Value::Object(map) = result_obj {
        // Backsolve: the solved input is the answer
        if map.contains_key("converged") {
            let key = match map.get("target").and_then(Value::as_str) {
                Some("Volatility") => "volatility",
                _ => "equity_value",
            };
            if let Some(val) = map.get(key) {
                return format_minimal(val);
            }
        }

        // Allocation: the conservation block carries the allocated total
        if let Some(Value::Object(conservation)) = map.get("conservation") {
            if let Some(val) = conservation.get("allocated_total") {
                return format_minimal(val);
            }
        }

        // Breakpoint analysis: the interval count
        if let Some(Value::Array(bps)) = map.get("breakpoints") {
            return bps.len().to_string();
        }

        // Fall back to first field
        if let Some((key, val)) = map.iter().next() {
            return format!("{}: {}", key, format_minimal(val));
        }
    }

    // Not an object, just print directly
    format_minimal(result_obj)
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
    fn test_equity_backsolve_prints_equity_value() {
        let value = json!({
            "result": {
                "target": "EquityValue",
                "equity_value": "4700000",
                "volatility": "0.6",
                "converged": true
            }
        });
        assert_eq!(render(&value), "4700000");
    }

    #[test]
    fn test_volatility_backsolve_prints_volatility() {
        let value = json!({
            "result": {
                "target": "Volatility",
                "equity_value": "5000000",
                "volatility": "0.6",
                "converged": true
            }
        });
        assert_eq!(render(&value), "0.6");
    }

    #[test]
    fn test_allocation_prints_allocated_total() {
        let value = json!({
            "result": {
                "securities": [],
                "conservation": { "allocated_total": "5000000" }
            }
        });
        assert_eq!(render(&value), "5000000");
    }

    #[test]
    fn test_breakpoint_analysis_prints_interval_count() {
        let value = json!({
            "result": { "breakpoints": [{}, {}, {}] }
        });
        assert_eq!(render(&value), "3");
    }
}
