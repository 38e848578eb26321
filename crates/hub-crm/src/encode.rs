//! Bitrix24-shaped form body encoding: nested mappings/sequences become
//! bracketed keys (`a[b][c]=…`), empty collections serialize as `key[]=`.
//! Grounds spec §4.1's "Request encoding" and §6's wire-encoding rule.

use serde_json::Value;

/// Encodes a JSON value into a `application/x-www-form-urlencoded` body
/// under the given top-level key prefix, Bitrix24-bracket style.
pub fn encode_form(params: &Value) -> String {
    let mut pairs = Vec::new();
    encode_value("", params, &mut pairs);
    pairs.join("&")
}

fn encode_value(prefix: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if map.is_empty() && !prefix.is_empty() {
                out.push(format!("{}[]=", prefix));
                return;
            }
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}[{k}]")
                };
                encode_value(&key, v, out);
            }
        }
        Value::Array(items) => {
            if items.is_empty() {
                out.push(format!("{}[]=", prefix));
                return;
            }
            for (i, v) in items.iter().enumerate() {
                let key = format!("{prefix}[{i}]");
                encode_value(&key, v, out);
            }
        }
        Value::Null => {
            out.push(format!("{}=", prefix));
        }
        Value::String(s) => {
            out.push(format!("{}={}", prefix, urlencoding::encode(s)));
        }
        Value::Bool(b) => {
            out.push(format!("{}={}", prefix, b));
        }
        Value::Number(n) => {
            out.push(format!("{}={}", prefix, n));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_nested_brackets() {
        let body = encode_form(&json!({"data": {"FIELDS": {"ID": 1234}}}));
        assert_eq!(body, "data[FIELDS][ID]=1234");
    }

    #[test]
    fn encodes_empty_array_as_bracket_equals() {
        let body = encode_form(&json!({"filter": {"TAGS": []}}));
        assert_eq!(body, "filter[TAGS][]=");
    }

    #[test]
    fn encodes_array_indices() {
        let body = encode_form(&json!({"filter": {"ID": [1, 2, 3]}}));
        assert_eq!(body, "filter[ID][0]=1&filter[ID][1]=2&filter[ID][2]=3");
    }
}
