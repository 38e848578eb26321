//! `call_list` batch fan-out and pagination aggregation, ported from
//! `original_source/bx24/bx_utils/bitrix_call_list.py`.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{CrmError, Result};

/// Methods whose batch result is wrapped under a named key instead of being
/// a bare list.
fn method_wrappers() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| {
        HashMap::from([
            ("tasks.task.list", "tasks"),
            ("crm.item.list", "items"),
            ("crm.stagehistory.list", "items"),
            ("crm.type.list", "types"),
        ])
    })
}

/// Methods that paginate via `NAV_PARAMS{nPageSize,iNumPage}` instead of
/// `start`.
pub const WEIRD_PAGINATION_METHODS: &[&str] = &[
    "task.item.list",
    "task.items.getlist",
    "task.elapseditem.getlist",
];

const CHUNK_SIZE: usize = 50;

/// Unwraps one batch-result slot into its list of records.
fn unwrap_batch_result(method: &str, value: &Value) -> Result<Vec<Value>> {
    if let Some(wrapper_key) = method_wrappers().get(method) {
        let items = value
            .get(wrapper_key)
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        return Ok(items);
    }
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(_) => {
            // Some methods wrap the bare list as {"items": [...]}.
            if let Some(items) = value.get("items").and_then(|v| v.as_array()) {
                Ok(items.clone())
            } else {
                Ok(vec![value.clone()])
            }
        }
        other => Ok(vec![other.clone()]),
    }
}

/// One command + its query-string params for a batch slot.
pub fn build_batch_cmd(method: &str, params: &Value) -> String {
    let query = crate::encode::encode_form(params);
    if query.is_empty() {
        method.to_string()
    } else {
        format!("{method}?{query}")
    }
}

/// Result of executing a set of batched commands: ordered by slot key
/// `c{j}`, each either `Ok` or an error message.
pub struct BatchResult {
    pub ok: Vec<(usize, Value)>,
    pub errors: Vec<(usize, String)>,
}

impl BatchResult {
    pub fn all_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn from_response(body: &Value, slot_count: usize) -> Self {
        let mut ok = Vec::new();
        let mut errors = Vec::new();
        let result = body.get("result").cloned().unwrap_or(Value::Null);
        let results = result.get("result").cloned().unwrap_or(Value::Null);
        let result_errors = result.get("result_error").cloned().unwrap_or(Value::Null);
        for j in 0..slot_count {
            let key = format!("c{j}");
            if let Some(err) = result_errors.get(&key) {
                if !err.is_null() {
                    errors.push((j, err.to_string()));
                    continue;
                }
            }
            let value = results.get(&key).cloned().unwrap_or(Value::Null);
            ok.push((j, value));
        }
        Self { ok, errors }
    }
}

/// Parameters for a `call_list`-style paginated, filtered fetch.
pub struct CallListRequest<'a> {
    pub method: &'a str,
    pub filter: Value,
    pub select: Vec<String>,
    pub limit: Option<usize>,
}

/// Builds the `cmd` map for a chunk of methods, keyed `c0`, `c1`, ….
pub fn chunk_ids(ids: &[Value]) -> Vec<Vec<Value>> {
    ids.chunks(CHUNK_SIZE).map(|c| c.to_vec()).collect()
}

/// Builds the Bitrix `NAV_PARAMS` block for weird-pagination methods.
pub fn weird_nav_params(page_size: usize, page_num: usize) -> Value {
    json!({"NAV_PARAMS": {"nPageSize": page_size, "iNumPage": page_num}})
}

pub fn is_weird_pagination(method: &str) -> bool {
    WEIRD_PAGINATION_METHODS.contains(&method)
}

/// Builds query params for the next page of a normal (non-weird) method.
pub fn next_page_params(base: &Value, start: usize) -> Value {
    let mut params = base.clone();
    if let Value::Object(ref mut map) = params {
        map.insert("start".to_string(), json!(start));
    }
    params
}

/// Unwraps a single-call (non-batch) list response the same way a batch
/// slot would be.
pub fn unwrap_single(method: &str, value: &Value) -> Result<Vec<Value>> {
    unwrap_batch_result(method, value).map_err(|e| e)
}

/// Re-exported for callers assembling batch slots manually.
pub fn unwrap_slot(method: &str, value: &Value) -> Result<Vec<Value>> {
    unwrap_batch_result(method, value)
}

pub fn batch_error(errors: &[(usize, String)]) -> CrmError {
    let summary = errors
        .iter()
        .map(|(i, e)| format!("slot c{i}: {e}"))
        .collect::<Vec<_>>()
        .join("; ");
    CrmError::BatchError(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_named_wrapper() {
        let value = json!({"tasks": [{"id": 1}, {"id": 2}]});
        let items = unwrap_batch_result("tasks.task.list", &value).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn unwraps_bare_list() {
        let value = json!([{"ID": 1}]);
        let items = unwrap_batch_result("crm.deal.list", &value).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn chunks_ids_at_fifty() {
        let ids: Vec<Value> = (0..120).map(|i| json!(i)).collect();
        let chunks = chunk_ids(&ids);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 50);
        assert_eq!(chunks[2].len(), 20);
    }
}
