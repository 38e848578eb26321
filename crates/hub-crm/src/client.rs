use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::batch::{self, BatchResult, CallListRequest};
use crate::encode::encode_form;
use crate::error::{CrmError, RefreshErrorCode, Result};
use crate::retry;

/// Two credential modes (spec §4.1): webhook-style (token embedded in the
/// call path) or OAuth bearer (token in the `auth` form field).
#[derive(Debug, Clone)]
pub enum Credential {
    Webhook { token: String },
    OAuth { access_token: String },
}

#[derive(Debug, Clone)]
pub struct OAuthRefreshConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub refresh_url: String,
}

/// Typed, retry-aware CRM RPC client (C1).
pub struct CrmClient {
    http: reqwest::Client,
    base_url: String,
    credential: Arc<RwLock<Credential>>,
    refresh_cfg: Option<OAuthRefreshConfig>,
}

impl CrmClient {
    pub fn new(
        base_url: impl Into<String>,
        credential: Credential,
        timeout_ms: u64,
        refresh_cfg: Option<OAuthRefreshConfig>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            credential: Arc::new(RwLock::new(credential)),
            refresh_cfg,
        })
    }

    fn call_url(&self, method: &str) -> String {
        format!("{}/{}.json", self.base_url.trim_end_matches('/'), method)
    }

    /// Merges credential into the form body per §4.1: webhook token goes in
    /// the path (already baked into `base_url` by the caller), OAuth token
    /// goes into the `auth` form field.
    async fn authed_params(&self, params: &Value) -> Value {
        let cred = self.credential.read().await;
        match &*cred {
            Credential::Webhook { .. } => params.clone(),
            Credential::OAuth { access_token } => {
                let mut merged = params.clone();
                if let Value::Object(ref mut map) = merged {
                    map.insert("auth".to_string(), json!(access_token));
                }
                merged
            }
        }
    }

    /// `Call(method, params) -> JSON`.
    #[instrument(skip(self, params), fields(method = %method))]
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.call_inner(method, params, true).await
    }

    async fn call_inner(&self, method: &str, params: Value, allow_refresh: bool) -> Result<Value> {
        let url = self.call_url(method);
        let body_params = self.authed_params(&params).await;
        let body = encode_form(&body_params);

        let resp = retry::run(|| {
            self.http
                .post(&url)
                .header("content-type", "application/x-www-form-urlencoded")
                .body(body.clone())
                .send()
        })
        .await;

        match resp {
            Err(CrmError::ExpiredToken) if allow_refresh && self.refresh_cfg.is_some() => {
                warn!(method = %method, "access token expired, refreshing once");
                self.refresh().await?;
                self.call_inner(method, params, false).await
            }
            Err(e) => Err(e),
            Ok(r) => r
                .json::<Value>()
                .await
                .map_err(|e| CrmError::Malformed(e.to_string())),
        }
    }

    /// Issues one `batch` request for up to 50 slots with `halt=1`.
    async fn do_batch(&self, cmds: Vec<(String, Value)>) -> Result<BatchResult> {
        let cmd_map: Value = cmds
            .iter()
            .enumerate()
            .map(|(i, (method, params))| {
                (format!("c{i}"), Value::String(batch::build_batch_cmd(method, params)))
            })
            .collect::<serde_json::Map<_, _>>()
            .into();

        let body = self
            .call_inner("batch", json!({"halt": 1, "cmd": cmd_map}), true)
            .await?;
        Ok(BatchResult::from_response(&json!({"result": body}), cmds.len()))
    }

    /// `CallList(method, filter, select, limit?) -> []Record`.
    ///
    /// Handles the ID-filter-only optimization, pagination via batched
    /// `next`/`total`, and the weird-pagination methods' `NAV_PARAMS`.
    #[instrument(skip(self, req), fields(method = %req.method))]
    pub async fn call_list(&self, req: CallListRequest<'_>) -> Result<Vec<Value>> {
        // ID-filter-only optimization: fan out chunks of <=50 ids in one batch.
        if let Some(ids) = sole_id_filter(&req.filter) {
            let chunks = batch::chunk_ids(&ids);
            let cmds: Vec<(String, Value)> = chunks
                .into_iter()
                .map(|chunk| {
                    let params = json!({
                        "filter": {"ID": chunk},
                        "select": req.select,
                    });
                    (req.method.to_string(), params)
                })
                .collect();
            let result = self.do_batch(cmds).await?;
            if !result.all_ok() {
                return Err(batch::batch_error(&result.errors));
            }
            let mut out = Vec::new();
            for (_, value) in result.ok {
                out.extend(batch::unwrap_slot(req.method, &value)?);
            }
            return Ok(out);
        }

        if batch::is_weird_pagination(req.method) {
            return self.call_list_weird_pagination(&req).await;
        }

        // First page.
        let first_params = json!({
            "filter": req.filter,
            "select": req.select,
            "start": 0,
        });
        let first = self.call(req.method, first_params.clone()).await?;
        let mut items = batch::unwrap_slot(req.method, first.get("result").unwrap_or(&first))?;
        let total = first.get("total").and_then(|v| v.as_u64()).unwrap_or(items.len() as u64);
        let next = first.get("next").and_then(|v| v.as_u64());

        if next.is_none() || items.len() as u64 >= total {
            truncate_to_limit(&mut items, req.limit);
            return Ok(items);
        }

        // Remaining offsets fanned out in groups of 50 batched calls.
        let mut offsets = Vec::new();
        let mut offset = next.unwrap();
        while offset < total {
            offsets.push(offset);
            offset += 50;
        }
        for chunk in offsets.chunks(50) {
            let cmds: Vec<(String, Value)> = chunk
                .iter()
                .map(|&start| (req.method.to_string(), batch::next_page_params(&first_params, start as usize)))
                .collect();
            let result = self.do_batch(cmds).await?;
            if !result.all_ok() {
                return Err(batch::batch_error(&result.errors));
            }
            for (_, value) in result.ok {
                items.extend(batch::unwrap_slot(req.method, &value)?);
            }
            if let Some(limit) = req.limit {
                if items.len() >= limit {
                    break;
                }
            }
        }

        truncate_to_limit(&mut items, req.limit);
        Ok(items)
    }

    async fn call_list_weird_pagination(&self, req: &CallListRequest<'_>) -> Result<Vec<Value>> {
        let page_size = 50usize;
        let mut page = 1usize;
        let mut items = Vec::new();
        loop {
            let params = {
                let mut p = batch::weird_nav_params(page_size, page);
                if let Value::Object(ref mut map) = p {
                    map.insert("filter".to_string(), req.filter.clone());
                    map.insert("select".to_string(), json!(req.select));
                }
                p
            };
            let resp = self.call(req.method, params).await?;
            let page_items = batch::unwrap_slot(req.method, resp.get("result").unwrap_or(&resp))?;
            let got = page_items.len();
            items.extend(page_items);
            if let Some(limit) = req.limit {
                if items.len() >= limit {
                    break;
                }
            }
            if got < page_size {
                break;
            }
            page += 1;
        }
        truncate_to_limit(&mut items, req.limit);
        Ok(items)
    }

    /// OAuth refresh: response errors map to typed codes; on success,
    /// persists the new access/refresh tokens.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let cfg = self
            .refresh_cfg
            .as_ref()
            .ok_or_else(|| CrmError::RefreshFailed(RefreshErrorCode::Other))?;

        let body = encode_form(&json!({
            "grant_type": "refresh_token",
            "client_id": cfg.client_id,
            "client_secret": cfg.client_secret,
            "refresh_token": cfg.refresh_token,
        }));

        let resp = self
            .http
            .post(&cfg.refresh_url)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let value: Value = resp.json().await.map_err(|e| CrmError::Malformed(e.to_string()))?;

        if let Some(err) = value.get("error").and_then(|v| v.as_str()) {
            return Err(CrmError::RefreshFailed(RefreshErrorCode::from_body(err)));
        }

        let access_token = value
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CrmError::Malformed("missing access_token in refresh response".into()))?
            .to_string();

        *self.credential.write().await = Credential::OAuth { access_token };
        info!("CRM access token refreshed at {}", chrono::Utc::now().to_rfc3339());
        Ok(())
    }
}

/// If `filter` is exactly `{"ID": [...]}`, returns the id list.
fn sole_id_filter(filter: &Value) -> Option<Vec<Value>> {
    let map = filter.as_object()?;
    if map.len() != 1 {
        return None;
    }
    let ids = map.get("ID")?;
    ids.as_array().cloned()
}

fn truncate_to_limit(items: &mut Vec<Value>, limit: Option<usize>) {
    if let Some(limit) = limit {
        items.truncate(limit);
    }
}
