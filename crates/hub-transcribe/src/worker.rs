use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hub_core::types::MessageType;
use hub_crm::CrmClient;
use hub_helpdesk::HelpdeskClient;
use hub_links::LinkRegistry;
use rusqlite::Connection;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use crate::call_info::{build_call_summary, parse_call_info};
use crate::error::{Result, TranscribeError};
use crate::job::{self, JobRow};
use crate::processed_call;
use crate::stt::SttClient;

/// Concurrency for the transcription worker (spec §4.8): 3 concurrent
/// tasks, dispatcher polling every ~1s for up to `2 * CONCURRENCY` jobs.
const CONCURRENCY: usize = 3;
const DISPATCH_INTERVAL: Duration = Duration::from_secs(1);

pub struct TranscriptionWorker {
    crm_clients: HashMap<String, Arc<CrmClient>>,
    helpdesk: Arc<HelpdeskClient>,
    links: Arc<LinkRegistry>,
    stt: Arc<dyn SttClient>,
    http: reqwest::Client,
    conn: Arc<Mutex<Connection>>,
}

impl TranscriptionWorker {
    pub fn new(
        crm_clients: HashMap<String, Arc<CrmClient>>,
        helpdesk: Arc<HelpdeskClient>,
        links: Arc<LinkRegistry>,
        stt: Arc<dyn SttClient>,
        conn: Arc<Mutex<Connection>>,
    ) -> Self {
        Self {
            crm_clients,
            helpdesk,
            links,
            stt,
            http: reqwest::Client::new(),
            conn,
        }
    }

    fn crm(&self, portal: &str) -> Result<&CrmClient> {
        self.crm_clients
            .get(portal)
            .map(|c| c.as_ref())
            .ok_or_else(|| TranscribeError::Malformed(format!("no CRM client configured for portal {portal}")))
    }

    /// Dispatcher loop: every ~1s, claim up to `2 * CONCURRENCY` jobs and
    /// run each under a shared semaphore. Runs until `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
        let mut ticker = tokio::time::interval(DISPATCH_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("transcription dispatcher shutting down");
                        return;
                    }
                }
            }

            let claimed = {
                let guard = self.conn.lock().expect("transcribe db mutex poisoned");
                match job::claim_batch(&guard, 2 * CONCURRENCY) {
                    Ok(jobs) => jobs,
                    Err(e) => {
                        error!(error = %e, "failed to claim transcription jobs");
                        continue;
                    }
                }
            };

            for claimed_job in claimed {
                let worker = self.clone();
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore closed");
                tokio::spawn(async move {
                    let _permit = permit;
                    worker.process_job(claimed_job).await;
                });
            }
        }
    }

    #[instrument(skip(self, job), fields(job_id = job.id, portal = %job.portal, deal_bx_id = job.deal_bx_id))]
    async fn process_job(&self, job: JobRow) {
        let result = self.transcribe_calls_for_deal(&job.portal, job.deal_bx_id).await;
        let guard = self.conn.lock().expect("transcribe db mutex poisoned");
        match result {
            Ok(()) => {
                if let Err(e) = job::mark_done(&guard, job.id) {
                    error!(job_id = job.id, error = %e, "failed to mark transcription job done");
                }
            }
            Err(e) => {
                warn!(job_id = job.id, error = %e, "transcription job failed, scheduling retry");
                if let Err(mark_err) = job::mark_retry(&guard, job.id, job.attempt, &e.to_string()) {
                    error!(job_id = job.id, error = %mark_err, "failed to mark transcription job for retry");
                }
            }
        }
    }

    /// `TranscribeCallsForDeal(portal, deal_id)` (spec §4.8).
    #[instrument(skip(self))]
    pub async fn transcribe_calls_for_deal(&self, portal: &str, deal_id: i64) -> Result<()> {
        let crm = self.crm(portal)?;
        let last_transcribed_call = {
            let guard = self.conn.lock().expect("transcribe db mutex poisoned");
            hub_dealsync::deal::get(&guard, portal, deal_id)?.and_then(|d| d.last_transcribed_call)
        };

        let mut filter = json!({"OWNER_TYPE_ID": 2, "OWNER_ID": deal_id, "PROVIDER_TYPE_ID": "CALL"});
        if let Some(since) = last_transcribed_call {
            let since = since + chrono::Duration::seconds(1);
            filter[">START_TIME"] = json!(since.to_rfc3339());
        }
        let resp = crm
            .call(
                "crm.activity.list",
                json!({"filter": filter, "select": ["*"], "order": {"START_TIME": "ASC"}}),
            )
            .await?;
        let calls = resp.get("result").and_then(|v| v.as_array()).cloned().unwrap_or_default();

        let links = self.links.get_links_for_deal(portal, deal_id)?;
        let mut max_seen: Option<chrono::DateTime<chrono::Utc>> = last_transcribed_call;

        for call in &calls {
            let info = parse_call_info(call);
            // Download/convert failures are infra faults and propagate (the
            // whole job retries per spec §8); only the STT result itself is
            // recorded as a `ProcessedCall` outcome.
            let text = match self.transcribe_one_call(portal, deal_id, &info).await? {
                Ok(text) => text,
                Err(stt_err) => {
                    warn!(call_id = %info.id, error = %stt_err, "stt transcription failed");
                    let guard = self.conn.lock().expect("transcribe db mutex poisoned");
                    processed_call::upsert(&guard, portal, &info.id, deal_id, None, Some(&stt_err))?;
                    continue;
                }
            };

            let already_sent = {
                let guard = self.conn.lock().expect("transcribe db mutex poisoned");
                processed_call::get(&guard, portal, &info.id)?.map(|r| r.sent_to_bx).unwrap_or(false)
            };
            if !already_sent {
                let summary = build_call_summary(&info, Some(&text));
                crm.call(
                    "crm.timeline.comment.add",
                    json!({"fields": {"ENTITY_ID": deal_id, "ENTITY_TYPE": "deal", "COMMENT": summary.clone()}}),
                )
                .await?;
                for link in &links {
                    self.helpdesk
                        .send_message(link.conversation_id, &summary, MessageType::Outgoing, true)
                        .await?;
                }
                let guard = self.conn.lock().expect("transcribe db mutex poisoned");
                processed_call::mark_sent(&guard, portal, &info.id)?;
            }

            for ts in [info.start, info.end].into_iter().flatten() {
                max_seen = Some(max_seen.map_or(ts, |m| m.max(ts)));
            }
        }

        if let Some(ts) = max_seen {
            let guard = self.conn.lock().expect("transcribe db mutex poisoned");
            hub_dealsync::deal::bump_last_transcribed_call(&guard, portal, deal_id, ts)?;
        }

        Ok(())
    }

    /// Fetches and converts the call recording (infra: propagates `Err` on
    /// failure — no `ProcessedCall` row, job retries per spec §8) then runs
    /// STT (recorded as the `ProcessedCall` outcome either way, per §4.8).
    async fn transcribe_one_call(
        &self,
        portal: &str,
        deal_id: i64,
        info: &crate::call_info::CallInfo,
    ) -> Result<std::result::Result<String, String>> {
        if let Some(existing) = {
            let guard = self.conn.lock().expect("transcribe db mutex poisoned");
            processed_call::get(&guard, portal, &info.id)?
        } {
            if let Some(text) = existing.transcribation {
                return Ok(Ok(text));
            }
        }

        let file_id = info
            .file_id
            .as_ref()
            .ok_or_else(|| TranscribeError::NoFileId(info.id.clone()))?;

        let crm = self.crm(portal)?;
        let file_resp = crm.call("disk.file.get", json!({"id": file_id})).await?;
        let download_url = file_resp
            .get("result")
            .and_then(|r| r.get("DOWNLOAD_URL"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| TranscribeError::Malformed("disk.file.get missing DOWNLOAD_URL".into()))?;

        let tmp_dir = std::env::temp_dir();
        let raw_path = tmp_dir.join(format!("hub-call-{portal}-{deal_id}-{}.raw", info.id));
        self.download_to_file(download_url, &raw_path).await?;

        let wav_path = tmp_dir.join(format!("hub-call-{portal}-{deal_id}-{}.wav", info.id));
        self.convert_to_wav(&raw_path, &wav_path).await?;
        let _ = tokio::fs::remove_file(&raw_path).await;

        let result = self.stt.transcribe(&wav_path).await;
        let _ = tokio::fs::remove_file(&wav_path).await;
        Ok(result.map_err(|e| e.to_string()))
    }

    async fn download_to_file(&self, url: &str, dest: &Path) -> Result<()> {
        let resp = self.http.get(url).send().await?;
        let mut stream = resp.bytes_stream();
        let mut file = tokio::fs::File::create(dest).await?;
        let mut total = 0usize;
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            total += chunk.len();
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        if total == 0 {
            return Err(TranscribeError::EmptyRecording(dest.display().to_string()));
        }
        Ok(())
    }

    /// Resamples to 16-bit mono 16 kHz WAV via `ffmpeg`.
    async fn convert_to_wav(&self, src: &Path, dest: &Path) -> Result<()> {
        let status = tokio::process::Command::new("ffmpeg")
            .args(["-y", "-i"])
            .arg(src)
            .args(["-ac", "1", "-ar", "16000", "-sample_fmt", "s16"])
            .arg(dest)
            .status()
            .await?;
        if !status.success() {
            return Err(TranscribeError::Malformed(format!("ffmpeg exited with {status}")));
        }
        Ok(())
    }
}
