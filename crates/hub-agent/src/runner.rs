use tracing::{info, warn};

use crate::error::{AgentError, Result};
use crate::provider::Message;
use crate::router::RouterAgent;

pub struct RunContext<'a> {
    pub agent_code: &'a str,
    pub conversation_id: i64,
}

pub struct RunResult {
    pub final_output: String,
    pub specialist: &'static str,
}

/// `Runner.run(router, input=history, ctx, max_turns=8)` (spec §4.10 step
/// 4). No direct port of the Python `agents` SDK's tool loop exists here
/// (see DESIGN.md) — handoff is single-shot: one routing call picks a
/// specialist, that specialist's own provider call produces
/// `final_output`. `max_turns` bounds retries against transient provider
/// failures instead of a multi-step tool loop.
pub async fn run(router: &RouterAgent, history: &[Message], ctx: &RunContext<'_>, max_turns: u32) -> Result<RunResult> {
    let specialist = router.route(history).await?;

    let mut last_err: Option<AgentError> = None;
    for attempt in 0..max_turns.max(1) {
        match specialist.reply(history).await {
            Ok(final_output) => {
                info!(
                    agent_code = %ctx.agent_code,
                    conversation_id = ctx.conversation_id,
                    specialist = specialist.kind.label(),
                    attempt,
                    "specialist produced final output"
                );
                return Ok(RunResult { final_output, specialist: specialist.kind.label() });
            }
            Err(e) => {
                warn!(agent_code = %ctx.agent_code, attempt, error = %e, "specialist reply failed, retrying");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or(AgentError::NoRoute))
}
