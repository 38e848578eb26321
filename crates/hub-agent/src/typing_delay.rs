use std::time::Duration;

use hub_core::normalize::visible_char_count;

const CHARS_PER_MINUTE: f64 = 200.0;
const MAX_DELAY_SECS: f64 = 180.0;

/// `apply_typing_delay` (spec §4.10 step 5): paces the reply so it reads
/// as typed rather than instant, minus time already spent "thinking"
/// (the LLM round trip).
pub fn typing_delay(reply: &str, thinking: Duration) -> Duration {
    let chars = visible_char_count(reply) as f64;
    let target_secs = (chars / CHARS_PER_MINUTE * 60.0).min(MAX_DELAY_SECS);
    let remaining = (target_secs - thinking.as_secs_f64()).max(0.0);
    Duration::from_secs_f64(remaining)
}

pub async fn sleep_for_typing(reply: &str, thinking: Duration) {
    let delay = typing_delay(reply, thinking);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_reply_has_short_delay() {
        let delay = typing_delay("ок", Duration::from_secs(0));
        assert!(delay.as_secs_f64() < 1.0);
    }

    #[test]
    fn long_reply_caps_at_180_seconds() {
        let long = "а".repeat(5000);
        let delay = typing_delay(&long, Duration::from_secs(0));
        assert_eq!(delay.as_secs(), 180);
    }

    #[test]
    fn thinking_time_is_subtracted() {
        let reply = "а".repeat(400); // ~120s target
        let fast = typing_delay(&reply, Duration::from_secs(0));
        let slow = typing_delay(&reply, Duration::from_secs(100));
        assert!(slow < fast);
    }
}
