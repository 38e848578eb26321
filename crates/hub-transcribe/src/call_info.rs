use chrono::{DateTime, Datelike, Timelike, Utc};
use serde_json::Value;

const RU_MONTHS: [&str; 12] = [
    "января", "февраля", "марта", "апреля", "мая", "июня", "июля", "августа", "сентября", "октября",
    "ноября", "декабря",
];

#[derive(Debug, Clone)]
pub struct CallInfo {
    pub id: String,
    pub subject: Option<String>,
    pub direction: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub duration_human: Option<String>,
    pub status: String,
    pub file_id: Option<String>,
}

/// `SETTINGS.MISSED_CALL` → "Пропущенный"; no end / not completed →
/// "Отменённый"; else "Успешный".
pub fn get_call_status(call: &Value) -> &'static str {
    let missed = call
        .get("SETTINGS")
        .and_then(|s| s.get("MISSED_CALL"))
        .map(is_truthy)
        .unwrap_or(false);
    if missed {
        return "Пропущенный";
    }
    let start = call.get("START_TIME").and_then(|v| v.as_str());
    let end = call.get("END_TIME").and_then(|v| v.as_str());
    let completed = call.get("COMPLETED").and_then(|v| v.as_str());
    if end.is_none() || end == start || !matches!(completed, Some("Y") | Some("y")) {
        return "Отменённый";
    }
    "Успешный"
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty() && s != "0" && s != "N",
        Value::Number(n) => n.as_i64().map(|i| i != 0).unwrap_or(false),
        _ => false,
    }
}

pub fn parse_call_info(call: &Value) -> CallInfo {
    let start = call.get("START_TIME").and_then(|v| v.as_str()).and_then(parse_dt);
    let end = call.get("END_TIME").and_then(|v| v.as_str()).and_then(parse_dt);
    let direction = direction_label(call.get("DIRECTION"));
    let file_id = call
        .get("FILES")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|f| f.get("ID"))
        .map(|v| v.to_string().trim_matches('"').to_string());

    CallInfo {
        id: call.get("ID").map(|v| v.to_string().trim_matches('"').to_string()).unwrap_or_default(),
        subject: call.get("SUBJECT").and_then(|v| v.as_str()).map(str::to_string),
        direction,
        start,
        end,
        duration_human: start.zip(end).map(|(s, e)| calculate_duration(s, e)),
        status: get_call_status(call).to_string(),
        file_id,
    }
}

fn direction_label(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) if s == "1" => "Входящий".to_string(),
        Some(Value::String(s)) if s == "2" => "Исходящий".to_string(),
        Some(Value::Number(n)) if n.as_i64() == Some(1) => "Входящий".to_string(),
        Some(Value::Number(n)) if n.as_i64() == Some(2) => "Исходящий".to_string(),
        _ => "Неизвестно".to_string(),
    }
}

fn parse_dt(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

fn calculate_duration(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let secs = (end - start).num_seconds().max(0);
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// `6 августа 2025, 11:43 (UTC+03:00)` — the call's own timezone offset is
/// not preserved once normalized to UTC, so this formats in UTC.
fn format_dt_human(dt: DateTime<Utc>) -> String {
    format!(
        "{} {} {}, {:02}:{:02} (UTC+00:00)",
        dt.day(),
        RU_MONTHS[dt.month0() as usize],
        dt.year(),
        dt.hour(),
        dt.minute(),
    )
}

/// Summary posted to `crm.timeline.comment.add` after a successful
/// transcription (spec §4.8).
pub fn build_call_summary(info: &CallInfo, transcription: Option<&str>) -> String {
    let mut lines = Vec::new();
    lines.push(info.subject.clone().unwrap_or_else(|| "Звонок".to_string()));
    if !info.direction.is_empty() {
        lines.push(format!("тип: {}", info.direction));
    }
    if let Some(start) = info.start {
        lines.push(format!("дата: {}", format_dt_human(start)));
    }
    if let Some(duration) = &info.duration_human {
        lines.push(format!("длительность: {duration}"));
    }
    if let Some(text) = transcription {
        if !text.is_empty() {
            lines.push("транскрибация:".to_string());
            lines.push(text.to_string());
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_missed_call() {
        let call = json!({"SETTINGS": {"MISSED_CALL": "1"}});
        assert_eq!(get_call_status(&call), "Пропущенный");
    }

    #[test]
    fn status_cancelled_when_no_end() {
        let call = json!({"START_TIME": "2025-08-06T11:43:28+03:00", "COMPLETED": "Y"});
        assert_eq!(get_call_status(&call), "Отменённый");
    }

    #[test]
    fn status_successful() {
        let call = json!({
            "START_TIME": "2025-08-06T11:43:28+03:00",
            "END_TIME": "2025-08-06T11:45:28+03:00",
            "COMPLETED": "Y",
        });
        assert_eq!(get_call_status(&call), "Успешный");
    }

    #[test]
    fn summary_includes_transcription() {
        let call = json!({
            "ID": 42,
            "SUBJECT": "Звонок клиенту",
            "DIRECTION": "2",
            "START_TIME": "2025-08-06T11:43:28+03:00",
            "END_TIME": "2025-08-06T11:45:28+03:00",
            "COMPLETED": "Y",
        });
        let info = parse_call_info(&call);
        let summary = build_call_summary(&info, Some("Привет, это тест"));
        assert!(summary.contains("Исходящий"));
        assert!(summary.contains("транскрибация:"));
        assert!(summary.contains("Привет, это тест"));
    }
}
