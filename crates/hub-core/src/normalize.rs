//! Boundary normalization helpers shared across crates: phone numbers,
//! timestamps, file-link splitting, and marker detection (spec §4.2, §4.9,
//! §4.10, §6).

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Strips everything but digits, then applies spec §6's wire rule: a
/// leading `7` or `8` becomes `+7`; anything else is prefixed with `+`.
///
/// `original_source/utils/normalize_phone.py` only rewrites the `7`/`8`
/// case and returns bare digits otherwise — spec §6 is explicit that the
/// `+`-prefixed form is the wire contract, so that's what's implemented
/// here; the source's bare-digit fallback is a bug in the distillation,
/// not a contract to preserve.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return digits;
    }
    match digits.as_bytes()[0] {
        b'7' | b'8' => format!("+7{}", &digits[1..]),
        _ => format!("+{digits}"),
    }
}

/// Helpdesk contact identifier = phone digits without the leading `+`.
pub fn helpdesk_identifier(normalized_phone: &str) -> String {
    normalized_phone.trim_start_matches('+').to_string()
}

/// Accepts epoch seconds, epoch millis (`> 10^12`), or ISO-8601 with a
/// trailing `Z`; emits aware UTC. Mirrors
/// `chatwoot_client.py::_msg_datetime_utc`.
pub fn normalize_timestamp_numeric(value: f64) -> Option<DateTime<Utc>> {
    if value > 1e12 {
        Utc.timestamp_millis_opt(value as i64).single()
    } else {
        Utc.timestamp_opt(value as i64, 0).single()
    }
}

pub fn normalize_timestamp_str(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(n) = value.parse::<f64>() {
        return normalize_timestamp_numeric(n);
    }
    let iso = value.replace('Z', "+00:00");
    DateTime::parse_from_rfc3339(&iso)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `(http[s]?://[^\s]+?\.(?:pdf|jpe?g|png|docx?|xlsx?|pptx?|txt|csv|gif|webp|mp4|avi|zip|rar))`
pub const FILE_LINK_PATTERN: &str =
    r"(?i)https?://[^\s]+?\.(?:pdf|jpe?g|png|docx?|xlsx?|pptx?|txt|csv|gif|webp|mp4|avi|zip|rar)";

fn file_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(FILE_LINK_PATTERN).expect("static regex"))
}

/// Splits a message on file links, preserving order and interleaving text
/// segments with matched links. Used by both C9 (typing-delay char count)
/// and C10 (outbound text/file splitting).
pub fn split_message_by_links(message: &str) -> Vec<String> {
    let re = file_link_regex();
    let mut parts = Vec::new();
    let mut last_end = 0;
    for m in re.find_iter(message) {
        let text = message[last_end..m.start()].trim();
        if !text.is_empty() {
            parts.push(text.trim_matches(|c| c == '(' || c == ')').to_string());
        }
        parts.push(m.as_str().to_string());
        last_end = m.end();
    }
    let tail = message[last_end..].trim();
    if !tail.is_empty() {
        parts.push(tail.trim_matches(|c| c == '(' || c == ')').to_string());
    }
    parts
}

pub fn is_file_link(segment: &str) -> bool {
    file_link_regex().is_match(segment) && file_link_regex().find(segment).map(|m| m.start() == 0 && m.end() == segment.len()).unwrap_or(false)
}

/// Counts visible characters for typing-delay pacing: file-link segments
/// are excluded, short leftover punctuation fragments are dropped.
/// Mirrors `apply_typing_delay.py::visible_char_count`.
pub fn visible_char_count(text: &str) -> usize {
    split_message_by_links(text)
        .into_iter()
        .filter_map(|part| {
            let trimmed = part.trim_matches(|c: char| ".,!?;:- \t".contains(c));
            if trimmed.chars().count() < 2 || is_file_link(trimmed) {
                None
            } else {
                Some(trimmed.chars().count())
            }
        })
        .sum()
}

/// Case-insensitive substring marker set from spec §4.2, checked over
/// non-private, non-activity helpdesk messages to trigger `NotifyResponsible`.
pub const MARKERS: &[&str] = &[
    "звонок",
    "созвон",
    "перезвон",
    "в офис",
    " бот",
    "робот",
    " ии",
    "позвон",
    "встреча",
    "встретимся",
    "встретиться",
    "о встрече",
    "позови",
    "шоурум",
    "шоу рум",
];

/// Returns the first matched marker, if any.
pub fn check_message_for_markers(content: &str) -> Option<&'static str> {
    let lower = content.to_lowercase();
    MARKERS.iter().find(|m| lower.contains(*m)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_phone_equivalence() {
        assert_eq!(normalize_phone("+79991112233"), "+79991112233");
        assert_eq!(normalize_phone("89991112233"), "+79991112233");
        assert_eq!(normalize_phone("79991112233"), "+79991112233");
        assert_eq!(normalize_phone(" (7) 999 111 22 33"), "+79991112233");
    }

    #[test]
    fn normalize_phone_non_ru_prefixes_plus() {
        assert_eq!(normalize_phone("12025550123"), "+12025550123");
    }

    #[test]
    fn helpdesk_identifier_strips_plus() {
        assert_eq!(helpdesk_identifier("+79991112233"), "79991112233");
    }

    #[test]
    fn split_preserves_order_and_urls() {
        let msg =
            "Держите документ: https://site/pricelist.pdf и каталог: https://site/catalog.pdf";
        let parts = split_message_by_links(msg);
        assert_eq!(
            parts,
            vec![
                "Держите документ:",
                "https://site/pricelist.pdf",
                "и каталог:",
                "https://site/catalog.pdf",
            ]
        );
    }

    #[test]
    fn markers_case_insensitive() {
        assert_eq!(
            check_message_for_markers("Давайте организуем ВСТРЕЧУ завтра"),
            Some("встреча")
        );
        assert_eq!(check_message_for_markers("просто текст"), None);
    }

    #[test]
    fn visible_char_count_excludes_links() {
        let msg = "короткий ответ https://site/a.pdf";
        let count = visible_char_count(msg);
        assert_eq!(count, "короткий ответ".chars().count());
    }
}
