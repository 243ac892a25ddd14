//! Shared helpers for text composition and logging
//!
//! Markup escaping, date shortening, time formatting and `msg-level`
//! parsing live here so `props`, `text` and `engine` agree on them.

use log::LevelFilter;
use regex::Regex;
use std::sync::LazyLock;

// ---------------------------------------------------------------------------
// Markup escaping
// ---------------------------------------------------------------------------

/// Escape `<`, `>` and `&` when the notification server renders body markup.
///
/// Without markup support the string is returned unchanged.
pub fn escape_markup(s: &str, markup: bool) -> String {
    if !markup {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Full dates like `2009-06-22`, `2009.06.22` or `2009/06/22`.
static FULL_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}[-./ ][0-9]{2}[-./ ][0-9]{2}$").unwrap());

/// Keep only `YYYY` from a full date, otherwise escape the whole value.
pub fn year_of(s: &str, markup: bool) -> String {
    if FULL_DATE_RE.is_match(s) {
        s[..4].to_string()
    } else {
        escape_markup(s, markup)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Format whole seconds as `HH:MM:SS`. Negative values clamp to zero.
pub fn hhmmss(total_secs: i64) -> String {
    let total = total_secs.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

// ---------------------------------------------------------------------------
// Truncation
// ---------------------------------------------------------------------------

/// Cut a string to at most `max_bytes` bytes without splitting a character.
pub fn truncate_bytes(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

// ---------------------------------------------------------------------------
// msg-level
// ---------------------------------------------------------------------------

/// Map mpv's `msg-level` option onto a log filter for this client.
///
/// Entries are `module=level` separated by commas; `all` and the client's
/// own name apply, the last matching entry wins. `no` silences everything,
/// `v` enables informational messages and `debug`/`trace` the chatty ones.
/// Anything else keeps errors and warnings only.
pub fn parse_msg_level(msg_level: Option<&str>, client_name: &str) -> LevelFilter {
    let Some(msg_level) = msg_level else {
        return LevelFilter::Warn;
    };

    let level = msg_level
        .split(',')
        .filter_map(|entry| entry.split_once('='))
        .filter(|(module, _)| *module == client_name || *module == "all")
        .map(|(_, level)| level)
        .last();

    match level {
        Some("no") => LevelFilter::Off,
        Some("v") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Warn,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- escape_markup --

    #[test]
    fn test_escape_markup_enabled() {
        assert_eq!(escape_markup("a<b>&c", true), "a&lt;b&gt;&amp;c");
    }

    #[test]
    fn test_escape_markup_disabled() {
        assert_eq!(escape_markup("a<b>&c", false), "a<b>&c");
    }

    // -- year_of --

    #[test]
    fn test_year_of_full_date() {
        assert_eq!(year_of("2009-06-22", true), "2009");
        assert_eq!(year_of("1999.01.02", true), "1999");
        assert_eq!(year_of("1999 01 02", false), "1999");
    }

    #[test]
    fn test_year_of_other_shapes() {
        assert_eq!(year_of("2009", true), "2009");
        assert_eq!(year_of("2009-06", true), "2009-06");
        assert_eq!(year_of("20a9-06-22", true), "20a9-06-22");
        assert_eq!(year_of("<2009-06-2>", true), "&lt;2009-06-2&gt;");
    }

    // -- hhmmss --

    #[test]
    fn test_hhmmss() {
        assert_eq!(hhmmss(0), "00:00:00");
        assert_eq!(hhmmss(59), "00:00:59");
        assert_eq!(hhmmss(3661), "01:01:01");
        assert_eq!(hhmmss(-5), "00:00:00");
    }

    // -- truncate_bytes --

    #[test]
    fn test_truncate_bytes_multibyte() {
        let mut s = "ab▶cd".to_string();
        truncate_bytes(&mut s, 3);
        assert_eq!(s, "ab");
    }

    #[test]
    fn test_truncate_bytes_short() {
        let mut s = "abc".to_string();
        truncate_bytes(&mut s, 10);
        assert_eq!(s, "abc");
    }

    // -- parse_msg_level --

    #[test]
    fn test_msg_level_default() {
        assert_eq!(parse_msg_level(None, "notify_osd"), LevelFilter::Warn);
        assert_eq!(parse_msg_level(Some(""), "notify_osd"), LevelFilter::Warn);
    }

    #[test]
    fn test_msg_level_client_and_all() {
        assert_eq!(
            parse_msg_level(Some("all=v"), "notify_osd"),
            LevelFilter::Info
        );
        assert_eq!(
            parse_msg_level(Some("all=v,notify_osd=debug"), "notify_osd"),
            LevelFilter::Debug
        );
        assert_eq!(
            parse_msg_level(Some("notify_osd=no,ffmpeg=trace"), "notify_osd"),
            LevelFilter::Off
        );
    }

    #[test]
    fn test_msg_level_trailing_all_overrides_client() {
        assert_eq!(
            parse_msg_level(Some("notify_osd=v,all=no"), "notify_osd"),
            LevelFilter::Off
        );
    }

    #[test]
    fn test_msg_level_other_module_ignored() {
        assert_eq!(
            parse_msg_level(Some("cplayer=trace"), "notify_osd"),
            LevelFilter::Warn
        );
    }
}
