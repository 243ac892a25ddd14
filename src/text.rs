//! Summary and body composition
//!
//! The summary names what is playing; the body is a few lines of playback
//! state built from the [`PropertyStore`]. Both are capped to the sizes the
//! notification server is known to accept.

use std::fmt::Write;

use crate::props::{PropId, PropertyStore};
use crate::util::{hhmmss, truncate_bytes};

pub const SUMMARY_MAX_BYTES: usize = 511;
pub const BODY_MAX_BYTES: usize = 4095;

/// OSD renderings of chapter and edition, refreshed on change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsdStrings {
    /// Current chapter, markup-escaped
    pub chapter: Option<String>,
    pub chapters: Option<String>,
    /// Current edition, markup-escaped
    pub edition: Option<String>,
    pub editions: Option<String>,
}

/// Timings shown when `perfdata` is enabled, in microseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Perfdata {
    pub thumbnail_us: u128,
    pub show_us: u128,
}

/// Inputs to the body besides the property store
#[derive(Debug, Clone, Copy)]
pub struct BodyContext<'a> {
    pub osd: &'a OsdStrings,
    /// The server renders markup
    pub markup: bool,
    pub send_sub_text: bool,
    pub perfdata: Option<Perfdata>,
}

/// `artist - title`, else the media title, else `No file`.
pub fn compose_summary(props: &PropertyStore) -> String {
    let tagged = props
        .metadata()
        .and_then(|md| Some((md.artist.as_deref()?, md.title.as_deref()?)));

    let mut summary = match tagged {
        Some((artist, title)) => format!("{artist} - {title}"),
        None => match props.string(PropId::MediaTitle) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => "No file".to_string(),
        },
    };
    truncate_bytes(&mut summary, SUMMARY_MAX_BYTES);
    summary
}

pub fn compose_body(props: &PropertyStore, ctx: &BodyContext<'_>) -> String {
    let mut body = String::new();

    write_status_line(&mut body, props);

    // Writing into a String cannot fail.
    let osd = ctx.osd;
    if let (Some(chapter), Some(chapters)) = (&osd.chapter, &osd.chapters) {
        let _ = write!(body, "\nChapter: {chapter} / {chapters}");
    }
    if let (Some(edition), Some(editions)) = (&osd.edition, &osd.editions) {
        let _ = write!(body, "\nEdition: {edition} / {editions}");
    }

    write_release_lines(&mut body, props);

    if let Some(msg) = end_message(props) {
        if ctx.markup {
            let _ = write!(body, "\n<b>{msg}</b>");
        } else {
            let _ = write!(body, "\n{msg}");
        }
    }

    if let Some(pd) = ctx.perfdata {
        let _ = write!(
            body,
            "\nThumbnail postprocess timing (last µs): {}",
            pd.thumbnail_us
        );
        let _ = write!(body, "\nPrevious ntf show rtt (µs): {}", pd.show_us);
    }

    if ctx.send_sub_text && props.is_true(PropId::SubVisibility) {
        if let Some(sub) = props.string(PropId::SubText).filter(|s| !s.is_empty()) {
            let _ = write!(body, "\n{sub}");
        }
    }

    truncate_bytes(&mut body, BODY_MAX_BYTES);
    body
}

// ---------------------------------------------------------------------------
// Lines
// ---------------------------------------------------------------------------

fn write_status_line(body: &mut String, props: &PropertyStore) {
    let count = props.playlist_count();
    if let Some(pos) = props.int(PropId::PlaylistPos) {
        if count > 1 {
            let _ = write!(body, "({:02}/{count:02}) ", pos + 1);
        }
    }

    let glyph = if props.is_true(PropId::PausedForCache) || props.is_true(PropId::Seeking) {
        "⏲"
    } else if props.is_true(PropId::Pause) {
        "⏸"
    } else if props.string(PropId::PlayDirection) == Some("backward") {
        "◀"
    } else {
        "▶"
    };
    body.push_str(glyph);

    let slideshow = props.is_true(PropId::DetectImage);
    if !props.is_true(PropId::IdleActive) && !slideshow {
        if let Some(time) = props.int(PropId::TimePos) {
            let percent = props.percent_rounded();
            match props.int(PropId::Duration) {
                Some(duration) => {
                    let _ = write!(
                        body,
                        " {} / {} ({percent}%)",
                        hhmmss(time),
                        hhmmss(duration)
                    );
                }
                None => {
                    let _ = write!(body, " {} ({percent}%)", hhmmss(time));
                }
            }

            if props.string(PropId::LoopFile).is_some_and(|l| l != "no") {
                body.push_str(" 🔁");
            }
        }
    }

    if let Some(speed) = props.double(PropId::Speed) {
        #[allow(clippy::float_cmp)]
        if speed != 1.0 {
            let _ = write!(body, " ({speed:.2}x)");
        }
    }

    if props.is_true(PropId::Mute) {
        body.push_str(" 🔇");
    }

    if let Some(volume) = props.int(PropId::Volume).filter(|v| *v != 100) {
        let _ = write!(body, " (🔊 {volume}%)");
    }

    match props.double(PropId::ImageDisplayDuration).filter(|d| d.is_normal()) {
        None => {
            let keep_open = props.string(PropId::KeepOpen).unwrap_or_default();
            if !slideshow && !keep_open.is_empty() && keep_open != "always" {
                body.push_str(" (auto)");
            }
        }
        Some(secs) if slideshow => {
            let _ = write!(body, " (ss: {secs:.0}s)");
        }
        Some(_) => {}
    }
}

fn write_release_lines(body: &mut String, props: &PropertyStore) {
    let Some(md) = props.metadata() else {
        return;
    };

    if let Some(album) = &md.album {
        let date = md
            .originalyear
            .as_ref()
            .or(md.originaldate_year.as_ref())
            .or(md.year.as_ref())
            .or(md.date_year.as_ref());
        body.push('\n');
        if let Some(artist) = md.album_artist.as_ref().or(md.artist_escaped.as_ref()) {
            let _ = write!(body, "{artist} - ");
        }
        body.push_str(album);
        if let Some(date) = date {
            let _ = write!(body, " ({date})");
        }
    } else {
        let date = md
            .originalyear
            .as_ref()
            .or(md.originaldate.as_ref())
            .or(md.year.as_ref())
            .or(md.date.as_ref());
        if let Some(date) = date {
            let _ = write!(body, "\nDate: {date}");
        }
    }

    let total = md
        .totaldiscs
        .as_ref()
        .or(md.disctotal.as_ref())
        .or(md.discc.as_ref());
    let disc = md.disc.as_ref().or(md.discnumber.as_ref());
    if let (Some(disc), Some(total)) = (disc, total) {
        if total != "0" && total != "1" {
            let _ = write!(body, "\nDisc: {disc} / {total}");
        }
    }
}

fn end_message(props: &PropertyStore) -> Option<&'static str> {
    if !props.is_true(PropId::EofReached) {
        return None;
    }
    let pos = props.int(PropId::PlaylistPos)?;
    let count = props.playlist_count();
    if count <= 0 || pos < 0 {
        return None;
    }
    if count > 1 && pos + 1 == count {
        Some("end of playlist")
    } else {
        Some("EOF")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn store(pairs: &[(PropId, Value)]) -> PropertyStore {
        let mut props = PropertyStore::new();
        for (id, v) in pairs {
            props.save(*id, Some(v), true);
        }
        props
    }

    fn body(props: &PropertyStore) -> String {
        let osd = OsdStrings::default();
        compose_body(
            props,
            &BodyContext {
                osd: &osd,
                markup: true,
                send_sub_text: true,
                perfdata: None,
            },
        )
    }

    #[test]
    fn test_summary_fallbacks() {
        let mut props = PropertyStore::new();
        assert_eq!(compose_summary(&props), "No file");

        props.save(PropId::MediaTitle, Some(&json!("movie.mkv")), false);
        assert_eq!(compose_summary(&props), "movie.mkv");

        props.save(PropId::Metadata, Some(&json!({"title": "Song"})), false);
        assert_eq!(compose_summary(&props), "movie.mkv");

        props.save(
            PropId::Metadata,
            Some(&json!({"Artist": "Band", "title": "Song"})),
            false,
        );
        assert_eq!(compose_summary(&props), "Band - Song");
    }

    #[test]
    fn test_summary_truncated_on_char_boundary() {
        let mut props = PropertyStore::new();
        props.save(PropId::MediaTitle, Some(&json!("é".repeat(400))), false);
        let summary = compose_summary(&props);
        assert!(summary.len() <= SUMMARY_MAX_BYTES);
        assert_eq!(summary.len(), 510);
    }

    #[test]
    fn test_status_line_playing() {
        let props = store(&[
            (PropId::IdleActive, json!(false)),
            (PropId::TimePos, json!(65)),
            (PropId::Duration, json!(3600)),
            (PropId::PercentPos, json!(1.8)),
            (PropId::PlaylistPos, json!(1)),
            (PropId::PlaylistCount, json!(3)),
            (PropId::Speed, json!(1.0)),
            (PropId::Volume, json!(100)),
        ]);
        assert_eq!(body(&props), "(02/03) ▶ 00:01:05 / 01:00:00 (2%)");
    }

    #[test]
    fn test_status_line_indicators() {
        let props = store(&[
            (PropId::Pause, json!(true)),
            (PropId::TimePos, json!(5)),
            (PropId::LoopFile, json!("inf")),
            (PropId::Speed, json!(1.5)),
            (PropId::Mute, json!(true)),
            (PropId::Volume, json!(80)),
            (PropId::KeepOpen, json!("yes")),
        ]);
        assert_eq!(
            body(&props),
            "⏸ 00:00:05 (0%) 🔁 (1.50x) 🔇 (🔊 80%) (auto)"
        );
    }

    #[test]
    fn test_seeking_wins_over_pause() {
        let props = store(&[
            (PropId::Pause, json!(true)),
            (PropId::Seeking, json!(true)),
        ]);
        assert!(body(&props).starts_with('⏲'));
    }

    #[test]
    fn test_slideshow_marker() {
        let props = store(&[
            (PropId::DetectImage, json!(true)),
            (PropId::TimePos, json!(5)),
            (PropId::ImageDisplayDuration, json!(4.0)),
        ]);
        assert_eq!(body(&props), "▶ (ss: 4s)");
    }

    #[test]
    fn test_release_and_disc_lines() {
        let props = store(&[(
            PropId::Metadata,
            json!({
                "artist": "A&B",
                "album": "Record",
                "date": "1999-01-02",
                "disc": "2",
                "totaldiscs": "3"
            }),
        )]);
        assert_eq!(body(&props), "▶\nA&amp;B - Record (1999)\nDisc: 2 / 3");
    }

    #[test]
    fn test_date_line_without_album() {
        let props = store(&[(
            PropId::Metadata,
            json!({"originaldate": "1970.05.06", "disc": "1", "disctotal": "1"}),
        )]);
        assert_eq!(body(&props), "▶\nDate: 1970.05.06");
    }

    #[test]
    fn test_end_of_playlist_bold() {
        let props = store(&[
            (PropId::EofReached, json!(true)),
            (PropId::PlaylistPos, json!(2)),
            (PropId::PlaylistCount, json!(3)),
        ]);
        assert!(body(&props).ends_with("\n<b>end of playlist</b>"));

        let osd = OsdStrings::default();
        let plain = compose_body(
            &props,
            &BodyContext {
                osd: &osd,
                markup: false,
                send_sub_text: false,
                perfdata: None,
            },
        );
        assert!(plain.ends_with("\nend of playlist"));
    }

    #[test]
    fn test_eof_single_file() {
        let props = store(&[
            (PropId::EofReached, json!(true)),
            (PropId::PlaylistPos, json!(0)),
            (PropId::PlaylistCount, json!(1)),
        ]);
        assert!(body(&props).ends_with("\n<b>EOF</b>"));
    }

    #[test]
    fn test_chapter_and_perfdata_and_subs() {
        let props = store(&[
            (PropId::SubText, json!("a <b>")),
            (PropId::SubVisibility, json!(true)),
        ]);
        let osd = OsdStrings {
            chapter: Some("Intro".into()),
            chapters: Some("4".into()),
            ..OsdStrings::default()
        };
        let out = compose_body(
            &props,
            &BodyContext {
                osd: &osd,
                markup: true,
                send_sub_text: true,
                perfdata: Some(Perfdata {
                    thumbnail_us: 12,
                    show_us: 345,
                }),
            },
        );
        assert_eq!(
            out,
            "▶\nChapter: Intro / 4\
             \nThumbnail postprocess timing (last µs): 12\
             \nPrevious ntf show rtt (µs): 345\
             \na &lt;b&gt;"
        );
    }

    #[test]
    fn test_hidden_subs_omitted() {
        let props = store(&[
            (PropId::SubText, json!("line")),
            (PropId::SubVisibility, json!(false)),
        ]);
        assert_eq!(body(&props), "▶");
    }

    #[test]
    fn test_body_capped() {
        let props = store(&[
            (PropId::SubText, json!("x".repeat(10_000))),
            (PropId::SubVisibility, json!(true)),
        ]);
        assert_eq!(body(&props).len(), BODY_MAX_BYTES);
    }
}
