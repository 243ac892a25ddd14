//! Observed player properties
//!
//! Every property the OSD watches is described once by [`PropId::spec`], together
//! with the actions a change triggers and whether it feeds the summary or the
//! body text. [`PropertyStore`] owns the last value seen for each of them.

use serde_json::{Map, Value};

use crate::actions::{Action, ActionSet};
use crate::util::{escape_markup, year_of};

/// Wire format a property is observed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Flag,
    Int,
    Double,
    String,
    Node,
}

/// Identifier of an observed property; doubles as the observe id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropId {
    AppName,
    Brightness,
    Chapter,
    Chapters,
    Contrast,
    CurrentVideoImage,
    Duration,
    Edition,
    Editions,
    EofReached,
    Focused,
    Gamma,
    Hue,
    IdleActive,
    ImageDisplayDuration,
    KeepOpen,
    LavfiComplex,
    MediaTitle,
    Metadata,
    MsgLevel,
    MousePos,
    Mute,
    ScriptOpts,
    LoopFile,
    Pause,
    PausedForCache,
    PercentPos,
    PlayDirection,
    PlaylistCount,
    PlaylistPos,
    Saturation,
    Seeking,
    Speed,
    SubText,
    SubVisibility,
    TimePos,
    DetectImage,
    Vid,
    Volume,
}

/// Static description of an observed property
#[derive(Debug, Clone, Copy)]
pub struct PropSpec {
    pub name: &'static str,
    pub format: Format,
    /// String values are markup-escaped when stored
    pub escape: bool,
    /// Actions accumulated on change
    pub actions: ActionSet,
    /// Only accumulate `actions` when the new value is true
    pub if_true: bool,
    pub summary: bool,
    pub body: bool,
}

const fn spec(name: &'static str, format: Format) -> PropSpec {
    PropSpec {
        name,
        format,
        escape: false,
        actions: ActionSet::empty(),
        if_true: false,
        summary: false,
        body: false,
    }
}

impl PropSpec {
    fn on_change(mut self, actions: ActionSet) -> Self {
        self.actions = actions;
        self
    }

    fn if_true(mut self) -> Self {
        self.if_true = true;
        self
    }

    fn summary(mut self) -> Self {
        self.summary = true;
        self
    }

    fn body(mut self) -> Self {
        self.body = true;
        self
    }

    fn escaped(mut self) -> Self {
        self.escape = true;
        self
    }
}

impl PropId {
    pub const COUNT: usize = 39;

    pub const ALL: [PropId; PropId::COUNT] = [
        PropId::AppName,
        PropId::Brightness,
        PropId::Chapter,
        PropId::Chapters,
        PropId::Contrast,
        PropId::CurrentVideoImage,
        PropId::Duration,
        PropId::Edition,
        PropId::Editions,
        PropId::EofReached,
        PropId::Focused,
        PropId::Gamma,
        PropId::Hue,
        PropId::IdleActive,
        PropId::ImageDisplayDuration,
        PropId::KeepOpen,
        PropId::LavfiComplex,
        PropId::MediaTitle,
        PropId::Metadata,
        PropId::MsgLevel,
        PropId::MousePos,
        PropId::Mute,
        PropId::ScriptOpts,
        PropId::LoopFile,
        PropId::Pause,
        PropId::PausedForCache,
        PropId::PercentPos,
        PropId::PlayDirection,
        PropId::PlaylistCount,
        PropId::PlaylistPos,
        PropId::Saturation,
        PropId::Seeking,
        PropId::Speed,
        PropId::SubText,
        PropId::SubVisibility,
        PropId::TimePos,
        PropId::DetectImage,
        PropId::Vid,
        PropId::Volume,
    ];

    /// Observe id used with the player
    pub fn observe_id(self) -> u64 {
        self as u64
    }

    pub fn from_observe_id(id: u64) -> Option<Self> {
        usize::try_from(id).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn spec(self) -> PropSpec {
        use Action::*;
        use Format::*;

        let update = ActionSet::from(Update);
        let reset = ActionSet::from(Reset);
        let shot = ActionSet::from(QueueShot);

        match self {
            // distinguishes player instances where the player exposes it
            PropId::AppName => spec("app-name", String).on_change(update),
            PropId::Brightness => spec("brightness", Int).on_change(shot),
            PropId::Chapter => spec("chapter", Int).on_change(update).body(),
            PropId::Chapters => spec("chapters", Int).on_change(update).body(),
            PropId::Contrast => spec("contrast", Int).on_change(shot),
            PropId::CurrentVideoImage => spec("current-tracks/video/image", Flag),
            PropId::Duration => spec("duration", Int).on_change(update).body(),
            PropId::Edition => spec("edition", Int).on_change(update).body(),
            PropId::Editions => spec("editions", Int).on_change(update).body(),
            PropId::EofReached => spec("eof-reached", Flag).on_change(reset).if_true().body(),
            PropId::Focused => spec("focused", Flag).on_change(Close.into()).if_true(),
            PropId::Gamma => spec("gamma", Int).on_change(shot),
            PropId::Hue => spec("hue", Int).on_change(shot),
            PropId::IdleActive => spec("idle-active", Flag).on_change(update | CheckImage),
            PropId::ImageDisplayDuration => {
                spec("image-display-duration", Double).on_change(update).body()
            }
            PropId::KeepOpen => spec("keep-open", String).on_change(reset).body(),
            PropId::LavfiComplex => spec("lavfi-complex", String).on_change(update | CheckImage),
            PropId::MediaTitle => spec("media-title", String).on_change(update).summary(),
            PropId::Metadata => spec("metadata", Node)
                .on_change(reset | CheckImage)
                .summary()
                .body(),
            PropId::MsgLevel => spec("msg-level", String),
            PropId::MousePos => spec("mouse-pos", Node),
            PropId::Mute => spec("mute", Flag).on_change(update).body(),
            PropId::ScriptOpts => spec("options/script-opts", Node),
            PropId::LoopFile => spec("loop-file", String).on_change(reset).body(),
            PropId::Pause => spec("pause", Flag).on_change(reset).body(),
            PropId::PausedForCache => spec("paused-for-cache", Flag).on_change(update).body(),
            PropId::PercentPos => spec("percent-pos", Double),
            PropId::PlayDirection => spec("play-direction", String).on_change(update).body(),
            PropId::PlaylistCount => spec("playlist-count", Int).on_change(update).body(),
            PropId::PlaylistPos => spec("playlist-pos", Int).on_change(update).body(),
            PropId::Saturation => spec("saturation", Int).on_change(shot),
            PropId::Seeking => spec("seeking", Flag).on_change(update).body(),
            PropId::Speed => spec("speed", Double).on_change(update).body(),
            PropId::SubText => spec("sub-text", String).escaped().on_change(update).body(),
            PropId::SubVisibility => spec("sub-visibility", Flag).on_change(update).body(),
            PropId::TimePos => spec("time-pos", Int).on_change(update).body(),
            // set by a companion script that detects image slideshows
            PropId::DetectImage => {
                spec("user-data/detect-image/detected", Flag).on_change(update).summary()
            }
            PropId::Vid => spec("vid", Int).on_change(update | CheckImage),
            PropId::Volume => spec("volume", Int).on_change(update).body(),
        }
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Last known value of a property
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PropValue {
    #[default]
    Unavailable,
    Flag(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Node(Value),
}

impl PropValue {
    /// Convert a raw node into the property's declared format.
    ///
    /// Mirrors the player's own conversions: numbers truncate to integers,
    /// booleans render as `yes`/`no` and maps as `k=v,...` for string
    /// properties. Values that
    /// cannot be represented are unavailable.
    pub fn from_node(format: Format, node: Option<&Value>, escape: bool) -> Self {
        let Some(node) = node else {
            return PropValue::Unavailable;
        };

        match format {
            Format::Flag => node.as_bool().map_or(PropValue::Unavailable, PropValue::Flag),
            #[allow(clippy::cast_possible_truncation)]
            Format::Int => node
                .as_i64()
                .or_else(|| node.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                .map_or(PropValue::Unavailable, PropValue::Int),
            Format::Double => node.as_f64().map_or(PropValue::Unavailable, PropValue::Double),
            Format::String => {
                let text = match node {
                    Value::String(s) => s.clone(),
                    Value::Bool(true) => "yes".to_string(),
                    Value::Bool(false) => "no".to_string(),
                    Value::Number(n) => n.to_string(),
                    // key/value list options such as msg-level
                    Value::Object(map) => map
                        .iter()
                        .map(|(k, v)| match v {
                            Value::String(s) => format!("{k}={s}"),
                            other => format!("{k}={other}"),
                        })
                        .collect::<Vec<_>>()
                        .join(","),
                    _ => return PropValue::Unavailable,
                };
                PropValue::Str(escape_markup(&text, escape))
            }
            Format::Node => match node {
                Value::Null => PropValue::Unavailable,
                other => PropValue::Node(other.clone()),
            },
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, PropValue::Unavailable)
    }

    /// Truthiness: set flags, non-zero integers and non-empty strings.
    pub fn is_true(&self) -> bool {
        match self {
            PropValue::Flag(b) => *b,
            PropValue::Int(i) => *i != 0,
            PropValue::Str(s) => !s.is_empty(),
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            PropValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            PropValue::Node(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Tags picked out of the `metadata` property.
///
/// Most fields are stored markup-escaped; `artist` and `title` are raw because
/// they end up in the summary, which is never rendered as markup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub artist: Option<String>,
    pub artist_escaped: Option<String>,
    pub date: Option<String>,
    pub date_year: Option<String>,
    pub disc: Option<String>,
    pub discc: Option<String>,
    pub discnumber: Option<String>,
    pub disctotal: Option<String>,
    pub originaldate: Option<String>,
    pub originaldate_year: Option<String>,
    pub originalyear: Option<String>,
    pub title: Option<String>,
    pub totaldiscs: Option<String>,
    pub year: Option<String>,
}

impl Metadata {
    /// Extract known tags. Keys match case-insensitively; the first
    /// occurrence of a tag wins.
    pub fn from_map(map: &Map<String, Value>, markup: bool) -> Self {
        fn first(slot: &mut Option<String>, value: impl FnOnce() -> String) {
            if slot.is_none() {
                *slot = Some(value());
            }
        }

        let mut md = Metadata::default();
        let esc = |s: &str| escape_markup(s, markup);

        for (key, value) in map {
            let Some(v) = value.as_str() else {
                continue;
            };

            match key.to_ascii_lowercase().as_str() {
                "album" => first(&mut md.album, || esc(v)),
                "album_artist" => first(&mut md.album_artist, || esc(v)),
                "artist" => {
                    first(&mut md.artist, || v.to_string());
                    first(&mut md.artist_escaped, || esc(v));
                }
                "date" => {
                    first(&mut md.date, || esc(v));
                    first(&mut md.date_year, || year_of(v, markup));
                }
                "disc" => first(&mut md.disc, || esc(v)),
                "discc" => first(&mut md.discc, || esc(v)),
                "discnumber" => first(&mut md.discnumber, || esc(v)),
                "disctotal" => first(&mut md.disctotal, || esc(v)),
                "originaldate" => {
                    first(&mut md.originaldate, || esc(v));
                    first(&mut md.originaldate_year, || year_of(v, markup));
                }
                "originalyear" => first(&mut md.originalyear, || esc(v)),
                "title" => first(&mut md.title, || v.to_string()),
                "totaldiscs" => first(&mut md.totaldiscs, || esc(v)),
                "year" => first(&mut md.year, || esc(v)),
                _ => {}
            }
        }

        md
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Last known value of every observed property plus values derived from them
#[derive(Debug, Clone)]
pub struct PropertyStore {
    values: Vec<PropValue>,
    metadata: Option<Metadata>,
    mouse_hovered: bool,
    percent_rounded: i64,
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyStore {
    pub fn new() -> Self {
        Self {
            values: vec![PropValue::Unavailable; PropId::COUNT],
            metadata: None,
            mouse_hovered: false,
            percent_rounded: 0,
        }
    }

    pub fn get(&self, id: PropId) -> &PropValue {
        &self.values[id as usize]
    }

    pub fn is_true(&self, id: PropId) -> bool {
        self.get(id).is_true()
    }

    pub fn is_available(&self, id: PropId) -> bool {
        self.get(id).is_available()
    }

    pub fn int(&self, id: PropId) -> Option<i64> {
        self.get(id).as_int()
    }

    pub fn double(&self, id: PropId) -> Option<f64> {
        self.get(id).as_double()
    }

    pub fn string(&self, id: PropId) -> Option<&str> {
        self.get(id).as_str()
    }

    /// Replace the stored value from a change notification.
    ///
    /// Derived state (metadata, hover, rounded percent) follows the value.
    pub fn save(&mut self, id: PropId, node: Option<&Value>, markup: bool) {
        let spec = id.spec();
        let value = PropValue::from_node(spec.format, node, spec.escape && markup);

        match id {
            PropId::Metadata => {
                self.metadata = value.as_map().map(|m| Metadata::from_map(m, markup));
            }
            PropId::MousePos => {
                self.mouse_hovered = value
                    .as_map()
                    .and_then(|m| m.get("hover"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
            }
            PropId::PercentPos => {
                self.percent_rounded = value
                    .as_double()
                    .filter(|p| p.is_normal())
                    .map_or(0, |p| p.round() as i64);
            }
            _ => {}
        }

        self.values[id as usize] = value;
    }

    /// Parsed metadata, `None` while the player has none (e.g. mid track switch)
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn metadata_available(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn mouse_hovered(&self) -> bool {
        self.mouse_hovered
    }

    pub fn percent_rounded(&self) -> i64 {
        self.percent_rounded
    }

    pub fn playlist_count(&self) -> i64 {
        self.int(PropId::PlaylistCount).unwrap_or(0)
    }

    /// Value for the notification's progress hint.
    ///
    /// In image-gallery mode the playlist position stands in for playback
    /// progress.
    pub fn progress(&self, send_progress: bool) -> Option<i32> {
        if self.is_true(PropId::IdleActive) || !send_progress {
            return None;
        }

        if self.is_true(PropId::DetectImage) {
            let count = self.playlist_count();
            let pos = self.int(PropId::PlaylistPos)?;
            if count <= 1 {
                return None;
            }
            #[allow(clippy::cast_precision_loss)]
            let percent = ((pos + 1) as f64 / count as f64 * 100.0).round();
            return i32::try_from(percent as i64).ok();
        }

        i32::try_from(self.percent_rounded).ok()
    }

    /// Whether the player is between files: not idle, but neither a video
    /// track nor metadata is known yet.
    pub fn switching_track(&self) -> bool {
        !self.is_true(PropId::IdleActive)
            && !self.is_available(PropId::Vid)
            && !self.metadata_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_observe_ids_round_trip_table() {
        for (i, id) in PropId::ALL.iter().enumerate() {
            assert_eq!(id.observe_id(), i as u64);
            assert_eq!(PropId::from_observe_id(i as u64), Some(*id));
        }
        assert_eq!(PropId::from_observe_id(PropId::COUNT as u64), None);
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = PropId::ALL.iter().map(|p| p.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), PropId::COUNT);
    }

    #[test]
    fn test_from_node_int_truncates_double() {
        let v = PropValue::from_node(Format::Int, Some(&json!(12.9)), false);
        assert_eq!(v, PropValue::Int(12));
    }

    #[test]
    fn test_from_node_missing_is_unavailable() {
        assert_eq!(
            PropValue::from_node(Format::Flag, None, false),
            PropValue::Unavailable
        );
        assert_eq!(
            PropValue::from_node(Format::Node, Some(&Value::Null), false),
            PropValue::Unavailable
        );
    }

    #[test]
    fn test_from_node_string_from_bool() {
        let v = PropValue::from_node(Format::String, Some(&json!(false)), false);
        assert_eq!(v, PropValue::Str("no".into()));
    }

    #[test]
    fn test_from_node_string_from_key_value_map() {
        let v = PropValue::from_node(Format::String, Some(&json!({"all": "v"})), false);
        assert_eq!(v, PropValue::Str("all=v".into()));
    }

    #[test]
    fn test_msg_level_map_keeps_player_order() {
        let node: Value = serde_json::from_str(r#"{"notify_osd": "v", "all": "no"}"#).unwrap();
        let v = PropValue::from_node(Format::String, Some(&node), false);
        assert_eq!(v, PropValue::Str("notify_osd=v,all=no".into()));
        assert_eq!(
            crate::util::parse_msg_level(v.as_str(), "notify_osd"),
            log::LevelFilter::Off
        );
    }

    #[test]
    fn test_sub_text_escaped_only_with_markup() {
        let mut store = PropertyStore::new();
        store.save(PropId::SubText, Some(&json!("<i>hi</i>")), true);
        assert_eq!(store.string(PropId::SubText), Some("&lt;i&gt;hi&lt;/i&gt;"));
        store.save(PropId::SubText, Some(&json!("<i>hi</i>")), false);
        assert_eq!(store.string(PropId::SubText), Some("<i>hi</i>"));
    }

    #[test]
    fn test_metadata_first_key_wins_case_insensitive() {
        let map: Value = serde_json::from_str(
            r#"{"title": "first", "ARTIST": "A<1>", "TITLE": "second", "artist": "B", "Date": "2001-02-03"}"#,
        )
        .unwrap();
        let md = Metadata::from_map(map.as_object().unwrap(), true);
        assert_eq!(md.title.as_deref(), Some("first"));
        assert_eq!(md.artist.as_deref(), Some("A<1>"));
        assert_eq!(md.artist_escaped.as_deref(), Some("A&lt;1&gt;"));
        assert_eq!(md.date_year.as_deref(), Some("2001"));
        assert_eq!(md.album, None);
    }

    #[test]
    fn test_metadata_upper_case_first_wins() {
        let map: Value = serde_json::from_str(r#"{"TITLE": "upper", "title": "lower"}"#).unwrap();
        let md = Metadata::from_map(map.as_object().unwrap(), false);
        assert_eq!(md.title.as_deref(), Some("upper"));
    }

    #[test]
    fn test_metadata_availability_follows_node() {
        let mut store = PropertyStore::new();
        assert!(!store.metadata_available());
        store.save(PropId::Metadata, Some(&json!({"title": "x"})), false);
        assert!(store.metadata_available());
        store.save(PropId::Metadata, None, false);
        assert!(!store.metadata_available());
    }

    #[test]
    fn test_mouse_hover() {
        let mut store = PropertyStore::new();
        store.save(PropId::MousePos, Some(&json!({"x": 1, "y": 2, "hover": true})), false);
        assert!(store.mouse_hovered());
        store.save(PropId::MousePos, Some(&json!({"x": 1, "y": 2, "hover": false})), false);
        assert!(!store.mouse_hovered());
    }

    #[test]
    fn test_percent_rounded() {
        let mut store = PropertyStore::new();
        store.save(PropId::PercentPos, Some(&json!(41.6)), false);
        assert_eq!(store.percent_rounded(), 42);
        store.save(PropId::PercentPos, Some(&json!(0.0)), false);
        assert_eq!(store.percent_rounded(), 0);
    }

    #[test]
    fn test_progress_hint() {
        let mut store = PropertyStore::new();
        store.save(PropId::PercentPos, Some(&json!(10.2)), false);
        assert_eq!(store.progress(true), Some(10));
        assert_eq!(store.progress(false), None);

        store.save(PropId::DetectImage, Some(&json!(true)), false);
        store.save(PropId::PlaylistCount, Some(&json!(4)), false);
        store.save(PropId::PlaylistPos, Some(&json!(0)), false);
        assert_eq!(store.progress(true), Some(25));

        store.save(PropId::PlaylistCount, Some(&json!(1)), false);
        assert_eq!(store.progress(true), None);

        store.save(PropId::IdleActive, Some(&json!(true)), false);
        assert_eq!(store.progress(true), None);
    }

    #[test]
    fn test_switching_track() {
        let mut store = PropertyStore::new();
        store.save(PropId::IdleActive, Some(&json!(false)), false);
        assert!(store.switching_track());
        store.save(PropId::Vid, Some(&json!(1)), false);
        assert!(!store.switching_track());
    }
}
