//! Script options
//!
//! Options come in three layers: built-in defaults, the
//! `script-opts/<client>.conf` file, and the player's runtime
//! `script-opts` property. [`OptionLayers`] keeps the file-layered base and
//! the active set and reports which options changed whenever a layer is
//! reapplied.

use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Identifiers and values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionId {
    ExpireTimeout,
    AppIcon,
    Category,
    Urgency,
    SendThumbnail,
    SendProgress,
    SendSubText,
    ThumbnailSize,
    ScreenshotFlags,
    ThumbnailScaling,
    DisableScaling,
    FocusManual,
    Perfdata,
}

impl OptionId {
    pub const COUNT: usize = 13;

    pub const ALL: [OptionId; OptionId::COUNT] = [
        OptionId::ExpireTimeout,
        OptionId::AppIcon,
        OptionId::Category,
        OptionId::Urgency,
        OptionId::SendThumbnail,
        OptionId::SendProgress,
        OptionId::SendSubText,
        OptionId::ThumbnailSize,
        OptionId::ScreenshotFlags,
        OptionId::ThumbnailScaling,
        OptionId::DisableScaling,
        OptionId::FocusManual,
        OptionId::Perfdata,
    ];

    /// Key used in config files and `script-opts`
    pub fn key(self) -> &'static str {
        match self {
            OptionId::ExpireTimeout => "expire_timeout",
            OptionId::AppIcon => "ntf_app_icon",
            OptionId::Category => "ntf_category",
            OptionId::Urgency => "ntf_urgency",
            OptionId::SendThumbnail => "send_thumbnail",
            OptionId::SendProgress => "send_progress",
            OptionId::SendSubText => "send_sub_text",
            OptionId::ThumbnailSize => "thumbnail_size",
            OptionId::ScreenshotFlags => "screenshot_flags",
            OptionId::ThumbnailScaling => "thumbnail_scaling",
            OptionId::DisableScaling => "disable_scaling",
            OptionId::FocusManual => "focus_manual",
            OptionId::Perfdata => "perfdata",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.key() == key)
    }
}

/// Value held by one option slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptValue {
    Int(i64),
    Flag(bool),
    /// `None` only if a string could not be stored; empty strings are valid
    Str(Option<String>),
}

impl OptValue {
    fn str(s: &str) -> Self {
        OptValue::Str(Some(s.to_string()))
    }

    pub fn is_true(&self) -> bool {
        match self {
            OptValue::Int(i) => *i != 0,
            OptValue::Flag(b) => *b,
            OptValue::Str(s) => s.as_deref().is_some_and(|s| !s.is_empty()),
        }
    }
}

/// Notification urgency levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Normal,
    Critical,
}

impl Urgency {
    fn code(self) -> i64 {
        match self {
            Urgency::Low => 0,
            Urgency::Normal => 1,
            Urgency::Critical => 2,
        }
    }

    fn from_code(code: i64) -> Self {
        match code {
            1 => Urgency::Normal,
            2 => Urgency::Critical,
            _ => Urgency::Low,
        }
    }
}

/// Thumbnail resampling filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingAlgorithm {
    FastBilinear,
    Bilinear,
    Bicubic,
    Lanczos,
}

impl ScalingAlgorithm {
    fn code(self) -> i64 {
        match self {
            ScalingAlgorithm::FastBilinear => 1,
            ScalingAlgorithm::Bilinear => 2,
            ScalingAlgorithm::Bicubic => 4,
            ScalingAlgorithm::Lanczos => 0x200,
        }
    }

    fn from_code(code: i64) -> Self {
        match code {
            1 => ScalingAlgorithm::FastBilinear,
            2 => ScalingAlgorithm::Bilinear,
            0x200 => ScalingAlgorithm::Lanczos,
            _ => ScalingAlgorithm::Bicubic,
        }
    }
}

// ---------------------------------------------------------------------------
// Option set
// ---------------------------------------------------------------------------

/// Where an option assignment came from, for diagnostics
#[derive(Debug, Clone, Copy)]
pub enum Origin<'a> {
    File { client: &'a str, line: usize },
    Runtime,
}

impl fmt::Display for Origin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::File { client, line } => write!(f, "script-opts/{client}.conf:{line}"),
            Origin::Runtime => f.write_str("script-opts"),
        }
    }
}

/// One snapshot of every option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    slots: [OptValue; OptionId::COUNT],
}

impl Default for Options {
    fn default() -> Self {
        Self {
            slots: [
                OptValue::Int(10),
                OptValue::str("mpv"),
                OptValue::str("mpv"),
                OptValue::Int(Urgency::Low.code()),
                OptValue::Flag(true),
                OptValue::Flag(true),
                OptValue::Flag(true),
                OptValue::Int(64),
                OptValue::str("video"),
                OptValue::Int(ScalingAlgorithm::Bicubic.code()),
                OptValue::Flag(false),
                OptValue::Flag(false),
                OptValue::Flag(false),
            ],
        }
    }
}

impl Options {
    pub fn get(&self, id: OptionId) -> &OptValue {
        &self.slots[id as usize]
    }

    pub fn is_true(&self, id: OptionId) -> bool {
        self.get(id).is_true()
    }

    pub fn int(&self, id: OptionId) -> i64 {
        match self.get(id) {
            OptValue::Int(i) => *i,
            _ => 0,
        }
    }

    /// String option, `None` when empty or unset
    pub fn string(&self, id: OptionId) -> Option<&str> {
        match self.get(id) {
            OptValue::Str(Some(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn expire_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.int(OptionId::ExpireTimeout).max(0).unsigned_abs())
    }

    pub fn urgency(&self) -> Urgency {
        Urgency::from_code(self.int(OptionId::Urgency))
    }

    pub fn scaling(&self) -> ScalingAlgorithm {
        ScalingAlgorithm::from_code(self.int(OptionId::ThumbnailScaling))
    }

    pub fn thumbnail_size(&self) -> u32 {
        u32::try_from(self.int(OptionId::ThumbnailSize)).unwrap_or(u32::MAX)
    }

    pub fn screenshot_flags(&self) -> &str {
        match self.get(OptionId::ScreenshotFlags) {
            OptValue::Str(Some(s)) => s,
            _ => "",
        }
    }

    /// Assign one option from its string form.
    ///
    /// Unknown keys and unparsable values are reported and leave the set
    /// untouched, except for urgency and scaling which fall back to their
    /// defaults.
    pub fn set(&mut self, key: &str, value: &str, origin: Origin<'_>) {
        info!("{origin} setting option '{key}' to '{value}'");

        let Some(id) = OptionId::from_key(key) else {
            warn!("{origin} unknown key '{key}', ignoring");
            return;
        };

        let parsed = match id {
            OptionId::ExpireTimeout => parse_int(value).filter(|n| *n >= 0).map(OptValue::Int),
            OptionId::ThumbnailSize => parse_int(value).filter(|n| *n >= 1).map(OptValue::Int),
            OptionId::AppIcon | OptionId::Category | OptionId::ScreenshotFlags => {
                Some(OptValue::str(value))
            }
            OptionId::Urgency => {
                let urgency = match value {
                    "low" => Urgency::Low,
                    "normal" => Urgency::Normal,
                    "critical" => Urgency::Critical,
                    _ => {
                        warn!("{origin} unknown notification urgency '{value}', setting to 'low'");
                        Urgency::Low
                    }
                };
                Some(OptValue::Int(urgency.code()))
            }
            OptionId::ThumbnailScaling => {
                let algorithm = match value {
                    "fast-bilinear" => ScalingAlgorithm::FastBilinear,
                    "bilinear" => ScalingAlgorithm::Bilinear,
                    "bicubic" => ScalingAlgorithm::Bicubic,
                    "lanczos" => ScalingAlgorithm::Lanczos,
                    _ => {
                        warn!(
                            "{origin} unknown thumbnail scaling option '{value}', setting to 'bicubic'"
                        );
                        ScalingAlgorithm::Bicubic
                    }
                };
                Some(OptValue::Int(algorithm.code()))
            }
            OptionId::SendThumbnail
            | OptionId::SendProgress
            | OptionId::SendSubText
            | OptionId::DisableScaling
            | OptionId::FocusManual
            | OptionId::Perfdata => match parse_bool(value) {
                Some(b) => Some(OptValue::Flag(b)),
                None => {
                    warn!(
                        "{origin} error converting value '{value}' for key '{key}' into boolean, using default or config file value"
                    );
                    return;
                }
            },
        };

        match parsed {
            Some(v) => self.slots[id as usize] = v,
            None => warn!(
                "{origin} error converting value '{value}' for key '{key}' into number, or number is insuitable, using default or config file value"
            ),
        }
    }

    /// Layer `key=value` lines from a config file.
    ///
    /// Empty lines, `#` comments and lines without `=` are skipped.
    pub fn apply_file_contents(&mut self, contents: &str, client: &str) {
        for (index, line) in contents.lines().enumerate() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            self.set(key, value, Origin::File { client, line: index + 1 });
        }
    }

    /// Layer the config file at `path` if it exists.
    pub fn apply_file(&mut self, path: &Path, client: &str) -> Result<()> {
        if let Some(contents) = read_config_file(path)? {
            self.apply_file_contents(&contents, client);
        }
        Ok(())
    }

    /// Layer the player's `script-opts` map.
    ///
    /// Only string entries named `<client>-<option>` apply.
    pub fn apply_runtime(&mut self, script_opts: &Map<String, Value>, client: &str) {
        for (key, value) in script_opts {
            let Some(value) = value.as_str() else {
                continue;
            };
            let Some(name) = key
                .strip_prefix(client)
                .and_then(|rest| rest.strip_prefix('-'))
            else {
                continue;
            };
            self.set(name, value, Origin::Runtime);
        }
    }

    /// Options whose value differs between `before` and `after`, in id order.
    pub fn changed(before: &Options, after: &Options) -> Vec<OptionId> {
        OptionId::ALL
            .into_iter()
            .filter(|id| before.get(*id) != after.get(*id))
            .collect()
    }
}

/// Contents of a config file, `None` if it does not exist.
pub fn read_config_file(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Ok(Some(contents))
}

fn parse_int(value: &str) -> Option<i64> {
    value.parse::<i64>().ok()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Layers
// ---------------------------------------------------------------------------

/// The file-layered base and the active option set
#[derive(Debug, Clone, Default)]
pub struct OptionLayers {
    base: Options,
    active: Options,
}

impl OptionLayers {
    /// Start from defaults with the config file layered on top.
    ///
    /// Returns the options that differ from the defaults.
    pub fn with_file_contents(contents: Option<&str>, client: &str) -> (Self, Vec<OptionId>) {
        let defaults = Options::default();
        let mut active = defaults.clone();
        if let Some(contents) = contents {
            active.apply_file_contents(contents, client);
        }
        let changed = Options::changed(&defaults, &active);
        let layers = Self {
            base: active.clone(),
            active,
        };
        (layers, changed)
    }

    pub fn active(&self) -> &Options {
        &self.active
    }

    pub fn base(&self) -> &Options {
        &self.base
    }

    /// Rebuild the active set from the base plus new runtime overrides.
    pub fn apply_runtime(&mut self, script_opts: Option<&Map<String, Value>>, client: &str) -> Vec<OptionId> {
        let previous = std::mem::replace(&mut self.active, self.base.clone());
        if let Some(map) = script_opts {
            self.active.apply_runtime(map, client);
        }
        Options::changed(&previous, &self.active)
    }

    /// Full reload: defaults, then the file, snapshotted as base, then
    /// runtime overrides. Reports changes against the previous active set.
    pub fn reload(
        &mut self,
        file_contents: Option<&str>,
        script_opts: Option<&Map<String, Value>>,
        client: &str,
    ) -> Vec<OptionId> {
        let previous = std::mem::take(&mut self.active);
        let mut fresh = Options::default();
        if let Some(contents) = file_contents {
            fresh.apply_file_contents(contents, client);
        }
        self.base = fresh.clone();
        self.active = fresh;
        if let Some(map) = script_opts {
            self.active.apply_runtime(map, client);
        }
        Options::changed(&previous, &self.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const CLIENT: &str = "notify_osd";

    #[test]
    fn test_defaults() {
        let o = Options::default();
        assert_eq!(o.int(OptionId::ExpireTimeout), 10);
        assert_eq!(o.string(OptionId::AppIcon), Some("mpv"));
        assert_eq!(o.urgency(), Urgency::Low);
        assert!(o.is_true(OptionId::SendThumbnail));
        assert_eq!(o.thumbnail_size(), 64);
        assert_eq!(o.screenshot_flags(), "video");
        assert_eq!(o.scaling(), ScalingAlgorithm::Bicubic);
        assert!(!o.is_true(OptionId::FocusManual));
    }

    #[test]
    fn test_bad_number_keeps_previous() {
        let mut o = Options::default();
        o.set("thumbnail_size", "0", Origin::Runtime);
        o.set("expire_timeout", "12abc", Origin::Runtime);
        o.set("expire_timeout", "-1", Origin::Runtime);
        assert_eq!(o.thumbnail_size(), 64);
        assert_eq!(o.int(OptionId::ExpireTimeout), 10);
    }

    #[test]
    fn test_bad_bool_keeps_previous() {
        let mut o = Options::default();
        o.set("send_progress", "true", Origin::Runtime);
        assert!(o.is_true(OptionId::SendProgress));
        o.set("send_progress", "no", Origin::Runtime);
        assert!(!o.is_true(OptionId::SendProgress));
    }

    #[test]
    fn test_unknown_enum_values_fall_back() {
        let mut o = Options::default();
        o.set("ntf_urgency", "critical", Origin::Runtime);
        assert_eq!(o.urgency(), Urgency::Critical);
        o.set("ntf_urgency", "loud", Origin::Runtime);
        assert_eq!(o.urgency(), Urgency::Low);
        o.set("thumbnail_scaling", "lanczos", Origin::Runtime);
        assert_eq!(o.scaling(), ScalingAlgorithm::Lanczos);
        o.set("thumbnail_scaling", "sinc", Origin::Runtime);
        assert_eq!(o.scaling(), ScalingAlgorithm::Bicubic);
    }

    #[test]
    fn test_unknown_key_ignored() {
        let mut o = Options::default();
        o.set("colour", "blue", Origin::Runtime);
        assert_eq!(o, Options::default());
    }

    #[test]
    fn test_empty_string_is_off() {
        let mut o = Options::default();
        o.set("ntf_category", "", Origin::Runtime);
        assert_eq!(o.string(OptionId::Category), None);
        assert!(!o.is_true(OptionId::Category));
    }

    #[test]
    fn test_file_contents() {
        let mut o = Options::default();
        o.apply_file_contents(
            "# comment\n\nexpire_timeout=3\nnonsense line\nntf_app_icon=a=b\n",
            CLIENT,
        );
        assert_eq!(o.int(OptionId::ExpireTimeout), 3);
        assert_eq!(o.string(OptionId::AppIcon), Some("a=b"));
    }

    #[test]
    fn test_apply_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "perfdata=yes").unwrap();
        let mut o = Options::default();
        o.apply_file(file.path(), CLIENT).unwrap();
        assert!(o.is_true(OptionId::Perfdata));
    }

    #[test]
    fn test_apply_file_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let mut o = Options::default();
        o.apply_file(&dir.path().join("absent.conf"), CLIENT).unwrap();
        assert_eq!(o, Options::default());
    }

    #[test]
    fn test_runtime_prefix_filter() {
        let map = json!({
            "notify_osd-ntf_category": "video",
            "other-ntf_category": "nope",
            "notify_osd-send_thumbnail": "no",
            "notify_osd-thumbnail_size": 5,
        });
        let mut o = Options::default();
        o.apply_runtime(map.as_object().unwrap(), CLIENT);
        assert_eq!(o.string(OptionId::Category), Some("video"));
        assert!(!o.is_true(OptionId::SendThumbnail));
        assert_eq!(o.thumbnail_size(), 64);
    }

    #[test]
    fn test_changed_single_string_slot() {
        let before = Options::default();
        let mut after = before.clone();
        after.set("screenshot_flags", "subtitles", Origin::Runtime);
        assert_eq!(Options::changed(&before, &after), vec![OptionId::ScreenshotFlags]);
    }

    #[test]
    fn test_changed_absent_to_present() {
        let mut before = Options::default();
        before.slots[OptionId::AppIcon as usize] = OptValue::Str(None);
        let after = Options::default();
        assert_eq!(Options::changed(&before, &after), vec![OptionId::AppIcon]);
        assert_eq!(Options::changed(&after, &before), vec![OptionId::AppIcon]);
    }

    #[test]
    fn test_layers_runtime_reverts_to_base() {
        let (mut layers, changed) = OptionLayers::with_file_contents(Some("thumbnail_size=32"), CLIENT);
        assert_eq!(changed, vec![OptionId::ThumbnailSize]);

        let map = json!({"notify_osd-thumbnail_size": "128"});
        let changed = layers.apply_runtime(map.as_object(), CLIENT);
        assert_eq!(changed, vec![OptionId::ThumbnailSize]);
        assert_eq!(layers.active().thumbnail_size(), 128);

        let changed = layers.apply_runtime(None, CLIENT);
        assert_eq!(changed, vec![OptionId::ThumbnailSize]);
        assert_eq!(layers.active().thumbnail_size(), 32);
    }

    #[test]
    fn test_layers_reload() {
        let (mut layers, _) = OptionLayers::with_file_contents(Some("perfdata=yes"), CLIENT);
        let map = json!({"notify_osd-focus_manual": "yes"});
        let changed = layers.reload(Some("ntf_urgency=normal"), map.as_object(), CLIENT);
        assert_eq!(
            changed,
            vec![OptionId::Urgency, OptionId::FocusManual, OptionId::Perfdata]
        );
        assert_eq!(layers.base().urgency(), Urgency::Normal);
        assert!(!layers.base().is_true(OptionId::FocusManual));
    }
}
