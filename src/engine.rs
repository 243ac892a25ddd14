//! Decision engine
//!
//! [`Engine`] owns every piece of session state: the property store, the
//! option layers, the notification session, the thumbnail pipeline and the
//! expire timer. Events only accumulate actions and mark text dirty;
//! [`Engine::resolve`] turns the accumulated set into at most one
//! notification operation and at most one screenshot request per batch.

use log::{debug, error, info, warn};
use serde_json::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::actions::{Action, ActionSet, Lifecycle};
use crate::notification::{NotificationServer, NotificationSession, SessionSetup, DEFAULT_APP_NAME};
use crate::options::{read_config_file, OptionId, OptionLayers};
use crate::player::{FrameReply, Player, PlayerEvent};
use crate::props::{Format, PropId, PropValue, PropertyStore};
use crate::text::{compose_body, compose_summary, BodyContext, OsdStrings, Perfdata};
use crate::thumbnail::{FrameOutcome, RawFrame, ScaleSettings, ThumbnailPipeline};
use crate::timer::DebounceTimer;
use crate::util::{escape_markup, parse_msg_level};

/// Whether the event loop should keep going after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Shutdown,
}

pub struct Engine<P, S> {
    player: P,
    client_name: String,
    props: PropertyStore,
    options: OptionLayers,
    session: NotificationSession<S>,
    thumbnails: ThumbnailPipeline,
    timer: DebounceTimer,
    actions: ActionSet,
    /// Set by the `open` message; bypasses focus and close suppression
    force_open: bool,
    /// The player exposes `app-name`
    has_app_name: bool,

    summary: String,
    body: String,
    rewrite_summary: bool,
    rewrite_body: bool,
    osd: OsdStrings,

    pd_thumbnail: Duration,
    pd_show: Duration,
}

impl<P: Player, S: NotificationServer> Engine<P, S> {
    pub fn new(player: P, server: S, client_name: impl Into<String>) -> Self {
        Self {
            player,
            client_name: client_name.into(),
            props: PropertyStore::new(),
            options: OptionLayers::default(),
            session: NotificationSession::new(server),
            thumbnails: ThumbnailPipeline::new(),
            timer: DebounceTimer::new(),
            actions: ActionSet::empty(),
            force_open: false,
            has_app_name: false,
            summary: String::new(),
            body: String::new(),
            rewrite_summary: false,
            rewrite_body: false,
            osd: OsdStrings::default(),
            pd_thumbnail: Duration::ZERO,
            pd_show: Duration::ZERO,
        }
    }

    /// Bring the session up: log level, initial text, notification,
    /// config file and property observation, in that order.
    pub fn start(&mut self) {
        let msg_level = self.player.get_property("msg-level");
        let msg_level = PropValue::from_node(Format::String, msg_level.as_ref(), false);
        log::set_max_level(parse_msg_level(msg_level.as_str(), &self.client_name));

        self.summary = compose_summary(&self.props);
        self.body = self.compose_body();

        self.init_session();

        let contents = self.read_config();
        let (layers, changed) = OptionLayers::with_file_contents(contents.as_deref(), &self.client_name);
        self.options = layers;
        self.run_changed(&changed);
        // the first property changes decide what happens next
        self.actions.clear();

        self.has_app_name = self.check_app_name_support();
        self.observe_all(false);

        info!("started as {}", self.client_name);
    }

    /// Orderly teardown on player shutdown
    pub fn shutdown(&mut self) {
        self.timer.disarm();
        self.thumbnails.teardown();
        self.session.uninit();
        info!("shut down");
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    pub fn server(&self) -> &S {
        self.session.server()
    }

    pub fn server_mut(&mut self) -> &mut S {
        self.session.server_mut()
    }

    pub fn props(&self) -> &PropertyStore {
        &self.props
    }

    pub fn options(&self) -> &OptionLayers {
        &self.options
    }

    pub fn thumbnails(&self) -> &ThumbnailPipeline {
        &self.thumbnails
    }

    pub fn timer(&self) -> &DebounceTimer {
        &self.timer
    }

    pub fn pending_actions(&self) -> ActionSet {
        self.actions
    }

    pub fn is_force_open(&self) -> bool {
        self.force_open
    }

    pub fn is_notification_active(&self) -> bool {
        self.session.is_active()
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Add actions to the current batch.
    pub fn accumulate(&mut self, actions: impl Into<ActionSet>) {
        self.actions.extend(actions.into());
    }

    pub fn handle_event(&mut self, event: PlayerEvent) -> Control {
        match event {
            PlayerEvent::PropertyChange { id, data } => self.on_property_change(id, data),
            PlayerEvent::VideoReconfig => {
                // a screenshot taken now shows the new file
                debug!("video reconfig");
                self.actions |= Action::ForcedQueueShot;
            }
            PlayerEvent::Seek => {
                debug!("seeked");
                self.actions |= Action::Reset;
            }
            PlayerEvent::CommandReply { request_id, result } => {
                self.on_command_reply(request_id, result);
            }
            PlayerEvent::ClientMessage(args) => self.on_client_message(&args),
            PlayerEvent::Shutdown => return Control::Shutdown,
        }
        Control::Continue
    }

    /// Next time [`poll_timer`](Self::poll_timer) needs to run
    pub fn timer_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Inject `Close` if the expire timer ran out. Returns `true` on expiry.
    pub fn poll_timer(&mut self, now: Instant) -> bool {
        if !self.timer.take_expired(now) {
            return false;
        }
        debug!("expire timer expired");
        self.actions |= Action::Close;
        true
    }

    fn on_property_change(&mut self, id: u64, data: Option<Value>) {
        let Some(prop) = PropId::from_observe_id(id) else {
            debug!("change for unknown observe id {id}");
            return;
        };
        let spec = prop.spec();

        let was_hovered = self.props.mouse_hovered();
        let old_rounded = self.props.percent_rounded();
        self.props.save(prop, data.as_ref(), self.session.body_markup());

        if !spec.if_true || self.props.is_true(prop) {
            self.actions.extend(spec.actions);
        }
        if spec.summary {
            self.rewrite_summary = true;
        }
        if spec.body {
            self.rewrite_body = true;
        }

        match prop {
            PropId::AppName => self.apply_app_name(),
            PropId::Chapter | PropId::Chapters => {
                let (current, total) = self.osd_pair("chapter", "chapters");
                self.osd.chapter = current;
                self.osd.chapters = total;
            }
            PropId::Edition | PropId::Editions => {
                let (current, total) = self.osd_pair("edition", "editions");
                self.osd.edition = current;
                self.osd.editions = total;
            }
            PropId::IdleActive => {
                self.apply_progress();
                self.rewrite_body = true;
            }
            PropId::MousePos => {
                if !was_hovered && self.props.mouse_hovered() {
                    self.actions |= Action::Close;
                }
            }
            PropId::MsgLevel => {
                let level = parse_msg_level(self.props.string(PropId::MsgLevel), &self.client_name);
                log::set_max_level(level);
            }
            PropId::ScriptOpts => {
                let script_opts = data.as_ref().and_then(Value::as_object);
                let changed = self.options.apply_runtime(script_opts, &self.client_name);
                self.run_changed(&changed);
            }
            PropId::PercentPos => {
                // cover art does not change with position
                if !self.props.is_true(PropId::CurrentVideoImage) {
                    self.actions |= Action::QueueShot;
                }
                if old_rounded != self.props.percent_rounded() {
                    self.apply_progress();
                    self.actions |= Action::Update;
                    self.rewrite_body = true;
                }
            }
            PropId::PlaylistCount | PropId::PlaylistPos | PropId::DetectImage => {
                self.apply_progress();
            }
            _ => {}
        }

        debug!("property changed, {}", spec.name);
    }

    /// Escaped current value and raw total of a chapter-like property pair.
    fn osd_pair(&mut self, current: &str, total: &str) -> (Option<String>, Option<String>) {
        let markup = self.session.body_markup();
        let Some(current) = self.player.osd_string(current) else {
            return (None, None);
        };
        (Some(escape_markup(&current, markup)), self.player.osd_string(total))
    }

    fn on_client_message(&mut self, args: &[String]) {
        let Some(command) = args.first() else {
            return;
        };

        match command.as_str() {
            "close" => {
                self.force_open = false;
                self.actions |= Action::Close;
            }
            "open" => {
                self.force_open = true;
                self.actions |= Action::Reset;
            }
            "reload-config" => self.reload_config(),
            other => debug!("ignoring client message '{other}'"),
        }
    }

    fn on_command_reply(&mut self, request_id: u64, result: Result<FrameReply, String>) {
        if !self.thumbnails.is_enabled() {
            return;
        }
        if !self.thumbnails.take_reply(request_id) {
            debug!("ignoring stale screenshot reply {request_id}");
            return;
        }

        debug!("post-processing screenshot");

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!("screenshot failed: {e}");
                return;
            }
        };
        let frame = match RawFrame::from_reply(reply) {
            Ok(frame) => frame,
            Err(e) => {
                error!("{e}");
                return;
            }
        };

        let settings = self.scale_settings();
        match self.thumbnails.accept(&frame, settings) {
            Ok(FrameOutcome::Processed { .. }) => {
                self.session.set_image(self.thumbnails.image());
                if self.options.active().is_true(OptionId::Perfdata) {
                    self.pd_thumbnail = self.thumbnails.last_process_time();
                    self.rewrite_body = true;
                }
                self.actions |= Action::Update;
            }
            Ok(FrameOutcome::Skipped) => {
                debug!("skipping frame of a geometry that failed before");
            }
            Err(e) => {
                error!("{e}, disabling thumbnails for this source");
                // a failed build leaves no context and remembers the geometry
                if self.thumbnails.has_context() {
                    self.thumbnails.teardown();
                }
                self.session.set_image(None);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Options
    // -----------------------------------------------------------------------

    fn read_config(&mut self) -> Option<String> {
        let path = self.config_path()?;
        debug!("reading config from {}", path.display());
        match read_config_file(&path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("{e:#}");
                None
            }
        }
    }

    fn config_path(&mut self) -> Option<PathBuf> {
        let file = format!("{}.conf", self.client_name);
        self.player
            .expand_path(&format!("~~home/script-opts/{file}"))
            .or_else(|| dirs::config_dir().map(|d| d.join("mpv").join("script-opts").join(file)))
    }

    fn reload_config(&mut self) {
        info!("reloading config");
        let contents = self.read_config();
        let script_opts = self.player.get_property("options/script-opts");
        let changed = self.options.reload(
            contents.as_deref(),
            script_opts.as_ref().and_then(Value::as_object),
            &self.client_name,
        );
        self.run_changed(&changed);
    }

    /// Immediate side effects and follow-up actions of changed options.
    fn run_changed(&mut self, changed: &[OptionId]) {
        for id in changed {
            info!("option {} changed", id.key());
            match id {
                OptionId::AppIcon => {
                    self.session
                        .set_app_icon(self.options.active().string(OptionId::AppIcon));
                    self.actions |= Action::Update;
                }
                OptionId::Category => {
                    self.session
                        .set_category(self.options.active().string(OptionId::Category));
                    self.actions |= Action::Update;
                }
                OptionId::Urgency => {
                    self.session.set_urgency(self.options.active().urgency());
                    self.actions |= Action::Update;
                }
                OptionId::SendThumbnail => {
                    // enabling never queues on its own, so queue here
                    self.actions |= Action::CheckImage;
                    if self.options.active().is_true(OptionId::SendThumbnail) {
                        self.actions |= Action::QueueShot;
                    }
                }
                OptionId::SendProgress => {
                    self.apply_progress();
                    self.actions |= Action::Update;
                }
                OptionId::SendSubText | OptionId::Perfdata => {
                    self.actions |= Action::Update;
                    self.rewrite_body = true;
                }
                OptionId::ThumbnailSize | OptionId::ThumbnailScaling | OptionId::DisableScaling => {
                    self.destroy_thumbnail();
                    self.actions |= Action::QueueShot;
                }
                OptionId::ScreenshotFlags => self.actions |= Action::QueueShot,
                OptionId::FocusManual => self.actions |= Action::Reset,
                OptionId::ExpireTimeout => {}
            }
        }
    }

    fn scale_settings(&self) -> ScaleSettings {
        let active = self.options.active();
        ScaleSettings {
            target: active.thumbnail_size(),
            algorithm: active.scaling(),
            disabled: active.is_true(OptionId::DisableScaling),
        }
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Act on everything accumulated since the last call, then start a new
    /// batch.
    pub fn resolve(&mut self, now: Instant) {
        if self.actions.contains(Action::CheckImage) {
            self.check_image();
        }

        if self.actions.contains(Action::ForcedQueueShot) {
            self.queue_screenshot(true);
        } else if self.actions.contains(Action::QueueShot) {
            self.queue_screenshot(false);
        }

        match self.actions.lifecycle(self.force_open) {
            Lifecycle::Close => {
                self.timer.disarm();
                self.close();
            }
            // metadata missing while not idle means a track switch is under
            // way; the change that completes it triggers the next action
            Lifecycle::Reset if self.eligible() => self.reset(now),
            Lifecycle::Update if self.eligible() && (self.timer.is_armed() || self.force_open) => {
                self.refresh();
            }
            _ => {}
        }

        self.actions.clear();
        debug!("back to sleep ~");
    }

    /// The user is looking at the player
    fn focused(&self) -> bool {
        self.props.is_true(PropId::Focused)
            || self.props.mouse_hovered()
            || self.options.active().is_true(OptionId::FocusManual)
    }

    fn eligible(&self) -> bool {
        let ready = (self.props.metadata_available() && self.props.is_available(PropId::TimePos))
            || self.props.is_true(PropId::IdleActive);
        (!self.focused() || self.force_open) && ready
    }

    /// Enable or disable thumbnails.
    ///
    /// Screenshots keep returning the last frame after the video goes away,
    /// so this cannot be inferred from failed screenshots.
    fn check_image(&mut self) {
        let props = &self.props;
        let disable = props.is_true(PropId::IdleActive)
            || !self.options.active().is_true(OptionId::SendThumbnail)
            || (!props.is_available(PropId::Vid)
                && !props.is_true(PropId::LavfiComplex)
                && !props.switching_track());

        if disable {
            if self.thumbnails.set_enabled(false) {
                info!("notification image disabled");
                self.destroy_thumbnail();
                self.actions |= Action::Update;
            }
            return;
        }

        if self.thumbnails.set_enabled(true) {
            info!("notification image enabled");
        }
    }

    fn destroy_thumbnail(&mut self) {
        self.thumbnails.teardown();
        self.session.set_image(None);
    }

    fn queue_screenshot(&mut self, force: bool) {
        if !self.thumbnails.is_enabled() || (!self.timer.is_armed() && !force && !self.force_open) {
            return;
        }

        let id = self.thumbnails.next_request();
        let flags = self.options.active().screenshot_flags();
        match self.player.request_screenshot(id, flags) {
            Ok(()) => {
                self.thumbnails.mark_pending(id);
                debug!("queued screenshot {id}");
            }
            Err(e) => error!("failed to queue screenshot: {e:#}"),
        }
    }

    fn reset(&mut self, now: Instant) {
        debug!("notification reset");
        let was_armed = self.timer.is_armed();
        self.timer.arm(now, self.options.active().expire_timeout());
        if !was_armed {
            self.queue_screenshot(false);
        }
        self.refresh();
    }

    fn close(&mut self) {
        if let Err(e) = self.session.close() {
            error!("failed to close notification: {e}");
            // recreated by the next refresh, never by a close
            self.session.uninit();
        }
    }

    /// Rewrite dirty text, update and show.
    fn refresh(&mut self) {
        if !self.session.is_active() {
            self.reinit();
            return;
        }

        if self.rewrite_summary {
            debug!("writing summary");
            self.summary = compose_summary(&self.props);
        }
        if self.rewrite_body {
            debug!("writing body");
            self.body = self.compose_body();
        }
        if self.rewrite_summary || self.rewrite_body {
            self.session.update(&self.summary, &self.body);
        }
        self.rewrite_summary = false;
        self.rewrite_body = false;

        let start = Instant::now();
        if let Err(e) = self.session.show() {
            error!("failed to show notification: {e}");
            self.reinit();
        }

        if self.options.active().is_true(OptionId::Perfdata) {
            self.pd_show = start.elapsed();
            self.rewrite_body = true;
        }
    }

    fn compose_body(&self) -> String {
        let active = self.options.active();
        let perfdata = active.is_true(OptionId::Perfdata).then(|| Perfdata {
            thumbnail_us: self.pd_thumbnail.as_micros(),
            show_us: self.pd_show.as_micros(),
        });
        compose_body(
            &self.props,
            &BodyContext {
                osd: &self.osd,
                markup: self.session.body_markup(),
                send_sub_text: active.is_true(OptionId::SendSubText),
                perfdata,
            },
        )
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    fn init_session(&mut self) {
        let active = self.options.active();
        let setup = SessionSetup {
            app_name: app_name(&self.props),
            app_icon: active.string(OptionId::AppIcon),
            summary: &self.summary,
            body: &self.body,
            urgency: active.urgency(),
            category: active.string(OptionId::Category),
            progress: self.props.progress(active.is_true(OptionId::SendProgress)),
            image: self.thumbnails.image(),
        };
        if let Err(e) = self.session.init(&setup) {
            error!("failed to initialize notification: {e}");
        }
    }

    /// Recreate the session after the service rejected a call.
    ///
    /// Properties are observed again so escaping follows the new server's
    /// markup support, and so the notification gets shown again.
    fn reinit(&mut self) {
        self.session.uninit();
        self.init_session();
        if self.session.is_active() {
            self.observe_all(true);
        }
    }

    fn apply_app_name(&mut self) {
        self.session.set_app_name(app_name(&self.props));
    }

    fn apply_progress(&mut self) {
        let send = self.options.active().is_true(OptionId::SendProgress);
        self.session.set_progress(self.props.progress(send));
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    fn check_app_name_support(&mut self) -> bool {
        self.player
            .get_property("property-list")
            .as_ref()
            .and_then(Value::as_array)
            .is_some_and(|names| {
                names
                    .iter()
                    .any(|n| n.as_str() == Some(PropId::AppName.name()))
            })
    }

    fn observe_all(&mut self, reobserve: bool) {
        for prop in PropId::ALL {
            if prop == PropId::AppName && !self.has_app_name {
                continue;
            }
            let id = prop.observe_id();
            if reobserve {
                if let Err(e) = self.player.unobserve_property(id) {
                    error!("failed to unobserve property {}: {e:#}", prop.name());
                }
            }
            if let Err(e) = self.player.observe_property(id, prop.name()) {
                error!("failed to observe property {}: {e:#}", prop.name());
            }
        }
    }
}

fn app_name(props: &PropertyStore) -> &str {
    props
        .string(PropId::AppName)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_APP_NAME)
}
