//! Notification session
//!
//! [`NotificationSession`] wraps a [`NotificationServer`] and tracks whether
//! the service connection and the notification object exist. The session
//! never panics on service errors; callers decide whether to recreate it.

use log::{debug, error, info};

use crate::error::{Error, Result};
use crate::options::Urgency;
use crate::thumbnail::ImageView;

/// Application name registered with the service
pub const DEFAULT_APP_NAME: &str = "mpv";

/// A desktop notification service holding a single notification object
pub trait NotificationServer {
    /// Connect to the service
    fn init(&mut self, app_name: &str) -> Result<()>;

    fn uninit(&mut self);

    fn capabilities(&mut self) -> Result<Vec<String>>;

    fn set_app_name(&mut self, name: &str);

    fn set_app_icon(&mut self, icon: Option<&str>);

    /// Create the notification object; it never expires on its own.
    fn create(&mut self, summary: &str, body: &str) -> Result<()>;

    /// Release the notification object
    fn destroy(&mut self);

    fn update(&mut self, summary: &str, body: &str);

    fn show(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn set_urgency(&mut self, urgency: Urgency);

    /// `None` removes the category hint
    fn set_category(&mut self, category: Option<&str>);

    /// `None` removes the progress hint
    fn set_progress(&mut self, value: Option<i32>);

    /// `None` removes the image hint
    fn set_image(&mut self, image: Option<ImageView<'_>>);
}

/// Everything needed to (re)create the notification
#[derive(Debug, Clone, Copy)]
pub struct SessionSetup<'a> {
    pub app_name: &'a str,
    pub app_icon: Option<&'a str>,
    pub summary: &'a str,
    pub body: &'a str,
    pub urgency: Urgency,
    pub category: Option<&'a str>,
    pub progress: Option<i32>,
    pub image: Option<ImageView<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    /// Service connected, no notification object
    Connected,
    Active,
}

pub struct NotificationSession<S> {
    server: S,
    state: State,
    body_markup: bool,
}

impl<S: NotificationServer> NotificationSession<S> {
    pub fn new(server: S) -> Self {
        Self {
            server,
            state: State::Uninitialized,
            body_markup: false,
        }
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut S {
        &mut self.server
    }

    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    /// Whether the server renders markup in the body
    pub fn body_markup(&self) -> bool {
        self.body_markup
    }

    /// Connect and create the notification with all attributes applied.
    ///
    /// On failure the session is left uninitialized and the error returned.
    pub fn init(&mut self, setup: &SessionSetup<'_>) -> Result<()> {
        if let Err(e) = self.try_init(setup) {
            self.uninit();
            return Err(e);
        }
        Ok(())
    }

    fn try_init(&mut self, setup: &SessionSetup<'_>) -> Result<()> {
        self.server.init(DEFAULT_APP_NAME)?;
        self.state = State::Connected;

        let caps = self
            .server
            .capabilities()
            .map_err(|e| Error::Notification(format!("failed to get server caps: {e}")))?;
        self.body_markup = caps.iter().any(|c| c == "body-markup");
        info!("server supports markup? {}", self.body_markup);

        self.server.set_app_name(setup.app_name);
        self.server.set_app_icon(setup.app_icon);

        self.server.create(setup.summary, setup.body)?;
        self.state = State::Active;

        self.server.set_progress(setup.progress);
        self.server.set_category(setup.category);
        self.server.set_urgency(setup.urgency);
        self.server.set_image(setup.image);
        Ok(())
    }

    /// Close and release everything. Safe to call in any state.
    pub fn uninit(&mut self) {
        if self.state == State::Active {
            if let Err(e) = self.server.close() {
                error!("failed to close notification: {e}");
            }
            self.server.destroy();
        }
        if self.state != State::Uninitialized {
            self.server.uninit();
        }
        self.state = State::Uninitialized;
    }

    pub fn set_app_name(&mut self, name: &str) {
        if self.state != State::Uninitialized {
            self.server.set_app_name(name);
        }
    }

    pub fn set_app_icon(&mut self, icon: Option<&str>) {
        if self.state != State::Uninitialized {
            self.server.set_app_icon(icon);
        }
    }

    pub fn set_urgency(&mut self, urgency: Urgency) {
        if self.is_active() {
            self.server.set_urgency(urgency);
        }
    }

    pub fn set_category(&mut self, category: Option<&str>) {
        if self.is_active() {
            self.server.set_category(category);
        }
    }

    pub fn set_progress(&mut self, value: Option<i32>) {
        if self.is_active() {
            self.server.set_progress(value);
        }
    }

    pub fn set_image(&mut self, image: Option<ImageView<'_>>) {
        if self.is_active() {
            self.server.set_image(image);
        }
    }

    pub fn update(&mut self, summary: &str, body: &str) {
        if self.is_active() {
            self.server.update(summary, body);
        }
    }

    pub fn show(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(Error::Notification("no notification".into()));
        }
        debug!("sending notification");
        self.server.show()
    }

    /// Close the notification; a no-op without one.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        debug!("notification close");
        self.server.close()
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Recording stand-in for a notification service

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Init,
        Uninit,
        AppName(String),
        AppIcon(Option<String>),
        Create(String, String),
        Destroy,
        Update(String, String),
        Show,
        Close,
        Urgency(Urgency),
        Category(Option<String>),
        Progress(Option<i32>),
        Image(Option<(u32, u32)>),
    }

    #[derive(Debug, Default)]
    pub struct FakeServer {
        pub calls: Vec<Call>,
        pub markup: bool,
        pub fail_init: bool,
        pub fail_show: usize,
        pub fail_close: usize,
    }

    impl FakeServer {
        pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(c)).count()
        }

        pub fn shows(&self) -> usize {
            self.count(|c| *c == Call::Show)
        }

        pub fn closes(&self) -> usize {
            self.count(|c| *c == Call::Close)
        }

        pub fn updates(&self) -> usize {
            self.count(|c| matches!(c, Call::Update(..)))
        }

        pub fn last_update(&self) -> Option<(&str, &str)> {
            self.calls.iter().rev().find_map(|c| match c {
                Call::Update(s, b) | Call::Create(s, b) => Some((s.as_str(), b.as_str())),
                _ => None,
            })
        }
    }

    impl NotificationServer for FakeServer {
        fn init(&mut self, _app_name: &str) -> Result<()> {
            if self.fail_init {
                return Err(Error::Notification("init refused".into()));
            }
            self.calls.push(Call::Init);
            Ok(())
        }

        fn uninit(&mut self) {
            self.calls.push(Call::Uninit);
        }

        fn capabilities(&mut self) -> Result<Vec<String>> {
            let mut caps = vec!["body".to_string()];
            if self.markup {
                caps.push("body-markup".to_string());
            }
            Ok(caps)
        }

        fn set_app_name(&mut self, name: &str) {
            self.calls.push(Call::AppName(name.to_string()));
        }

        fn set_app_icon(&mut self, icon: Option<&str>) {
            self.calls.push(Call::AppIcon(icon.map(str::to_string)));
        }

        fn create(&mut self, summary: &str, body: &str) -> Result<()> {
            self.calls
                .push(Call::Create(summary.to_string(), body.to_string()));
            Ok(())
        }

        fn destroy(&mut self) {
            self.calls.push(Call::Destroy);
        }

        fn update(&mut self, summary: &str, body: &str) {
            self.calls
                .push(Call::Update(summary.to_string(), body.to_string()));
        }

        fn show(&mut self) -> Result<()> {
            self.calls.push(Call::Show);
            if self.fail_show > 0 {
                self.fail_show -= 1;
                return Err(Error::Notification("ServiceUnknown".into()));
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.calls.push(Call::Close);
            if self.fail_close > 0 {
                self.fail_close -= 1;
                return Err(Error::Notification("ServiceUnknown".into()));
            }
            Ok(())
        }

        fn set_urgency(&mut self, urgency: Urgency) {
            self.calls.push(Call::Urgency(urgency));
        }

        fn set_category(&mut self, category: Option<&str>) {
            self.calls.push(Call::Category(category.map(str::to_string)));
        }

        fn set_progress(&mut self, value: Option<i32>) {
            self.calls.push(Call::Progress(value));
        }

        fn set_image(&mut self, image: Option<ImageView<'_>>) {
            self.calls
                .push(Call::Image(image.map(|i| (i.width, i.height))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{Call, FakeServer};
    use super::*;

    fn setup() -> SessionSetup<'static> {
        SessionSetup {
            app_name: "mpv",
            app_icon: Some("mpv"),
            summary: "No file",
            body: "▶",
            urgency: Urgency::Low,
            category: None,
            progress: Some(3),
            image: None,
        }
    }

    #[test]
    fn test_init_applies_attributes() {
        let mut session = NotificationSession::new(FakeServer {
            markup: true,
            ..FakeServer::default()
        });
        session.init(&setup()).unwrap();
        assert!(session.is_active());
        assert!(session.body_markup());
        let calls = &session.server().calls;
        assert_eq!(calls[0], Call::Init);
        assert!(calls.contains(&Call::Create("No file".into(), "▶".into())));
        assert!(calls.contains(&Call::Category(None)));
        assert!(calls.contains(&Call::Image(None)));
        assert!(calls.contains(&Call::Progress(Some(3))));
    }

    #[test]
    fn test_init_failure_leaves_uninitialized() {
        let mut session = NotificationSession::new(FakeServer {
            fail_init: true,
            ..FakeServer::default()
        });
        assert!(session.init(&setup()).is_err());
        assert!(!session.is_active());
        assert!(session.show().is_err());
        assert!(session.close().is_ok());
    }

    #[test]
    fn test_setters_ignored_when_inactive() {
        let mut session = NotificationSession::new(FakeServer::default());
        session.set_category(Some("x"));
        session.set_progress(Some(1));
        session.update("a", "b");
        assert!(session.server().calls.is_empty());
    }

    #[test]
    fn test_uninit_closes_and_releases() {
        let mut session = NotificationSession::new(FakeServer::default());
        session.init(&setup()).unwrap();
        session.uninit();
        let calls = &session.server().calls;
        let tail: Vec<_> = calls.iter().rev().take(3).rev().cloned().collect();
        assert_eq!(tail, vec![Call::Close, Call::Destroy, Call::Uninit]);
        assert!(!session.is_active());
    }
}
