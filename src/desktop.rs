//! freedesktop notification service over D-Bus
//!
//! notify-rust builds a fresh message on every show, so this keeps the
//! notification's attributes locally and replays them, reusing the server
//! assigned id so the popup is replaced in place instead of stacking.

use log::{debug, info, warn};
use notify_rust::{Hint, Image, Notification, NotificationHandle, Timeout};

use crate::error::{Error, Result};
use crate::notification::NotificationServer;
use crate::options::Urgency;
use crate::thumbnail::ImageView;

#[derive(Default)]
pub struct DesktopServer {
    connected: bool,
    created: bool,
    app_name: String,
    app_icon: Option<String>,
    summary: String,
    body: String,
    urgency: Option<notify_rust::Urgency>,
    category: Option<String>,
    progress: Option<i32>,
    image: Option<Image>,
    handle: Option<NotificationHandle>,
}

impl DesktopServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn build(&self) -> Notification {
        let mut n = Notification::new();
        n.appname(&self.app_name)
            .summary(&self.summary)
            .body(&self.body)
            .timeout(Timeout::Never);
        if let Some(icon) = &self.app_icon {
            n.icon(icon);
        }
        if let Some(urgency) = self.urgency {
            n.urgency(urgency);
        }
        if let Some(category) = &self.category {
            n.hint(Hint::Category(category.clone()));
        }
        if let Some(value) = self.progress {
            n.hint(Hint::CustomInt("value".to_string(), value));
        }
        if let Some(image) = &self.image {
            n.image_data(image.clone());
        }
        if let Some(handle) = &self.handle {
            n.id(handle.id());
        }
        n
    }
}

fn service_error(e: &notify_rust::error::Error) -> Error {
    Error::Notification(e.to_string())
}

/// Copy rows out of a possibly padded buffer into a tight RGBA buffer.
fn pack_rows(view: &ImageView<'_>) -> Option<Vec<u8>> {
    let row = view.width as usize * 4;
    let mut packed = Vec::with_capacity(row * view.height as usize);
    for y in 0..view.height as usize {
        let start = y * view.stride;
        packed.extend_from_slice(view.data.get(start..start + row)?);
    }
    Some(packed)
}

impl NotificationServer for DesktopServer {
    fn init(&mut self, app_name: &str) -> Result<()> {
        let info = notify_rust::get_server_information().map_err(|e| service_error(&e))?;
        info!(
            "✅ Connected to notification server {} {} ({})",
            info.name, info.version, info.vendor
        );
        self.app_name = app_name.to_string();
        self.connected = true;
        Ok(())
    }

    fn uninit(&mut self) {
        self.connected = false;
        self.created = false;
        self.handle = None;
    }

    fn capabilities(&mut self) -> Result<Vec<String>> {
        notify_rust::get_capabilities().map_err(|e| service_error(&e))
    }

    fn set_app_name(&mut self, name: &str) {
        self.app_name = name.to_string();
    }

    fn set_app_icon(&mut self, icon: Option<&str>) {
        self.app_icon = icon.map(str::to_string);
    }

    fn create(&mut self, summary: &str, body: &str) -> Result<()> {
        if !self.connected {
            return Err(Error::Notification("not connected".into()));
        }
        self.summary = summary.to_string();
        self.body = body.to_string();
        self.created = true;
        Ok(())
    }

    fn destroy(&mut self) {
        self.created = false;
        self.handle = None;
        self.image = None;
    }

    fn update(&mut self, summary: &str, body: &str) {
        self.summary = summary.to_string();
        self.body = body.to_string();
    }

    fn show(&mut self) -> Result<()> {
        if !self.created {
            return Err(Error::Notification("no notification".into()));
        }
        let handle = self.build().show().map_err(|e| service_error(&e))?;
        debug!("notification id {}", handle.id());
        self.handle = Some(handle);
        Ok(())
    }

    /// Never fails: notify-rust sends `CloseNotification` without reporting
    /// the outcome, so a lost service only surfaces on the next show.
    fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
        Ok(())
    }

    fn set_urgency(&mut self, urgency: Urgency) {
        self.urgency = Some(match urgency {
            Urgency::Low => notify_rust::Urgency::Low,
            Urgency::Normal => notify_rust::Urgency::Normal,
            Urgency::Critical => notify_rust::Urgency::Critical,
        });
    }

    fn set_category(&mut self, category: Option<&str>) {
        self.category = category.map(str::to_string);
    }

    fn set_progress(&mut self, value: Option<i32>) {
        self.progress = value;
    }

    fn set_image(&mut self, image: Option<ImageView<'_>>) {
        self.image = image.and_then(|view| {
            let width = i32::try_from(view.width).ok()?;
            let height = i32::try_from(view.height).ok()?;
            let data = pack_rows(&view)?;
            match Image::from_rgba(width, height, data) {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!("dropping thumbnail: {e}");
                    None
                }
            }
        });
    }
}
