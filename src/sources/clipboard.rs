//! Clipboard polling: text and image changes become pipeline input.
//!
//! Only lengths and fingerprints are logged, never clipboard content.

use anyhow::{anyhow, Result};
use arboard::Clipboard;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

use super::ocr::ImageAdapter;
use super::phash::{encode_png, fingerprint_image, ClipboardImage};
use super::scheduler::Periodic;
use super::{Inbound, SourceLink};
use crate::models::CodeSource;

/// System pasteboard operations. All calls block.
pub trait ClipboardAccess: Send + Sync + 'static {
    fn read_text(&self) -> Result<Option<String>>;
    fn read_image(&self) -> Result<Option<ClipboardImage>>;
    fn write_text(&self, text: &str) -> Result<()>;
}

/// `arboard` clipboard, opened fresh for every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl ClipboardAccess for SystemClipboard {
    fn read_text(&self) -> Result<Option<String>> {
        let mut clipboard = Clipboard::new()?;
        match clipboard.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(err) => Err(anyhow!(err)),
        }
    }

    fn read_image(&self) -> Result<Option<ClipboardImage>> {
        let mut clipboard = Clipboard::new()?;
        match clipboard.get_image() {
            Ok(image) => Ok(Some(ClipboardImage {
                width: image.width,
                height: image.height,
                rgba: image.bytes.into_owned(),
            })),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(err) => Err(anyhow!(err)),
        }
    }

    fn write_text(&self, text: &str) -> Result<()> {
        let mut clipboard = Clipboard::new()?;
        clipboard.set_text(text.to_string())?;
        log_debug!("wrote {} chars to clipboard", text.chars().count());
        Ok(())
    }
}

/// Last observed clipboard content, kept separately for text and images.
#[derive(Debug, Default)]
pub struct ClipboardFingerprint {
    text: Option<String>,
    image: Option<String>,
}

impl ClipboardFingerprint {
    /// Record `text`; true when it differs from the previous observation.
    pub fn observe_text(&mut self, text: &str) -> bool {
        if self.text.as_deref() == Some(text) {
            return false;
        }
        self.text = Some(text.to_string());
        true
    }

    pub fn observe_image(&mut self, fingerprint: &str) -> bool {
        if self.image.as_deref() == Some(fingerprint) {
            return false;
        }
        self.image = Some(fingerprint.to_string());
        true
    }
}

pub struct ClipboardPoller {
    clipboard: Arc<dyn ClipboardAccess>,
    images: ImageAdapter,
    fingerprint: ClipboardFingerprint,
    self_written: watch::Receiver<Option<String>>,
    link: SourceLink,
    primed: bool,
}

impl ClipboardPoller {
    /// `self_written` carries the last code the monitor copied to the clipboard so
    /// it is not extracted a second time.
    pub fn new(
        clipboard: Arc<dyn ClipboardAccess>,
        images: ImageAdapter,
        self_written: watch::Receiver<Option<String>>,
        link: SourceLink,
    ) -> Self {
        Self {
            clipboard,
            images,
            fingerprint: ClipboardFingerprint::default(),
            self_written,
            link,
            primed: false,
        }
    }

    /// Read the clipboard once. The first poll only records a baseline.
    pub async fn poll_once(&mut self) -> Vec<Inbound> {
        let mut found = Vec::new();

        if let Some(text) = self.read_text().await {
            let changed = self.fingerprint.observe_text(&text);
            let own_write = self.self_written.borrow().as_deref() == Some(text.as_str());
            if changed && self.primed && !own_write {
                log_debug!("clipboard text changed ({} chars)", text.chars().count());
                found.push(Inbound::now(CodeSource::Clipboard, text));
            }
        }

        if let Some(text) = self.read_image_text().await {
            found.push(Inbound::now(CodeSource::Image, text));
        }

        self.primed = true;
        found
    }

    async fn read_text(&self) -> Option<String> {
        let clipboard = Arc::clone(&self.clipboard);
        match tokio::task::spawn_blocking(move || clipboard.read_text()).await {
            Ok(Ok(text)) => text.filter(|t| !t.trim().is_empty()),
            Ok(Err(err)) => {
                log_debug!("clipboard text unavailable: {err}");
                None
            }
            Err(err) => {
                log_warn!("clipboard read task failed: {err}");
                None
            }
        }
    }

    /// Recognized text of a new clipboard image, if there is one.
    async fn read_image_text(&mut self) -> Option<String> {
        let clipboard = Arc::clone(&self.clipboard);
        let read = tokio::task::spawn_blocking(move || -> Result<Option<_>> {
            let Some(image) = clipboard.read_image()? else {
                return Ok(None);
            };
            let image = image.to_dynamic_image()?;
            let fingerprint = fingerprint_image(&image);
            Ok(Some((fingerprint, image)))
        })
        .await;

        let (fingerprint, image) = match read {
            Ok(Ok(Some(found))) => found,
            Ok(Ok(None)) => return None,
            Ok(Err(err)) => {
                log_debug!("clipboard image unavailable: {err}");
                return None;
            }
            Err(err) => {
                log_warn!("clipboard image task failed: {err}");
                return None;
            }
        };

        if !self.fingerprint.observe_image(&fingerprint) || !self.primed {
            return None;
        }
        log_debug!(
            "clipboard image changed ({}x{}, {fingerprint})",
            image.width(),
            image.height()
        );

        let png = match tokio::task::spawn_blocking(move || encode_png(&image)).await {
            Ok(Ok(png)) => png,
            Ok(Err(err)) => {
                log_warn!("{err:?}");
                return None;
            }
            Err(err) => {
                log_warn!("clipboard image encode task failed: {err}");
                return None;
            }
        };

        self.images.recognize(png).await
    }
}

impl Periodic for ClipboardPoller {
    fn tick(&mut self) -> impl Future<Output = ()> + Send {
        async move {
            for inbound in self.poll_once().await {
                if !self.link.forward(inbound).await {
                    break;
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{gradient, FakeClipboard};
    use super::*;
    use crate::sources::ocr::test_support::FixedRecognizer;
    use crate::sources::test_support::link;
    use crate::sources::SourceKind;

    fn poller(
        clipboard: Arc<FakeClipboard>,
        recognizer: Arc<FixedRecognizer>,
    ) -> (ClipboardPoller, watch::Sender<Option<String>>) {
        let (written_tx, written_rx) = watch::channel(None);
        let (link, _rx) = link(SourceKind::Clipboard);
        let poller = ClipboardPoller::new(clipboard, ImageAdapter::new(recognizer), written_rx, link);
        (poller, written_tx)
    }

    fn texts(found: &[Inbound]) -> Vec<&str> {
        found.iter().map(|i| i.text.as_str()).collect()
    }

    #[test]
    fn fingerprint_tracks_changes() {
        let mut fp = ClipboardFingerprint::default();
        assert!(fp.observe_text("a"));
        assert!(!fp.observe_text("a"));
        assert!(fp.observe_text("b"));
        assert!(fp.observe_image("x"));
        assert!(!fp.observe_image("x"));
    }

    #[tokio::test]
    async fn first_poll_is_a_baseline() {
        let clipboard = Arc::new(FakeClipboard::default());
        clipboard.set_text("Your code is 482913");
        let (mut poller, _written) = poller(clipboard, FixedRecognizer::new(None));

        assert!(poller.poll_once().await.is_empty());
    }

    #[tokio::test]
    async fn same_string_twice_forwards_once() {
        let clipboard = Arc::new(FakeClipboard::default());
        let (mut poller, _written) = poller(Arc::clone(&clipboard), FixedRecognizer::new(None));
        poller.poll_once().await;

        clipboard.set_text("code 482913");
        assert_eq!(texts(&poller.poll_once().await), vec!["code 482913"]);
        assert!(poller.poll_once().await.is_empty());

        clipboard.set_text("something else");
        assert_eq!(texts(&poller.poll_once().await), vec!["something else"]);
    }

    #[tokio::test]
    async fn self_written_code_is_absorbed() {
        let clipboard = Arc::new(FakeClipboard::default());
        let (mut poller, written) = poller(Arc::clone(&clipboard), FixedRecognizer::new(None));
        poller.poll_once().await;

        written.send_replace(Some("482913".to_string()));
        clipboard.set_text("482913");
        assert!(poller.poll_once().await.is_empty());
    }

    #[tokio::test]
    async fn new_image_is_recognized_once() {
        let clipboard = Arc::new(FakeClipboard::default());
        let recognizer = FixedRecognizer::new(Some("验证码 735194"));
        let (mut poller, _written) = poller(Arc::clone(&clipboard), Arc::clone(&recognizer));
        poller.poll_once().await;

        clipboard.set_image(gradient(48, 0));
        let found = poller.poll_once().await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, CodeSource::Image);
        assert_eq!(found[0].text, "验证码 735194");

        assert!(poller.poll_once().await.is_empty());
        assert_eq!(recognizer.calls(), 1);
    }

    #[tokio::test]
    async fn baseline_image_is_not_recognized() {
        let clipboard = Arc::new(FakeClipboard::default());
        clipboard.set_image(gradient(32, 5));
        let recognizer = FixedRecognizer::new(Some("482913"));
        let (mut poller, _written) = poller(clipboard, Arc::clone(&recognizer));

        assert!(poller.poll_once().await.is_empty());
        assert!(poller.poll_once().await.is_empty());
        assert_eq!(recognizer.calls(), 0);
    }
}
