pub mod forward;
pub mod history;
pub mod picker;
pub mod report;
pub mod subscribers;

pub use forward::AutoForwarder;
pub use history::{ColorHistory, HistoryEntry, HISTORY_CAP};
pub use picker::ColorPicker;
pub use report::{classify, Classified};
pub use subscribers::{ColorCallback, SubscriberRegistry, Subscription};

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    str::FromStr,
    sync::{Mutex, MutexGuard, RwLock},
};
use tokio::sync::oneshot;

use crate::{
    color::{ColorSample, Rgb},
    error::ValidationError,
    message_log::MessageLog,
    notify::{emit, NotificationLevel, SharedNotifier},
    serial::SessionObserver,
};

/// Console operating mode. Only `Data` forwards reports to the send board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Data,
    Control,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Data => f.write_str("data"),
            Mode::Control => f.write_str("control"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "data" => Ok(Mode::Data),
            "control" => Ok(Mode::Control),
            other => Err(format!("Unknown mode '{other}' (expected data or control)")),
        }
    }
}

/// Outcome of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Sample(ColorSample),
    Malformed(ValidationError),
    Unclassified(String),
}

/// Turns text from the receive board into color events.
///
/// All state mutation for one message happens before the next message is
/// looked at; callers feed it from a single read loop.
pub struct TranslationPipeline {
    mode: RwLock<Mode>,
    latest: Mutex<Option<Rgb>>,
    history: Mutex<ColorHistory>,
    subscribers: SubscriberRegistry,
    picker: ColorPicker,
    log: MessageLog,
    notifier: SharedNotifier,
    forwarder: Option<AutoForwarder>,
}

impl TranslationPipeline {
    pub fn new(
        mode: Mode,
        log: MessageLog,
        notifier: SharedNotifier,
        forwarder: Option<AutoForwarder>,
    ) -> Self {
        Self {
            mode: RwLock::new(mode),
            latest: Mutex::new(None),
            history: Mutex::new(ColorHistory::new()),
            subscribers: SubscriberRegistry::new(),
            picker: ColorPicker::new(),
            log,
            notifier,
            forwarder,
        }
    }

    pub fn mode(&self) -> Mode {
        *self.mode.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = mode;
    }

    pub fn latest(&self) -> Option<Rgb> {
        *lock(&self.latest)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        lock(&self.history).entries()
    }

    pub fn subscribe(&self, callback: ColorCallback) -> Subscription {
        self.subscribers.subscribe(callback)
    }

    pub fn request_pick(&self) -> oneshot::Receiver<Rgb> {
        self.picker.request()
    }

    pub fn cancel_pick(&self) -> bool {
        self.picker.cancel()
    }

    pub fn is_picking(&self) -> bool {
        self.picker.is_awaiting()
    }

    /// Process every non-empty line of `chunk` as one message. The session
    /// only hands over newline-terminated text.
    pub fn handle_chunk(&self, chunk: &str) -> Vec<Inbound> {
        chunk
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| self.handle_message(line))
            .collect()
    }

    pub fn handle_message(&self, message: &str) -> Inbound {
        match classify(message) {
            Classified::Report { rgb, text } => Inbound::Sample(self.accept(rgb, &text)),
            Classified::Malformed(err) => {
                log::warn!("Dropping report: {err}");
                emit(
                    self.notifier.as_ref(),
                    NotificationLevel::Error,
                    "Received invalid RGB format",
                );
                Inbound::Malformed(err)
            }
            Classified::Unclassified(raw) => {
                log::info!("Received non-RGB data: {raw}");
                *lock(&self.latest) = None;
                self.log.push_received(raw.clone());
                emit(
                    self.notifier.as_ref(),
                    NotificationLevel::Info,
                    format!("Received non-RGB data: {raw}"),
                );
                Inbound::Unclassified(raw)
            }
        }
    }

    fn accept(&self, rgb: Rgb, text: &str) -> ColorSample {
        let sample = ColorSample::from_rgb(rgb);

        self.log
            .push_received(format!("{} → {}", sample.hex, sample.name));
        emit(
            self.notifier.as_ref(),
            NotificationLevel::Success,
            format!("Received Color: {}", sample.hex),
        );

        lock(&self.history).push(&sample);
        *lock(&self.latest) = Some(rgb);

        self.subscribers.publish(rgb);
        if self.picker.offer(rgb) {
            log::info!("Color pick resolved with {rgb}");
        }

        if self.mode() == Mode::Data {
            match &self.forwarder {
                Some(forwarder) if forwarder.is_available() => forwarder.forward(text),
                Some(forwarder) => emit(
                    self.notifier.as_ref(),
                    NotificationLevel::Info,
                    format!("{} not connected, auto-forward skipped", forwarder.board()),
                ),
                None => emit(
                    self.notifier.as_ref(),
                    NotificationLevel::Info,
                    "No send board configured, auto-forward skipped",
                ),
            }
        }

        sample
    }
}

impl SessionObserver for TranslationPipeline {
    fn on_data(&self, text: &str) {
        self.handle_chunk(text);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
