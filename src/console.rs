use serde::Serialize;
use std::{fmt, str::FromStr, sync::Arc};

use tokio::sync::oneshot;

use crate::{
    color::Rgb,
    error::{ConnectionError, SaveRuleError, WriteError},
    message_log::MessageLog,
    notify::{emit, NotificationLevel, SharedNotifier},
    outbound::{Outbound, SendKind},
    pipeline::{AutoForwarder, ColorCallback, HistoryEntry, Mode, Subscription, TranslationPipeline},
    rules::{validate, CommandEncoder, PinRule, RuleDraft, RuleStore},
    serial::{DeviceInfo, NoopObserver, PortProvider, SerialSession, SessionState},
};

/// The two boards the console talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Board {
    /// Streams color-sensor reports.
    Receive,
    /// Takes pin-control commands.
    Send,
}

impl Board {
    pub fn label(self) -> &'static str {
        match self {
            Board::Receive => "receive board",
            Board::Send => "send board",
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Board {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "receive" | "rx" | "1" => Ok(Board::Receive),
            "send" | "tx" | "2" => Ok(Board::Send),
            other => Err(format!("Unknown board '{other}' (expected receive or send)")),
        }
    }
}

/// One-word control commands understood by the send board firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickCommand {
    Color,
    On,
    Off,
}

impl QuickCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            QuickCommand::Color => "COLOR",
            QuickCommand::On => "ON",
            QuickCommand::Off => "OFF",
        }
    }
}

impl FromStr for QuickCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COLOR" => Ok(QuickCommand::Color),
            "ON" => Ok(QuickCommand::On),
            "OFF" => Ok(QuickCommand::Off),
            other => Err(format!("Unknown command '{other}' (expected COLOR, ON or OFF)")),
        }
    }
}

/// Result of a successful [`Console::save_rule`].
#[derive(Debug)]
pub struct SavedRule {
    pub rule: PinRule,
    /// The command line written to the send board, if the write went through.
    pub sent: Option<String>,
}

/// Everything the presentation layer drives: both sessions, the translation
/// pipeline, the rule store and the message logs.
pub struct Console {
    receive: SerialSession,
    send: SerialSession,
    pipeline: Arc<TranslationPipeline>,
    rules: RuleStore,
    encoder: CommandEncoder,
    outbound: Outbound,
    log: MessageLog,
    notifier: SharedNotifier,
}

impl Console {
    /// Wire up both sessions. Must be called from within a tokio runtime.
    pub fn new(
        receive_provider: Arc<dyn PortProvider>,
        send_provider: Arc<dyn PortProvider>,
        mode: Mode,
        log: MessageLog,
        notifier: SharedNotifier,
    ) -> Self {
        let send = SerialSession::new(
            Board::Send.label(),
            send_provider,
            Arc::new(NoopObserver),
            notifier.clone(),
        );
        let outbound = Outbound::new(send.clone(), log.clone(), notifier.clone());

        let pipeline = Arc::new(TranslationPipeline::new(
            mode,
            log.clone(),
            notifier.clone(),
            Some(AutoForwarder::spawn(outbound.clone())),
        ));
        let receive = SerialSession::new(
            Board::Receive.label(),
            receive_provider,
            pipeline.clone(),
            notifier.clone(),
        );

        Self {
            receive,
            send,
            pipeline,
            rules: RuleStore::new(),
            encoder: CommandEncoder::new(outbound.clone()),
            outbound,
            log,
            notifier,
        }
    }

    pub fn session(&self, board: Board) -> &SerialSession {
        match board {
            Board::Receive => &self.receive,
            Board::Send => &self.send,
        }
    }

    pub fn state(&self, board: Board) -> SessionState {
        self.session(board).state()
    }

    pub async fn connect(&self, board: Board) -> Result<DeviceInfo, ConnectionError> {
        self.session(board).connect().await
    }

    pub async fn disconnect(&self, board: Board) {
        self.session(board).disconnect().await;
    }

    pub async fn shutdown(&self) {
        self.pipeline.cancel_pick();
        self.receive.disconnect().await;
        self.send.disconnect().await;
    }

    pub fn mode(&self) -> Mode {
        self.pipeline.mode()
    }

    pub fn set_mode(&self, mode: Mode) {
        self.pipeline.set_mode(mode);
        emit(
            self.notifier.as_ref(),
            NotificationLevel::Info,
            format!("Switched to {} Mode", mode.to_string().to_uppercase()),
        );
    }

    /// Write free text to the send board. Whitespace-only input is ignored and
    /// reported as `Ok(false)`.
    pub async fn send_data(&self, text: &str) -> Result<bool, WriteError> {
        if text.trim().is_empty() {
            return Ok(false);
        }
        self.outbound.send(text, SendKind::Manual).await?;
        Ok(true)
    }

    pub async fn send_command(&self, command: QuickCommand) -> Result<(), WriteError> {
        self.outbound.send(command.as_str(), SendKind::Command).await
    }

    /// Validate, store (add, or update `existing_id`), then transmit.
    pub async fn save_rule(
        &self,
        existing_id: Option<&str>,
        draft: &RuleDraft,
    ) -> Result<SavedRule, SaveRuleError> {
        let fields = validate(draft).map_err(|err| {
            emit(
                self.notifier.as_ref(),
                NotificationLevel::Error,
                format!("Validation error: {err}"),
            );
            err
        })?;

        let rule = match existing_id {
            Some(id) => {
                let rule = self.rules.update(id, fields).map_err(|err| {
                    emit(
                        self.notifier.as_ref(),
                        NotificationLevel::Error,
                        format!("Rule not saved: {err}"),
                    );
                    err
                })?;
                emit(
                    self.notifier.as_ref(),
                    NotificationLevel::Success,
                    format!("Rule {} updated", rule.id),
                );
                rule
            }
            None => {
                let rule = self.rules.add(fields);
                emit(
                    self.notifier.as_ref(),
                    NotificationLevel::Success,
                    format!("Rule {} added", rule.id),
                );
                rule
            }
        };

        let sent = match self.encoder.transmit(&rule).await {
            Ok(line) => Some(line),
            Err(err) => {
                log::warn!("Rule {} stored but not sent: {err}", rule.id);
                None
            }
        };

        Ok(SavedRule { rule, sent })
    }

    pub fn delete_rule(&self, id: &str) -> bool {
        let removed = self.rules.delete(id);
        if removed {
            emit(
                self.notifier.as_ref(),
                NotificationLevel::Success,
                format!("Rule {id} deleted"),
            );
        } else {
            log::info!("Delete ignored, no rule {id}");
        }
        removed
    }

    pub fn rules(&self) -> Vec<PinRule> {
        self.rules.rules()
    }

    pub fn rule(&self, id: &str) -> Option<PinRule> {
        self.rules.get(id)
    }

    /// Wait for the next color the receive board reports.
    pub fn pick_color(&self) -> oneshot::Receiver<Rgb> {
        emit(
            self.notifier.as_ref(),
            NotificationLevel::Info,
            "Waiting for new color data from device...",
        );
        self.pipeline.request_pick()
    }

    pub fn cancel_pick(&self) -> bool {
        self.pipeline.cancel_pick()
    }

    pub fn subscribe(&self, callback: ColorCallback) -> Subscription {
        self.pipeline.subscribe(callback)
    }

    pub fn latest_color(&self) -> Option<Rgb> {
        self.pipeline.latest()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.pipeline.history()
    }

    pub fn received_log(&self) -> Vec<String> {
        self.log.received()
    }

    pub fn sent_log(&self) -> Vec<String> {
        self.log.sent()
    }

    pub fn clear_received(&self) {
        self.log.clear_received();
        emit(
            self.notifier.as_ref(),
            NotificationLevel::Info,
            "Received log cleared",
        );
    }
}
