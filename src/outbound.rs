use crate::{
    error::WriteError,
    message_log::MessageLog,
    notify::{emit, NotificationLevel, SharedNotifier},
    serial::SerialSession,
};

/// Why a line is being written to the send board. Decides the wording and
/// level of the resulting notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
    Manual,
    AutoForward,
    Command,
    Rule,
}

/// Write path to the send board: every successful write lands in the sent log
/// and every attempt produces one notification.
#[derive(Clone)]
pub struct Outbound {
    session: SerialSession,
    log: MessageLog,
    notifier: SharedNotifier,
}

impl Outbound {
    pub fn new(session: SerialSession, log: MessageLog, notifier: SharedNotifier) -> Self {
        Self {
            session,
            log,
            notifier,
        }
    }

    pub fn session(&self) -> &SerialSession {
        &self.session
    }

    pub fn is_available(&self) -> bool {
        self.session.is_connected()
    }

    pub async fn send(&self, text: &str, kind: SendKind) -> Result<(), WriteError> {
        let result = self.session.write(text.as_bytes()).await;
        let board = self.session.label();

        let (level, message) = match (&result, kind) {
            (Ok(()), SendKind::Manual) => {
                (NotificationLevel::Success, format!("Data sent to {board}: {text}"))
            }
            (Ok(()), SendKind::AutoForward) => {
                (NotificationLevel::Info, format!("Auto-sent to {board}: {text}"))
            }
            (Ok(()), SendKind::Command) => {
                (NotificationLevel::Success, format!("Command sent: {text}"))
            }
            (Ok(()), SendKind::Rule) => (
                NotificationLevel::Success,
                format!("Rule command sent to {board}"),
            ),
            (Err(WriteError::NotConnected), SendKind::Manual) => (
                NotificationLevel::Info,
                format!("{board} not connected, nothing sent"),
            ),
            (Err(WriteError::NotConnected), SendKind::AutoForward) => (
                NotificationLevel::Info,
                format!("{board} not connected, auto-forward skipped"),
            ),
            (Err(WriteError::NotConnected), SendKind::Command) => {
                (NotificationLevel::Error, "Not connected to any device".to_string())
            }
            (Err(WriteError::NotConnected), SendKind::Rule) => (
                NotificationLevel::Error,
                format!("{board} not connected, rule stored but not sent"),
            ),
            (Err(err), SendKind::Manual) => (
                NotificationLevel::Error,
                format!("Error sending data to {board}: {err}"),
            ),
            (Err(err), SendKind::AutoForward) => (
                NotificationLevel::Error,
                format!("Error auto-sending data: {err}"),
            ),
            (Err(err), SendKind::Command) => (
                NotificationLevel::Error,
                format!("Failed to send command: {err}"),
            ),
            (Err(err), SendKind::Rule) => (
                NotificationLevel::Error,
                format!("Error sending rule command: {err}"),
            ),
        };

        if result.is_ok() {
            self.log.push_sent(text);
        }
        emit(self.notifier.as_ref(), level, message);
        result
    }
}
