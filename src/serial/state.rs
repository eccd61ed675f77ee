use chrono::{DateTime, Utc};
use serde::Serialize;

use super::port::DeviceInfo;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Connection state of one session. Only the session mutates it, and only at
/// its transition points; everything else reads a snapshot.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub status: ConnectionStatus,
    pub device: Option<DeviceInfo>,
    pub connected_at: Option<DateTime<Utc>>,
    /// Bumped on every successful connect so stale read loops can tell they
    /// belong to an earlier connection.
    #[serde(skip)]
    pub generation: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn is_idle(&self) -> bool {
        self.status == ConnectionStatus::Disconnected
    }

    pub fn begin_connect(&mut self) {
        self.status = ConnectionStatus::Connecting;
    }

    /// Returns the generation assigned to the new connection.
    pub fn connected(&mut self, device: DeviceInfo) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.status = ConnectionStatus::Connected;
        self.device = Some(device);
        self.connected_at = Some(Utc::now());
        self.generation
    }

    /// Returns true if this call performed the transition.
    pub fn disconnected(&mut self) -> bool {
        let was_active = !self.is_idle();
        self.status = ConnectionStatus::Disconnected;
        self.device = None;
        self.connected_at = None;
        was_active
    }
}
