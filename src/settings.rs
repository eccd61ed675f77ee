use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use crate::{console::Board, pipeline::Mode, serial::PortSelector};

pub const DATA_DIR_ENV: &str = "CHROMA_BRIDGE_DATA_DIR";
pub const RECEIVE_PORT_ENV: &str = "CHROMA_RECEIVE_PORT";
pub const SEND_PORT_ENV: &str = "CHROMA_SEND_PORT";
const DEFAULT_DATA_DIR: &str = ".chroma-bridge";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsoleSettings {
    pub receive_port: PortSelector,
    pub send_port: PortSelector,
    pub mode: Mode,
}

impl ConsoleSettings {
    pub fn port(&self, board: Board) -> &PortSelector {
        match board {
            Board::Receive => &self.receive_port,
            Board::Send => &self.send_port,
        }
    }

    /// Port names from the environment win over the stored selectors.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup(RECEIVE_PORT_ENV).filter(|name| !name.trim().is_empty()) {
            self.receive_port = PortSelector::from_arg(&name);
        }
        if let Some(name) = lookup(SEND_PORT_ENV).filter(|name| !name.trim().is_empty()) {
            self.send_port = PortSelector::from_arg(&name);
        }
    }
}

/// Directory holding `settings.json` and `store.json`.
pub fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ConsoleSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring unreadable settings {}: {err}", path.display());
                ConsoleSettings::default()
            })
        } else {
            ConsoleSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> ConsoleSettings {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn update_mode(&self, mode: Mode) -> Result<()> {
        self.update(|settings| settings.mode = mode)
    }

    pub fn update_port(&self, board: Board, selector: PortSelector) -> Result<()> {
        self.update(|settings| match board {
            Board::Receive => settings.receive_port = selector,
            Board::Send => settings.send_port = selector,
        })
    }

    fn update(&self, apply: impl FnOnce(&mut ConsoleSettings)) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &ConsoleSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
