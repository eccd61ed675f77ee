pub mod encoder;
pub mod store;

pub use encoder::{validate, CommandEncoder};
pub use store::RuleStore;

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::{color::Rgb, error::ValidationError};

/// Pins wired on the control firmware.
pub const VALID_PINS: [u8; 3] = [2, 3, 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PinState {
    High,
    Low,
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinState::High => f.write_str("HIGH"),
            PinState::Low => f.write_str("LOW"),
        }
    }
}

impl FromStr for PinState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIGH" => Ok(PinState::High),
            "LOW" => Ok(PinState::Low),
            other => Err(ValidationError::PinState(other.to_string())),
        }
    }
}

/// Rule fields as entered by the user, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDraft {
    pub color_r: i64,
    pub color_g: i64,
    pub color_b: i64,
    pub pin_number: i64,
    pub pin_state: String,
    pub threshold: Option<u32>,
}

/// Validated rule fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFields {
    pub color: Rgb,
    pub pin_number: u8,
    pub pin_state: PinState,
    /// Kept for display; matching on the firmware is exact.
    pub threshold: Option<u32>,
}

/// A stored color → pin-state mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinRule {
    pub id: String,
    pub color: Rgb,
    pub pin_number: u8,
    pub pin_state: PinState,
    pub threshold: Option<u32>,
}

impl PinRule {
    pub fn new(id: String, fields: RuleFields) -> Self {
        Self {
            id,
            color: fields.color,
            pin_number: fields.pin_number,
            pin_state: fields.pin_state,
            threshold: fields.threshold,
        }
    }
}

impl fmt::Display for PinRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({},{},{}) -> pin {} {}",
            self.id, self.color.r, self.color.g, self.color.b, self.pin_number, self.pin_state
        )?;
        if let Some(threshold) = self.threshold {
            write!(f, " (threshold {threshold})")?;
        }
        Ok(())
    }
}
