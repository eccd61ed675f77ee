use serde::Serialize;

use super::{PinRule, PinState, RuleDraft, RuleFields, VALID_PINS};
use crate::{
    color::Rgb,
    error::{ValidationError, WriteError},
    outbound::{Outbound, SendKind},
};

/// Check a draft field by field; the first failing field is reported.
pub fn validate(draft: &RuleDraft) -> Result<RuleFields, ValidationError> {
    let r = channel("colorR", draft.color_r)?;
    let g = channel("colorG", draft.color_g)?;
    let b = channel("colorB", draft.color_b)?;

    let pin_number = u8::try_from(draft.pin_number)
        .ok()
        .filter(|pin| VALID_PINS.contains(pin))
        .ok_or(ValidationError::PinNumber(draft.pin_number))?;
    let pin_state: PinState = draft.pin_state.parse()?;

    Ok(RuleFields {
        color: Rgb::new(r, g, b),
        pin_number,
        pin_state,
        threshold: draft.threshold,
    })
}

fn channel(name: &'static str, value: i64) -> Result<i32, ValidationError> {
    if (0..=255).contains(&value) {
        Ok(value as i32)
    } else {
        Err(ValidationError::ColorChannel {
            channel: name,
            value,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RuleCommand<'a> {
    id: &'a str,
    color_r: i32,
    color_g: i32,
    color_b: i32,
    pin_number: u8,
    pin_state: PinState,
}

/// Serializes rules into `[RULE:{json}]` commands and writes them to the send
/// board.
#[derive(Clone)]
pub struct CommandEncoder {
    outbound: Outbound,
}

impl CommandEncoder {
    pub fn new(outbound: Outbound) -> Self {
        Self { outbound }
    }

    /// The command line for `rule`, without the trailing newline.
    pub fn encode(rule: &PinRule) -> Result<String, WriteError> {
        let command = RuleCommand {
            id: &rule.id,
            color_r: rule.color.r,
            color_g: rule.color.g,
            color_b: rule.color.b,
            pin_number: rule.pin_number,
            pin_state: rule.pin_state,
        };
        let json = serde_json::to_string(&command)?;
        Ok(format!("[RULE:{json}]"))
    }

    /// Encode and write one rule. Returns the line that was sent.
    pub async fn transmit(&self, rule: &PinRule) -> Result<String, WriteError> {
        let line = Self::encode(rule)?;
        log::info!("Sending rule command {line}");
        self.outbound.send(&line, SendKind::Rule).await?;
        Ok(line)
    }
}
