use crate::{color::Rgb, error::ValidationError};

pub const REPORT_PREFIX: &str = "RGB:";

/// What one inbound message turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// `RGB:<int>,<int>,<int>`; carries the trimmed message text as received.
    Report { rgb: Rgb, text: String },
    /// Starts like a report but does not parse.
    Malformed(ValidationError),
    /// Anything else.
    Unclassified(String),
}

/// Classify one message. Surrounding whitespace is ignored; each channel is
/// trimmed and must be a plain base-10 integer.
pub fn classify(message: &str) -> Classified {
    let text = message.trim();
    let Some(body) = text.strip_prefix(REPORT_PREFIX) else {
        return Classified::Unclassified(text.to_string());
    };

    match parse_channels(body) {
        Ok(rgb) => Classified::Report {
            rgb,
            text: text.to_string(),
        },
        Err(reason) => Classified::Malformed(ValidationError::MalformedReport {
            raw: text.to_string(),
            reason,
        }),
    }
}

fn parse_channels(body: &str) -> Result<Rgb, String> {
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected 3 channels, found {}", parts.len()));
    }

    let mut channels = [0i32; 3];
    for (slot, part) in channels.iter_mut().zip(&parts) {
        *slot = part
            .parse::<i32>()
            .map_err(|_| format!("'{part}' is not an integer"))?;
    }

    let [r, g, b] = channels;
    Ok(Rgb::new(r, g, b))
}
