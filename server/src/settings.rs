//! Duration settings as entered by a user.
//!
//! Users enter whole minutes. Input arrives either as JSON numbers or as the
//! raw text of a form field; both go through the same checks and are
//! rejected before anything touches the store.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::session::Durations;

/// A minutes field exactly as it was submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MinutesInput {
    Number(serde_json::Number),
    Text(String),
}

impl From<u64> for MinutesInput {
    fn from(minutes: u64) -> Self {
        Self::Number(minutes.into())
    }
}

impl From<&str> for MinutesInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Body of a settings update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRequest {
    #[serde(default)]
    pub focus_minutes: Option<MinutesInput>,

    #[serde(default)]
    pub break_minutes: Option<MinutesInput>,
}

impl SettingsRequest {
    #[must_use]
    pub fn new(focus: impl Into<MinutesInput>, brk: impl Into<MinutesInput>) -> Self {
        Self {
            focus_minutes: Some(focus.into()),
            break_minutes: Some(brk.into()),
        }
    }

    /// Checks both fields and converts them to [`Durations`].
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found, focus before break.
    pub fn validate(&self) -> Result<Durations, ValidationError> {
        let focus = parse_field("focus", self.focus_minutes.as_ref())?;
        let brk = parse_field("break", self.break_minutes.as_ref())?;
        Durations::from_minutes(focus, brk)
    }
}

/// Parses one minutes value typed by a user.
///
/// Accepts surrounding whitespace. Rejects empty input, fractions, signs
/// other than a leading minus (which is then rejected as non-positive) and
/// zero.
///
/// # Errors
///
/// [`ValidationError::NotANumber`] or [`ValidationError::NonPositive`].
pub fn parse_minutes(field: &'static str, input: &str) -> Result<u64, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing { field });
    }

    let value: i128 = trimmed.parse().map_err(|_| ValidationError::NotANumber {
        field,
        input: input.to_string(),
    })?;

    if value <= 0 {
        return Err(ValidationError::NonPositive { field });
    }
    u64::try_from(value).map_err(|_| ValidationError::TooLarge { field })
}

fn parse_field(field: &'static str, input: Option<&MinutesInput>) -> Result<u64, ValidationError> {
    match input {
        None => Err(ValidationError::Missing { field }),
        Some(MinutesInput::Text(text)) => parse_minutes(field, text),
        Some(MinutesInput::Number(number)) => {
            if let Some(minutes) = number.as_u64() {
                if minutes == 0 {
                    return Err(ValidationError::NonPositive { field });
                }
                return Ok(minutes);
            }
            match number.as_i64() {
                Some(_) => Err(ValidationError::NonPositive { field }),
                None => Err(ValidationError::NotANumber {
                    field,
                    input: number.to_string(),
                }),
            }
        }
    }
}
