//! Schedule expression grammar for recurring jobs.
//!
//! Two forms are accepted, matching the trigger provider's grammar:
//! `cron(<6 whitespace-separated fields>)` and
//! `rate(N minute|minutes|hour|hours|day|days)` with singular/plural
//! agreement. Parsing happens before any provider call so a malformed
//! expression never creates remote resources.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Time unit for a `rate(...)` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateUnit {
    Minutes,
    Hours,
    Days,
}

impl RateUnit {
    fn as_str(self, plural: bool) -> &'static str {
        match (self, plural) {
            (Self::Minutes, false) => "minute",
            (Self::Minutes, true) => "minutes",
            (Self::Hours, false) => "hour",
            (Self::Hours, true) => "hours",
            (Self::Days, false) => "day",
            (Self::Days, true) => "days",
        }
    }
}

/// A parsed schedule expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleExpression {
    /// Six-field cron expression (minute hour day-of-month month
    /// day-of-week year), stored without the `cron(...)` wrapper.
    Cron(String),
    /// Fixed interval.
    Rate { value: u32, unit: RateUnit },
}

impl ScheduleExpression {
    /// Parse the provider grammar.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for anything outside the grammar:
    /// wrong field count, zero or non-numeric rate value, unknown unit,
    /// or singular/plural disagreement.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if let Some(body) = strip_call(input, "cron") {
            let fields: Vec<&str> = body.split_whitespace().collect();
            if fields.len() != 6 {
                return Err(Error::Validation(format!(
                    "cron expression must have 6 fields, got {}: '{}'",
                    fields.len(),
                    body
                )));
            }
            return Ok(Self::Cron(fields.join(" ")));
        }
        if let Some(body) = strip_call(input, "rate") {
            let mut parts = body.split_whitespace();
            let (value, unit) = match (parts.next(), parts.next(), parts.next()) {
                (Some(value), Some(unit), None) => (value, unit),
                _ => {
                    return Err(Error::Validation(format!(
                        "rate expression must be 'rate(N unit)': '{}'",
                        input
                    )))
                }
            };
            let value: u32 = value
                .parse()
                .map_err(|_| Error::Validation(format!("invalid rate value '{}'", value)))?;
            if value == 0 {
                return Err(Error::Validation("rate value must be positive".into()));
            }
            let parsed_unit = match unit {
                "minute" | "minutes" => RateUnit::Minutes,
                "hour" | "hours" => RateUnit::Hours,
                "day" | "days" => RateUnit::Days,
                other => {
                    return Err(Error::Validation(format!(
                        "unknown rate unit '{}'; expected minute(s), hour(s), or day(s)",
                        other
                    )))
                }
            };
            let plural = unit.ends_with('s');
            if (value == 1) == plural {
                return Err(Error::Validation(format!(
                    "rate unit must agree in number: 'rate({} {})'",
                    value,
                    parsed_unit.as_str(value != 1)
                )));
            }
            return Ok(Self::Rate { value, unit: parsed_unit });
        }
        Err(Error::Validation(format!(
            "schedule must be 'cron(...)' or 'rate(...)': '{}'",
            input
        )))
    }
}

/// Strip `name(` ... `)` and return the body, if `input` is that call form.
fn strip_call<'a>(input: &'a str, name: &str) -> Option<&'a str> {
    input
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('('))
        .and_then(|rest| rest.strip_suffix(')'))
}

impl std::fmt::Display for ScheduleExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cron(fields) => write!(f, "cron({})", fields),
            Self::Rate { value, unit } => {
                write!(f, "rate({} {})", value, unit.as_str(*value != 1))
            }
        }
    }
}
