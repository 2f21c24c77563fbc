//! UTC to locale time resolution.
//!
//! Track files record instants in UTC. Entries are identified by the civil
//! time at the place the activity started, so the first recorded position is
//! mapped to a timezone and the instant converted into it.

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::track::Position;
use crate::types::EntryKey;

/// Format used for the `date` and `date_utc` fields.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Length of the `YYYY-MM-DDTHH:MM:SS` prefix of a track timestamp.
const UTC_PREFIX_LEN: usize = 19;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("invalid UTC timestamp: {0:?}")]
    InvalidUtc(String),
    #[error("invalid entry date: {0:?}")]
    InvalidDate(String),
    #[error("entry has no date field")]
    MissingDate,
}

/// Maps a geographic position to a timezone.
pub trait ZoneLookup {
    /// Returns the zone at the position, or `None` when it is unknown.
    fn zone_at(&self, position: Position) -> Option<Tz>;
}

/// Timezone lookup backed by the `tzf-rs` boundary data.
///
/// The finder is large, so it is only built on the first lookup.
#[derive(Default)]
pub struct TzfLookup {
    finder: OnceLock<tzf_rs::DefaultFinder>,
}

impl TzfLookup {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ZoneLookup for TzfLookup {
    fn zone_at(&self, position: Position) -> Option<Tz> {
        let finder = self.finder.get_or_init(tzf_rs::DefaultFinder::new);
        let name = finder.get_tz_name(position.longitude, position.latitude);
        name.parse().ok()
    }
}

/// An instant resolved into locale time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstant {
    pub local: DateTime<FixedOffset>,
    pub utc: DateTime<Utc>,
    pub key: EntryKey,
}

impl ResolvedInstant {
    /// Value of the `date` field.
    pub fn date_field(&self) -> String {
        self.local.format(DATE_FORMAT).to_string()
    }

    /// Value of the `date_utc` field.
    pub fn date_utc_field(&self) -> String {
        self.utc.fixed_offset().format(DATE_FORMAT).to_string()
    }
}

/// Parses the UTC prefix of a track timestamp, e.g. `2020-06-30T06:39:19.000Z`.
///
/// Sub-second digits and zone markers after the first 19 characters are
/// ignored; the value is always treated as UTC.
pub fn parse_utc(value: &str) -> Result<DateTime<Utc>, TimeError> {
    let prefix = value
        .get(..UTC_PREFIX_LEN)
        .ok_or_else(|| TimeError::InvalidUtc(value.to_string()))?;
    let naive = NaiveDateTime::parse_from_str(prefix, "%Y-%m-%dT%H:%M:%S")
        .map_err(|_| TimeError::InvalidUtc(value.to_string()))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Resolves a track timestamp into locale time at `position`.
///
/// Without a position, or when no zone is known at it, locale time equals UTC.
pub fn resolve(
    utc_value: &str,
    position: Option<Position>,
    zones: &dyn ZoneLookup,
) -> Result<ResolvedInstant, TimeError> {
    let utc = parse_utc(utc_value)?;

    let local = match position {
        Some(position) => {
            if let Some(zone) = zones.zone_at(position) {
                tracing::debug!(%utc, zone = zone.name(), ?position, "resolved locale time");
                utc.with_timezone(&zone).fixed_offset()
            } else {
                tracing::warn!(?position, "no timezone at position, using UTC");
                utc.fixed_offset()
            }
        }
        None => {
            tracing::debug!(%utc, "no position data, using UTC");
            utc.fixed_offset()
        }
    };

    Ok(ResolvedInstant {
        key: EntryKey::from_datetime(&local.naive_local()),
        local,
        utc,
    })
}

/// Parses a stored `date` field back into a locale instant.
///
/// Accepts RFC 3339 offsets (`+02:00`) and the colon-less `+0200` form.
pub fn parse_entry_date(value: &str) -> Result<DateTime<FixedOffset>, TimeError> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z"))
        .map_err(|_| TimeError::InvalidDate(value.to_string()))
}
