//! TCX activity extraction.
//!
//! Streams a Garmin Training Center XML file and reduces it to a
//! [`Measurements`] summary. Elements are matched by local name so that both
//! prefixed and default-namespace documents are accepted.
//!
//! Sample selection follows the schema layout:
//! - heart rate: every `HeartRateBpm/Value`
//! - altitude: every `AltitudeMeters`
//! - distance: every `Trackpoint/DistanceMeters` (lap totals are ignored)
//! - duration: sum of every `Lap/TotalTimeSeconds`

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::Reader as XmlReader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

/// Errors raised while extracting a track file.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("failed to read track file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed XML at byte {position}: {source}")]
    Xml {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },
    #[error("missing {0} in track file")]
    Missing(&'static str),
    #[error("invalid number in <{element}>: {value:?}")]
    InvalidNumber { element: &'static str, value: String },
}

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// Normalized summary of one recorded activity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Measurements {
    /// Declared sport of the activity, lower-cased (e.g. `biking`).
    pub sport: String,
    /// Raw start instant of the first lap, e.g. `2021-05-01T06:00:03.000Z`.
    pub started_at: String,
    /// Summed lap durations in seconds.
    pub duration_s: f64,
    pub heart_rates: Vec<i64>,
    pub altitudes: Vec<f64>,
    pub distances: Vec<f64>,
    /// First trackpoint carrying both coordinates.
    pub first_position: Option<Position>,
}

impl Measurements {
    /// Extracts measurements from a TCX file on disk.
    pub fn extract(path: &Path) -> Result<Self, TrackError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Extracts measurements from any buffered TCX source.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, TrackError> {
        let mut reader = XmlReader::from_reader(reader);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut path: Vec<Vec<u8>> = Vec::new();
        let mut out = Self::default();
        let mut sport: Option<String> = None;
        let mut started_at: Option<String> = None;
        let mut pending = PendingPosition::default();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|source| TrackError::Xml {
                    position: reader.buffer_position(),
                    source,
                })?;
            match event {
                Event::Start(e) => {
                    on_open(&e, &mut sport, &mut started_at)?;
                    let name = e.local_name().as_ref().to_vec();
                    if name == b"Position" && parent_is(&path, b"Trackpoint") {
                        pending = PendingPosition::default();
                    }
                    path.push(name);
                }
                Event::Empty(e) => on_open(&e, &mut sport, &mut started_at)?,
                Event::Text(t) => {
                    let text = t.unescape().map_err(|source| TrackError::Xml {
                        position: reader.buffer_position(),
                        source,
                    })?;
                    out.on_text(&path, text.trim(), &mut pending)?;
                }
                Event::End(_) => {
                    if let Some(name) = path.pop() {
                        if name == b"Position" && parent_is(&path, b"Trackpoint") {
                            if let (None, Some(position)) = (out.first_position, pending.take()) {
                                out.first_position = Some(position);
                            }
                        }
                    }
                }
                Event::Eof => break,
                _ => (),
            }
            buf.clear();
        }

        out.sport = sport.ok_or(TrackError::Missing("Activity Sport attribute"))?;
        out.started_at = started_at.ok_or(TrackError::Missing("Lap StartTime attribute"))?;
        Ok(out)
    }

    fn on_text(
        &mut self,
        path: &[Vec<u8>],
        text: &str,
        pending: &mut PendingPosition,
    ) -> Result<(), TrackError> {
        let Some(leaf) = path.last() else {
            return Ok(());
        };
        let parent = &path[..path.len() - 1];
        match leaf.as_slice() {
            b"Value" if parent_is(parent, b"HeartRateBpm") => {
                self.heart_rates.push(parse_number(text, "Value")?);
            }
            b"AltitudeMeters" => self.altitudes.push(parse_number(text, "AltitudeMeters")?),
            b"DistanceMeters" if parent_is(parent, b"Trackpoint") => {
                self.distances.push(parse_number(text, "DistanceMeters")?);
            }
            b"TotalTimeSeconds" if parent_is(parent, b"Lap") => {
                self.duration_s += parse_number::<f64>(text, "TotalTimeSeconds")?;
            }
            b"LatitudeDegrees" if parent_is(parent, b"Position") => {
                pending.latitude = Some(parse_number(text, "LatitudeDegrees")?);
            }
            b"LongitudeDegrees" if parent_is(parent, b"Position") => {
                pending.longitude = Some(parse_number(text, "LongitudeDegrees")?);
            }
            _ => {}
        }
        Ok(())
    }

    pub fn has_heart_rate(&self) -> bool {
        !self.heart_rates.is_empty()
    }

    pub fn has_altitude(&self) -> bool {
        !self.altitudes.is_empty()
    }

    pub fn has_distance(&self) -> bool {
        !self.distances.is_empty()
    }

    /// Last cumulative distance sample in meters, or 0.
    pub fn distance_m(&self) -> f64 {
        self.distances.last().copied().unwrap_or(0.0)
    }

    /// Integer mean of the heart-rate samples, or 0.
    pub fn heart_rate_avg(&self) -> i64 {
        let count = i64::try_from(self.heart_rates.len()).unwrap_or(i64::MAX);
        if count == 0 {
            return 0;
        }
        self.heart_rates.iter().sum::<i64>() / count
    }

    pub fn heart_rate_max(&self) -> i64 {
        self.heart_rates.iter().copied().max().unwrap_or(0)
    }

    pub fn altitude_max(&self) -> f64 {
        self.altitudes.iter().copied().reduce(f64::max).unwrap_or(0.0)
    }

    pub fn altitude_min(&self) -> f64 {
        self.altitudes.iter().copied().reduce(f64::min).unwrap_or(0.0)
    }

    /// Sum of positive altitude deltas in meters.
    pub fn ascent(&self) -> f64 {
        self.altitude_deltas().filter(|d| *d > 0.0).sum()
    }

    /// Sum of absolute negative altitude deltas in meters.
    pub fn descent(&self) -> f64 {
        self.altitude_deltas().filter(|d| *d < 0.0).map(f64::abs).sum()
    }

    fn altitude_deltas(&self) -> impl Iterator<Item = f64> + '_ {
        self.altitudes.windows(2).map(|w| w[1] - w[0])
    }

    /// Average speed in km/h; 0 when no time was recorded.
    pub fn average_speed_kmh(&self) -> f64 {
        if self.duration_s <= 0.0 {
            return 0.0;
        }
        (self.distance_m() / 1000.0) / (self.duration_s / 3600.0)
    }

    /// Average pace as `MM:SS` per kilometer.
    ///
    /// Minutes wrap at 60, like a clock reading of the seconds value.
    pub fn pace(&self) -> String {
        let distance = self.distance_m();
        let secs_per_km = if distance > 0.0 {
            self.duration_s / (distance / 1000.0)
        } else {
            0.0
        };
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "pace is displayed in whole seconds"
        )]
        let secs = secs_per_km.max(0.0) as u64;
        format!("{:02}:{:02}", (secs / 60) % 60, secs % 60)
    }
}

#[derive(Debug, Default)]
struct PendingPosition {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl PendingPosition {
    fn take(&mut self) -> Option<Position> {
        match (self.latitude.take(), self.longitude.take()) {
            (Some(latitude), Some(longitude)) => Some(Position {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

fn on_open(
    e: &BytesStart<'_>,
    sport: &mut Option<String>,
    started_at: &mut Option<String>,
) -> Result<(), TrackError> {
    match e.local_name().as_ref() {
        b"Activity" if sport.is_none() => {
            *sport = attribute(e, b"Sport")?.map(|s| s.to_lowercase());
        }
        b"Lap" if started_at.is_none() => {
            *started_at = attribute(e, b"StartTime")?;
        }
        _ => {}
    }
    Ok(())
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, TrackError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| TrackError::Xml {
            position: 0,
            source: err.into(),
        })?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value().map_err(|source| TrackError::Xml {
                position: 0,
                source,
            })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parent_is(path: &[Vec<u8>], name: &[u8]) -> bool {
    path.last().is_some_and(|p| p.as_slice() == name)
}

fn parse_number<T: std::str::FromStr>(text: &str, element: &'static str) -> Result<T, TrackError> {
    text.parse().map_err(|_| TrackError::InvalidNumber {
        element,
        value: text.to_string(),
    })
}
