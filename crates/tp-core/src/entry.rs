//! Activity post entries and their front-matter fields.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, FixedOffset};

use crate::locale::{self, ResolvedInstant, TimeError};
use crate::track::Measurements;
use crate::types::{EntryKey, FieldValue, Fields, ValidationError};

/// Front-matter field names of an activity post.
pub mod field {
    pub const ACTIVITY: &str = "activity";
    pub const ACTIVITY_SPORT: &str = "activity_sport";
    pub const ALTITUDE_MAX: &str = "altitude_max__m";
    pub const ALTITUDE_MIN: &str = "altitude_min__m";
    pub const ASCENT: &str = "ascent__m";
    pub const AVERAGE_HEART_RATE: &str = "average_heart_rate__bpm";
    pub const AVERAGE_SPEED: &str = "average_speed__km_per_h";
    pub const BASE: &str = "base";
    pub const CATEGORY: &str = "category";
    pub const DATE: &str = "date";
    pub const DATE_UTC: &str = "date_utc";
    pub const DESCENT: &str = "descent__m";
    pub const DESCRIPTION: &str = "description";
    pub const DEVICE: &str = "device";
    pub const DISTANCE: &str = "distance__m";
    pub const DRAFT: &str = "draft";
    pub const MAXIMUM_HEART_RATE: &str = "maximum_heart_rate__bpm";
    pub const PACE: &str = "pace__s_per_km";
    pub const SPORT: &str = "sport";
    pub const TITLE: &str = "title";
    pub const TOPIC: &str = "topic";
    pub const TOTAL_TIME: &str = "total_time__s";
    pub const UTENSILS: &str = "utensils";
    pub const YEAR: &str = "year";
}

/// Post categories.
pub mod category {
    pub const CYCLING: &str = "cycling";
    pub const GYM: &str = "gym";
    pub const HIKING: &str = "hiking";
    pub const RUNNING: &str = "running";
    pub const OTHERS: &str = "others";
}

/// Value of the `base` field for posts created from track files.
pub const BASE_TCX: &str = "tcx";

/// File name of a post document inside its directory.
pub const ENTRY_FILE_NAME: &str = "index.md";

/// One content entry: a front-matter document stored at `path`.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Path of the `index.md` file.
    pub path: PathBuf,
    pub fields: Fields,
    /// Markdown content after the front-matter block.
    pub body: String,
}

impl Entry {
    pub fn new(path: impl Into<PathBuf>, fields: Fields, body: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fields,
            body: body.into(),
        }
    }

    /// Name of the directory holding the entry, e.g. `20201231-172153`.
    pub fn dir_name(&self) -> &str {
        self.path
            .parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Identity key taken from the directory name.
    pub fn key(&self) -> Result<EntryKey, ValidationError> {
        EntryKey::new(self.dir_name())
    }

    /// Locale start instant from the `date` field.
    pub fn locale_instant(&self) -> Result<DateTime<FixedOffset>, TimeError> {
        let value = self
            .get(field::DATE)
            .and_then(FieldValue::as_text)
            .ok_or(TimeError::MissingDate)?;
        locale::parse_entry_date(value)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<FieldValue>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Sets `key` when `present` holds, otherwise removes it.
    pub fn set_optional(&mut self, present: bool, key: &str, value: impl Into<FieldValue>) {
        if present {
            self.set(key, value);
        } else {
            self.remove(key);
        }
    }

    /// Deletes `key` if present.
    pub fn remove(&mut self, key: &str) {
        self.fields.remove(key);
    }

    /// Writes the track measurements into the entry.
    ///
    /// Fields gated by a data-availability flag are removed when the flag is
    /// false, so no stale value survives a re-extraction.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "stored measurements are whole units"
    )]
    pub fn merge_extraction(
        &mut self,
        m: &Measurements,
        instant: &ResolvedInstant,
        source_file: &Path,
    ) {
        let file_name = source_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let title = file_name.split('.').next().unwrap_or_default().to_string();

        let altitude = m.has_altitude();
        let heart_rate = m.has_heart_rate();
        let distance = m.has_distance();

        self.set(field::ACTIVITY, file_name);
        self.set_optional(altitude, field::ALTITUDE_MAX, m.altitude_max() as i64);
        self.set_optional(altitude, field::ALTITUDE_MIN, m.altitude_min() as i64);
        self.set_optional(altitude, field::ASCENT, m.ascent() as i64);
        self.set_optional(altitude, field::DESCENT, m.descent() as i64);
        self.set_optional(heart_rate, field::AVERAGE_HEART_RATE, m.heart_rate_avg());
        self.set_optional(heart_rate, field::MAXIMUM_HEART_RATE, m.heart_rate_max());
        self.set_optional(distance, field::DISTANCE, m.distance_m() as i64);
        self.set_optional(distance, field::PACE, m.pace());
        self.set_optional(
            distance,
            field::AVERAGE_SPEED,
            (m.average_speed_kmh() * 100.0).round() / 100.0,
        );
        self.set(field::BASE, BASE_TCX);
        self.set(field::CATEGORY, category_for_sport(&m.sport));
        self.set(field::DATE, instant.date_field());
        self.set(field::DATE_UTC, instant.date_utc_field());
        self.set(field::DRAFT, true);
        self.set(field::ACTIVITY_SPORT, m.sport.as_str());
        self.set(field::TITLE, title);
        self.set(field::TOTAL_TIME, m.duration_s as i64);
        self.set(field::YEAR, instant.utc.year().to_string());
    }
}

/// Category implied by a track file's sport attribute.
pub fn category_for_sport(sport: &str) -> &'static str {
    match sport {
        "biking" => category::CYCLING,
        "running" => category::RUNNING,
        _ => category::HIKING,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::locale::{self, tests::FixedZone};

    fn instant(utc: &str) -> ResolvedInstant {
        locale::resolve(utc, None, &FixedZone(None)).unwrap()
    }

    fn full_measurements() -> Measurements {
        Measurements {
            sport: "biking".to_string(),
            started_at: "2021-05-01T06:00:03.000Z".to_string(),
            duration_s: 3600.9,
            heart_rates: vec![100, 150],
            altitudes: vec![500.0, 520.5, 510.0],
            distances: vec![0.0, 25_000.0],
            first_position: None,
        }
    }

    fn entry() -> Entry {
        Entry::new("/posts/2021/20210501-060003/index.md", Fields::new(), "")
    }

    #[test]
    fn merge_sets_all_fields() {
        let mut e = entry();
        let m = full_measurements();
        e.merge_extraction(&m, &instant(&m.started_at), Path::new("/in/ride.tcx"));

        assert_eq!(e.get(field::ACTIVITY), Some(&FieldValue::from("ride.tcx")));
        assert_eq!(e.get(field::TITLE), Some(&FieldValue::from("ride")));
        assert_eq!(e.get(field::TOTAL_TIME), Some(&FieldValue::Integer(3600)));
        assert_eq!(e.get(field::DISTANCE), Some(&FieldValue::Integer(25_000)));
        assert_eq!(e.get(field::AVERAGE_SPEED), Some(&FieldValue::Float(24.99)));
        assert_eq!(e.get(field::PACE), Some(&FieldValue::from("02:24")));
        assert_eq!(e.get(field::ASCENT), Some(&FieldValue::Integer(20)));
        assert_eq!(e.get(field::DESCENT), Some(&FieldValue::Integer(10)));
        assert_eq!(e.get(field::ALTITUDE_MAX), Some(&FieldValue::Integer(520)));
        assert_eq!(e.get(field::AVERAGE_HEART_RATE), Some(&FieldValue::Integer(125)));
        assert_eq!(e.get(field::MAXIMUM_HEART_RATE), Some(&FieldValue::Integer(150)));
        assert_eq!(e.get(field::CATEGORY), Some(&FieldValue::from("cycling")));
        assert_eq!(e.get(field::DRAFT), Some(&FieldValue::Boolean(true)));
        assert_eq!(e.get(field::YEAR), Some(&FieldValue::from("2021")));
        assert_eq!(
            e.get(field::DATE),
            Some(&FieldValue::from("2021-05-01T06:00:03+00:00"))
        );
        assert_eq!(e.key().unwrap().as_str(), "20210501-060003");
    }

    #[test]
    fn re_extraction_removes_gated_fields() {
        let mut e = entry();
        let m = full_measurements();
        let at = instant(&m.started_at);
        e.merge_extraction(&m, &at, Path::new("ride.tcx"));
        assert!(e.contains(field::AVERAGE_HEART_RATE));

        let bare = Measurements {
            heart_rates: vec![],
            altitudes: vec![],
            distances: vec![],
            ..m
        };
        e.merge_extraction(&bare, &at, Path::new("ride.tcx"));

        for key in [
            field::AVERAGE_HEART_RATE,
            field::MAXIMUM_HEART_RATE,
            field::ALTITUDE_MAX,
            field::ALTITUDE_MIN,
            field::ASCENT,
            field::DESCENT,
            field::DISTANCE,
            field::PACE,
            field::AVERAGE_SPEED,
        ] {
            assert!(!e.contains(key), "{key} should have been removed");
        }
        assert!(e.contains(field::TOTAL_TIME));
    }

    #[test]
    fn locale_instant_reads_date_field() {
        let mut e = entry();
        e.set(field::DATE, "2021-05-01T08:00:00+02:00");
        let local = e.locale_instant().unwrap();
        assert_eq!(local.offset().local_minus_utc(), 7200);

        e.set(field::DATE, FieldValue::Datetime("2021-05-01T08:00:00+02:00".to_string()));
        assert_eq!(e.locale_instant().unwrap(), local);

        e.remove(field::DATE);
        assert!(e.locale_instant().is_err());
    }

    #[test]
    fn sport_categories() {
        assert_eq!(category_for_sport("biking"), category::CYCLING);
        assert_eq!(category_for_sport("running"), category::RUNNING);
        assert_eq!(category_for_sport("other"), category::HIKING);
    }
}
