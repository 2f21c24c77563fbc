//! Ledger reconciliation.
//!
//! Pairs newly created entries with ledger rows and merges the ledger's
//! attributes into them.
//!
//! # Matching
//!
//! Entry and ledger clocks drift, and ledger times are sometimes logged in
//! the wrong timezone. A row is therefore searched in this order:
//!
//! 1. The entry's own key.
//! 2. The entry's locale instant shifted by each hour offset in
//!    [`HOUR_OFFSETS`] (outer loop) and each second offset in
//!    [`SECOND_OFFSETS`] (inner loop).
//!
//! The first hit wins, so smaller offsets are preferred and, at equal
//! magnitude, the positive direction is tried first.
//!
//! # Merge policy
//!
//! Applied once per matched entry, each rule independently:
//! - `category` from the ledger's sport category (always overwritten)
//! - `topic` from the comment sentinel or the training type (always overwritten)
//! - `description` from the comment, removed when empty
//! - `device` / `utensils` from the equipment list, removed when empty
//! - `sport` from the device profile, removed without a device

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::{DeviceRegistry, parse_equipment};
use crate::entry::{Entry, category, field};
use crate::ledger::{Ledger, LedgerRow};
use crate::locale::TimeError;
use crate::types::{EntryKey, FieldValue};

/// Hour offsets of the fuzzy search, in search order.
pub const HOUR_OFFSETS: [i64; 9] = [0, 1, -1, 2, -2, 3, -3, 4, -4];

/// Second offsets tried within each hour offset, in search order.
pub const SECOND_OFFSETS: [i64; 7] = [0, 1, -1, 2, -2, 3, -3];

/// Comment prefix (case-insensitive) marking the weekly group ride.
pub const ROUND_HOUR_SENTINEL: &str = "die runde stunde";

/// Topic assigned to entries whose comment starts with [`ROUND_HOUR_SENTINEL`].
pub const ROUND_HOUR_TOPIC: &str = "die-runde-stunde";

/// Errors that abort reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("missing device directory for {device:?} (ledger row {key})")]
    UnknownDevice { device: String, key: EntryKey },
    #[error("entry {entry} has no usable date: {source}")]
    EntryDate {
        entry: String,
        #[source]
        source: TimeError,
    },
    #[error("failed to save entry {entry}: {source}")]
    Persist {
        entry: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// How to treat a ledger row naming equipment missing from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EquipmentPolicy {
    /// Stop the whole run.
    #[default]
    Abort,
    /// Leave the entry unenriched and count it as failed.
    SkipRow,
}

/// Persistence seam used to write back enriched entries.
pub trait EntryWriter {
    fn save(&self, entry: &Entry) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// How a ledger row was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Fuzzy { hours: i64, seconds: i64 },
}

/// A located ledger row.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub row: &'a LedgerRow,
    pub kind: MatchKind,
}

/// Outcome of enriching one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrichment {
    Merged(MatchKind),
    Unmatched,
    /// The row named unknown equipment under [`EquipmentPolicy::SkipRow`].
    Rejected { device: String },
}

/// Totals of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub enriched: usize,
    /// Directory names of entries without a ledger row.
    pub unmatched: Vec<String>,
    /// Directory names of entries whose row was rejected, with the unknown device.
    pub rejected: Vec<(String, String)>,
}

impl ReconcileReport {
    pub fn failed(&self) -> usize {
        self.unmatched.len() + self.rejected.len()
    }
}

/// Matches entries against a ledger and merges ledger attributes.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    ledger: &'a Ledger,
    devices: &'a DeviceRegistry,
    policy: EquipmentPolicy,
}

impl<'a> Reconciler<'a> {
    pub const fn new(ledger: &'a Ledger, devices: &'a DeviceRegistry, policy: EquipmentPolicy) -> Self {
        Self {
            ledger,
            devices,
            policy,
        }
    }

    /// Finds the ledger row for a locale instant.
    pub fn find(&self, local: &DateTime<FixedOffset>) -> Option<Match<'a>> {
        let exact = EntryKey::from_datetime(&local.naive_local());
        if let Some(row) = self.ledger.get(&exact) {
            return Some(Match {
                row,
                kind: MatchKind::Exact,
            });
        }

        for hours in HOUR_OFFSETS {
            for seconds in SECOND_OFFSETS {
                let shifted = *local + Duration::hours(hours) + Duration::seconds(seconds);
                let key = EntryKey::from_datetime(&shifted.naive_local());
                if let Some(row) = self.ledger.get(&key) {
                    tracing::debug!(%exact, %key, hours, seconds, "found ledger row by fuzzy match");
                    return Some(Match {
                        row,
                        kind: MatchKind::Fuzzy { hours, seconds },
                    });
                }
            }
        }
        None
    }

    /// Finds the entry's ledger row and merges it into the entry.
    ///
    /// The entry is left untouched unless the outcome is [`Enrichment::Merged`].
    pub fn enrich(&self, entry: &mut Entry) -> Result<Enrichment, ReconcileError> {
        let local = entry
            .locale_instant()
            .map_err(|source| ReconcileError::EntryDate {
                entry: entry.dir_name().to_string(),
                source,
            })?;
        let Some(found) = self.find(&local) else {
            return Ok(Enrichment::Unmatched);
        };
        tracing::debug!(entry = entry.dir_name(), row = %found.row.key, "matched ledger row");

        let equipment = parse_equipment(&found.row.equipment);
        if let Some(unknown) = equipment.iter().find(|d| !self.devices.contains(d)) {
            return match self.policy {
                EquipmentPolicy::Abort => Err(ReconcileError::UnknownDevice {
                    device: unknown.clone(),
                    key: found.row.key.clone(),
                }),
                EquipmentPolicy::SkipRow => Ok(Enrichment::Rejected {
                    device: unknown.clone(),
                }),
            };
        }

        apply_row(entry, found.row, &equipment, self.devices);
        Ok(Enrichment::Merged(found.kind))
    }

    /// Enriches every entry and saves each merged one through `writer`.
    pub fn reconcile(
        &self,
        entries: &mut [Entry],
        writer: &dyn EntryWriter,
    ) -> Result<ReconcileReport, ReconcileError> {
        let mut report = ReconcileReport::default();

        for entry in entries.iter_mut() {
            match self.enrich(entry)? {
                Enrichment::Merged(_) => {
                    writer
                        .save(entry)
                        .map_err(|source| ReconcileError::Persist {
                            entry: entry.dir_name().to_string(),
                            source,
                        })?;
                    report.enriched += 1;
                }
                Enrichment::Unmatched => {
                    tracing::debug!(entry = entry.dir_name(), "key not found in ledger");
                    report.unmatched.push(entry.dir_name().to_string());
                }
                Enrichment::Rejected { device } => {
                    tracing::debug!(entry = entry.dir_name(), %device, "ledger row names unknown device");
                    report.rejected.push((entry.dir_name().to_string(), device));
                }
            }
        }

        Ok(report)
    }
}

/// Applies the merge policy for a validated row.
fn apply_row(entry: &mut Entry, row: &LedgerRow, equipment: &[String], devices: &DeviceRegistry) {
    entry.set(field::CATEGORY, category_for_ledger(&row.sport_category));
    entry.set(field::TOPIC, topic_for(row));
    entry.set_optional(!row.comment.is_empty(), field::DESCRIPTION, row.comment.as_str());

    let (device, utensils) = match equipment.split_first() {
        Some((first, rest)) => (first.as_str(), rest.join(", ")),
        None => ("", String::new()),
    };
    entry.set_optional(!device.is_empty(), field::DEVICE, device);
    entry.set_optional(!utensils.is_empty(), field::UTENSILS, utensils);

    let sport = entry
        .get(field::DEVICE)
        .and_then(FieldValue::as_str)
        .map(|device| devices.sport_of(device));
    match sport {
        Some(sport) => entry.set(field::SPORT, sport),
        None => entry.remove(field::SPORT),
    }
}

/// Category for a ledger sport category, compared case-insensitively.
pub fn category_for_ledger(sport_category: &str) -> &'static str {
    match sport_category.to_lowercase().as_str() {
        "laufsport" => category::RUNNING,
        "radsport" | "mountainbike" => category::CYCLING,
        "fitness" => category::GYM,
        "wandern" => category::HIKING,
        _ => category::OTHERS,
    }
}

/// Topic of a ledger row.
pub fn topic_for(row: &LedgerRow) -> String {
    if row.comment.to_lowercase().starts_with(ROUND_HOUR_SENTINEL) {
        ROUND_HOUR_TOPIC.to_string()
    } else {
        row.training_type.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;

    use crate::device::tests::registry;
    use crate::locale::parse_entry_date;
    use crate::types::{FieldValue, Fields};

    fn row(key: &str, sport: &str, training: &str, equipment: &str, comment: &str) -> LedgerRow {
        LedgerRow {
            key: EntryKey::new(key).unwrap(),
            comment: comment.to_string(),
            training_type: training.to_string(),
            sport_category: sport.to_string(),
            equipment: equipment.to_string(),
        }
    }

    fn simple_row(key: &str) -> LedgerRow {
        row(key, "Radsport", "Grundlage", "", "")
    }

    fn entry_at(dir: &str, date: &str) -> Entry {
        let mut fields = Fields::new();
        fields.insert(field::DATE.to_string(), FieldValue::from(date));
        Entry::new(format!("/posts/2021/{dir}/index.md"), fields, "")
    }

    fn devices() -> DeviceRegistry {
        registry(&[("focus-mtb", Some("mtb")), ("garmin-edge", Some("navigation"))])
    }

    fn found_kind(ledger: &Ledger, date: &str) -> Option<MatchKind> {
        let devices = DeviceRegistry::new();
        let reconciler = Reconciler::new(ledger, &devices, EquipmentPolicy::Abort);
        reconciler.find(&parse_entry_date(date).unwrap()).map(|m| m.kind)
    }

    #[derive(Default)]
    struct RecordingWriter {
        saved: RefCell<Vec<String>>,
    }

    impl EntryWriter for RecordingWriter {
        fn save(&self, entry: &Entry) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.saved.borrow_mut().push(entry.dir_name().to_string());
            Ok(())
        }
    }

    #[test]
    fn exact_key_is_preferred_over_fuzzy_candidates() {
        let ledger: Ledger = [
            simple_row("20210501-060500"),
            simple_row("20210501-060501"),
            simple_row("20210501-070500"),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            found_kind(&ledger, "2021-05-01T06:05:00+00:00"),
            Some(MatchKind::Exact)
        );
    }

    #[test]
    fn three_seconds_later_matches_before_next_hour() {
        let ledger: Ledger = [simple_row("20210501-060503"), simple_row("20210501-070500")]
            .into_iter()
            .collect();
        assert_eq!(
            found_kind(&ledger, "2021-05-01T06:05:00+00:00"),
            Some(MatchKind::Fuzzy {
                hours: 0,
                seconds: 3
            })
        );
    }

    #[test]
    fn positive_offset_wins_at_equal_magnitude() {
        let ledger: Ledger = [simple_row("20210501-060458"), simple_row("20210501-060502")]
            .into_iter()
            .collect();
        assert_eq!(
            found_kind(&ledger, "2021-05-01T06:05:00+00:00"),
            Some(MatchKind::Fuzzy {
                hours: 0,
                seconds: 2
            })
        );

        let ledger: Ledger = [simple_row("20210501-040500"), simple_row("20210501-080500")]
            .into_iter()
            .collect();
        assert_eq!(
            found_kind(&ledger, "2021-05-01T06:05:00+00:00"),
            Some(MatchKind::Fuzzy {
                hours: 2,
                seconds: 0
            })
        );
    }

    #[test]
    fn smaller_hour_offset_beats_smaller_second_offset() {
        let ledger: Ledger = [simple_row("20210501-050457"), simple_row("20210501-080500")]
            .into_iter()
            .collect();
        assert_eq!(
            found_kind(&ledger, "2021-05-01T06:05:00+00:00"),
            Some(MatchKind::Fuzzy {
                hours: -1,
                seconds: -3
            })
        );
    }

    #[test]
    fn search_is_bounded() {
        for key in ["20210501-060504", "20210501-010500", "20210501-110500", "20210501-100504"] {
            let ledger: Ledger = [simple_row(key)].into_iter().collect();
            assert_eq!(found_kind(&ledger, "2021-05-01T06:05:00+00:00"), None, "{key}");
        }

        for (key, hours, seconds) in [
            ("20210501-100503", 4, 3),
            ("20210501-020457", -4, -3),
        ] {
            let ledger: Ledger = [simple_row(key)].into_iter().collect();
            assert_eq!(
                found_kind(&ledger, "2021-05-01T06:05:00+00:00"),
                Some(MatchKind::Fuzzy { hours, seconds }),
                "{key}"
            );
        }
    }

    #[test]
    fn fuzzy_search_crosses_midnight() {
        let ledger: Ledger = [simple_row("20210502-000001")].into_iter().collect();
        assert_eq!(
            found_kind(&ledger, "2021-05-01T23:59:59+02:00"),
            Some(MatchKind::Fuzzy {
                hours: 0,
                seconds: 2
            })
        );
    }

    #[test]
    fn merges_equipment_and_sport() {
        let ledger: Ledger = [row(
            "20210501-080000",
            "Mountainbike",
            "Grundlage",
            "Focus MTB, Garmin Edge",
            "Trails am See",
        )]
        .into_iter()
        .collect();
        let devices = devices();
        let reconciler = Reconciler::new(&ledger, &devices, EquipmentPolicy::Abort);
        let mut entry = entry_at("20210501-080000", "2021-05-01T08:00:00+02:00");

        let outcome = reconciler.enrich(&mut entry).unwrap();

        assert_eq!(outcome, Enrichment::Merged(MatchKind::Exact));
        assert_eq!(entry.get(field::DEVICE), Some(&FieldValue::from("focus-mtb")));
        assert_eq!(entry.get(field::UTENSILS), Some(&FieldValue::from("garmin-edge")));
        assert_eq!(entry.get(field::SPORT), Some(&FieldValue::from("mtb")));
        assert_eq!(entry.get(field::CATEGORY), Some(&FieldValue::from("cycling")));
        assert_eq!(entry.get(field::TOPIC), Some(&FieldValue::from("grundlage")));
        assert_eq!(
            entry.get(field::DESCRIPTION),
            Some(&FieldValue::from("Trails am See"))
        );
    }

    #[test]
    fn unknown_device_aborts_by_default() {
        let ledger: Ledger = [row("20210501-080000", "Mountainbike", "x", "Focus MTB, Garmin Edge", "")]
            .into_iter()
            .collect();
        let devices = registry(&[("focus-mtb", Some("mtb"))]);
        let reconciler = Reconciler::new(&ledger, &devices, EquipmentPolicy::Abort);
        let mut entry = entry_at("20210501-080000", "2021-05-01T08:00:00+02:00");
        let before = entry.clone();

        let err = reconciler.enrich(&mut entry).unwrap_err();

        assert!(matches!(err, ReconcileError::UnknownDevice { ref device, .. } if device == "garmin-edge"));
        assert_eq!(entry, before);
    }

    #[test]
    fn unknown_device_can_skip_the_row() {
        let ledger: Ledger = [row("20210501-080000", "Mountainbike", "x", "Focus MTB, Garmin Edge", "")]
            .into_iter()
            .collect();
        let devices = registry(&[("focus-mtb", Some("mtb"))]);
        let reconciler = Reconciler::new(&ledger, &devices, EquipmentPolicy::SkipRow);
        let mut entries = vec![entry_at("20210501-080000", "2021-05-01T08:00:00+02:00")];
        let before = entries[0].clone();
        let writer = RecordingWriter::default();

        let report = reconciler.reconcile(&mut entries, &writer).unwrap();

        assert_eq!(report.enriched, 0);
        assert_eq!(
            report.rejected,
            vec![("20210501-080000".to_string(), "garmin-edge".to_string())]
        );
        assert!(writer.saved.borrow().is_empty());
        assert_eq!(entries[0], before);
    }

    #[test]
    fn empty_ledger_values_remove_stale_fields() {
        let ledger: Ledger = [row("20210501-080000", "Sonstiges", "Kraft", "", "")]
            .into_iter()
            .collect();
        let devices = devices();
        let reconciler = Reconciler::new(&ledger, &devices, EquipmentPolicy::Abort);
        let mut entry = entry_at("20210501-080000", "2021-05-01T08:00:00+02:00");
        entry.set(field::DESCRIPTION, "old");
        entry.set(field::DEVICE, "focus-mtb");
        entry.set(field::UTENSILS, "garmin-edge");
        entry.set(field::SPORT, "mtb");

        reconciler.enrich(&mut entry).unwrap();

        for key in [field::DESCRIPTION, field::DEVICE, field::UTENSILS, field::SPORT] {
            assert!(!entry.contains(key), "{key} should have been removed");
        }
        assert_eq!(entry.get(field::CATEGORY), Some(&FieldValue::from("others")));
        assert_eq!(entry.get(field::TOPIC), Some(&FieldValue::from("kraft")));
    }

    #[test]
    fn single_device_has_no_utensils() {
        let ledger: Ledger = [row("20210501-080000", "Radsport", "x", "Focus MTB", "")]
            .into_iter()
            .collect();
        let devices = devices();
        let reconciler = Reconciler::new(&ledger, &devices, EquipmentPolicy::Abort);
        let mut entry = entry_at("20210501-080000", "2021-05-01T08:00:00+02:00");
        entry.set(field::UTENSILS, "stale");

        reconciler.enrich(&mut entry).unwrap();

        assert_eq!(entry.get(field::DEVICE), Some(&FieldValue::from("focus-mtb")));
        assert!(!entry.contains(field::UTENSILS));
    }

    #[test]
    fn merge_is_idempotent() {
        let ledger: Ledger = [row(
            "20210501-080000",
            "Radsport",
            "Grundlage",
            "Focus MTB, Garmin Edge",
            "Die Runde Stunde #12",
        )]
        .into_iter()
        .collect();
        let devices = devices();
        let reconciler = Reconciler::new(&ledger, &devices, EquipmentPolicy::Abort);
        let mut entry = entry_at("20210501-080000", "2021-05-01T08:00:00+02:00");

        reconciler.enrich(&mut entry).unwrap();
        let once = entry.clone();
        reconciler.enrich(&mut entry).unwrap();

        assert_eq!(entry, once);
        assert_eq!(entry.get(field::TOPIC), Some(&FieldValue::from(ROUND_HOUR_TOPIC)));
    }

    #[test]
    fn reconcile_counts_and_persists() {
        let ledger: Ledger = [simple_row("20210501-060503")].into_iter().collect();
        let devices = devices();
        let reconciler = Reconciler::new(&ledger, &devices, EquipmentPolicy::Abort);
        let mut entries = vec![
            entry_at("20210501-060500", "2021-05-01T06:05:00+00:00"),
            entry_at("20210601-060500", "2021-06-01T06:05:00+00:00"),
        ];
        let writer = RecordingWriter::default();

        let report = reconciler.reconcile(&mut entries, &writer).unwrap();

        assert_eq!(report.enriched, 1);
        assert_eq!(report.unmatched, vec!["20210601-060500"]);
        assert_eq!(report.failed(), 1);
        assert_eq!(*writer.saved.borrow(), vec!["20210501-060500"]);
        assert!(!entries[1].contains(field::CATEGORY));
    }

    #[test]
    fn entry_without_date_is_an_error() {
        let ledger = Ledger::default();
        let devices = devices();
        let reconciler = Reconciler::new(&ledger, &devices, EquipmentPolicy::Abort);
        let mut entry = Entry::new("/posts/2021/20210501-060500/index.md", Fields::new(), "");
        assert!(matches!(
            reconciler.enrich(&mut entry),
            Err(ReconcileError::EntryDate { .. })
        ));
    }

    #[test]
    fn ledger_categories() {
        assert_eq!(category_for_ledger("Laufsport"), category::RUNNING);
        assert_eq!(category_for_ledger("RADSPORT"), category::CYCLING);
        assert_eq!(category_for_ledger("mountainbike"), category::CYCLING);
        assert_eq!(category_for_ledger("Fitness"), category::GYM);
        assert_eq!(category_for_ledger("Wandern"), category::HIKING);
        assert_eq!(category_for_ledger("Schwimmen"), category::OTHERS);
    }
}
