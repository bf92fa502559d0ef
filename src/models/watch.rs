use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ArchiverError;

/// A recurring download rule for one playlist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Watch {
    pub id: String,
    pub name: String,
    pub playlist_url: String,
    #[serde(default)]
    pub title_filter: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u32,
    #[serde(default)]
    pub enabled: bool,
    /// Kept as the raw stored string so a malformed value never poisons the
    /// whole file; see [`Watch::last_run_at`].
    #[serde(default)]
    pub last_run: Option<String>,
}

fn default_interval_hours() -> u32 {
    4
}

impl Watch {
    /// True when `today` falls inside the inclusive `[start_date, end_date]` window.
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        self.start_date <= today && today <= self.end_date
    }

    /// Parsed `last_run`, or `None` when unset or unparsable.
    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.last_run.as_deref().and_then(parse_timestamp)
    }
}

/// Render a timestamp the way it is stored in the watches file.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored timestamp. Offset-less values written by older versions
/// are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Fields posted by the add/edit watch form. Missing fields decode as empty
/// and are rejected by [`WatchForm::into_watch`] where that matters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatchForm {
    pub name: String,
    pub playlist_url: String,
    pub title_filter: String,
    pub start_date: String,
    pub end_date: String,
    pub interval_hours: String,
    /// Checkbox: present (usually `"on"`) when ticked, absent otherwise.
    pub enabled: Option<String>,
}

impl WatchForm {
    /// Convert the submitted form into a brand-new watch with a fresh id and
    /// no `last_run`.
    pub fn into_watch(self) -> Result<Watch, ArchiverError> {
        let interval_hours: u32 = self.interval_hours.trim().parse().map_err(|_| {
            ArchiverError::Validation(format!(
                "interval_hours must be a whole number, got '{}'",
                self.interval_hours
            ))
        })?;
        if interval_hours == 0 {
            return Err(ArchiverError::Validation(
                "interval_hours must be at least 1".to_string(),
            ));
        }

        Ok(Watch {
            id: Uuid::now_v7().to_string(),
            name: self.name,
            playlist_url: self.playlist_url,
            title_filter: self.title_filter.trim().to_string(),
            start_date: parse_form_date("start_date", &self.start_date)?,
            end_date: parse_form_date("end_date", &self.end_date)?,
            interval_hours,
            enabled: self.enabled.is_some(),
            last_run: None,
        })
    }
}

fn parse_form_date(field: &str, raw: &str) -> Result<NaiveDate, ArchiverError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        ArchiverError::Validation(format!("{} must be a YYYY-MM-DD date, got '{}'", field, raw))
    })
}

/// A watch as shown in listings, with the derived `_active` flag.
#[derive(Debug, Clone, Serialize)]
pub struct WatchView {
    #[serde(flatten)]
    pub watch: Watch,
    #[serde(rename = "_active")]
    pub active: bool,
}

impl WatchView {
    pub fn new(watch: Watch, today: NaiveDate) -> Self {
        let active = watch.is_active_on(today);
        Self { watch, active }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn make_watch() -> Watch {
        Watch {
            id: "test-id-123".to_string(),
            name: "Test Watch".to_string(),
            playlist_url: "https://youtube.com/playlist?list=TEST".to_string(),
            title_filter: "test.*".to_string(),
            start_date: date("2025-01-01"),
            end_date: date("2027-12-31"),
            interval_hours: 4,
            enabled: true,
            last_run: None,
        }
    }

    fn make_form() -> WatchForm {
        WatchForm {
            name: "My Watch".to_string(),
            playlist_url: "https://youtube.com/playlist?list=X".to_string(),
            title_filter: " some regex ".to_string(),
            start_date: "2025-01-01".to_string(),
            end_date: "2025-12-31".to_string(),
            interval_hours: "6".to_string(),
            enabled: Some("on".to_string()),
        }
    }

    #[test]
    fn test_form_basic_conversion() {
        let watch = make_form().into_watch().expect("convert");
        assert_eq!(watch.name, "My Watch");
        assert_eq!(watch.title_filter, "some regex");
        assert_eq!(watch.interval_hours, 6);
        assert!(watch.enabled);
        assert!(watch.last_run.is_none());
        assert!(!watch.id.is_empty());
        assert_eq!(watch.start_date, date("2025-01-01"));
    }

    #[test]
    fn test_form_disabled_when_checkbox_missing() {
        let mut form = make_form();
        form.enabled = None;
        let watch = form.into_watch().expect("convert");
        assert!(!watch.enabled);
    }

    #[test]
    fn test_form_assigns_fresh_ids() {
        let a = make_form().into_watch().unwrap();
        let b = make_form().into_watch().unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_form_rejects_non_numeric_interval() {
        let mut form = make_form();
        form.interval_hours = "six".to_string();
        match form.into_watch() {
            Err(ArchiverError::Validation(msg)) => assert!(msg.contains("interval_hours")),
            other => panic!("Expected Validation, got: {:?}", other),
        }
    }

    #[test]
    fn test_form_rejects_zero_interval() {
        let mut form = make_form();
        form.interval_hours = "0".to_string();
        assert!(form.into_watch().is_err());
    }

    #[test]
    fn test_form_rejects_bad_date() {
        let mut form = make_form();
        form.end_date = "31/12/2025".to_string();
        match form.into_watch() {
            Err(ArchiverError::Validation(msg)) => assert!(msg.contains("end_date")),
            other => panic!("Expected Validation, got: {:?}", other),
        }
    }

    #[test]
    fn test_is_active_inclusive_bounds() {
        let watch = make_watch();
        assert!(watch.is_active_on(date("2025-01-01")));
        assert!(watch.is_active_on(date("2026-02-22")));
        assert!(watch.is_active_on(date("2027-12-31")));
        assert!(!watch.is_active_on(date("2024-12-31")));
        assert!(!watch.is_active_on(date("2028-01-01")));
    }

    #[test]
    fn test_watch_serde_field_names() {
        let watch = make_watch();
        let json = serde_json::to_value(&watch).expect("serialize");
        assert_eq!(json["start_date"], "2025-01-01");
        assert_eq!(json["interval_hours"], 4);
        assert!(json["last_run"].is_null());
    }

    #[test]
    fn test_watch_defaults_for_missing_fields() {
        let json = r#"{"id":"a","name":"n","playlist_url":"u","start_date":"2025-01-01","end_date":"2025-12-31"}"#;
        let watch: Watch = serde_json::from_str(json).expect("deserialize");
        assert_eq!(watch.title_filter, "");
        assert_eq!(watch.interval_hours, 4);
        assert!(!watch.enabled);
        assert!(watch.last_run.is_none());
    }

    #[test]
    fn test_view_serializes_active_flag_alongside_fields() {
        let view = WatchView::new(make_watch(), date("2026-02-22"));
        let json = serde_json::to_value(&view).expect("serialize");
        assert_eq!(json["_active"], true);
        assert_eq!(json["id"], "test-id-123");
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 22, 10, 0, 0).unwrap();
        let raw = format_timestamp(ts);
        assert_eq!(raw, "2026-02-22T10:00:00Z");
        assert_eq!(parse_timestamp(&raw), Some(ts));
    }

    #[test]
    fn test_parse_timestamp_with_offset() {
        let parsed = parse_timestamp("2026-02-22T12:00:00+02:00").expect("parse");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 2, 22, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_timestamp_naive_is_utc() {
        let parsed = parse_timestamp("2026-02-22T10:00:00").expect("parse");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 2, 22, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_last_run_at_unparsable_is_none() {
        let mut watch = make_watch();
        watch.last_run = Some("yesterday-ish".to_string());
        assert!(watch.last_run_at().is_none());
    }
}
