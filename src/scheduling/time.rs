//! Wall-clock helpers. All booking dates and times are the school's local
//! time; timestamps in the database are UTC.

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use serde::{de, Deserialize, Deserializer};

/// Parses `HH:mm` or `HH:mm:ss`.
pub fn normalize_time(input: &str) -> Option<NaiveTime> {
    let s = input.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// `HH:mm`, the format shown to users.
pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// `dd/MM/yyyy`.
pub fn format_br_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Serde adapter so request bodies accept both time forms.
pub fn deserialize_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    normalize_time(&raw).ok_or_else(|| de::Error::custom(format!("invalid time '{raw}'")))
}

pub fn deserialize_opt_time<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => normalize_time(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid time '{raw}'"))),
    }
}

/// Local date-time from a `datetime-local` input, with or without seconds.
pub fn deserialize_local_datetime<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let s = raw.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .map_err(|_| de::Error::custom(format!("invalid date-time '{raw}'")))
}

/// The school's clock at a fixed UTC offset (Brasília does not observe DST).
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    offset: FixedOffset,
}

impl LocalClock {
    pub fn new(offset_minutes: i32) -> Self {
        // Out-of-range offsets fall back to UTC.
        let offset = FixedOffset::east_opt(offset_minutes * 60).unwrap_or(Utc.fix());
        Self { offset }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.to_local(Utc::now())
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }

    pub fn to_local(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        utc.with_timezone(&self.offset).naive_local()
    }

    /// Converts a stored naive UTC timestamp to local wall time.
    pub fn naive_utc_to_local(&self, utc: NaiveDateTime) -> NaiveDateTime {
        utc + Duration::seconds(self.offset.local_minus_utc() as i64)
    }

    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        Utc.from_utc_datetime(&(local - Duration::seconds(self.offset.local_minus_utc() as i64)))
    }

    /// Converts local wall time to naive UTC for storage.
    pub fn local_to_naive_utc(&self, local: NaiveDateTime) -> NaiveDateTime {
        self.to_utc(local).naive_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_time_accepts_both_forms() {
        let expected = NaiveTime::from_hms_opt(7, 30, 0).unwrap();
        assert_eq!(normalize_time("07:30"), Some(expected));
        assert_eq!(normalize_time("07:30:00"), Some(expected));
        assert_eq!(normalize_time(" 07:30 "), Some(expected));
    }

    #[test]
    fn test_normalize_time_rejects_garbage() {
        assert_eq!(normalize_time(""), None);
        assert_eq!(normalize_time("25:00"), None);
        assert_eq!(normalize_time("7h30"), None);
    }

    #[test]
    fn test_formatting() {
        let t = NaiveTime::from_hms_opt(9, 5, 0).unwrap();
        assert_eq!(format_hhmm(t), "09:05");
        let d = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(format_br_date(d), "09/03/2026");
    }

    #[test]
    fn test_brasilia_conversion() {
        let clock = LocalClock::new(-180);
        let utc = Utc.with_ymd_and_hms(2026, 1, 10, 2, 0, 0).unwrap();

        let local = clock.to_local(utc);
        assert_eq!(local.date(), NaiveDate::from_ymd_opt(2026, 1, 9).unwrap());
        assert_eq!(local.time(), NaiveTime::from_hms_opt(23, 0, 0).unwrap());

        assert_eq!(clock.to_utc(local), utc);
        assert_eq!(clock.local_to_naive_utc(local), utc.naive_utc());
        assert_eq!(clock.naive_utc_to_local(utc.naive_utc()), local);
    }

    #[test]
    fn test_deserialize_time_in_json() {
        #[derive(Deserialize)]
        struct Body {
            #[serde(deserialize_with = "deserialize_time")]
            start: NaiveTime,
            #[serde(default, deserialize_with = "deserialize_opt_time")]
            end: Option<NaiveTime>,
        }

        let body: Body = serde_json::from_str(r#"{"start":"13:00","end":""}"#).unwrap();
        assert_eq!(body.start, NaiveTime::from_hms_opt(13, 0, 0).unwrap());
        assert!(body.end.is_none());

        assert!(serde_json::from_str::<Body>(r#"{"start":"1pm"}"#).is_err());
    }

    #[test]
    fn test_deserialize_local_datetime() {
        #[derive(Deserialize)]
        struct Body {
            #[serde(deserialize_with = "deserialize_local_datetime")]
            at: NaiveDateTime,
        }

        let expected = NaiveDate::from_ymd_opt(2026, 3, 10)
            .unwrap()
            .and_hms_opt(7, 30, 0)
            .unwrap();
        for raw in ["2026-03-10T07:30", "2026-03-10T07:30:00", "2026-03-10 07:30"] {
            let body: Body = serde_json::from_value(serde_json::json!({ "at": raw })).unwrap();
            assert_eq!(body.at, expected);
        }
        assert!(serde_json::from_str::<Body>(r#"{"at":"10/03/2026"}"#).is_err());
    }
}
