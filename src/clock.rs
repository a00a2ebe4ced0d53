use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, SecondsFormat, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    System,
    Fixed(DateTime<Utc>),
}

/// Time source for every request. "Today" is the calendar day at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    source: Source,
    offset: FixedOffset,
}

impl Clock {
    pub fn system() -> Self {
        Self {
            source: Source::System,
            offset: utc(),
        }
    }

    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self {
            source: Source::Fixed(at),
            offset: utc(),
        }
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.source, Source::Fixed(_))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self.source {
            Source::System => Utc::now(),
            Source::Fixed(at) => at,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.offset).date_naive()
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Storage format for instants: RFC 3339 in UTC with millisecond precision.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339 and SQLite's `YYYY-MM-DD HH:MM:SS` (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Calendar day for a schedule date. Full timestamps are moved to `offset`
/// before their time of day is dropped.
pub fn parse_calendar_date(raw: &str, offset: FixedOffset) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    parse_timestamp(raw).map(|dt| dt.with_timezone(&offset).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_today_respects_offset() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 20, 0, 0).unwrap();
        let clock = Clock::fixed(at);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());

        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let clock = clock.with_offset(jst);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
    }

    #[test]
    fn timestamps_parse_both_storage_shapes() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2026-03-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-01T21:00:00+09:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-01 12:00:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(
            parse_timestamp(&format_timestamp(expected)),
            Some(expected)
        );
    }

    #[test]
    fn calendar_dates_drop_time_of_day() {
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let d = NaiveDate::from_ymd_opt(2027, 1, 15).unwrap();
        assert_eq!(parse_calendar_date("2027-01-15", jst), Some(d));
        assert_eq!(parse_calendar_date("2027-01-14T18:30:00Z", jst), Some(d));
        assert_eq!(parse_calendar_date("15/01/2027", jst), None);
    }
}
