//! Timestamp column parsing
//!
//! A parser is built once per timestamp column from the column's format and
//! timezone (falling back to the task defaults) and shared read-only by
//! every row.

use chrono::format::{ParseErrorKind, Parsed, StrftimeItems};
use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Utc};

/// Timestamp text that could not be turned into an instant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error(transparent)]
    Parse(#[from] chrono::ParseError),

    #[error("out of the supported date range")]
    OutOfRange,
}

/// Timezone text that is neither UTC nor a fixed `±HH:MM` offset
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported timezone {0:?}; use UTC or a fixed offset such as +09:00")]
pub struct TimezoneError(pub String);

/// Parse `UTC`, `Z`, `GMT`, `±HH:MM`, `±HHMM` or `±HH` into a fixed offset
pub fn parse_timezone(text: &str) -> Result<FixedOffset, TimezoneError> {
    let err = || TimezoneError(text.to_string());
    let trimmed = text.trim();

    if ["UTC", "Z", "GMT"]
        .iter()
        .any(|name| trimmed.eq_ignore_ascii_case(name))
    {
        return FixedOffset::east_opt(0).ok_or_else(err);
    }

    let sign = match trimmed.chars().next() {
        Some('+') => 1,
        Some('-') => -1,
        _ => return Err(err()),
    };
    let digits: String = trimmed[1..].chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(err());
    }
    let (hours, minutes) = match digits.len() {
        2 => (&digits[..2], "0"),
        4 => (&digits[..2], &digits[2..]),
        _ => return Err(err()),
    };
    let hours: i32 = hours.parse().map_err(|_| err())?;
    let minutes: i32 = minutes.parse().map_err(|_| err())?;
    if hours > 23 || minutes > 59 {
        return Err(err());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(err)
}

/// Parses timestamp text into a UTC instant
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampParser {
    format: Option<String>,
    timezone: FixedOffset,
}

impl TimestampParser {
    /// Build a parser. Without a format, mail dates (RFC 2822) and RFC 3339
    /// are accepted.
    pub fn new(format: Option<String>, timezone: &str) -> Result<Self, TimezoneError> {
        Ok(Self {
            format,
            timezone: parse_timezone(timezone)?,
        })
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    pub fn parse(&self, text: &str) -> Result<DateTime<Utc>, TimestampError> {
        match &self.format {
            Some(format) => self.parse_with_format(text.trim(), format),
            None => Ok(parse_mail_date(text)?),
        }
    }

    fn parse_with_format(&self, text: &str, format: &str) -> Result<DateTime<Utc>, TimestampError> {
        let mut parsed = Parsed::new();
        chrono::format::parse(&mut parsed, text, StrftimeItems::new(format))?;

        if parsed.offset().is_some() {
            return Ok(parsed.to_datetime()?.with_timezone(&Utc));
        }

        // Epoch seconds are already UTC
        if parsed.timestamp().is_some() {
            return Ok(parsed.to_datetime_with_timezone(&Utc)?);
        }

        // Otherwise the text is local time in the column timezone
        let naive = match parsed.to_naive_datetime_with_offset(0) {
            Ok(naive) => naive,
            Err(e) if e.kind() == ParseErrorKind::NotEnough => {
                parsed.to_naive_date()?.and_time(NaiveTime::MIN)
            }
            Err(e) => return Err(e.into()),
        };

        let utc = naive
            .checked_sub_offset(self.timezone)
            .ok_or(TimestampError::OutOfRange)?;
        Ok(Utc.from_utc_datetime(&utc))
    }
}

/// Parse a `Date` header: RFC 2822, with a trailing `(Zone)` comment ignored,
/// falling back to RFC 3339
fn parse_mail_date(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let mut text = text.trim();
    if text.ends_with(')')
        && let Some(open) = text.rfind('(')
    {
        text = text[..open].trim_end();
    }

    DateTime::parse_from_rfc2822(text)
        .or_else(|e| DateTime::parse_from_rfc3339(text).map_err(|_| e))
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_timezone("z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_timezone("+09:00").unwrap().local_minus_utc(), 9 * 3600);
        assert_eq!(parse_timezone("-0530").unwrap().local_minus_utc(), -(5 * 3600 + 1800));
        assert_eq!(parse_timezone("+02").unwrap().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn test_parse_timezone_rejects_names() {
        assert!(parse_timezone("Asia/Tokyo").is_err());
        assert!(parse_timezone("+25:00").is_err());
        assert!(parse_timezone("").is_err());
    }

    #[test]
    fn test_mail_date_default() {
        let parser = TimestampParser::new(None, "UTC").unwrap();
        assert_eq!(
            parser.parse("Tue, 1 Jul 2003 10:52:37 +0200").unwrap(),
            utc(2003, 7, 1, 8, 52, 37)
        );
    }

    #[test]
    fn test_mail_date_with_zone_comment() {
        let parser = TimestampParser::new(None, "UTC").unwrap();
        assert_eq!(
            parser.parse("Mon, 4 Mar 2024 09:15:00 -0800 (PST)").unwrap(),
            utc(2024, 3, 4, 17, 15, 0)
        );
    }

    #[test]
    fn test_rfc3339_fallback() {
        let parser = TimestampParser::new(None, "UTC").unwrap();
        assert_eq!(
            parser.parse("2024-03-04T09:15:00+09:00").unwrap(),
            utc(2024, 3, 4, 0, 15, 0)
        );
    }

    #[test]
    fn test_format_without_offset_uses_timezone() {
        let parser = TimestampParser::new(Some("%Y-%m-%d %H:%M:%S".to_string()), "+09:00").unwrap();
        assert_eq!(
            parser.parse("2024-03-04 09:00:00").unwrap(),
            utc(2024, 3, 4, 0, 0, 0)
        );
    }

    #[test]
    fn test_format_with_offset_ignores_timezone() {
        let parser =
            TimestampParser::new(Some("%Y-%m-%d %H:%M:%S %z".to_string()), "+09:00").unwrap();
        assert_eq!(
            parser.parse("2024-03-04 09:00:00 +0000").unwrap(),
            utc(2024, 3, 4, 9, 0, 0)
        );
    }

    #[test]
    fn test_date_only_format() {
        let parser = TimestampParser::new(Some("%Y/%m/%d".to_string()), "UTC").unwrap();
        assert_eq!(parser.parse("2024/03/04").unwrap(), utc(2024, 3, 4, 0, 0, 0));
    }

    #[test]
    fn test_epoch_seconds_ignore_timezone() {
        let parser = TimestampParser::new(Some("%s".to_string()), "+09:00").unwrap();
        assert_eq!(
            parser.parse("1700000000").unwrap(),
            Utc.timestamp_opt(1_700_000_000, 0).unwrap()
        );
    }

    #[test]
    fn test_shift_past_max_date_is_out_of_range() {
        let format = Some("%Y-%m-%d %H:%M:%S".to_string());

        let parser = TimestampParser::new(format.clone(), "-01:00").unwrap();
        assert_eq!(
            parser.parse("+262142-12-31 23:30:00"),
            Err(TimestampError::OutOfRange)
        );

        let parser = TimestampParser::new(format, "+01:00").unwrap();
        let parsed = parser.parse("+262142-12-31 23:30:00").unwrap();
        assert_eq!(parsed.format("%H:%M").to_string(), "22:30");
    }

    #[test]
    fn test_invalid_text() {
        let parser = TimestampParser::new(None, "UTC").unwrap();
        assert!(parser.parse("yesterday").is_err());

        let parser = TimestampParser::new(Some("%Y-%m-%d".to_string()), "UTC").unwrap();
        assert!(parser.parse("04.03.2024").is_err());
    }
}
