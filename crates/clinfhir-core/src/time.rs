use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use time::{Date, Month};

/// Precision of a FHIR `date` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

/// A FHIR `date`: `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
///
/// See <https://www.hl7.org/fhir/datatypes.html#date>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FhirDate {
    date: Date,
    precision: DatePrecision,
}

impl FhirDate {
    pub fn date(&self) -> Date {
        self.date
    }

    pub fn precision(&self) -> DatePrecision {
        self.precision
    }

    pub fn is_full_date(&self) -> bool {
        self.precision == DatePrecision::Day
    }
}

impl fmt::Display for FhirDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let year = self.date.year();
        let month = u8::from(self.date.month());
        match self.precision {
            DatePrecision::Year => write!(f, "{year:04}"),
            DatePrecision::Month => write!(f, "{year:04}-{month:02}"),
            DatePrecision::Day => write!(f, "{year:04}-{month:02}-{:02}", self.date.day()),
        }
    }
}

impl FromStr for FhirDate {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CoreError::invalid_date(s.to_string());

        let bytes = s.as_bytes();
        let digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);

        match bytes.len() {
            4 if digits(0..4) => {
                let year: i32 = s.parse().map_err(|_| invalid())?;
                let date =
                    Date::from_calendar_date(year, Month::January, 1).map_err(|_| invalid())?;
                Ok(Self {
                    date,
                    precision: DatePrecision::Year,
                })
            }
            7 if digits(0..4) && bytes[4] == b'-' && digits(5..7) => {
                let year: i32 = s[..4].parse().map_err(|_| invalid())?;
                let month: u8 = s[5..7].parse().map_err(|_| invalid())?;
                let month = Month::try_from(month).map_err(|_| invalid())?;
                let date = Date::from_calendar_date(year, month, 1).map_err(|_| invalid())?;
                Ok(Self {
                    date,
                    precision: DatePrecision::Month,
                })
            }
            10 if digits(0..4)
                && bytes[4] == b'-'
                && digits(5..7)
                && bytes[7] == b'-'
                && digits(8..10) =>
            {
                let date = Date::parse(s, time::macros::format_description!("[year]-[month]-[day]"))
                    .map_err(|_| invalid())?;
                Ok(Self {
                    date,
                    precision: DatePrecision::Day,
                })
            }
            _ => Err(invalid()),
        }
    }
}

impl Serialize for FhirDate {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FhirDate {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FhirDate::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_each_precision() {
        let year: FhirDate = "1990".parse().unwrap();
        assert_eq!(year.precision(), DatePrecision::Year);
        assert_eq!(year.to_string(), "1990");

        let month: FhirDate = "1990-05".parse().unwrap();
        assert_eq!(month.precision(), DatePrecision::Month);
        assert_eq!(month.to_string(), "1990-05");

        let day: FhirDate = "1990-05-20".parse().unwrap();
        assert!(day.is_full_date());
        assert_eq!(day.to_string(), "1990-05-20");
    }

    #[test]
    fn test_rejects_out_of_range_components() {
        assert!("1990-13".parse::<FhirDate>().is_err());
        assert!("1990-02-30".parse::<FhirDate>().is_err());
        assert!("1990-00-10".parse::<FhirDate>().is_err());
    }

    #[test]
    fn test_rejects_other_formats() {
        for raw in ["90", "1990-5", "1990/05/20", "1990-05-20T10:00:00Z", "", "abcd"] {
            assert!(raw.parse::<FhirDate>().is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_serde_roundtrip_keeps_precision() {
        let date: FhirDate = "2021-07".parse().unwrap();
        let json = serde_json::to_string(&date).unwrap();
        assert_eq!(json, "\"2021-07\"");
        let back: FhirDate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, date);
    }

    #[test]
    fn test_error_message_content() {
        let err = "not-a-date".parse::<FhirDate>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid FHIR date: not-a-date");
    }
}
