//! Date/time granularity transforms applied to mapping values

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RecastError;
use crate::result::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueTransform {
    #[serde(rename = "toInstant")]
    ToInstant,
    #[serde(rename = "toDateTime")]
    ToDateTime,
    #[serde(rename = "toDate")]
    ToDate,
    #[serde(rename = "toTime")]
    ToTime,
}

impl fmt::Display for ValueTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueTransform::ToInstant => "toInstant",
            ValueTransform::ToDateTime => "toDateTime",
            ValueTransform::ToDate => "toDate",
            ValueTransform::ToTime => "toTime",
        };
        write!(f, "{name}")
    }
}

enum Parsed {
    Moment(DateTime<FixedOffset>),
    Time(NaiveTime),
}

impl ValueTransform {
    pub fn apply(self, source: &str) -> Result<String> {
        let parsed = parse(source.trim()).ok_or_else(|| {
            RecastError::temporal_error(format!("cannot {self} '{source}': unrecognized date/time"))
        })?;

        match (self, parsed) {
            (ValueTransform::ToInstant | ValueTransform::ToDateTime, Parsed::Moment(moment)) => {
                Ok(moment
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            (ValueTransform::ToDate, Parsed::Moment(moment)) => {
                Ok(moment.format("%Y-%m-%d").to_string())
            }
            (ValueTransform::ToTime, Parsed::Moment(moment)) => {
                Ok(moment.format("%H:%M:%S").to_string())
            }
            (ValueTransform::ToTime, Parsed::Time(time)) => Ok(time.format("%H:%M:%S").to_string()),
            (_, Parsed::Time(_)) => Err(RecastError::temporal_error(format!(
                "cannot {self} '{source}': a time of day has no date"
            ))),
        }
    }
}

/// Partial dates start at midnight UTC; date-times without an offset are UTC
fn parse(source: &str) -> Option<Parsed> {
    let midnight = |date: NaiveDate| {
        date.and_hms_opt(0, 0, 0)
            .map(|naive| Parsed::Moment(naive.and_utc().fixed_offset()))
    };

    match source.len() {
        4 => {
            let year = source.parse::<i32>().ok()?;
            NaiveDate::from_ymd_opt(year, 1, 1).and_then(midnight)
        }
        7 => NaiveDate::parse_from_str(&format!("{source}-01"), "%Y-%m-%d")
            .ok()
            .and_then(midnight),
        10 => NaiveDate::parse_from_str(source, "%Y-%m-%d")
            .ok()
            .and_then(midnight),
        _ if !source.contains('-') => NaiveTime::parse_from_str(source, "%H:%M:%S%.f")
            .ok()
            .map(Parsed::Time),
        _ => DateTime::parse_from_rfc3339(source)
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(source, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc().fixed_offset())
            })
            .map(Parsed::Moment),
    }
}
