//! Date shifting and date-range filtering over temporal fields
//!
//! Five shapes are handled: `instant`, `dateTime`, `date` (including the
//! partial `YYYY` and `YYYY-MM` forms), `time`, and `Period`. The field
//! list for a resource comes from [`FieldCatalog::temporal_fields`], with
//! `[x]` marking choice fields.

use std::str::FromStr;

use chrono::{
    DateTime, Datelike, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat,
    TimeDelta,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{trace, warn};

use crate::error::RecastError;
use crate::model::{Document, Element, Node, scalar_text};
use crate::result::Result;
use crate::schema::{TEMPORAL_TYPES, upper_first};

static SHIFT_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([+-])?P(?:([+-]?\d+)Y)?(?:([+-]?\d+)M)?(?:([+-]?\d+)W)?(?:([+-]?\d+)D)?(?:T(?:([+-]?\d+)H)?(?:([+-]?\d+)M)?(?:([+-]?\d+(?:[.,]\d+)?)S)?)?$",
    )
    .expect("valid shift amount regex")
});

/// An ISO-8601 amount such as `P1Y2M`, `-P30D` or `P1DT12H`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftAmount {
    months: i32,
    days: i64,
    clock: TimeDelta,
}

impl ShiftAmount {
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || RecastError::mapping_error(format!("invalid shift amount '{text}'"));
        let text = text.trim();
        let caps = SHIFT_AMOUNT.captures(text).ok_or_else(invalid)?;
        if text.ends_with('P') || text.ends_with('T') {
            return Err(invalid());
        }

        let sign: i64 = if caps.get(1).is_some_and(|m| m.as_str() == "-") {
            -1
        } else {
            1
        };
        let int = |index: usize| -> Result<i64> {
            caps.get(index)
                .map(|m| m.as_str().parse::<i64>().map_err(|_| invalid()))
                .transpose()?
                .unwrap_or(0)
                .checked_mul(sign)
                .ok_or_else(invalid)
        };
        let scaled = |index: usize, factor: i64| -> Result<i64> {
            int(index)?.checked_mul(factor).ok_or_else(invalid)
        };

        let months = scaled(2, 12)?
            .checked_add(int(3)?)
            .ok_or_else(invalid)?;
        let days = scaled(4, 7)?.checked_add(int(5)?).ok_or_else(invalid)?;
        let seconds = match caps.get(8) {
            Some(m) => m.as_str().replace(',', ".").parse::<f64>().map_err(|_| invalid())?,
            None => 0.0,
        } * sign as f64;
        let second_millis = (seconds * 1000.0).round();
        if !second_millis.is_finite() || second_millis.abs() >= i64::MAX as f64 {
            return Err(invalid());
        }
        let millis = scaled(6, 3_600_000)?
            .checked_add(scaled(7, 60_000)?)
            .and_then(|clock| clock.checked_add(second_millis as i64))
            .ok_or_else(invalid)?;

        Ok(Self {
            months: i32::try_from(months).map_err(|_| invalid())?,
            days,
            clock: TimeDelta::try_milliseconds(millis).ok_or_else(invalid)?,
        })
    }

    /// No hour, minute or second component
    pub fn is_calendar_only(&self) -> bool {
        self.clock.is_zero()
    }

    fn add_to(&self, moment: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let moment = match self.months {
            0 => moment,
            m if m > 0 => moment.checked_add_months(Months::new(m.unsigned_abs()))?,
            m => moment.checked_sub_months(Months::new(m.unsigned_abs()))?,
        };
        moment
            .checked_add_signed(TimeDelta::try_days(self.days)?)?
            .checked_add_signed(self.clock)
    }
}

impl FromStr for ShiftAmount {
    type Err = RecastError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precision {
    Year,
    Month,
    Day,
    /// Date and time; `zulu` records whether the offset was written as `Z`
    DateTime { zulu: bool, naive: bool },
    Time,
}

fn precision_of(text: &str) -> Option<Precision> {
    match text.len() {
        4 if text.bytes().all(|b| b.is_ascii_digit()) => Some(Precision::Year),
        7 if text.as_bytes()[4] == b'-' => Some(Precision::Month),
        10 if text.as_bytes()[4] == b'-' => Some(Precision::Day),
        _ if text.contains('T') => Some(Precision::DateTime {
            zulu: text.ends_with('Z'),
            naive: !(text.ends_with('Z') || has_offset(text)),
        }),
        _ if !text.contains('-') && text.contains(':') => Some(Precision::Time),
        _ => None,
    }
}

fn has_offset(text: &str) -> bool {
    text.rfind('T')
        .is_some_and(|t| text[t..].contains('+') || text[t..].contains('-'))
}

/// The earliest instant a date or date-time denotes, in its own offset (UTC for dates)
pub fn parse_moment(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    let start_of = |date: NaiveDate| {
        date.and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc().fixed_offset())
    };
    match precision_of(text)? {
        Precision::Year => text
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
            .and_then(start_of),
        Precision::Month => NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d")
            .ok()
            .and_then(start_of),
        Precision::Day => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(start_of),
        Precision::DateTime { naive: false, .. } => DateTime::parse_from_rfc3339(text).ok(),
        Precision::DateTime { naive: true, .. } => {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc().fixed_offset())
        }
        Precision::Time => None,
    }
}

/// Shift one temporal string, keeping its precision and offset style
pub fn shift_text(text: &str, amount: &ShiftAmount) -> Option<String> {
    let precision = precision_of(text)?;
    if precision == Precision::Time {
        let time = NaiveTime::parse_from_str(text, "%H:%M:%S%.f").ok()?;
        let (shifted, _) = time.overflowing_add_signed(amount.clock);
        let format = if text.contains('.') {
            "%H:%M:%S%.3f"
        } else {
            "%H:%M:%S"
        };
        return Some(shifted.format(format).to_string());
    }

    let shifted = amount.add_to(parse_moment(text)?)?;
    Some(match precision {
        Precision::Year => format!("{:04}", shifted.year()),
        Precision::Month => shifted.format("%Y-%m").to_string(),
        Precision::Day => shifted.format("%Y-%m-%d").to_string(),
        Precision::DateTime { naive: true, .. } => {
            shifted.naive_local().format("%Y-%m-%dT%H:%M:%S%.f").to_string()
        }
        Precision::DateTime { zulu, .. } => shifted.to_rfc3339_opts(SecondsFormat::AutoSi, zulu),
        Precision::Time => return None,
    })
}

/// Shift every temporal value of `document` listed in `fields`; returns how many changed
pub fn shift_document(document: &mut Document, fields: &[String], amount: &ShiftAmount) -> usize {
    let mut shifted = 0;
    for field in fields {
        let segments: Vec<&str> = field.split('.').collect();
        for_each_leaf_mut(document.root_mut(), &segments, &mut |node| {
            shifted += shift_node(node, amount);
        });
    }
    trace!("Shifted {} values on {}", shifted, document.identity());
    shifted
}

fn shift_node(node: &mut Node, amount: &ShiftAmount) -> usize {
    match node {
        Node::Primitive(primitive) => {
            let Some(text) = primitive.value.as_ref().map(scalar_text) else {
                return 0;
            };
            match shift_text(&text, amount) {
                Some(shifted) => {
                    primitive.value = Some(shifted.into());
                    1
                }
                None => {
                    warn!("Leaving unrecognized temporal value '{}' unshifted", text);
                    0
                }
            }
        }
        Node::Element(period) => {
            let mut count = 0;
            for endpoint in ["start", "end"] {
                if let Some(slot) = period.slot_mut(endpoint) {
                    for node in &mut slot.nodes {
                        count += shift_node(node, amount);
                    }
                }
            }
            keep_period_order(period);
            count
        }
    }
}

/// After shifting, an end that sorts before its start is pulled up to the start
fn keep_period_order(period: &mut Element) {
    let (Some(start), Some(end)) = (period.primitive_text("start"), period.primitive_text("end"))
    else {
        return;
    };
    if let (Some(s), Some(e)) = (parse_moment(&start), parse_moment(&end))
        && e < s
    {
        let type_name = period
            .slot("end")
            .and_then(|slot| slot.nodes.first())
            .and_then(Node::type_name)
            .map(str::to_string);
        period.set_primitive("end", start.into(), type_name.as_deref());
    }
}

/// Inclusive bounds used to filter documents by their temporal values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub min: Option<DateTime<FixedOffset>>,
    pub max: Option<DateTime<FixedOffset>>,
}

impl DateRange {
    pub fn parse(min: Option<&str>, max: Option<&str>) -> Result<Self> {
        let bound = |text: Option<&str>| -> Result<Option<DateTime<FixedOffset>>> {
            text.map(|text| {
                parse_moment(text).ok_or_else(|| {
                    RecastError::mapping_error(format!("invalid date filter bound '{text}'"))
                })
            })
            .transpose()
        };
        Ok(Self {
            min: bound(min)?,
            max: bound(max)?,
        })
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    fn contains(&self, moment: DateTime<FixedOffset>) -> bool {
        self.min.is_none_or(|min| moment >= min) && self.max.is_none_or(|max| moment <= max)
    }

    fn overlaps(&self, start: Option<DateTime<FixedOffset>>, end: Option<DateTime<FixedOffset>>) -> bool {
        match (start, end) {
            (None, None) => true,
            (Some(point), None) | (None, Some(point)) => self.contains(point),
            (Some(start), Some(end)) => {
                self.min.is_none_or(|min| end >= min) && self.max.is_none_or(|max| start <= max)
            }
        }
    }

    /// True when every temporal value of the document falls in range
    pub fn admits(&self, document: &Document, fields: &[String]) -> bool {
        let mut admitted = true;
        for field in fields {
            let segments: Vec<&str> = field.split('.').collect();
            for_each_leaf(document.root(), &segments, &mut |node| {
                admitted &= self.admits_node(node);
            });
            if !admitted {
                return false;
            }
        }
        true
    }

    fn admits_node(&self, node: &Node) -> bool {
        match node {
            Node::Primitive(primitive) => primitive
                .value
                .as_ref()
                .and_then(|value| parse_moment(&scalar_text(value)))
                .is_none_or(|moment| self.contains(moment)),
            Node::Element(period) => self.overlaps(
                period.primitive_text("start").as_deref().and_then(parse_moment),
                period.primitive_text("end").as_deref().and_then(parse_moment),
            ),
        }
    }
}

/// Concrete field names an element has for one path segment
fn matching_fields(element: &Element, segment: &str) -> Vec<String> {
    match segment.strip_suffix("[x]") {
        Some(base) => element
            .fields
            .keys()
            .filter(|name| {
                name.strip_prefix(base).is_some_and(|suffix| {
                    TEMPORAL_TYPES.iter().any(|t| upper_first(t) == suffix)
                })
            })
            .cloned()
            .collect(),
        None if element.fields.contains_key(segment) => vec![segment.to_string()],
        None => Vec::new(),
    }
}

fn for_each_leaf_mut(element: &mut Element, segments: &[&str], visit: &mut dyn FnMut(&mut Node)) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    for name in matching_fields(element, head) {
        let Some(slot) = element.slot_mut(&name) else {
            continue;
        };
        for node in &mut slot.nodes {
            if rest.is_empty() {
                visit(node);
            } else if let Node::Element(child) = node {
                for_each_leaf_mut(child, rest, visit);
            }
        }
    }
}

fn for_each_leaf(element: &Element, segments: &[&str], visit: &mut dyn FnMut(&Node)) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    for name in matching_fields(element, head) {
        let Some(slot) = element.slot(&name) else {
            continue;
        };
        for node in &slot.nodes {
            if rest.is_empty() {
                visit(node);
            } else if let Node::Element(child) = node {
                for_each_leaf(child, rest, visit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldCatalog, SchemaTable};
    use serde_json::json;

    fn amount(text: &str) -> ShiftAmount {
        ShiftAmount::parse(text).unwrap()
    }

    #[test]
    fn test_parse_amounts() {
        assert_eq!(amount("P1Y2M").months, 14);
        assert_eq!(amount("P2W3D").days, 17);
        assert_eq!(amount("-P1Y").months, -12);
        assert_eq!(amount("P-10D").days, -10);
        assert_eq!(amount("PT1H30M").clock, TimeDelta::try_minutes(90).unwrap());
        assert_eq!(amount("PT0.5S").clock, TimeDelta::try_milliseconds(500).unwrap());
        assert!(amount("P1D").is_calendar_only());
        assert!(!amount("P1DT1H").is_calendar_only());

        for bad in [
            "",
            "P",
            "PT",
            "1Y",
            "P1H",
            "P1.5Y",
            "P1YT",
            "P999999999999999999Y",
            "P999999999999999999W",
            "PT9999999999999999H",
            "PT999999999999999999M",
            "PT99999999999999999999S",
            "-P-9223372036854775808D",
        ] {
            assert!(ShiftAmount::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_shift_all_shapes() {
        let year = amount("P1Y");
        assert_eq!(shift_text("2020-02-29", &year).unwrap(), "2021-02-28");
        assert_eq!(shift_text("2020-02", &year).unwrap(), "2021-02");
        assert_eq!(shift_text("2020", &year).unwrap(), "2021");
        assert_eq!(
            shift_text("2020-05-01T10:00:00-04:00", &year).unwrap(),
            "2021-05-01T10:00:00-04:00"
        );
        assert_eq!(
            shift_text("2020-05-01T10:00:00.123Z", &year).unwrap(),
            "2021-05-01T10:00:00.123Z"
        );
        // Calendar parts do not apply to a bare time
        assert_eq!(shift_text("10:00:00", &year).unwrap(), "10:00:00");
        assert_eq!(shift_text("23:30:00", &amount("PT1H")).unwrap(), "00:30:00");
    }

    #[test]
    fn test_negative_and_mixed_shifts() {
        assert_eq!(
            shift_text("2020-01-01T00:00:00Z", &amount("-P1DT1H")).unwrap(),
            "2019-12-30T23:00:00Z"
        );
        assert_eq!(shift_text("2020-01-10", &amount("PT48H")).unwrap(), "2020-01-12");
    }

    #[test]
    fn test_shift_document_uses_temporal_fields() {
        let schema = SchemaTable::r4_core();
        let mut doc = Document::from_json(
            &json!({
                "resourceType": "Encounter",
                "period": {"start": "2020-01-01T10:00:00Z", "end": "2020-01-01T11:00:00Z"},
                "participant": [{"period": {"start": "2020-01-01T10:00:00Z"}}],
                "status": "finished"
            }),
            &schema,
        )
        .unwrap();
        let fields = schema.temporal_fields("Encounter");
        let count = shift_document(&mut doc, &fields, &amount("P1D"));
        assert_eq!(count, 3);
        assert_eq!(
            doc.to_json(),
            json!({
                "resourceType": "Encounter",
                "period": {"start": "2020-01-02T10:00:00Z", "end": "2020-01-02T11:00:00Z"},
                "participant": [{"period": {"start": "2020-01-02T10:00:00Z"}}],
                "status": "finished"
            })
        );
    }

    #[test]
    fn test_choice_fields_only_shift_temporal_variants() {
        let schema = SchemaTable::r4_core();
        let mut doc = Document::from_json(
            &json!({
                "resourceType": "Observation",
                "effectiveDateTime": "2020-01-01T00:00:00Z",
                "valueString": "2020-01-01"
            }),
            &schema,
        )
        .unwrap();
        let fields = schema.temporal_fields("Observation");
        shift_document(&mut doc, &fields, &amount("P1M"));
        let out = doc.to_json();
        assert_eq!(out["effectiveDateTime"], json!("2020-02-01T00:00:00Z"));
        assert_eq!(out["valueString"], json!("2020-01-01"));
    }

    #[test]
    fn test_period_order_is_preserved() {
        let mut period = Element::new("Period");
        period.set_primitive("start", json!("2020-01-31"), Some("dateTime"));
        period.set_primitive("end", json!("2020-01-30T23:00:00Z"), Some("dateTime"));
        keep_period_order(&mut period);
        assert_eq!(period.primitive_text("end").unwrap(), "2020-01-31");
    }

    #[test]
    fn test_date_range() {
        let schema = SchemaTable::r4_core();
        let range = DateRange::parse(Some("2020-01-01"), Some("2020-12-31T23:59:59Z")).unwrap();
        let fields = schema.temporal_fields("Encounter");

        let encounter = |start: &str, end: &str| {
            Document::from_json(
                &json!({"resourceType": "Encounter", "period": {"start": start, "end": end}}),
                &schema,
            )
            .unwrap()
        };
        assert!(range.admits(&encounter("2020-03-01", "2020-03-02"), &fields));
        assert!(range.admits(&encounter("2019-12-31", "2020-01-02"), &fields));
        assert!(!range.admits(&encounter("2018-01-01", "2018-01-02"), &fields));
        assert!(!range.admits(&encounter("2021-02-01", "2021-02-02"), &fields));

        assert!(DateRange::parse(Some("soon"), None).is_err());
        assert!(DateRange::parse(None, None).unwrap().is_unbounded());
    }
}
