//! Patient records and timelines

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use studydef_types::PatientId;
use thiserror::Error;

/// Kind of a timeline event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Coded primary care observation
    Clinical,
    /// Hospital admission; `primary` marks the principal diagnosis
    Admission,
    /// Vaccination; `value` is the target disease
    Vaccination,
    /// Laboratory test; `code` is the pathogen, `value` the result
    TestResult,
    /// GP consultation
    Consultation,
    /// Practice registration span; `value` is the practice region
    Registration,
    /// Death; `value` is the recording source
    Death,
    /// Care home residence span; `code` is `nursing` or `residential`
    CareHome,
    /// Ethnicity recorded on a hospital episode
    HospitalEthnicity,
}

impl EventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Clinical => "clinical",
            Self::Admission => "admission",
            Self::Vaccination => "vaccination",
            Self::TestResult => "test_result",
            Self::Consultation => "consultation",
            Self::Registration => "registration",
            Self::Death => "death",
            Self::CareHome => "care_home",
            Self::HospitalEthnicity => "hospital_ethnicity",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event kind '{0}'")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clinical" => Ok(Self::Clinical),
            "admission" => Ok(Self::Admission),
            "vaccination" => Ok(Self::Vaccination),
            "test_result" => Ok(Self::TestResult),
            "consultation" => Ok(Self::Consultation),
            "registration" => Ok(Self::Registration),
            "death" => Ok(Self::Death),
            "care_home" => Ok(Self::CareHome),
            "hospital_ethnicity" => Ok(Self::HospitalEthnicity),
            _ => Err(UnknownEventKind(s.to_string())),
        }
    }
}

/// A dated event on a patient timeline
///
/// Spans (registrations, care home stays) carry an end date; an open span
/// has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub kind: EventKind,
    pub code: Option<String>,
    pub primary: bool,
    pub value: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, date: NaiveDate) -> Self {
        Self {
            date,
            end_date: None,
            kind,
            code: None,
            primary: false,
            value: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Mark as the primary diagnosis
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    #[must_use]
    pub fn ending(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    /// Check whether this event, taken as a span, is active on `date`
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.date <= date && self.end_date.is_none_or(|end| date <= end)
    }

    /// Check whether this span is active on every day of `[start, end]`
    pub fn covers_range(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.covers(start) && self.covers(end)
    }
}

/// Events of one patient, in source order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientTimeline {
    events: Vec<Event>,
}

impl PatientTimeline {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    /// Events of one kind, keeping their position in the timeline
    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = (usize, &Event)> {
        self.events
            .iter()
            .enumerate()
            .filter(move |(_, event)| event.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<'a> IntoIterator for &'a PatientTimeline {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Static attributes and timeline of one patient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: PatientId,
    pub sex: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub healthcare_worker: bool,
    pub timeline: PatientTimeline,
}

impl PatientRecord {
    pub fn new(id: PatientId) -> Self {
        Self {
            id,
            sex: None,
            date_of_birth: None,
            healthcare_worker: false,
            timeline: PatientTimeline::default(),
        }
    }

    #[must_use]
    pub fn with_sex(mut self, sex: impl Into<String>) -> Self {
        self.sex = Some(sex.into());
        self
    }

    #[must_use]
    pub fn born(mut self, date_of_birth: NaiveDate) -> Self {
        self.date_of_birth = Some(date_of_birth);
        self
    }

    #[must_use]
    pub fn healthcare_worker(mut self, flag: bool) -> Self {
        self.healthcare_worker = flag;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.timeline = PatientTimeline::new(events);
        self
    }

    /// Age in whole years on `date`; `None` without a birth date or before birth
    pub fn age_on(&self, date: NaiveDate) -> Option<i64> {
        let born = self.date_of_birth?;
        if date < born {
            return None;
        }
        let mut years = i64::from(date.year() - born.year());
        if (date.month(), date.day()) < (born.month(), born.day()) {
            years -= 1;
        }
        Some(years)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case(date(2021, 6, 1), Some(41))]
    #[case(date(2021, 6, 14), Some(41))]
    #[case(date(2021, 6, 15), Some(42))]
    #[case(date(1979, 6, 15), Some(0))]
    #[case(date(1979, 6, 14), None)]
    fn test_age_on(#[case] on: NaiveDate, #[case] expected: Option<i64>) {
        let record = PatientRecord::new(PatientId(1)).born(date(1979, 6, 15));
        assert_eq!(record.age_on(on), expected);
    }

    #[test]
    fn test_leap_day_birthday() {
        let record = PatientRecord::new(PatientId(1)).born(date(2000, 2, 29));
        assert_eq!(record.age_on(date(2021, 2, 28)), Some(20));
        assert_eq!(record.age_on(date(2021, 3, 1)), Some(21));
    }

    #[test]
    fn test_span_cover() {
        let span = Event::new(EventKind::Registration, date(2020, 1, 1)).ending(date(2021, 3, 31));
        assert!(span.covers(date(2020, 1, 1)));
        assert!(span.covers(date(2021, 3, 31)));
        assert!(!span.covers(date(2021, 4, 1)));
        assert!(span.covers_range(date(2020, 12, 1), date(2021, 3, 1)));
        assert!(!span.covers_range(date(2019, 12, 1), date(2021, 3, 1)));

        let open = Event::new(EventKind::Registration, date(2020, 1, 1));
        assert!(open.covers(date(2099, 1, 1)));
    }

    #[test]
    fn test_event_kind_names() {
        for kind in [
            EventKind::Clinical,
            EventKind::Admission,
            EventKind::Vaccination,
            EventKind::TestResult,
            EventKind::Consultation,
            EventKind::Registration,
            EventKind::Death,
            EventKind::CareHome,
            EventKind::HospitalEthnicity,
        ] {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("diagnosis".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_of_kind_keeps_positions() {
        let timeline = PatientTimeline::new(vec![
            Event::new(EventKind::Clinical, date(2021, 1, 1)),
            Event::new(EventKind::Death, date(2021, 2, 1)),
            Event::new(EventKind::Clinical, date(2021, 3, 1)),
        ]);
        let positions: Vec<usize> = timeline.of_kind(EventKind::Clinical).map(|(i, _)| i).collect();
        assert_eq!(positions, vec![0, 2]);
    }
}
