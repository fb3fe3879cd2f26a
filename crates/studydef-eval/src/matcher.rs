//! Event-window matcher
//!
//! Selects events from a patient timeline by kind, codelist membership, date
//! window, diagnosis position and value, then reduces the matches to the
//! first, the last, a count or a presence flag.

use chrono::NaiveDate;
use indexmap::IndexMap;
use std::sync::Arc;
use studydef_model::{Codelist, Event, EventKind, PatientTimeline};
use studydef_types::DateWindow;

/// Criteria an event must meet to match
#[derive(Debug, Clone)]
pub struct EventFilter {
    kind: EventKind,
    codelist: Option<Arc<Codelist>>,
    window: DateWindow,
    primary_only: bool,
    code: Option<String>,
    value: Option<String>,
}

impl EventFilter {
    /// Match every event of one kind
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            codelist: None,
            window: DateWindow::unbounded(),
            primary_only: false,
            code: None,
            value: None,
        }
    }

    /// Require the event code to be in a codelist
    #[must_use]
    pub fn with_codelist(mut self, codelist: Arc<Codelist>) -> Self {
        self.codelist = Some(codelist);
        self
    }

    /// Require the event date to fall inside a window
    #[must_use]
    pub fn within(mut self, window: DateWindow) -> Self {
        self.window = window;
        self
    }

    /// Only consider primary diagnoses
    #[must_use]
    pub fn primary_only(mut self) -> Self {
        self.primary_only = true;
        self
    }

    /// Require a specific code (case-insensitive)
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Require a specific value (case-insensitive)
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }

    /// Check a single event against every criterion
    pub fn matches(&self, event: &Event) -> bool {
        event.kind == self.kind
            && self.window.contains(event.date)
            && (!self.primary_only || event.primary)
            && self.codelist.as_ref().is_none_or(|list| {
                event.code.as_deref().is_some_and(|code| list.contains(code))
            })
            && equal_ignoring_case(self.code.as_deref(), event.code.as_deref())
            && equal_ignoring_case(self.value.as_deref(), event.value.as_deref())
    }
}

fn equal_ignoring_case(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match wanted {
        None => true,
        Some(wanted) => actual.is_some_and(|actual| actual.eq_ignore_ascii_case(wanted)),
    }
}

fn matching<'a>(timeline: &'a PatientTimeline, filter: &EventFilter) -> impl Iterator<Item = &'a Event> {
    timeline
        .of_kind(filter.kind)
        .map(|(_, event)| event)
        .filter(move |event| filter.matches(event))
}

/// Earliest matching event; ties keep the event that comes first in the timeline
pub fn first_match<'a>(timeline: &'a PatientTimeline, filter: &EventFilter) -> Option<&'a Event> {
    let mut best: Option<&Event> = None;
    for event in matching(timeline, filter) {
        if best.is_none_or(|current| event.date < current.date) {
            best = Some(event);
        }
    }
    best
}

/// Latest matching event; ties keep the event that comes last in the timeline
pub fn last_match<'a>(timeline: &'a PatientTimeline, filter: &EventFilter) -> Option<&'a Event> {
    let mut best: Option<&Event> = None;
    for event in matching(timeline, filter) {
        if best.is_none_or(|current| event.date >= current.date) {
            best = Some(event);
        }
    }
    best
}

/// Number of matching events
pub fn count_matches(timeline: &PatientTimeline, filter: &EventFilter) -> i64 {
    let count = matching(timeline, filter).count();
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Whether any event matches
pub fn binary_presence(timeline: &PatientTimeline, filter: &EventFilter) -> bool {
    matching(timeline, filter).next().is_some()
}

/// Most frequent code among matching events
///
/// Ties go to the code seen first in the timeline. Events without a code are
/// ignored.
pub fn most_frequent_code(timeline: &PatientTimeline, filter: &EventFilter) -> Option<String> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for code in matching(timeline, filter).filter_map(|event| event.code.as_deref()) {
        *counts.entry(code).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for (code, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((code, count));
        }
    }
    best.map(|(code, _)| code.to_string())
}

/// Span of the given kind active on `date`
///
/// With overlapping spans, the one that started most recently wins.
pub fn covering_span(timeline: &PatientTimeline, kind: EventKind, date: NaiveDate) -> Option<&Event> {
    let mut best: Option<&Event> = None;
    for (_, event) in timeline.of_kind(kind) {
        if event.covers(date) && best.is_none_or(|current| event.date >= current.date) {
            best = Some(event);
        }
    }
    best
}

/// Whether a single registration span covers every day of `[start, end]`
pub fn continuous_registration(timeline: &PatientTimeline, start: NaiveDate, end: NaiveDate) -> bool {
    timeline
        .of_kind(EventKind::Registration)
        .any(|(_, event)| event.covers_range(start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use studydef_model::CodingSystem;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn clinical(code: &str, on: NaiveDate) -> Event {
        Event::new(EventKind::Clinical, on).with_code(code)
    }

    fn asthma() -> Arc<Codelist> {
        Arc::new(Codelist::from_codes(CodingSystem::Ctv3, ["H33", "H330"]))
    }

    fn window_example() -> PatientTimeline {
        PatientTimeline::new(vec![
            clinical("H33", date(2021, 5, 20)),
            clinical("H330", date(2021, 7, 1)),
            clinical("H33", date(2021, 6, 10)),
            clinical("XE0Uh", date(2021, 6, 15)),
            clinical("H33", date(2021, 8, 2)),
        ])
    }

    #[test]
    fn test_window_example() {
        let timeline = window_example();
        let filter = EventFilter::new(EventKind::Clinical)
            .with_codelist(asthma())
            .within(DateWindow::between(date(2021, 6, 1), date(2021, 7, 31)));

        assert_eq!(first_match(&timeline, &filter).map(|e| e.date), Some(date(2021, 6, 10)));
        assert_eq!(last_match(&timeline, &filter).map(|e| e.date), Some(date(2021, 7, 1)));
        assert_eq!(count_matches(&timeline, &filter), 2);
        assert!(binary_presence(&timeline, &filter));
    }

    #[test]
    fn test_no_matches() {
        let timeline = window_example();
        let filter = EventFilter::new(EventKind::Clinical)
            .with_codelist(asthma())
            .within(DateWindow::between(date(2019, 1, 1), date(2019, 12, 31)));

        assert_eq!(first_match(&timeline, &filter), None);
        assert_eq!(last_match(&timeline, &filter), None);
        assert_eq!(count_matches(&timeline, &filter), 0);
        assert!(!binary_presence(&timeline, &filter));
    }

    #[test]
    fn test_ties_follow_timeline_order() {
        let timeline = PatientTimeline::new(vec![
            clinical("H33", date(2021, 6, 1)),
            clinical("H330", date(2021, 6, 1)),
        ]);
        let filter = EventFilter::new(EventKind::Clinical).with_codelist(asthma());

        assert_eq!(
            first_match(&timeline, &filter).and_then(|e| e.code.as_deref()),
            Some("H33")
        );
        assert_eq!(
            last_match(&timeline, &filter).and_then(|e| e.code.as_deref()),
            Some("H330")
        );
    }

    #[test]
    fn test_primary_diagnosis_only() {
        let covid = Arc::new(Codelist::from_codes(CodingSystem::Icd10, ["U071", "U072"]));
        let timeline = PatientTimeline::new(vec![
            Event::new(EventKind::Admission, date(2021, 1, 5)).with_code("U071"),
            Event::new(EventKind::Admission, date(2021, 2, 5))
                .with_code("U072")
                .primary(),
        ]);

        let any = EventFilter::new(EventKind::Admission).with_codelist(covid.clone());
        let primary = any.clone().primary_only();
        assert_eq!(count_matches(&timeline, &any), 2);
        assert_eq!(first_match(&timeline, &primary).map(|e| e.date), Some(date(2021, 2, 5)));
    }

    #[test]
    fn test_code_and_value_ignore_case() {
        let timeline = PatientTimeline::new(vec![
            Event::new(EventKind::TestResult, date(2021, 1, 3))
                .with_code("SARS-CoV-2")
                .with_value("Negative"),
            Event::new(EventKind::TestResult, date(2021, 1, 9))
                .with_code("SARS-CoV-2")
                .with_value("Positive"),
        ]);
        let filter = EventFilter::new(EventKind::TestResult)
            .with_code("sars-cov-2")
            .with_value("positive");
        assert_eq!(first_match(&timeline, &filter).map(|e| e.date), Some(date(2021, 1, 9)));
    }

    #[test]
    fn test_most_frequent_code() {
        let timeline = PatientTimeline::new(vec![
            Event::new(EventKind::HospitalEthnicity, date(2019, 1, 1)).with_code("A"),
            Event::new(EventKind::HospitalEthnicity, date(2019, 2, 1)).with_code("C"),
            Event::new(EventKind::HospitalEthnicity, date(2019, 3, 1)).with_code("C"),
            Event::new(EventKind::HospitalEthnicity, date(2019, 4, 1)).with_code("A"),
            Event::new(EventKind::HospitalEthnicity, date(2019, 5, 1)),
        ]);
        let filter = EventFilter::new(EventKind::HospitalEthnicity);
        assert_eq!(most_frequent_code(&timeline, &filter), Some("A".to_string()));
        assert_eq!(most_frequent_code(&PatientTimeline::default(), &filter), None);
    }

    #[test]
    fn test_covering_span_prefers_latest_start() {
        let timeline = PatientTimeline::new(vec![
            Event::new(EventKind::Registration, date(2010, 1, 1)).with_value("London"),
            Event::new(EventKind::Registration, date(2020, 1, 1))
                .ending(date(2021, 12, 31))
                .with_value("North West"),
        ]);
        let span = covering_span(&timeline, EventKind::Registration, date(2021, 6, 1));
        assert_eq!(span.and_then(|e| e.value.as_deref()), Some("North West"));

        let span = covering_span(&timeline, EventKind::Registration, date(2022, 6, 1));
        assert_eq!(span.and_then(|e| e.value.as_deref()), Some("London"));

        assert_eq!(covering_span(&timeline, EventKind::Registration, date(2009, 1, 1)), None);
    }

    #[test]
    fn test_continuous_registration() {
        let timeline = PatientTimeline::new(vec![
            Event::new(EventKind::Registration, date(2019, 1, 1)).ending(date(2020, 6, 30)),
            Event::new(EventKind::Registration, date(2020, 7, 1)),
        ]);
        assert!(continuous_registration(&timeline, date(2020, 7, 1), date(2021, 6, 1)));
        assert!(!continuous_registration(&timeline, date(2020, 1, 1), date(2021, 6, 1)));
    }
}
