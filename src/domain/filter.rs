// Filter state - the active type/location/time-range predicate
use super::telemetry::Metric;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_date: Option<DateTime<Utc>>,
}

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.from && ts <= self.to
    }

    /// Widen to whole UTC days: `from` at 00:00:00.000, `to` at 23:59:59.999.
    /// Stays on the same calendar day, so it holds up to `DateTime::MAX_UTC`.
    pub fn day_bounds(&self) -> TimeWindow {
        let from = self.from.date_naive().and_time(NaiveTime::MIN).and_utc();
        let to = self
            .to
            .date_naive()
            .and_hms_milli_opt(23, 59, 59, 999)
            .map(|end| end.and_utc())
            .unwrap_or(self.to);
        TimeWindow { from, to }
    }
}

/// How `hasTimeWindow` moved between two filter states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowTransition {
    Unchanged,
    Opened,
    Closed,
}

impl WindowTransition {
    pub fn between(previous: &FilterState, next: &FilterState) -> Self {
        match (previous.has_time_window(), next.has_time_window()) {
            (false, true) => WindowTransition::Opened,
            (true, false) => WindowTransition::Closed,
            _ => WindowTransition::Unchanged,
        }
    }
}

impl FilterState {
    pub fn by_type(metric_type: impl Into<String>) -> Self {
        Self {
            metric_type: Some(metric_type.into()),
            ..Self::default()
        }
    }

    pub fn with_window(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from_date = Some(from);
        self.to_date = Some(to);
        self
    }

    /// Blank predicates become absent and an inverted window is swapped.
    pub fn normalized(mut self) -> Self {
        self.metric_type = self.metric_type.filter(|t| !t.trim().is_empty());
        self.name = self.name.filter(|n| !n.trim().is_empty());
        if let (Some(from), Some(to)) = (self.from_date, self.to_date) {
            if from > to {
                self.from_date = Some(to);
                self.to_date = Some(from);
            }
        }
        self
    }

    /// Exactly one bound present disables the window.
    pub fn has_time_window(&self) -> bool {
        self.from_date.is_some() && self.to_date.is_some()
    }

    pub fn window(&self) -> Option<TimeWindow> {
        match (self.from_date, self.to_date) {
            (Some(from), Some(to)) => Some(TimeWindow { from, to }),
            _ => None,
        }
    }

    /// Type equality and name substring. Time is not part of this predicate.
    pub fn matches(&self, metric: &Metric) -> bool {
        let type_ok = self
            .metric_type
            .as_deref()
            .is_none_or(|t| metric.metric_type == t);
        let name_ok = self
            .name
            .as_deref()
            .is_none_or(|n| metric.name.contains(n));
        type_ok && name_ok
    }

    /// Same predicate with the time window dropped, as sent to the providers.
    pub fn without_window(&self) -> FilterState {
        FilterState {
            metric_type: self.metric_type.clone(),
            name: self.name.clone(),
            from_date: None,
            to_date: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_half_window_is_disabled() {
        let mut filter = FilterState::default();
        filter.from_date = Some(at(1, 0));
        assert!(!filter.has_time_window());
        assert!(filter.window().is_none());

        let filter = filter.with_window(at(1, 0), at(2, 0));
        assert!(filter.has_time_window());
    }

    #[test]
    fn test_window_transition() {
        let live = FilterState::by_type("motion");
        let windowed = FilterState::default().with_window(at(1, 0), at(3, 0));

        assert_eq!(WindowTransition::between(&live, &windowed), WindowTransition::Opened);
        assert_eq!(WindowTransition::between(&windowed, &live), WindowTransition::Closed);
        assert_eq!(WindowTransition::between(&live, &live), WindowTransition::Unchanged);
        assert_eq!(
            WindowTransition::between(&windowed, &windowed.clone().with_window(at(2, 0), at(4, 0))),
            WindowTransition::Unchanged
        );
    }

    #[test]
    fn test_normalized_swaps_and_blanks() {
        let filter = FilterState {
            metric_type: Some("  ".to_string()),
            name: Some("Kitchen".to_string()),
            from_date: Some(at(9, 0)),
            to_date: Some(at(2, 0)),
        }
        .normalized();

        assert_eq!(filter.metric_type, None);
        assert_eq!(filter.name.as_deref(), Some("Kitchen"));
        assert_eq!(filter.from_date, Some(at(2, 0)));
        assert_eq!(filter.to_date, Some(at(9, 0)));
    }

    #[test]
    fn test_matches_type_and_name_substring() {
        let metric = Metric::new(3, "energy", "Garage North", Default::default(), at(1, 0));

        assert!(FilterState::default().matches(&metric));
        assert!(FilterState::by_type("energy").matches(&metric));
        assert!(!FilterState::by_type("motion").matches(&metric));

        let by_name = FilterState {
            name: Some("North".to_string()),
            ..FilterState::default()
        };
        assert!(by_name.matches(&metric));
    }

    #[test]
    fn test_day_bounds() {
        let window = TimeWindow { from: at(1, 15), to: at(3, 8) }.day_bounds();
        assert_eq!(window.from, at(1, 0));
        assert_eq!(
            window.to,
            Utc.with_ymd_and_hms(2024, 5, 3, 23, 59, 59).unwrap() + Duration::milliseconds(999)
        );
        assert!(window.contains(at(3, 23)));
        assert!(!window.contains(at(4, 0)));
    }

    #[test]
    fn test_day_bounds_at_calendar_limits() {
        let window = TimeWindow {
            from: DateTime::<Utc>::MIN_UTC,
            to: DateTime::<Utc>::MAX_UTC,
        }
        .day_bounds();
        assert_eq!(window.from, DateTime::<Utc>::MIN_UTC);
        assert!(window.to <= DateTime::<Utc>::MAX_UTC);
        assert_eq!(window.to.date_naive(), DateTime::<Utc>::MAX_UTC.date_naive());

        let far: DateTime<Utc> = "+262142-12-31T00:00:00Z".parse().unwrap();
        let window = TimeWindow { from: at(1, 0), to: far }.day_bounds();
        assert_eq!(window.to.date_naive(), far.date_naive());
        assert!(window.contains(far));
    }
}
