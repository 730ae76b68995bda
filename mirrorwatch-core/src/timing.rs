//! Page navigation timing
//!
//! The host supplies the raw navigation-timing marks once (epoch
//! milliseconds, `0` or absent when a mark never happened). [`PageTimings`]
//! derives the intervals reported on the first successful flush.

use serde::{Deserialize, Serialize};

/// Value reported for an interval whose marks are unavailable
pub const UNAVAILABLE: i64 = -1;

/// Raw navigation timing marks, in epoch milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationTiming {
    pub fetch_start: Option<u64>,
    pub domain_lookup_start: Option<u64>,
    pub domain_lookup_end: Option<u64>,
    pub connect_start: Option<u64>,
    pub connect_end: Option<u64>,
    pub request_start: Option<u64>,
    pub response_start: Option<u64>,
    pub response_end: Option<u64>,
    pub dom_interactive: Option<u64>,
    pub dom_content_loaded_event_end: Option<u64>,
    pub load_event_start: Option<u64>,
}

/// Derived page-load intervals in milliseconds, [`UNAVAILABLE`] when unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTimings {
    /// DNS lookup
    pub dns: i64,
    /// TCP connect
    pub tcp: i64,
    /// Request sent to first response byte
    pub ttfb: i64,
    /// Response transfer
    pub trans: i64,
    /// DOM processing
    pub dom: i64,
    /// Sub-resource loading
    pub res: i64,
    /// DNS start to first response byte
    pub firstbyte: i64,
    /// First paintable time
    pub fpt: i64,
    /// Time to interactive
    pub tti: i64,
    /// DOM ready
    pub ready: i64,
    /// Full load
    pub load: i64,
}

impl Default for PageTimings {
    fn default() -> Self {
        Self {
            dns: UNAVAILABLE,
            tcp: UNAVAILABLE,
            ttfb: UNAVAILABLE,
            trans: UNAVAILABLE,
            dom: UNAVAILABLE,
            res: UNAVAILABLE,
            firstbyte: UNAVAILABLE,
            fpt: UNAVAILABLE,
            tti: UNAVAILABLE,
            ready: UNAVAILABLE,
            load: UNAVAILABLE,
        }
    }
}

/// `end - start`, or [`UNAVAILABLE`] when either mark is missing or they are out of order.
fn interval(end: Option<u64>, start: Option<u64>) -> i64 {
    match (end, start) {
        (Some(end), Some(start)) if end > 0 && start > 0 && end >= start => (end - start) as i64,
        _ => UNAVAILABLE,
    }
}

impl PageTimings {
    pub fn from_navigation(t: &NavigationTiming) -> Self {
        Self {
            dns: interval(t.domain_lookup_end, t.domain_lookup_start),
            tcp: interval(t.connect_end, t.connect_start),
            ttfb: interval(t.response_start, t.request_start),
            trans: interval(t.response_end, t.response_start),
            dom: interval(t.dom_interactive, t.response_end),
            res: interval(t.load_event_start, t.dom_content_loaded_event_end),
            firstbyte: interval(t.response_start, t.domain_lookup_start),
            fpt: interval(t.response_end, t.fetch_start),
            tti: interval(t.dom_interactive, t.fetch_start),
            ready: interval(t.dom_content_loaded_event_end, t.fetch_start),
            load: interval(t.load_event_start, t.fetch_start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_timing() -> NavigationTiming {
        NavigationTiming {
            fetch_start: Some(1_000),
            domain_lookup_start: Some(1_005),
            domain_lookup_end: Some(1_025),
            connect_start: Some(1_025),
            connect_end: Some(1_065),
            request_start: Some(1_070),
            response_start: Some(1_170),
            response_end: Some(1_200),
            dom_interactive: Some(1_500),
            dom_content_loaded_event_end: Some(1_600),
            load_event_start: Some(2_000),
        }
    }

    #[test]
    fn test_intervals_from_complete_timing() {
        let times = PageTimings::from_navigation(&complete_timing());
        assert_eq!(times.dns, 20);
        assert_eq!(times.tcp, 40);
        assert_eq!(times.ttfb, 100);
        assert_eq!(times.trans, 30);
        assert_eq!(times.dom, 300);
        assert_eq!(times.res, 400);
        assert_eq!(times.firstbyte, 165);
        assert_eq!(times.fpt, 200);
        assert_eq!(times.tti, 500);
        assert_eq!(times.ready, 600);
        assert_eq!(times.load, 1_000);
    }

    #[test]
    fn test_missing_marks_yield_sentinel() {
        let timing = NavigationTiming {
            load_event_start: Some(0),
            dom_content_loaded_event_end: None,
            ..complete_timing()
        };
        let times = PageTimings::from_navigation(&timing);
        assert_eq!(times.load, UNAVAILABLE);
        assert_eq!(times.res, UNAVAILABLE);
        assert_eq!(times.ready, UNAVAILABLE);
        assert_eq!(times.dns, 20);
    }

    #[test]
    fn test_empty_timing_is_all_sentinel() {
        let times = PageTimings::from_navigation(&NavigationTiming::default());
        assert_eq!(times, PageTimings::default());
    }

    #[test]
    fn test_parse_camel_case_marks() {
        let timing: NavigationTiming =
            serde_json::from_str(r#"{"fetchStart": 10, "loadEventStart": 40}"#).unwrap();
        assert_eq!(PageTimings::from_navigation(&timing).load, 30);
    }
}
