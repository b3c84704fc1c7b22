// Query construction for the /api/history/period endpoint.

use chrono::{DateTime, Duration, Utc};

/// Default history window when the caller gives no start time.
pub const DEFAULT_HISTORY_WINDOW_HOURS: i64 = 24;

/// Default statistics window (the statistics fallback looks further back).
pub const DEFAULT_STATISTICS_WINDOW_DAYS: i64 = 7;

/// Builder for one history request. The endpoint path carries the start
/// timestamp; everything else travels as query parameters.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    entity_id: Option<String>,
    minimal_response: bool,
}

impl HistoryQuery {
    /// Start from an explicit time, or 24 hours before now.
    pub fn new(start: Option<DateTime<Utc>>) -> Self {
        Self {
            start: start.unwrap_or_else(|| Utc::now() - Duration::hours(DEFAULT_HISTORY_WINDOW_HOURS)),
            end: None,
            entity_id: None,
            minimal_response: true,
        }
    }

    pub fn entity_id(mut self, entity_id: Option<impl Into<String>>) -> Self {
        self.entity_id = entity_id.map(Into::into);
        self
    }

    pub fn end(mut self, end: Option<DateTime<Utc>>) -> Self {
        self.end = end;
        self
    }

    pub fn minimal_response(mut self, minimal: bool) -> Self {
        self.minimal_response = minimal;
        self
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start
    }

    /// Endpoint path, relative to `/api/`.
    pub fn path(&self) -> String {
        format!("history/period/{}", self.start.to_rfc3339())
    }

    /// Query parameters, built conditionally. `minimal_response` is the
    /// literal string "true" because the endpoint treats any present value
    /// as enabled.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(entity_id) = &self.entity_id {
            params.push(("filter_entity_id".to_string(), entity_id.clone()));
        }
        if let Some(end) = self.end {
            params.push(("end_time".to_string(), end.to_rfc3339()));
        }
        if self.minimal_response {
            params.push(("minimal_response".to_string(), "true".to_string()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_start_is_24_hours_ago() {
        let before = Utc::now() - Duration::hours(24);
        let query = HistoryQuery::new(None);
        let after = Utc::now() - Duration::hours(24);
        assert!(query.start_time() >= before - Duration::seconds(1));
        assert!(query.start_time() <= after + Duration::seconds(1));
    }

    #[test]
    fn default_params_carry_minimal_response_string() {
        let query = HistoryQuery::new(None);
        assert_eq!(
            query.params(),
            vec![("minimal_response".to_string(), "true".to_string())]
        );
    }

    #[test]
    fn path_embeds_rfc3339_start() {
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let query = HistoryQuery::new(Some(start));
        assert_eq!(query.path(), "history/period/2025-05-01T12:00:00+00:00");
    }

    #[test]
    fn all_params_present_when_set() {
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 5, 2, 0, 0, 0).unwrap();
        let query = HistoryQuery::new(Some(start))
            .entity_id(Some("sensor.temp"))
            .end(Some(end));
        let params = query.params();
        assert_eq!(params.len(), 3);
        assert_eq!(params[0].0, "filter_entity_id");
        assert_eq!(params[0].1, "sensor.temp");
        assert_eq!(params[1].0, "end_time");
        assert!(params[1].1.starts_with("2025-05-02T00:00:00"));
        assert_eq!(params[2], ("minimal_response".to_string(), "true".to_string()));
    }

    #[test]
    fn minimal_response_can_be_disabled() {
        let query = HistoryQuery::new(None).minimal_response(false);
        assert!(query.params().is_empty());
    }
}
