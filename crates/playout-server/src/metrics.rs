//! Prometheus-compatible metrics endpoint

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use playout_core::swap::SwapBranch;

fn branch_label(branch: SwapBranch) -> &'static str {
    match branch {
        SwapBranch::PadSeamOverride => "pad_seam_override",
        SwapBranch::ContentSeamOverride => "content_seam_override",
        SwapBranch::CadenceAdvance => "cadence_advance",
        SwapBranch::CadenceRepeat => "cadence_repeat",
        SwapBranch::NormalPop => "normal_pop",
        SwapBranch::HoldLast => "hold_last",
        SwapBranch::PadFallback => "pad_fallback",
        SwapBranch::ForceExecute => "force_execute",
    }
}

/// Metrics collector
#[derive(Debug)]
pub struct Metrics {
    /// Server start time
    start_time: Instant,
    /// Total requests processed
    request_count: RwLock<u64>,
    /// Requests by endpoint
    requests_by_endpoint: RwLock<HashMap<String, u64>>,
    /// Active channels
    active_channels: RwLock<u64>,
    /// Ticks processed across all channels
    ticks_total: RwLock<u64>,
    /// Swap branches taken, by branch name
    swap_branches: RwLock<HashMap<&'static str, u64>>,
    /// Lateness events observed
    lateness_events: RwLock<u64>,
    /// Errors by type
    errors_by_type: RwLock<HashMap<String, u64>>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            request_count: RwLock::new(0),
            requests_by_endpoint: RwLock::new(HashMap::new()),
            active_channels: RwLock::new(0),
            ticks_total: RwLock::new(0),
            swap_branches: RwLock::new(HashMap::new()),
            lateness_events: RwLock::new(0),
            errors_by_type: RwLock::new(HashMap::new()),
        }
    }

    /// Record a request
    pub fn record_request(&self, endpoint: &str) {
        *self.request_count.write() += 1;
        *self
            .requests_by_endpoint
            .write()
            .entry(endpoint.to_string())
            .or_insert(0) += 1;
    }

    /// Update active channel count
    pub fn set_active_channels(&self, count: u64) {
        *self.active_channels.write() = count;
    }

    /// Record one pipeline tick having executed, tagged with the video and
    /// audio swap branch it took.
    pub fn record_tick(&self, video_branch: SwapBranch, audio_branch: SwapBranch) {
        *self.ticks_total.write() += 1;
        let mut branches = self.swap_branches.write();
        *branches.entry(branch_label(video_branch)).or_insert(0) += 1;
        *branches.entry(branch_label(audio_branch)).or_insert(0) += 1;
    }

    /// Record an observed lateness event (actual emission past its deadline)
    pub fn record_lateness(&self) {
        *self.lateness_events.write() += 1;
    }

    /// Record error
    pub fn record_error(&self, error_type: &str) {
        *self
            .errors_by_type
            .write()
            .entry(error_type.to_string())
            .or_insert(0) += 1;
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP playout_uptime_seconds Server uptime in seconds\n");
        output.push_str("# TYPE playout_uptime_seconds counter\n");
        output.push_str(&format!("playout_uptime_seconds {}\n", self.uptime_secs()));

        output.push_str("\n# HELP playout_start_time_seconds Server start time as Unix timestamp\n");
        output.push_str("# TYPE playout_start_time_seconds gauge\n");
        output.push_str(&format!(
            "playout_start_time_seconds {}\n",
            std::time::SystemTime::UNIX_EPOCH
                .elapsed()
                .unwrap_or(Duration::ZERO)
                .as_secs()
                .saturating_sub(self.uptime_secs())
        ));

        output.push_str("\n# HELP playout_requests_total Total number of HTTP requests\n");
        output.push_str("# TYPE playout_requests_total counter\n");
        output.push_str(&format!("playout_requests_total {}\n", *self.request_count.read()));

        output.push_str("\n# HELP playout_requests_by_endpoint Requests by endpoint\n");
        output.push_str("# TYPE playout_requests_by_endpoint counter\n");
        for (endpoint, count) in self.requests_by_endpoint.read().iter() {
            output.push_str(&format!(
                "playout_requests_by_endpoint{{endpoint=\"{}\"}} {}\n",
                endpoint, count
            ));
        }

        output.push_str("\n# HELP playout_active_channels Number of active playout channels\n");
        output.push_str("# TYPE playout_active_channels gauge\n");
        output.push_str(&format!("playout_active_channels {}\n", *self.active_channels.read()));

        output.push_str("\n# HELP playout_ticks_total Total pipeline ticks processed\n");
        output.push_str("# TYPE playout_ticks_total counter\n");
        output.push_str(&format!("playout_ticks_total {}\n", *self.ticks_total.read()));

        output.push_str("\n# HELP playout_swap_branch_total Swap cascade branches taken, by branch\n");
        output.push_str("# TYPE playout_swap_branch_total counter\n");
        for (branch, count) in self.swap_branches.read().iter() {
            output.push_str(&format!("playout_swap_branch_total{{branch=\"{}\"}} {}\n", branch, count));
        }

        output.push_str("\n# HELP playout_lateness_events_total Tick deadlines missed\n");
        output.push_str("# TYPE playout_lateness_events_total counter\n");
        output.push_str(&format!("playout_lateness_events_total {}\n", *self.lateness_events.read()));

        output.push_str("\n# HELP playout_errors_total Total errors by type\n");
        output.push_str("# TYPE playout_errors_total counter\n");
        for (error_type, count) in self.errors_by_type.read().iter() {
            output.push_str(&format!("playout_errors_total{{type=\"{}\"}} {}\n", error_type, count));
        }

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> Response {
    let prometheus_output = metrics.export_prometheus();

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        prometheus_output,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert!(metrics.uptime_secs() < 2);
    }

    #[test]
    fn test_record_request() {
        let metrics = Metrics::new();
        metrics.record_request("/channels");
        metrics.record_request("/channels");

        assert_eq!(*metrics.request_count.read(), 2);
        assert_eq!(metrics.requests_by_endpoint.read().get("/channels"), Some(&2));
    }

    #[test]
    fn test_record_tick_tags_both_branches() {
        let metrics = Metrics::new();
        metrics.record_tick(SwapBranch::PadSeamOverride, SwapBranch::NormalPop);

        let branches = metrics.swap_branches.read();
        assert_eq!(branches.get("pad_seam_override"), Some(&1));
        assert_eq!(branches.get("normal_pop"), Some(&1));
        assert_eq!(*metrics.ticks_total.read(), 1);
    }

    #[test]
    fn test_export_prometheus() {
        let metrics = Metrics::new();
        metrics.record_request("/channels");
        metrics.record_tick(SwapBranch::ForceExecute, SwapBranch::ForceExecute);

        let output = metrics.export_prometheus();

        assert!(output.contains("playout_requests_total"));
        assert!(output.contains("playout_swap_branch_total"));
        assert!(output.contains("force_execute"));
    }

    #[test]
    fn test_error_recording() {
        let metrics = Metrics::new();
        metrics.record_error("vacuum_violation");
        metrics.record_error("vacuum_violation");
        metrics.record_error("spool_full");

        let errors = metrics.errors_by_type.read();
        assert_eq!(errors.get("vacuum_violation"), Some(&2));
        assert_eq!(errors.get("spool_full"), Some(&1));
    }
}
