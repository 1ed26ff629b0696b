//! Prometheus metrics for the gated endpoints.
//!
//! Each server owns its registry; nothing is registered globally, so
//! several app states can coexist in one process.

use std::time::Duration;

use axum::http::StatusCode;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

pub mod labels {
    pub const ENDPOINT: &str = "endpoint";
    pub const STATUS: &str = "status";
    pub const REQUEST_IP: &str = "request_ip";
    pub const API_KEY: &str = "api_key";
}

pub struct RequestMetrics {
    registry: Registry,
    duration: HistogramVec,
    in_flight: IntGaugeVec,
}

/// Holds one in-flight slot; released on drop.
pub struct InFlight(IntGauge);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.dec();
    }
}

impl RequestMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let duration = HistogramVec::new(
            HistogramOpts::new(
                "transgate_http_request_duration_seconds",
                "Time spent on request",
            ),
            &[
                labels::ENDPOINT,
                labels::STATUS,
                labels::REQUEST_IP,
                labels::API_KEY,
            ],
        )?;
        let in_flight = IntGaugeVec::new(
            Opts::new(
                "transgate_http_requests_in_flight",
                "Active requests",
            ),
            &[labels::ENDPOINT, labels::REQUEST_IP, labels::API_KEY],
        )?;

        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;

        Ok(Self {
            registry,
            duration,
            in_flight,
        })
    }

    /// Count a request as running until the returned guard drops.
    pub fn start(&self, endpoint: &str, request_ip: &str, api_key: &str) -> InFlight {
        let gauge = self
            .in_flight
            .with_label_values(&[endpoint, request_ip, api_key]);
        gauge.inc();
        InFlight(gauge)
    }

    pub fn observe(
        &self,
        endpoint: &str,
        status: StatusCode,
        request_ip: &str,
        api_key: &str,
        elapsed: Duration,
    ) {
        self.duration
            .with_label_values(&[endpoint, status.as_str(), request_ip, api_key])
            .observe(elapsed.as_secs_f64());
    }

    /// Text exposition of everything recorded, with its content type.
    pub fn render(&self) -> Result<(String, Vec<u8>), prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(metrics: &RequestMetrics) -> String {
        String::from_utf8(metrics.render().unwrap().1).unwrap()
    }

    #[test]
    fn test_in_flight_released_on_drop() {
        let metrics = RequestMetrics::new().unwrap();

        let slot = metrics.start("/translate", "10.0.0.1", "");
        let gauge = metrics
            .in_flight
            .with_label_values(&["/translate", "10.0.0.1", ""]);
        assert_eq!(gauge.get(), 1);

        drop(slot);
        assert_eq!(gauge.get(), 0);
    }

    #[test]
    fn test_render_includes_observed_labels() {
        let metrics = RequestMetrics::new().unwrap();
        metrics.observe(
            "/detect",
            StatusCode::TOO_MANY_REQUESTS,
            "10.0.0.2",
            "key-1",
            Duration::from_millis(15),
        );

        let text = rendered(&metrics);
        assert!(text.contains("transgate_http_request_duration_seconds_count"));
        assert!(text.contains("status=\"429\""));
        assert!(text.contains("api_key=\"key-1\""));
        assert!(metrics.render().unwrap().0.starts_with("text/plain"));
    }
}
