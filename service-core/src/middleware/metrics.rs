use axum::{extract::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};
use std::time::Instant;

const REQUESTS_TOTAL: &str = "http_requests_total";
const REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Endpoints polled by the monitoring stack itself; counting them would
/// drown out the operations that matter.
const UNTRACKED_PATHS: &[&str] = &["/health", "/metrics"];

pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    if UNTRACKED_PATHS.contains(&path.as_str()) {
        return response;
    }

    let status = response.status().as_u16().to_string();
    let labels = [("method", method), ("path", path), ("status", status)];

    counter!(REQUESTS_TOTAL, &labels).increment(1);
    histogram!(REQUEST_DURATION_SECONDS, &labels).record(start.elapsed().as_secs_f64());

    response
}
