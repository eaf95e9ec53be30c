use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Records request count and latency for every HTTP request.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(start.elapsed().as_secs_f64());

    response
}

/// Collapses session ids and other dynamic segments into `{id}` so the
/// path label stays low-cardinality.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| if is_dynamic(segment) { "{id}" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_dynamic(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    let uuid_like =
        segment.len() == 36 && segment.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
    let numeric = segment.chars().all(|c| c.is_ascii_digit());
    uuid_like || numeric
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_collapse_to_placeholder() {
        assert_eq!(
            normalize_path("/api/v1/quizzes/550e8400-e29b-41d4-a716-446655440000/leaderboard"),
            "/api/v1/quizzes/{id}/leaderboard"
        );
        assert_eq!(normalize_path("/api/v1/quizzes/42"), "/api/v1/quizzes/{id}");
    }

    #[test]
    fn static_paths_are_untouched() {
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/metrics"), "/metrics");
        assert_eq!(normalize_path("/api/v1/quizzes"), "/api/v1/quizzes");
    }
}
