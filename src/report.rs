use std::time::Duration;

use actix_web::{
    get,
    web::{Data, Query, ServiceConfig},
    HttpResponse, Responder,
};
use askama::Template;
use serde::Deserialize;
use tracing::error;

use crate::benchmarks::{Benchmarks, Snapshot};

/// Window used by `/benchmarks` when the caller doesn't pass one.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Windows shown on the status page, as long as they fit in the retention.
const STATUS_WINDOWS: [Duration; 3] = [
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(15 * 60),
];

/// Register the report routes. Expects a `Data<Benchmarks>` in the app data.
pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(stats).service(status);
}

#[derive(Debug, Deserialize)]
struct WindowQuery {
    /// In seconds. Negative windows are accepted and produce empty stats.
    window: Option<i64>,
}

impl WindowQuery {
    fn window(&self) -> Duration {
        match self.window {
            Some(secs) => u64::try_from(secs)
                .map(Duration::from_secs)
                .unwrap_or_default(),
            None => DEFAULT_WINDOW,
        }
    }
}

#[get("/benchmarks")]
#[tracing::instrument(level = "debug", skip(benchmarks))]
async fn stats(query: Query<WindowQuery>, benchmarks: Data<Benchmarks>) -> impl Responder {
    HttpResponse::Ok().json(benchmarks.stats(query.window()))
}

#[derive(Template)]
#[template(path = "status.html")]
struct StatusTemplate {
    retention: String,
    windows: Vec<WindowDisplay>,
}

/// A `Snapshot` formatted for the status page.
#[derive(Debug)]
struct WindowDisplay {
    label: String,
    requests: u64,
    rate: String,
    average: String,
    min: String,
    max: String,
}

impl WindowDisplay {
    fn new(window: Duration, snapshot: Snapshot) -> Self {
        WindowDisplay {
            label: human_window(window),
            requests: snapshot.requests,
            rate: format!("{:.2}", snapshot.requests_per_second),
            average: human_latency(snapshot.average_response_time),
            min: human_latency(snapshot.min_response_time),
            max: human_latency(snapshot.max_response_time),
        }
    }
}

fn human_latency(duration: Duration) -> String {
    let micros = duration.as_micros();
    if micros < 1000 {
        format!("{} µs", micros)
    } else if micros < 1_000_000 {
        format!("{:.2} ms", micros as f64 / 1000.0)
    } else {
        format!("{:.2} s", duration.as_secs_f64())
    }
}

fn human_window(window: Duration) -> String {
    let seconds = window.as_secs();
    if seconds == 1 {
        "1 second".to_string()
    } else if seconds < 60 {
        format!("{} seconds", seconds)
    } else if seconds == 60 {
        "1 minute".to_string()
    } else if seconds % 60 == 0 {
        format!("{} minutes", seconds / 60)
    } else {
        format!("{:.2} minutes", seconds as f64 / 60.0)
    }
}

#[get("/benchmarks/status")]
#[tracing::instrument(level = "debug", skip(benchmarks))]
async fn status(benchmarks: Data<Benchmarks>) -> impl Responder {
    let windows = STATUS_WINDOWS
        .into_iter()
        .filter(|window| *window <= benchmarks.retention())
        .map(|window| WindowDisplay::new(window, benchmarks.stats(window)))
        .collect();

    let page = StatusTemplate {
        retention: human_window(benchmarks.retention()),
        windows,
    };
    match page.render() {
        Ok(body) => HttpResponse::Ok().content_type("text/html").body(body),
        Err(err) => {
            error!("Failed to render status page: {}", err);
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    use actix_web::{test as actix_test, App};

    use super::*;
    use crate::{clock::ManualClock, config::BenchmarksConfig};

    fn benchmarks(retention: Duration) -> Arc<Benchmarks> {
        let start: SystemTime = UNIX_EPOCH + Duration::from_secs(1_640_995_200);
        let clock = Arc::new(ManualClock::new(start));
        let config = BenchmarksConfig::default()
            .with_retention(retention)
            .with_clock(clock.clone());
        let benchmarks = Benchmarks::new(config).unwrap();
        for millis in [50, 150, 250, 100] {
            benchmarks.update(Duration::from_millis(millis));
        }
        Arc::new(benchmarks)
    }

    #[actix_web::test]
    async fn test_stats_json() {
        let app = actix_test::init_service(
            App::new()
                .app_data(Data::from(benchmarks(Duration::from_secs(900))))
                .configure(configure),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/benchmarks?window=60")
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body,
            serde_json::json!({
                "total_requests": 4,
                "total_requests_sec": 4.0,
                "average_resp_time": 137500,
                "min_resp_time": 50000,
                "max_resp_time": 250000,
            })
        );

        let req = actix_test::TestRequest::get().uri("/benchmarks").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_requests"], 4);
    }

    #[actix_web::test]
    async fn test_stats_negative_window() {
        let app = actix_test::init_service(
            App::new()
                .app_data(Data::from(benchmarks(Duration::from_secs(900))))
                .configure(configure),
        )
        .await;

        for uri in ["/benchmarks?window=-60", "/benchmarks?window=0"] {
            let req = actix_test::TestRequest::get().uri(uri).to_request();
            let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
            assert_eq!(body["total_requests"], 0, "{uri}");
            assert_eq!(body["max_resp_time"], 0, "{uri}");
        }
    }

    #[actix_web::test]
    async fn test_status_page() {
        let app = actix_test::init_service(
            App::new()
                .app_data(Data::from(benchmarks(Duration::from_secs(5 * 60))))
                .configure(configure),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/benchmarks/status")
            .to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        let body = std::str::from_utf8(&body).unwrap();

        assert!(body.contains("Keeping data for the last 5 minutes."));
        assert!(body.contains("<td>1 minute</td>"));
        assert!(body.contains("<td>5 minutes</td>"));
        assert!(!body.contains("<td>15 minutes</td>"));
        assert!(body.contains("<td>137.50 ms</td>"));
    }

    #[test]
    fn test_human_latency() {
        assert_eq!(human_latency(Duration::ZERO), "0 µs");
        assert_eq!(human_latency(Duration::from_micros(999)), "999 µs");
        assert_eq!(human_latency(Duration::from_micros(137_500)), "137.50 ms");
        assert_eq!(human_latency(Duration::from_millis(2500)), "2.50 s");
    }

    #[test]
    fn test_human_window() {
        assert_eq!(human_window(Duration::from_secs(1)), "1 second");
        assert_eq!(human_window(Duration::from_secs(45)), "45 seconds");
        assert_eq!(human_window(Duration::from_secs(60)), "1 minute");
        assert_eq!(human_window(Duration::from_secs(900)), "15 minutes");
        assert_eq!(human_window(Duration::from_secs(90)), "1.50 minutes");
    }
}
