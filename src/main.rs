use std::{process::exit, sync::Arc, time::Duration};

use actix_web::{
    get,
    web::{Data, Path},
    App, HttpResponse, HttpServer, Responder,
};
use http_benchmarks::{report, Benchmarks, BenchmarksMiddleware, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::{
    fmt::format::FmtSpan, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Longest delay `/sleep` will honor.
const MAX_SLEEP_MS: u64 = 10_000;

#[get("/")]
#[tracing::instrument(level = "debug")]
async fn home() -> impl Responder {
    HttpResponse::Ok().body("Hello! Request statistics are at /benchmarks/status.")
}

/// Respond after a delay, handy for watching the latency numbers move.
#[get("/sleep/{millis}")]
#[tracing::instrument(level = "debug")]
async fn sleep(millis: Path<u64>) -> impl Responder {
    let millis = millis.into_inner().min(MAX_SLEEP_MS);
    tokio::time::sleep(Duration::from_millis(millis)).await;
    HttpResponse::Ok().body(format!("Slept for {} ms", millis))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_span_events(FmtSpan::NEW | FmtSpan::CLOSE))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            exit(1);
        }
    };

    // One aggregator for the whole server, shared by every worker.
    let benchmarks = match Benchmarks::new(config.benchmarks()) {
        Ok(benchmarks) => Arc::new(benchmarks),
        Err(err) => {
            error!("{}", err);
            exit(1);
        }
    };

    info!("Listening on {}", config.bind);
    HttpServer::new(move || {
        App::new()
            .wrap(BenchmarksMiddleware::new(benchmarks.clone()))
            .app_data(Data::from(benchmarks.clone()))
            .service(home)
            .service(sleep)
            .configure(report::configure)
    })
    .bind(config.bind.as_str())?
    .run()
    .await
}
