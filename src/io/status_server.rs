//! Status HTTP endpoint
//!
//! - `GET /metrics` - job metrics in Prometheus text format
//! - `GET /health` - liveness plus the last finished run as JSON
//! - `POST /jobs/expiry/run` - manual trigger (409 while a run is in progress)
//!
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{MetricsSummary, NUM_BUCKETS, RUN_DURATION_BOUNDS_MS};
use crate::services::scheduler::{ExpiryScheduler, TriggerOutcome};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with service label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    service: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{service=\"{service}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    service: &str,
    buckets: &[u64; NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in RUN_DURATION_BOUNDS_MS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{service=\"{service}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{service=\"{service}\",le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum{{service=\"{service}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{service=\"{service}\"}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(
    summary: &MetricsSummary,
    running: bool,
    service_id: &str,
) -> String {
    let mut output = String::with_capacity(4096);

    write_metric(
        &mut output,
        "expiry_runs_completed_total",
        "Runs that finished all stages",
        MetricType::Counter,
        service_id,
        summary.runs_completed,
    );
    write_metric(
        &mut output,
        "expiry_runs_failed_total",
        "Runs aborted by an error",
        MetricType::Counter,
        service_id,
        summary.runs_failed,
    );
    write_metric(
        &mut output,
        "expiry_runs_skipped_total",
        "Triggers skipped because a run was in progress",
        MetricType::Counter,
        service_id,
        summary.runs_skipped,
    );
    write_metric(
        &mut output,
        "expiry_items_warned_total",
        "Items moved to the warning category",
        MetricType::Counter,
        service_id,
        summary.items_warned,
    );
    write_metric(
        &mut output,
        "expiry_items_dangered_total",
        "Items moved to the danger category",
        MetricType::Counter,
        service_id,
        summary.items_dangered,
    );
    write_metric(
        &mut output,
        "expiry_items_missing_total",
        "Classified items no longer present at reclassification",
        MetricType::Counter,
        service_id,
        summary.items_missing,
    );
    write_metric(
        &mut output,
        "expiry_notifications_total",
        "Notifications dispatched",
        MetricType::Counter,
        service_id,
        summary.notifications_sent,
    );

    write_histogram(
        &mut output,
        "expiry_run_duration_ms",
        "Run duration in milliseconds",
        service_id,
        &summary.duration_buckets,
        summary.duration_sum_ms,
    );
    write_metric(
        &mut output,
        "expiry_run_duration_max_ms",
        "Longest run duration",
        MetricType::Gauge,
        service_id,
        summary.duration_max_ms,
    );
    write_metric(
        &mut output,
        "expiry_run_last_duration_ms",
        "Duration of the most recent run",
        MetricType::Gauge,
        service_id,
        summary.last_duration_ms,
    );
    write_metric(
        &mut output,
        "expiry_run_in_progress",
        "1 while a run is executing",
        MetricType::Gauge,
        service_id,
        u64::from(running),
    );

    output
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response should not fail")
}

/// Handle HTTP requests (no route reads the request body)
async fn handle_request<B>(
    req: Request<B>,
    scheduler: ExpiryScheduler,
    service_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let summary = scheduler.metrics().report();
            let body = format_prometheus_metrics(&summary, scheduler.is_running(), &service_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(json_response(
            StatusCode::OK,
            json!({
                "status": "ok",
                "service": service_id.as_str(),
                "running": scheduler.is_running(),
                "last_run": scheduler.last_run(),
            }),
        )),
        (&Method::POST, "/jobs/expiry/run") => {
            info!("manual_expiry_trigger");
            // The run lives on a scheduler task, so a client hanging up cannot
            // cancel it between stages.
            let outcome = match scheduler.spawn_trigger().await {
                Ok(outcome) => outcome,
                Err(_) => TriggerOutcome::Failed("run task ended without a result".to_string()),
            };
            let response = match outcome {
                TriggerOutcome::Completed(report) => {
                    json_response(StatusCode::OK, json!({ "ok": true, "report": report }))
                }
                TriggerOutcome::Failed(message) => json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "ok": false, "error": message }),
                ),
                TriggerOutcome::Skipped => json_response(
                    StatusCode::CONFLICT,
                    json!({ "ok": false, "error": "run_in_progress" }),
                ),
            };
            Ok(response)
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the status HTTP server
pub async fn start_status_server(
    port: u16,
    scheduler: ExpiryScheduler,
    service_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let service_id = Arc::new(service_id);

    info!(port = %port, service = %service_id, "status_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let scheduler = scheduler.clone();
                        let service_id = service_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let scheduler = scheduler.clone();
                                let service_id = service_id.clone();
                                async move { handle_request(req, scheduler, service_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "status_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "status_accept_error");
                    }
                }
            }
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    info!("status_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
