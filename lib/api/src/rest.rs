use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use oddsim_core::{Error, HistoricalRecord, OperationStats};
use oddsim_storage::{AnalysisManager, AnalysisRequest, RejectedRecord};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Accepted range for `min_matches` on this surface
pub const MIN_MATCHES_RANGE: std::ops::RangeInclusive<usize> = 1..=100;

#[derive(Deserialize)]
struct CompareRequest {
    odds: Map<String, Value>,
    #[serde(default)]
    min_matches: Option<usize>,
}

#[derive(Deserialize)]
struct UpsertRecordsRequest {
    records: Vec<Value>,
}

pub struct RestApi;

impl RestApi {
    pub async fn start(manager: Arc<AnalysisManager>, port: u16) -> std::io::Result<()> {
        info!("binding REST API on 0.0.0.0:{}", port);
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(manager.clone()))
                .configure(RestApi::configure)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }

    /// Route table; the app must carry `web::Data<Arc<AnalysisManager>>`
    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.route("/similarity/analyze", web::post().to(analyze))
            .route("/similarity/compare", web::post().to(compare))
            .route("/records", web::put().to(upsert_records))
            .route("/records/stats", web::get().to(record_stats))
            .route("/cache/stats", web::get().to(cache_stats))
            .route("/cache", web::delete().to(clear_cache))
            .route("/store/compact", web::post().to(compact_store))
            .route("/metrics", web::get().to(metrics));
    }
}

fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::Encoding(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: &Error) -> HttpResponse {
    let status = status_for(e);
    if status.is_server_error() {
        warn!("request failed: {}", e);
    }
    HttpResponse::build(status).json(json!({ "error": e.to_string() }))
}

fn bad_request(message: String) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({ "error": message }))
}

fn check_min_matches(min_matches: Option<usize>) -> Option<HttpResponse> {
    match min_matches {
        Some(n) if !MIN_MATCHES_RANGE.contains(&n) => Some(bad_request(format!(
            "min_matches must be within {}..={}, got {}",
            MIN_MATCHES_RANGE.start(),
            MIN_MATCHES_RANGE.end(),
            n
        ))),
        _ => None,
    }
}

async fn analyze(
    manager: web::Data<Arc<AnalysisManager>>,
    req: web::Json<AnalysisRequest>,
) -> ActixResult<HttpResponse> {
    let request = req.into_inner();
    if let Some(rejection) = check_min_matches(request.min_matches) {
        return Ok(rejection);
    }

    let manager = manager.get_ref().clone();
    let result = web::block(move || manager.analyze(&request, None)).await?;
    match result {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({ "result": response }))),
        Err(e) => Ok(error_response(&e)),
    }
}

async fn compare(
    manager: web::Data<Arc<AnalysisManager>>,
    req: web::Json<CompareRequest>,
) -> ActixResult<HttpResponse> {
    let request = req.into_inner();
    if let Some(rejection) = check_min_matches(request.min_matches) {
        return Ok(rejection);
    }

    let manager = manager.get_ref().clone();
    let result =
        web::block(move || manager.compare_metrics(&request.odds, request.min_matches, None)).await?;
    match result {
        Ok(reports) => Ok(HttpResponse::Ok().json(json!({ "result": reports }))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Each record is decoded on its own so one malformed entry cannot sink the batch
async fn upsert_records(
    manager: web::Data<Arc<AnalysisManager>>,
    req: web::Json<UpsertRecordsRequest>,
) -> ActixResult<HttpResponse> {
    let mut records = Vec::with_capacity(req.records.len());
    let mut malformed = Vec::new();
    for value in req.into_inner().records {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match serde_json::from_value::<HistoricalRecord>(value) {
            Ok(record) => records.push(record),
            Err(e) => malformed.push(RejectedRecord {
                id,
                error: Error::from(e).to_string(),
            }),
        }
    }

    let manager = manager.get_ref().clone();
    let mut report = web::block(move || manager.upsert_batch(records)).await?;
    report.rejected.extend(malformed);
    Ok(HttpResponse::Ok().json(json!({ "result": report })))
}

async fn record_stats(manager: web::Data<Arc<AnalysisManager>>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({ "result": manager.store_stats() })))
}

async fn cache_stats(manager: web::Data<Arc<AnalysisManager>>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({ "result": manager.cache_stats() })))
}

async fn clear_cache(manager: web::Data<Arc<AnalysisManager>>) -> ActixResult<HttpResponse> {
    let removed = manager.clear_cache();
    Ok(HttpResponse::Ok().json(json!({ "result": { "removed": removed } })))
}

async fn compact_store(manager: web::Data<Arc<AnalysisManager>>) -> ActixResult<HttpResponse> {
    let manager = manager.get_ref().clone();
    match web::block(move || manager.compact()).await? {
        Ok(snapshot) => Ok(HttpResponse::Ok().json(json!({ "result": snapshot }))),
        Err(e) => Ok(error_response(&e)),
    }
}

async fn metrics(manager: web::Data<Arc<AnalysisManager>>) -> ActixResult<HttpResponse> {
    let ops: BTreeMap<String, OperationStats> = manager.metrics_snapshot().into_iter().collect();
    Ok(HttpResponse::Ok().json(json!({ "result": ops })))
}
