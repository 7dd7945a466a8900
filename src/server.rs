use std::fs;
use std::io::Write;
use std::path::Path;

use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::json;
use tempfile::{Builder, NamedTempFile};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::capture::PcapFileSource;
use crate::config::ServerConfig;
use crate::detection::{FloodAlert, ScanAlert};
use crate::error::AnalysisError;
use crate::models::dto::TrafficRow;
use crate::pipeline::NetworkAnalyzer;
use crate::report::Visualization;
use crate::store::ResultStore;

const ALLOWED_EXTENSIONS: [&str; 2] = ["pcap", "pcapng"];
const UPLOAD_FIELD: &str = "pcap_file";

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: ServerConfig,
}

#[derive(Debug, Serialize)]
pub struct Alerts {
    pub port_scans: Vec<ScanAlert>,
    pub floods: Vec<FloodAlert>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub message: String,
    pub analysis_results: Vec<TrafficRow>,
    pub visualizations: Vec<Visualization>,
    pub alerts: Alerts,
}

/// The `pcap_file` part of a multipart upload.
struct Upload {
    filename: String,
    data: Vec<u8>,
}

#[derive(Error, Debug)]
enum ReceiveError {
    #[error("malformed multipart body: {0}")]
    Malformed(String),
    #[error("upload exceeds {0} bytes")]
    TooLarge(usize),
}

#[derive(Error, Debug)]
enum UploadError {
    #[error("could not stage upload: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

#[get("/")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "netlens backend is running" }))
}

#[post("/analyze")]
async fn analyze(state: web::Data<AppState>, mut payload: Multipart) -> HttpResponse {
    info!("Received request to /analyze endpoint");

    let upload = match receive_upload(&mut payload, state.config.max_upload_bytes).await {
        Ok(Some(upload)) => upload,
        Ok(None) => {
            warn!("No '{}' part in the request", UPLOAD_FIELD);
            return bad_request("No PCAP file provided");
        }
        Err(ReceiveError::Malformed(e)) => {
            warn!("Unreadable upload: {}", e);
            return bad_request("No PCAP file provided");
        }
        Err(e @ ReceiveError::TooLarge(_)) => {
            warn!("Rejected upload: {}", e);
            return HttpResponse::PayloadTooLarge().json(json!({ "error": "File too large" }));
        }
    };
    if upload.filename.trim().is_empty() {
        warn!("No selected file");
        return bad_request("No file selected");
    }
    let extension = match allowed_extension(&upload.filename) {
        Some(extension) => extension,
        None => {
            warn!("Invalid file type for {}", upload.filename);
            return bad_request("Only .pcap or .pcapng files are allowed");
        }
    };

    let state = state.into_inner();
    let result = web::block(move || {
        analyze_upload(&state.config, &upload.filename, &extension, &upload.data)
    })
    .await;
    match result {
        Ok(Ok(response)) => HttpResponse::Ok().json(response),
        Ok(Err(UploadError::Analysis(e))) => analysis_error_response(&e),
        Ok(Err(e)) => {
            error!("Error during PCAP analysis: {}", e);
            let message = format!("Analysis failed: {}", e);
            HttpResponse::InternalServerError().json(json!({ "error": message }))
        }
        Err(e) => {
            error!("Analysis worker failed: {}", e);
            HttpResponse::InternalServerError().json(json!({ "error": "Analysis failed" }))
        }
    }
}

/// Reads form parts until `pcap_file` is found, skipping any others.
async fn receive_upload(
    payload: &mut Multipart,
    limit: usize,
) -> Result<Option<Upload>, ReceiveError> {
    let malformed = |e: actix_multipart::MultipartError| ReceiveError::Malformed(e.to_string());

    while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
        let disposition = field.content_disposition();
        let is_upload = disposition.get_name() == Some(UPLOAD_FIELD);
        let filename = disposition.get_filename().unwrap_or_default().to_string();

        if !is_upload {
            while field.try_next().await.map_err(malformed)?.is_some() {}
            continue;
        }

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(malformed)? {
            if data.len() + chunk.len() > limit {
                return Err(ReceiveError::TooLarge(limit));
            }
            data.extend_from_slice(&chunk);
        }
        return Ok(Some(Upload { filename, data }));
    }
    Ok(None)
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({ "error": message }))
}

fn analysis_error_response(e: &AnalysisError) -> HttpResponse {
    error!("Error during PCAP analysis: {}", e);
    let body = json!({ "error": e.user_message() });
    match e {
        AnalysisError::SourceUnavailable(_) | AnalysisError::NoAnalyzableTraffic => {
            HttpResponse::UnprocessableEntity().json(body)
        }
        AnalysisError::Persistence(_) | AnalysisError::ProtocolMap(_) => {
            HttpResponse::InternalServerError().json(body)
        }
    }
}

fn allowed_extension(filename: &str) -> Option<String> {
    let extension = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    ALLOWED_EXTENSIONS
        .contains(&extension.as_str())
        .then_some(extension)
}

fn staged(dir: &Path, prefix: &str, suffix: &str) -> std::io::Result<NamedTempFile> {
    Builder::new().prefix(prefix).suffix(suffix).tempfile_in(dir)
}

/// Stages the upload and both outputs as temp files; all three are removed
/// when this returns, whatever the outcome.
fn analyze_upload(
    config: &ServerConfig,
    filename: &str,
    extension: &str,
    body: &[u8],
) -> Result<AnalyzeResponse, UploadError> {
    fs::create_dir_all(&config.upload_dir)?;
    let dir = config.upload_dir.as_path();

    let prefix = format!("{}_", Uuid::new_v4());
    let mut capture = staged(dir, &prefix, &format!(".{}", extension))?;
    capture.write_all(body)?;
    capture.flush()?;
    info!("Upload {} staged at {}", filename, capture.path().display());

    let traffic = staged(dir, "analysis_", ".csv")?;
    let charts = staged(dir, "visualizations_", ".json")?;
    let store = ResultStore::new(traffic.path(), charts.path());

    let analyzer = NetworkAnalyzer::new(config.analyzer.clone());
    let output = analyzer.run(filename, &mut PcapFileSource::new(capture.path()), &store)?;
    let rows = store.load_traffic().map_err(AnalysisError::from)?;

    Ok(AnalyzeResponse {
        message: "Analysis completed successfully".to_string(),
        analysis_results: rows,
        visualizations: output.visualizations,
        alerts: Alerts {
            port_scans: output.report.detections.scans,
            floods: output.report.detections.floods,
        },
    })
}

/// Browser access for the configured frontend origin only.
pub fn cors(origin: &str) -> Cors {
    Cors::default()
        .allowed_origin(origin)
        .allowed_methods(vec!["GET", "POST"])
        .allow_any_header()
        .max_age(3600)
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(analyze);
}

pub async fn run(config: ServerConfig) -> std::io::Result<()> {
    fs::create_dir_all(&config.upload_dir)?;
    let bind = (config.bind.clone(), config.port);
    let origin = config.cors_origin.clone();
    let state = web::Data::new(AppState { config });
    info!("Listening on {}:{} (CORS origin {})", bind.0, bind.1, origin);

    HttpServer::new(move || {
        App::new()
            .wrap(cors(&origin))
            .app_data(state.clone())
            .configure(routes)
    })
    .bind(bind)?
    .run()
    .await
}
