use std::sync::Arc;

use axum::{
  extract::{Query, State},
  http::header::CONTENT_DISPOSITION,
  response::Response,
  routing::get,
  Json, Router,
};
use serde::Serialize;
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};

use crate::{
  download::{Orchestrator, Strategy},
  manifest::ManifestResolver,
  media::{DownloadQuery, DownloadRequest, OutputFormat},
  platform::PlatformKind,
  Error, Result,
};

#[derive(Clone)]
pub struct AppState {
  pub orchestrator: Arc<Orchestrator>,
  pub resolver: Arc<dyn ManifestResolver>,
}

pub fn router(state: AppState) -> Router {
  let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods(Any)
    .allow_headers(Any)
    .expose_headers([CONTENT_DISPOSITION]);

  Router::new()
    .route("/health", get(health))
    .route("/api/info", get(info))
    .route("/api/info/youtube", get(youtube_info))
    .route("/api/download", get(download))
    .route("/api/download/youtube", get(download_youtube))
    .route("/api/download/instagram", get(download_instagram))
    .route("/api/download/instagram-alt", get(download_instagram_alt))
    .layer(TraceLayer::new_for_http())
    .layer(cors)
    .with_state(state)
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Health {
  status: &'static str,
  timestamp: String,
  supported_platforms: [&'static str; 2],
  supported_formats: Vec<&'static str>,
}

async fn health() -> Json<Health> {
  Json(Health {
    status: "Server is running",
    timestamp: chrono::Utc::now()
      .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    supported_platforms: [
      PlatformKind::YouTube.name(),
      PlatformKind::Instagram.name(),
    ],
    supported_formats: supported_formats(),
  })
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct VideoInfo {
  title: String,
  duration: String,
  thumbnail: Option<String>,
  available_qualities: Vec<String>,
  formats: Vec<&'static str>,
}

fn supported_formats() -> Vec<&'static str> {
  OutputFormat::ALL.iter().map(|f| f.extension()).collect()
}

fn required_url(query: &DownloadQuery) -> Result<&str> {
  query
    .url
    .as_deref()
    .map(str::trim)
    .filter(|url| !url.is_empty())
    .ok_or(Error::InvalidInput("URL parameter is required"))
}

async fn info(
  State(state): State<AppState>,
  Query(query): Query<DownloadQuery>,
) -> Result<Json<VideoInfo>> {
  let url = required_url(&query)?;
  if PlatformKind::detect(url) != PlatformKind::YouTube {
    return Err(Error::UnsupportedPlatform(
      "Info not available for this platform",
    ));
  }

  video_info(state.resolver.as_ref(), url).await
}

async fn youtube_info(
  State(state): State<AppState>,
  Query(query): Query<DownloadQuery>,
) -> Result<Json<VideoInfo>> {
  let url = required_url(&query)?;
  video_info(state.resolver.as_ref(), url).await
}

async fn video_info(
  resolver: &dyn ManifestResolver,
  url: &str,
) -> Result<Json<VideoInfo>> {
  let manifest = resolver.resolve(url).await?;

  Ok(Json(VideoInfo {
    available_qualities: manifest.available_qualities(),
    duration: manifest.duration_seconds.to_string(),
    thumbnail: manifest.thumbnail_url,
    title: manifest.title,
    formats: supported_formats(),
  }))
}

async fn download(
  State(state): State<AppState>,
  Query(query): Query<DownloadQuery>,
) -> Result<Response> {
  let request = DownloadRequest::try_from(query)?;
  state.orchestrator.download(request).await
}

async fn download_youtube(
  State(state): State<AppState>,
  Query(query): Query<DownloadQuery>,
) -> Result<Response> {
  let request = DownloadRequest::try_from(query)?;
  state
    .orchestrator
    .download_with(Strategy::YouTube, request)
    .await
}

async fn download_instagram(
  State(state): State<AppState>,
  Query(query): Query<DownloadQuery>,
) -> Result<Response> {
  let request = DownloadRequest::try_from(query)?;
  state
    .orchestrator
    .download_with(Strategy::InstagramPage, request)
    .await
}

async fn download_instagram_alt(
  State(state): State<AppState>,
  Query(query): Query<DownloadQuery>,
) -> Result<Response> {
  let request = DownloadRequest::try_from(query)?;
  state
    .orchestrator
    .download_with(Strategy::InstagramIntercept, request)
    .await
}
