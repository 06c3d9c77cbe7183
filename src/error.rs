use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;
use tracing::error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("invalid input: {0}")]
  InvalidInput(&'static str),
  #[error("unsupported platform: {0}")]
  UnsupportedPlatform(&'static str),
  #[error("{0} support coming soon")]
  NotYetSupported(&'static str),
  // message shown to the caller, then the cause
  #[error("failed to resolve media: {1:#}")]
  UpstreamResolution(&'static str, anyhow::Error),
  #[error("quality not available: {0}")]
  QualityUnavailable(String),
  // 408 when the media element never showed up in time
  #[error("timed out waiting for media: {0}")]
  MediaTimeout(&'static str),
  #[error("media not found: {0}")]
  MediaNotFound(&'static str),
  #[error("extraction failed: {0:#}")]
  ExtractionFailed(anyhow::Error),
  #[error("{0}: {1:#}")]
  Transcode(&'static str, anyhow::Error),
  #[error("failed to write response stream: {0}")]
  StreamWrite(std::io::Error),
  #[error("io error: {0}")]
  IO(#[from] std::io::Error),
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl Error {
  pub fn status(&self) -> StatusCode {
    match self {
      Error::InvalidInput(_) | Error::UnsupportedPlatform(_) => {
        StatusCode::BAD_REQUEST
      }
      Error::NotYetSupported(_) => StatusCode::NOT_IMPLEMENTED,
      Error::QualityUnavailable(_) | Error::MediaNotFound(_) => {
        StatusCode::NOT_FOUND
      }
      Error::MediaTimeout(_) => StatusCode::REQUEST_TIMEOUT,
      Error::UpstreamResolution(..)
      | Error::ExtractionFailed(_)
      | Error::Transcode(..)
      | Error::StreamWrite(_)
      | Error::IO(_)
      | Error::Http(_)
      | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Relabel a resolution failure with the operation it interrupted.
  pub fn resolving(self, what: &'static str) -> Self {
    match self {
      Error::UpstreamResolution(_, e) => Error::UpstreamResolution(what, e),
      other => other,
    }
  }

  pub fn body(&self) -> ErrorBody {
    let (error, details) = match self {
      Error::InvalidInput(msg)
      | Error::UnsupportedPlatform(msg)
      | Error::MediaTimeout(msg)
      | Error::MediaNotFound(msg) => (msg.to_string(), None),
      Error::NotYetSupported(_) => (self.to_string(), None),
      Error::UpstreamResolution(what, e) => {
        (what.to_string(), Some(format!("{e:#}")))
      }
      Error::QualityUnavailable(label) => (
        "Requested quality not available".into(),
        Some(label.clone()),
      ),
      Error::ExtractionFailed(e) => {
        ("Failed to download media".into(), Some(format!("{e:#}")))
      }
      Error::Transcode(what, e) => (what.to_string(), Some(format!("{e:#}"))),
      Error::StreamWrite(e) | Error::IO(e) => {
        ("Internal server error".into(), Some(e.to_string()))
      }
      Error::Http(e) => ("Internal server error".into(), Some(e.to_string())),
      Error::Other(e) => {
        ("Internal server error".into(), Some(format!("{e:#}")))
      }
    };

    ErrorBody { error, details }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(error = %self, "request failed");
    }
    (status, Json(self.body())).into_response()
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_status_mapping() {
    assert_eq!(
      Error::InvalidInput("x").status(),
      StatusCode::BAD_REQUEST
    );
    assert_eq!(
      Error::NotYetSupported("tiktok").status(),
      StatusCode::NOT_IMPLEMENTED
    );
    assert_eq!(
      Error::QualityUnavailable("720p".into()).status(),
      StatusCode::NOT_FOUND
    );
    assert_eq!(
      Error::MediaTimeout("slow").status(),
      StatusCode::REQUEST_TIMEOUT
    );
    assert_eq!(
      Error::Transcode("mux", anyhow::anyhow!("boom")).status(),
      StatusCode::INTERNAL_SERVER_ERROR
    );
  }

  #[test]
  fn test_body_omits_missing_details() {
    let body = Error::NotYetSupported("tiktok").body();
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(
      json,
      serde_json::json!({ "error": "tiktok support coming soon" })
    );

    let body = Error::QualityUnavailable("1080p".into()).body();
    assert_eq!(body.error, "Requested quality not available");
    assert_eq!(body.details.as_deref(), Some("1080p"));
  }

  #[test]
  fn test_resolving_relabels_upstream_failures() {
    let err = Error::UpstreamResolution(
      "Failed to get video info",
      anyhow::anyhow!("Video unavailable"),
    )
    .resolving("Failed to download YouTube video");
    let body = err.body();
    assert_eq!(body.error, "Failed to download YouTube video");
    assert_eq!(body.details.as_deref(), Some("Video unavailable"));

    let err = Error::InvalidInput("Invalid YouTube URL").resolving("x");
    assert!(matches!(err, Error::InvalidInput("Invalid YouTube URL")));
  }
}
