mod chromium;

use std::time::Duration;

use async_trait::async_trait;

pub use chromium::Chromium;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
  AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
  #[error("chromium launch failed: {0}")]
  Launch(String),
  #[error("cdp error: {0}")]
  Cdp(#[from] chromiumoxide::error::CdpError),
  #[error("timeout waiting for {0}")]
  Timeout(String),
  #[error("navigation failed: {0}")]
  Navigation(String),
  #[error("element not found: {0}")]
  ElementNotFound(String),
  #[error("configuration error: {0}")]
  Configuration(String),
  #[error("script error: {0}")]
  Script(String),
}

impl BrowserError {
  /// Chromium network failures (`net::ERR_*`) mean the page itself could not
  /// be loaded, usually a removed or private post.
  pub fn is_network_failure(&self) -> bool {
    self.to_string().contains("net::ERR_")
  }
}

/// A response observed while a page was loading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedResponse {
  pub url: String,
  pub mime_type: String,
  pub status: i64,
}

/// One headless browser with one page. The owner must call `close` on every
/// exit path; dropping an unclosed session kills the browser process.
#[async_trait]
pub trait BrowserSession: Send {
  /// Navigate and wait for the load to finish.
  async fn goto(&mut self, url: &str) -> BrowserResult<()>;

  /// Poll until `selector` matches, failing with `Timeout` after `timeout`.
  async fn wait_for(
    &mut self,
    selector: &str,
    timeout: Duration,
  ) -> BrowserResult<()>;

  /// Evaluate an expression, awaiting promises, and return its JSON value.
  async fn evaluate(
    &mut self,
    script: &str,
  ) -> BrowserResult<serde_json::Value>;

  async fn click(
    &mut self,
    selector: &str,
    timeout: Duration,
  ) -> BrowserResult<()>;

  /// Video responses seen since the session started, in arrival order.
  fn video_responses(&self) -> Vec<CapturedResponse>;

  async fn close(self: Box<Self>);
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
  async fn launch(&self) -> BrowserResult<Box<dyn BrowserSession>>;
}

pub fn is_video_response(url: &str, mime_type: &str, status: i64) -> bool {
  (url.contains(".mp4") || mime_type.contains("video/mp4"))
    && !url.starts_with("blob:")
    && status == 200
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_is_video_response() {
    assert!(is_video_response(
      "https://cdn.example/v/clip.mp4?x=1",
      "application/octet-stream",
      200
    ));
    assert!(is_video_response("https://cdn.example/x", "video/mp4", 200));

    assert!(!is_video_response("blob:https://x/1.mp4", "video/mp4", 200));
    assert!(!is_video_response("https://cdn.example/x.mp4", "video/mp4", 206));
    assert!(!is_video_response("https://cdn.example/x.js", "text/js", 200));
  }

  #[test]
  fn test_network_failure() {
    let err = BrowserError::Navigation("net::ERR_FAILED".into());
    assert!(err.is_network_failure());
    assert!(!BrowserError::Timeout("video".into()).is_network_failure());
  }
}
