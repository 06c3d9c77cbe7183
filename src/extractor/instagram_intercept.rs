use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
  browser::{BrowserError, BrowserLauncher, BrowserSession},
  fetch::browser_headers,
  media::{DownloadRequest, Extraction, Media, OutputFormat},
  platform::PlatformKind,
  scratch::ScratchSession,
  Error, Result,
};

use super::{
  instagram::{validate_url, FILE_STEM, REFERER},
  Extractor,
};

const PLAY_BUTTON: &str =
  r#"[aria-label="Play"], [data-testid="media-play-button"]"#;
const PLAY_CLICK_TIMEOUT: Duration = Duration::from_secs(2);
const AFTER_PLAY_WAIT: Duration = Duration::from_secs(2);

/// Loads the post and takes the first video payload the page fetched.
pub struct InstagramIntercept {
  launcher: Arc<dyn BrowserLauncher>,
  settle: Duration,
}

impl InstagramIntercept {
  pub fn new(launcher: Arc<dyn BrowserLauncher>, settle: Duration) -> Self {
    Self { launcher, settle }
  }

  async fn observe(
    &self,
    session: &mut dyn BrowserSession,
    url: &str,
  ) -> Result<Media> {
    session.goto(url).await.map_err(browser_error)?;

    // no play button is normal for autoplaying posts
    match session.click(PLAY_BUTTON, PLAY_CLICK_TIMEOUT).await {
      Ok(()) => tokio::time::sleep(AFTER_PLAY_WAIT).await,
      Err(e) => debug!(error = %e, "no play button clicked"),
    }
    tokio::time::sleep(self.settle).await;

    let responses = session.video_responses();
    debug!(count = responses.len(), "observed video responses");
    let first = responses
      .into_iter()
      .next()
      .ok_or(Error::MediaNotFound("No video found in this Instagram post"))?;

    Ok(Media::Remote {
      url: first.url,
      headers: browser_headers(REFERER),
    })
  }
}

#[async_trait]
impl Extractor for InstagramIntercept {
  fn platform(&self) -> PlatformKind {
    PlatformKind::Instagram
  }

  fn validate(&self, url: &str) -> Result<()> {
    validate_url(url)
  }

  async fn extract(
    &self,
    request: &DownloadRequest,
    _scratch: &ScratchSession,
  ) -> Result<Extraction> {
    let mut session = self.launcher.launch().await.map_err(browser_error)?;
    let res = self.observe(session.as_mut(), &request.source_url).await;
    session.close().await;

    let media = res?;
    info!(media = ?media, "intercepted instagram video");
    Ok(Extraction {
      media,
      stem: FILE_STEM.to_string(),
      format: OutputFormat::Mp4,
    })
  }
}

fn browser_error(err: BrowserError) -> Error {
  match err {
    BrowserError::Timeout(_) => Error::MediaTimeout(
      "Request timeout - Instagram post took too long to load",
    ),
    err if err.is_network_failure() => {
      Error::MediaNotFound("Instagram post not found or may be private")
    }
    err => Error::ExtractionFailed(anyhow!("{err}")),
  }
}
