use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
  browser::{BrowserError, BrowserLauncher, BrowserSession},
  fetch::browser_headers,
  media::{DownloadRequest, Extraction, Media, OutputFormat},
  platform::{is_instagram_url, PlatformKind},
  scratch::ScratchSession,
  Error, Result,
};

use super::Extractor;

pub(super) const REFERER: &str = "https://www.instagram.com/";
pub(super) const FILE_STEM: &str = "instagram-video";

// Blob sources only live inside the page, so their bytes are read there and
// shipped back base64 encoded.
const READ_VIDEO_SCRIPT: &str = r#"
(async () => {
  const video = document.querySelector('video');
  if (!video || !video.src) return null;
  try {
    if (video.src.startsWith('blob:')) {
      const resp = await fetch(video.src);
      const bytes = new Uint8Array(await resp.arrayBuffer());
      let binary = '';
      for (let i = 0; i < bytes.length; i += 0x8000) {
        const chunk = bytes.subarray(i, i + 0x8000);
        binary += String.fromCharCode.apply(null, chunk);
      }
      return { kind: 'blob', data: btoa(binary) };
    }
    return { kind: 'url', url: video.src };
  } catch (e) {
    return null;
  }
})()
"#;

#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum VideoSource {
  Blob { data: String },
  Url { url: String },
}

/// Loads the post and reads the source of its `<video>` element.
pub struct InstagramPage {
  launcher: Arc<dyn BrowserLauncher>,
  element_timeout: Duration,
}

impl InstagramPage {
  pub fn new(
    launcher: Arc<dyn BrowserLauncher>,
    element_timeout: Duration,
  ) -> Self {
    Self {
      launcher,
      element_timeout,
    }
  }

  async fn scrape(
    &self,
    session: &mut dyn BrowserSession,
    url: &str,
  ) -> Result<Media> {
    session.goto(url).await.map_err(browser_error)?;
    session
      .wait_for("video", self.element_timeout)
      .await
      .map_err(browser_error)?;

    let value = session
      .evaluate(READ_VIDEO_SCRIPT)
      .await
      .map_err(browser_error)?;
    let source: Option<VideoSource> = serde_json::from_value(value)
      .context("unexpected video source shape")
      .map_err(Error::ExtractionFailed)?;

    match source {
      None => Err(Error::MediaNotFound(
        "Video not found or could not be extracted",
      )),
      Some(VideoSource::Blob { data }) => {
        let bytes = base64::engine::general_purpose::STANDARD
          .decode(data)
          .map_err(|e| Error::ExtractionFailed(e.into()))?;
        debug!(len = bytes.len(), "read blob video from page");
        Ok(Media::from_bytes(bytes))
      }
      Some(VideoSource::Url { url }) => {
        debug!(%url, "found video url in page");
        Ok(Media::Remote {
          url,
          headers: browser_headers(REFERER),
        })
      }
    }
  }
}

#[async_trait]
impl Extractor for InstagramPage {
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
    let res = self.scrape(session.as_mut(), &request.source_url).await;
    session.close().await;

    let media = res?;
    info!(media = ?media, "extracted instagram video");
    Ok(Extraction {
      media,
      stem: FILE_STEM.to_string(),
      format: OutputFormat::Mp4,
    })
  }
}

pub(super) fn validate_url(url: &str) -> Result<()> {
  if is_instagram_url(url) {
    Ok(())
  } else {
    Err(Error::InvalidInput("Invalid Instagram URL"))
  }
}

fn browser_error(err: BrowserError) -> Error {
  match err {
    BrowserError::Timeout(_) => {
      Error::MediaTimeout("Request timeout - video took too long to load")
    }
    err if err.is_network_failure() => {
      Error::MediaNotFound("Instagram post not found or private")
    }
    err => Error::ExtractionFailed(anyhow!("{err}")),
  }
}
