use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
  fetch::write_to_file,
  manifest::{ManifestResolver, StreamFormat},
  media::{DownloadRequest, Extraction, Media},
  platform::{youtube_video_id, PlatformKind},
  scratch::{ScratchSession, TempHandle},
  util::clean_filename,
  Error, Result,
};

use super::Extractor;

pub struct YouTube {
  resolver: Arc<dyn ManifestResolver>,
  download_timeout: Duration,
}

impl YouTube {
  pub fn new(
    resolver: Arc<dyn ManifestResolver>,
    download_timeout: Duration,
  ) -> Self {
    Self {
      resolver,
      download_timeout,
    }
  }

  async fn download(
    &self,
    format: &StreamFormat,
    handle: &TempHandle,
  ) -> Result<u64> {
    let fetch = async {
      let stream = self.resolver.open(format).await?;
      write_to_file(stream, handle.path()).await
    };

    let written = tokio::time::timeout(self.download_timeout, fetch)
      .await
      .map_err(|_| {
        Error::ExtractionFailed(anyhow!(
          "download of format {} timed out after {:?}",
          format.id,
          self.download_timeout
        ))
      })?
      .map_err(|e| match e {
        e @ Error::ExtractionFailed(_) => e,
        e => Error::ExtractionFailed(e.into()),
      })?;

    debug!(format = %format.id, written, "downloaded stream");
    Ok(written)
  }
}

#[async_trait]
impl Extractor for YouTube {
  fn platform(&self) -> PlatformKind {
    PlatformKind::YouTube
  }

  fn validate(&self, url: &str) -> Result<()> {
    youtube_video_id(url)
      .map(|_| ())
      .ok_or(Error::InvalidInput("Invalid YouTube URL"))
  }

  async fn extract(
    &self,
    request: &DownloadRequest,
    scratch: &ScratchSession,
  ) -> Result<Extraction> {
    let manifest = self
      .resolver
      .resolve(&request.source_url)
      .await
      .map_err(|e| e.resolving("Failed to download YouTube video"))?;
    let stem = clean_filename(&manifest.title);

    let media = if request.format.is_audio_only() {
      let audio = manifest
        .best_audio()
        .ok_or_else(|| Error::QualityUnavailable("audio".into()))?;
      let input = scratch.allocate("audio", &audio.container);
      self.download(audio, &input).await?;
      Media::Audio { input }
    } else {
      let video = manifest.select_video(&request.quality, request.format)?;
      let audio = manifest
        .best_audio()
        .ok_or_else(|| Error::QualityUnavailable("audio".into()))?;
      info!(
        title = %manifest.title,
        video = %video.id,
        audio = %audio.id,
        "selected formats"
      );

      let video_file = scratch.allocate("video", &video.container);
      let audio_file = scratch.allocate("audio", &audio.container);
      // the first failure drops the sibling download
      tokio::try_join!(
        self.download(video, &video_file),
        self.download(audio, &audio_file)
      )?;

      Media::Components {
        video: video_file,
        audio: audio_file,
      }
    };

    Ok(Extraction {
      media,
      stem,
      format: request.format,
    })
  }
}
