mod ytdlp;

use std::cmp::Reverse;

use async_trait::async_trait;
use itertools::Itertools;

use crate::{
  media::{ByteStream, OutputFormat, Quality},
  Error, Result,
};

pub use ytdlp::Ytdlp;

#[derive(Clone, Debug, Default)]
pub struct Manifest {
  pub title: String,
  pub duration_seconds: u64,
  pub thumbnail_url: Option<String>,
  pub formats: Vec<StreamFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct StreamFormat {
  pub id: String,
  pub quality_label: Option<String>,
  pub height: Option<u32>,
  pub has_video: bool,
  pub has_audio: bool,
  /// Audio bitrate in kbps, when reported.
  pub audio_bitrate: Option<f64>,
  /// Container extension as reported by the source (mp4, webm, m4a).
  pub container: String,
  pub locator: StreamLocator,
}

/// Everything needed to open one specific stream.
#[derive(Clone, Debug, Default)]
pub struct StreamLocator {
  pub url: String,
  pub headers: Vec<(String, String)>,
}

#[async_trait]
pub trait ManifestResolver: Send + Sync {
  /// Fails with `InvalidInput` before touching the network when the URL is
  /// not a canonical video URL.
  async fn resolve(&self, url: &str) -> Result<Manifest>;

  async fn open(&self, format: &StreamFormat) -> Result<ByteStream>;
}

impl StreamFormat {
  pub fn is_video_only(&self) -> bool {
    self.has_video && !self.has_audio
  }

  pub fn is_audio_only(&self) -> bool {
    self.has_audio && !self.has_video
  }
}

impl Manifest {
  pub fn video_formats(&self) -> impl Iterator<Item = &StreamFormat> {
    self.formats.iter().filter(|f| f.has_video)
  }

  pub fn audio_formats(&self) -> impl Iterator<Item = &StreamFormat> {
    self.formats.iter().filter(|f| f.is_audio_only())
  }

  /// Distinct quality labels of video-capable formats, tallest first.
  pub fn available_qualities(&self) -> Vec<String> {
    self
      .video_formats()
      .filter_map(|f| f.quality_label.clone())
      .unique()
      .sorted_by_key(|label| Reverse(label_height(label)))
      .collect()
  }

  pub fn best_audio(&self) -> Option<&StreamFormat> {
    self.audio_formats().max_by(|a, b| {
      let a = a.audio_bitrate.unwrap_or(0.0);
      let b = b.audio_bitrate.unwrap_or(0.0);
      a.total_cmp(&b)
    })
  }

  /// Pick the video track for a download. An explicit label must match a
  /// video-only format exactly; nothing else is substituted.
  pub fn select_video(
    &self,
    quality: &Quality,
    target: OutputFormat,
  ) -> Result<&StreamFormat> {
    match quality {
      Quality::Highest => self
        .video_formats()
        .max_by_key(|f| {
          (
            f.height.unwrap_or(0),
            f.container == target.extension(),
            f.is_video_only(),
          )
        })
        .ok_or_else(|| Error::QualityUnavailable("highest".into())),
      Quality::Label(label) => self
        .formats
        .iter()
        .filter(|f| f.is_video_only())
        .filter(|f| f.quality_label.as_deref() == Some(label.as_str()))
        .max_by_key(|f| f.container == target.extension())
        .ok_or_else(|| Error::QualityUnavailable(label.clone())),
    }
  }
}

fn label_height(label: &str) -> u32 {
  label
    .chars()
    .skip_while(|c| !c.is_ascii_digit())
    .take_while(|c| c.is_ascii_digit())
    .collect::<String>()
    .parse()
    .unwrap_or(0)
}

#[cfg(test)]
pub(crate) fn format(
  id: &str,
  label: Option<&str>,
  has_video: bool,
  has_audio: bool,
) -> StreamFormat {
  StreamFormat {
    id: id.into(),
    quality_label: label.map(Into::into),
    height: label.map(label_height),
    has_video,
    has_audio,
    container: if has_video { "mp4" } else { "webm" }.into(),
    locator: StreamLocator {
      url: format!("https://media.example/{id}"),
      headers: vec![],
    },
    ..Default::default()
  }
}
