use std::{fmt, str::FromStr};

use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Deserialize;

use crate::{platform::PlatformKind, scratch::TempHandle, Error, Result};

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
  Mp4,
  Mp3,
  Webm,
}

impl OutputFormat {
  pub const ALL: [OutputFormat; 3] =
    [OutputFormat::Mp4, OutputFormat::Mp3, OutputFormat::Webm];

  pub fn extension(self) -> &'static str {
    match self {
      OutputFormat::Mp4 => "mp4",
      OutputFormat::Mp3 => "mp3",
      OutputFormat::Webm => "webm",
    }
  }

  pub fn mime_type(self) -> &'static str {
    match self {
      OutputFormat::Mp4 => "video/mp4",
      OutputFormat::Mp3 => "audio/mpeg",
      OutputFormat::Webm => "video/webm",
    }
  }

  pub fn is_audio_only(self) -> bool {
    self == OutputFormat::Mp3
  }
}

impl FromStr for OutputFormat {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_ascii_lowercase().as_str() {
      "mp4" => Ok(OutputFormat::Mp4),
      "mp3" => Ok(OutputFormat::Mp3),
      "webm" => Ok(OutputFormat::Webm),
      _ => Err(Error::InvalidInput("Unsupported format")),
    }
  }
}

impl fmt::Display for OutputFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.extension())
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Quality {
  Highest,
  Label(String),
}

impl From<&str> for Quality {
  fn from(s: &str) -> Self {
    match s.trim() {
      "" | "highest" => Quality::Highest,
      label => Quality::Label(label.to_string()),
    }
  }
}

#[derive(Deserialize, Debug, Default)]
pub struct DownloadQuery {
  pub url: Option<String>,
  pub quality: Option<String>,
  pub format: Option<String>,
}

/// A validated download request. The platform is detected once here and
/// carried along, never re-derived.
#[derive(Clone, Debug)]
pub struct DownloadRequest {
  pub source_url: String,
  pub platform: PlatformKind,
  pub quality: Quality,
  pub format: OutputFormat,
}

impl DownloadRequest {
  pub fn new(source_url: impl Into<String>) -> Self {
    let source_url = source_url.into();
    Self {
      platform: PlatformKind::detect(&source_url),
      source_url,
      quality: Quality::Highest,
      format: OutputFormat::Mp4,
    }
  }

  pub fn with_quality(self, quality: Quality) -> Self {
    Self { quality, ..self }
  }

  pub fn with_format(self, format: OutputFormat) -> Self {
    Self { format, ..self }
  }
}

impl TryFrom<DownloadQuery> for DownloadRequest {
  type Error = Error;

  fn try_from(query: DownloadQuery) -> Result<Self> {
    let url = query
      .url
      .filter(|url| !url.trim().is_empty())
      .ok_or(Error::InvalidInput("URL parameter is required"))?;
    let format = match query.format.as_deref() {
      None | Some("") => OutputFormat::Mp4,
      Some(format) => format.parse()?,
    };
    let quality = query.quality.as_deref().map(Quality::from);

    Ok(
      DownloadRequest::new(url.trim())
        .with_format(format)
        .with_quality(quality.unwrap_or(Quality::Highest)),
    )
  }
}

/// What an extraction strategy hands back to the orchestrator.
pub enum Media {
  /// Bytes ready to go out as-is, consumed exactly once.
  Stream {
    stream: ByteStream,
    content_length: Option<u64>,
  },
  /// A pointer to the media that has to be fetched and piped through.
  Remote {
    url: String,
    headers: Vec<(String, String)>,
  },
  /// Separate video and audio tracks waiting to be muxed.
  Components { video: TempHandle, audio: TempHandle },
  /// A downloaded audio track that still needs converting.
  Audio { input: TempHandle },
}

impl Media {
  pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
    let bytes = bytes.into();
    let content_length = Some(bytes.len() as u64);
    let stream = Box::pin(futures::stream::once(async move { Ok(bytes) }));
    Media::Stream {
      stream,
      content_length,
    }
  }

  pub fn needs_transcode(&self) -> bool {
    matches!(self, Media::Components { .. } | Media::Audio { .. })
  }
}

impl fmt::Debug for Media {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Media::Stream { content_length, .. } => f
        .debug_struct("Stream")
        .field("content_length", content_length)
        .finish(),
      Media::Remote { url, .. } => {
        f.debug_struct("Remote").field("url", url).finish()
      }
      Media::Components { video, audio } => f
        .debug_struct("Components")
        .field("video", &video.path())
        .field("audio", &audio.path())
        .finish(),
      Media::Audio { input } => {
        f.debug_struct("Audio").field("input", &input.path()).finish()
      }
    }
  }
}

#[derive(Debug)]
pub struct Extraction {
  pub media: Media,
  /// Filename without extension.
  pub stem: String,
  pub format: OutputFormat,
}

impl Extraction {
  pub fn filename(&self) -> String {
    format!("{}.{}", self.stem, self.format.extension())
  }
}
