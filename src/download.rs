mod stage;

use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use axum::{
  body::{boxed, StreamBody},
  http::{
    header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    HeaderValue,
  },
  response::Response,
};
use futures::{StreamExt, TryStreamExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{
  browser::BrowserLauncher,
  config::Config,
  extractor::{Extractor, InstagramIntercept, InstagramPage, YouTube},
  fetch::open_remote,
  manifest::ManifestResolver,
  media::{ByteStream, DownloadRequest, Extraction, Media, OutputFormat},
  platform::PlatformKind,
  scratch::{ScratchDir, ScratchSession, TempHandle},
  transcode::Transcoder,
  util::GuardedStream,
  Error, Result,
};

pub use stage::{Stage, Tracker};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
  YouTube,
  InstagramPage,
  InstagramIntercept,
}

impl Strategy {
  /// Default strategy for an auto-detected platform.
  pub fn for_platform(platform: PlatformKind) -> Result<Self> {
    match platform {
      PlatformKind::YouTube => Ok(Strategy::YouTube),
      PlatformKind::Instagram => Ok(Strategy::InstagramPage),
      PlatformKind::TikTok | PlatformKind::Facebook => {
        Err(Error::NotYetSupported(platform.name()))
      }
      PlatformKind::Unsupported => Err(Error::UnsupportedPlatform(
        "This platform is currently unsupported",
      )),
      PlatformKind::Invalid => Err(Error::InvalidInput("Invalid URL provided")),
    }
  }
}

/// Bytes ready to be sent plus the temp files that back them.
struct Payload {
  stream: ByteStream,
  content_length: Option<u64>,
  handles: Vec<TempHandle>,
}

struct Prepared {
  payload: Payload,
  format: OutputFormat,
  disposition: HeaderValue,
}

pub struct Orchestrator {
  youtube: YouTube,
  instagram: InstagramPage,
  instagram_intercept: InstagramIntercept,
  transcoder: Arc<dyn Transcoder>,
  http: reqwest::Client,
  scratch: ScratchDir,
  download_timeout: Duration,
}

impl Orchestrator {
  pub fn new(
    resolver: Arc<dyn ManifestResolver>,
    launcher: Arc<dyn BrowserLauncher>,
    transcoder: Arc<dyn Transcoder>,
    http: reqwest::Client,
    scratch: ScratchDir,
    config: &Config,
  ) -> Self {
    let timeouts = &config.timeouts;
    Self {
      youtube: YouTube::new(resolver, timeouts.download),
      instagram: InstagramPage::new(launcher.clone(), timeouts.element),
      instagram_intercept: InstagramIntercept::new(launcher, timeouts.settle),
      transcoder,
      http,
      scratch,
      download_timeout: timeouts.download,
    }
  }

  /// Pick the strategy from the detected platform and run it.
  pub async fn download(&self, request: DownloadRequest) -> Result<Response> {
    self.run(None, request).await
  }

  /// Run a specific strategy, skipping platform detection.
  pub async fn download_with(
    &self,
    strategy: Strategy,
    request: DownloadRequest,
  ) -> Result<Response> {
    self.run(Some(strategy), request).await
  }

  fn extractor(&self, strategy: Strategy) -> &dyn Extractor {
    match strategy {
      Strategy::YouTube => &self.youtube,
      Strategy::InstagramPage => &self.instagram,
      Strategy::InstagramIntercept => &self.instagram_intercept,
    }
  }

  async fn run(
    &self,
    strategy: Option<Strategy>,
    request: DownloadRequest,
  ) -> Result<Response> {
    let mut tracker = Tracker::new(&request);

    let prepared = match self.prepare(strategy, &request, &mut tracker).await {
      Ok(prepared) => prepared,
      Err(err) => {
        // every temp handle of the request is already dropped here
        tracker.fail(&err);
        return Err(err);
      }
    };

    tracker.advance(Stage::Streaming);
    Ok(respond(prepared, tracker))
  }

  async fn prepare(
    &self,
    strategy: Option<Strategy>,
    request: &DownloadRequest,
    tracker: &mut Tracker,
  ) -> Result<Prepared> {
    let strategy = match strategy {
      Some(strategy) => strategy,
      None => Strategy::for_platform(request.platform)?,
    };
    tracker.advance(Stage::Detected);

    let extractor = self.extractor(strategy);
    extractor.validate(&request.source_url)?;
    tracker.advance(Stage::Validated);

    let scratch = self.scratch.session();
    tracker.advance(Stage::Extracting);
    debug!(
      request_id = %tracker.id(),
      platform = %extractor.platform(),
      ?strategy,
      prefix = %scratch.prefix(),
      "extracting"
    );
    let extraction = extractor.extract(request, &scratch).await?;

    let filename = extraction.filename();
    let disposition =
      HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|e| anyhow!("bad filename {filename:?}: {e}"))?;

    let Extraction { media, format, .. } = extraction;
    if media.needs_transcode() {
      tracker.advance(Stage::Transcoding);
    }
    let payload = self.materialize(media, format, &scratch).await?;

    Ok(Prepared {
      payload,
      format,
      disposition,
    })
  }

  async fn materialize(
    &self,
    media: Media,
    format: OutputFormat,
    scratch: &ScratchSession,
  ) -> Result<Payload> {
    match media {
      Media::Stream {
        stream,
        content_length,
      } => Ok(Payload {
        stream,
        content_length,
        handles: vec![],
      }),
      Media::Remote { url, headers } => {
        let remote =
          open_remote(&self.http, &url, &headers, self.download_timeout)
            .await?;
        Ok(Payload {
          stream: remote.stream,
          content_length: remote.content_length,
          handles: vec![],
        })
      }
      Media::Components { video, audio } => {
        let output = scratch.allocate("output", format.extension());
        self
          .transcoder
          .mux(video.path(), audio.path(), output.path(), format)
          .await
          .map_err(|e| Error::Transcode("Failed to merge video and audio", e))?;
        // inputs are released as soon as they go out of scope
        open_file(output).await
      }
      Media::Audio { input } => {
        let output = scratch.allocate("output", format.extension());
        self
          .transcoder
          .convert_audio(input.path(), output.path(), format)
          .await
          .map_err(|e| Error::Transcode("Audio conversion failed", e))?;
        open_file(output).await
      }
    }
  }
}

async fn open_file(handle: TempHandle) -> Result<Payload> {
  let file = tokio::fs::File::open(handle.path()).await?;
  let len = file.metadata().await?.len();

  Ok(Payload {
    stream: ReaderStream::new(file).map_err(Error::StreamWrite).boxed(),
    content_length: Some(len),
    handles: vec![handle],
  })
}

fn respond(prepared: Prepared, tracker: Tracker) -> Response {
  let Prepared {
    payload,
    format,
    disposition,
  } = prepared;

  let body =
    GuardedStream::new(payload.stream, tracker).holding(payload.handles);
  let mut response = Response::new(boxed(StreamBody::new(body)));

  let headers = response.headers_mut();
  headers.insert(CONTENT_TYPE, HeaderValue::from_static(format.mime_type()));
  headers.insert(CONTENT_DISPOSITION, disposition);
  if let Some(len) = payload.content_length {
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
  }

  response
}
