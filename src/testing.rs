//! In-process collaborators for tests.

use std::{
  collections::HashSet,
  path::Path,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  },
  time::Duration,
};

use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::{
  io::{AsyncReadExt, AsyncWriteExt},
  net::TcpListener,
  task::JoinHandle,
};

use crate::{
  browser::{
    BrowserError, BrowserLauncher, BrowserResult, BrowserSession,
    CapturedResponse,
  },
  manifest::{Manifest, ManifestResolver, StreamFormat},
  media::{ByteStream, OutputFormat},
  platform::youtube_video_id,
  transcode::Transcoder,
  Error, Result,
};

/// Serves a fixed manifest. Opening a format yields its id as the payload.
#[derive(Default)]
pub struct StubResolver {
  manifest: Option<Manifest>,
  failing: HashSet<String>,
  resolves: AtomicUsize,
}

impl StubResolver {
  pub fn new(manifest: Manifest) -> Self {
    Self {
      manifest: Some(manifest),
      ..Default::default()
    }
  }

  /// Resolution itself fails, as for a removed video.
  pub fn unavailable() -> Self {
    Self::default()
  }

  /// Streams of this format break after the first chunk.
  pub fn failing(mut self, format_id: &str) -> Self {
    self.failing.insert(format_id.to_string());
    self
  }

  pub fn resolves(&self) -> usize {
    self.resolves.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl ManifestResolver for StubResolver {
  async fn resolve(&self, url: &str) -> Result<Manifest> {
    youtube_video_id(url).ok_or(Error::InvalidInput("Invalid YouTube URL"))?;
    self.resolves.fetch_add(1, Ordering::SeqCst);

    self.manifest.clone().ok_or_else(|| {
      Error::UpstreamResolution(
        "Failed to get video info",
        anyhow::anyhow!("Video unavailable"),
      )
    })
  }

  async fn open(&self, format: &StreamFormat) -> Result<ByteStream> {
    let first = Ok(Bytes::from(format.id.clone()));
    if !self.failing.contains(&format.id) {
      return Ok(futures::stream::iter([first]).boxed());
    }

    let broken = Err(Error::ExtractionFailed(anyhow::anyhow!(
      "connection reset"
    )));
    Ok(futures::stream::iter([first, broken]).boxed())
  }
}

/// Writes the concatenated inputs to the output instead of transcoding.
#[derive(Default)]
pub struct StubTranscoder {
  fail: bool,
  hang: bool,
  calls: AtomicUsize,
}

impl StubTranscoder {
  pub fn failing() -> Self {
    Self {
      fail: true,
      ..Default::default()
    }
  }

  /// Never finishes, like an ffmpeg run the client gives up on.
  pub fn hanging() -> Self {
    Self {
      hang: true,
      ..Default::default()
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  async fn concat(
    &self,
    inputs: &[&Path],
    output: &Path,
  ) -> anyhow::Result<()> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    // a failed run may still leave a partial output behind
    tokio::fs::write(output, b"partial").await?;
    if self.fail {
      bail!("ffmpeg exited with 1: Invalid data found");
    }
    if self.hang {
      std::future::pending::<()>().await;
    }

    let mut data = Vec::new();
    for input in inputs {
      data.extend(tokio::fs::read(input).await?);
    }
    tokio::fs::write(output, data).await?;
    Ok(())
  }
}

#[async_trait]
impl Transcoder for StubTranscoder {
  async fn convert_audio(
    &self,
    input: &Path,
    output: &Path,
    _format: OutputFormat,
  ) -> anyhow::Result<()> {
    self.concat(&[input], output).await
  }

  async fn mux(
    &self,
    video: &Path,
    audio: &Path,
    output: &Path,
    _format: OutputFormat,
  ) -> anyhow::Result<()> {
    self.concat(&[video, audio], output).await
  }
}

#[derive(Clone, Default)]
struct PageScript {
  navigation_error: Option<String>,
  navigation_timeout: bool,
  has_video: bool,
  has_play_button: bool,
  evaluated: serde_json::Value,
  responses: Vec<CapturedResponse>,
}

#[derive(Default)]
struct Counters {
  launches: AtomicUsize,
  clicks: AtomicUsize,
  closed: AtomicUsize,
}

/// Hands out scripted browser sessions and counts how they were used.
#[derive(Default)]
pub struct StubLauncher {
  page: PageScript,
  counters: Arc<Counters>,
}

impl StubLauncher {
  pub fn with_video(mut self) -> Self {
    self.page.has_video = true;
    self
  }

  pub fn with_play_button(mut self) -> Self {
    self.page.has_play_button = true;
    self
  }

  pub fn evaluating(mut self, value: serde_json::Value) -> Self {
    self.page.evaluated = value;
    self
  }

  pub fn responding(mut self, responses: Vec<CapturedResponse>) -> Self {
    self.page.responses = responses;
    self
  }

  pub fn failing_navigation(mut self, message: &str) -> Self {
    self.page.navigation_error = Some(message.to_string());
    self
  }

  pub fn timing_out_navigation(mut self) -> Self {
    self.page.navigation_timeout = true;
    self
  }

  pub fn launches(&self) -> usize {
    self.counters.launches.load(Ordering::SeqCst)
  }

  pub fn clicks(&self) -> usize {
    self.counters.clicks.load(Ordering::SeqCst)
  }

  pub fn closed(&self) -> usize {
    self.counters.closed.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl BrowserLauncher for StubLauncher {
  async fn launch(&self) -> BrowserResult<Box<dyn BrowserSession>> {
    self.counters.launches.fetch_add(1, Ordering::SeqCst);
    Ok(Box::new(StubSession {
      page: self.page.clone(),
      counters: self.counters.clone(),
      navigated: false,
    }))
  }
}

struct StubSession {
  page: PageScript,
  counters: Arc<Counters>,
  navigated: bool,
}

#[async_trait]
impl BrowserSession for StubSession {
  async fn goto(&mut self, url: &str) -> BrowserResult<()> {
    if self.page.navigation_timeout {
      return Err(BrowserError::Timeout(format!("navigation to {url}")));
    }
    if let Some(message) = &self.page.navigation_error {
      return Err(BrowserError::Navigation(message.clone()));
    }
    self.navigated = true;
    Ok(())
  }

  async fn wait_for(
    &mut self,
    selector: &str,
    timeout: Duration,
  ) -> BrowserResult<()> {
    if self.navigated && self.page.has_video {
      return Ok(());
    }
    tokio::time::sleep(timeout).await;
    Err(BrowserError::Timeout(selector.to_string()))
  }

  async fn evaluate(
    &mut self,
    _script: &str,
  ) -> BrowserResult<serde_json::Value> {
    Ok(self.page.evaluated.clone())
  }

  async fn click(
    &mut self,
    selector: &str,
    _timeout: Duration,
  ) -> BrowserResult<()> {
    if !self.page.has_play_button {
      return Err(BrowserError::ElementNotFound(selector.to_string()));
    }
    self.counters.clicks.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  fn video_responses(&self) -> Vec<CapturedResponse> {
    if self.navigated {
      self.page.responses.clone()
    } else {
      vec![]
    }
  }

  async fn close(self: Box<Self>) {
    self.counters.closed.fetch_add(1, Ordering::SeqCst);
  }
}

/// Answers a single HTTP request with `status` and `body`. The task yields
/// the request head it received.
pub async fn serve_once(
  status: &'static str,
  body: &'static [u8],
) -> (String, JoinHandle<String>) {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();

  let task = tokio::spawn(async move {
    let (mut socket, _) = listener.accept().await.unwrap();
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
      let n = socket.read(&mut buf).await.unwrap();
      if n == 0 {
        break;
      }
      head.extend_from_slice(&buf[..n]);
    }

    let reply = format!(
      "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
      body.len()
    );
    socket.write_all(reply.as_bytes()).await.unwrap();
    socket.write_all(body).await.unwrap();
    let _ = socket.shutdown().await;
    String::from_utf8_lossy(&head).to_ascii_lowercase()
  });

  (format!("http://{addr}/clip.mp4"), task)
}

/// A URL on a local port nobody listens on.
pub async fn refused_url() -> String {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  drop(listener);
  format!("http://{addr}/clip.mp4")
}
