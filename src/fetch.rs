use std::{path::Path, time::Duration};

use futures::{StreamExt, TryStreamExt};
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;

use crate::{browser::USER_AGENT, media::ByteStream, Error, Result};

pub fn http_client() -> reqwest::Result<reqwest::Client> {
  reqwest::Client::builder()
    .connect_timeout(Duration::from_secs(15))
    .build()
}

/// Headers that make a server-side fetch of page media look like the
/// browser that found it.
pub fn browser_headers(referer: &str) -> Vec<(String, String)> {
  vec![
    ("User-Agent".into(), USER_AGENT.into()),
    ("Referer".into(), referer.into()),
    ("Accept".into(), "video/mp4,video/*;q=0.9,*/*;q=0.8".into()),
  ]
}

pub struct Remote {
  pub stream: ByteStream,
  pub content_length: Option<u64>,
}

pub async fn open_remote(
  client: &reqwest::Client,
  url: &str,
  headers: &[(String, String)],
  timeout: Duration,
) -> Result<Remote> {
  let mut req = client.get(url).timeout(timeout);
  for (name, value) in headers {
    req = req.header(name, value);
  }

  let resp = req.send().await.map_err(|e| {
    if e.is_connect() {
      not_found()
    } else {
      Error::ExtractionFailed(e.into())
    }
  })?;
  if resp.status() == StatusCode::NOT_FOUND {
    return Err(not_found());
  }
  let resp = resp
    .error_for_status()
    .map_err(|e| Error::ExtractionFailed(e.into()))?;

  let content_length = resp.content_length();

  Ok(Remote {
    stream: resp.bytes_stream().map_err(Error::from).boxed(),
    content_length,
  })
}

fn not_found() -> Error {
  Error::MediaNotFound("Instagram post not found or may be private")
}

/// Drain `stream` into a new file at `path`, returning the bytes written.
pub async fn write_to_file(mut stream: ByteStream, path: &Path) -> Result<u64> {
  let mut file = tokio::fs::File::create(path).await?;
  let mut written = 0;
  while let Some(chunk) = stream.next().await {
    let chunk = chunk?;
    file.write_all(&chunk).await?;
    written += chunk.len() as u64;
  }
  file.flush().await?;
  Ok(written)
}

#[cfg(test)]
mod test {
  use bytes::Bytes;

  use super::*;
  use crate::testing::{refused_url, serve_once};

  const REFERER: &str = "https://www.instagram.com/";

  async fn open(url: &str) -> Result<Remote> {
    open_remote(
      &reqwest::Client::new(),
      url,
      &browser_headers(REFERER),
      Duration::from_secs(5),
    )
    .await
  }

  #[tokio::test]
  async fn test_open_remote_streams_with_browser_headers() {
    let (url, server) = serve_once("200 OK", b"video-bytes").await;

    let remote = open(&url).await.unwrap();
    assert_eq!(remote.content_length, Some(11));
    let chunks: Vec<Bytes> = remote.stream.try_collect().await.unwrap();
    assert_eq!(chunks.concat(), b"video-bytes");

    let head = server.await.unwrap();
    assert!(head.contains("referer: https://www.instagram.com/"));
    assert!(head.contains("user-agent: mozilla/5.0"));
    assert!(head.contains("accept: video/mp4"));
  }

  #[tokio::test]
  async fn test_open_remote_missing_media() {
    let (url, _server) = serve_once("404 Not Found", b"").await;

    let err = open(&url).await.err().unwrap();
    assert!(matches!(
      err,
      Error::MediaNotFound("Instagram post not found or may be private")
    ));
    assert_eq!(err.status(), 404);
  }

  #[tokio::test]
  async fn test_open_remote_other_failures() {
    let (url, _server) = serve_once("403 Forbidden", b"nope").await;
    let err = open(&url).await.err().unwrap();
    assert!(matches!(err, Error::ExtractionFailed(_)));
    assert_eq!(err.status(), 500);
  }

  #[tokio::test]
  async fn test_open_remote_unreachable_host() {
    let err = open(&refused_url().await).await.err().unwrap();
    assert!(matches!(err, Error::MediaNotFound(_)));
    assert_eq!(err.status(), 404);
  }

  #[tokio::test]
  async fn test_write_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let stream = futures::stream::iter(vec![
      Ok(Bytes::from_static(b"hello ")),
      Ok(Bytes::from_static(b"world")),
    ])
    .boxed();

    assert_eq!(write_to_file(stream, &path).await.unwrap(), 11);
    assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
  }

  #[tokio::test]
  async fn test_write_to_file_propagates_stream_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let stream = futures::stream::iter(vec![
      Ok(Bytes::from_static(b"partial")),
      Err(Error::MediaNotFound("gone")),
    ])
    .boxed();

    assert!(write_to_file(stream, &path).await.is_err());
  }
}
