use std::{
  pin::Pin,
  task::{Context, Poll},
};

use bytes::Bytes;
use futures::Stream;
use tracing::info;

use crate::{
  download::Tracker, media::ByteStream, scratch::TempHandle, Error, Result,
};

/// Response body that owns the temp files backing it.
///
/// The request is finished once the body is fully sent, fails, or is
/// dropped because the client went away. Every handle is released then.
/// This is the single place a streamed download ends.
pub struct GuardedStream {
  stream: ByteStream,
  handles: Vec<TempHandle>,
  tracker: Tracker,
  finished: bool,
  failed: bool,
}

impl GuardedStream {
  pub fn new(stream: ByteStream, tracker: Tracker) -> Self {
    GuardedStream {
      stream,
      handles: Vec::new(),
      tracker,
      finished: false,
      failed: false,
    }
  }

  pub fn holding(self, handles: impl IntoIterator<Item = TempHandle>) -> Self {
    let mut this = self;
    this.handles.extend(handles);
    this
  }
}

impl Stream for GuardedStream {
  type Item = Result<Bytes>;

  fn poll_next(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
  ) -> Poll<Option<Self::Item>> {
    let this = &mut *self;
    if this.finished || this.failed {
      return Poll::Ready(None);
    }

    match this.stream.as_mut().poll_next(cx) {
      Poll::Ready(Some(Ok(bytes))) => Poll::Ready(Some(Ok(bytes))),
      Poll::Ready(Some(Err(err))) => {
        this.failed = true;
        let err = match err {
          Error::IO(e) => Error::StreamWrite(e),
          other => other,
        };
        this.tracker.fail(&err);
        Poll::Ready(Some(Err(err)))
      }
      Poll::Ready(None) => {
        this.finished = true;
        this.tracker.complete();
        Poll::Ready(None)
      }
      Poll::Pending => Poll::Pending,
    }
  }
}

impl Drop for GuardedStream {
  fn drop(&mut self) {
    if !self.finished && !self.failed {
      // a disconnect still counts as completed, only cleanup remains
      info!(
        request_id = %self.tracker.id(),
        stage = %self.tracker.stage(),
        "client disconnected before the download finished"
      );
      self.tracker.complete();
    }

    for handle in &mut self.handles {
      handle.release();
    }
    if !self.handles.is_empty() {
      info!(
        request_id = %self.tracker.id(),
        files = self.handles.len(),
        "cleaned up temp files"
      );
    }
  }
}

#[cfg(test)]
mod test {
  use futures::{executor::block_on_stream, StreamExt};

  use super::*;
  use crate::{
    download::Stage,
    media::DownloadRequest,
    scratch::{count_files, ScratchDir},
  };

  fn tracker() -> Tracker {
    let mut tracker =
      Tracker::new(&DownloadRequest::new("https://youtu.be/dQw4w9WgXcQ"));
    tracker.advance(Stage::Streaming);
    tracker
  }

  fn chunks(items: Vec<Result<Bytes>>) -> ByteStream {
    futures::stream::iter(items).boxed()
  }

  #[test]
  fn test_releases_after_full_read() {
    let dir = tempfile::tempdir().unwrap();
    let session = ScratchDir::new(dir.path()).session();
    let handle = session.allocate("output", "mp4");
    std::fs::write(handle.path(), b"data").unwrap();

    let stream = GuardedStream::new(
      chunks(vec![
        Ok(Bytes::from_static(b"hello ")),
        Ok(Bytes::from_static(b"world")),
      ]),
      tracker(),
    )
    .holding([handle]);

    let mut iter = block_on_stream(stream);
    assert_eq!(iter.next().unwrap().unwrap(), "hello ");
    assert_eq!(iter.next().unwrap().unwrap(), "world");
    assert!(iter.next().is_none());
    // still owned by the body until it is dropped
    assert_eq!(count_files(dir.path()), 1);

    drop(iter);
    assert_eq!(count_files(dir.path()), 0);
  }

  #[test]
  fn test_stops_after_error() {
    let stream = GuardedStream::new(
      chunks(vec![
        Ok(Bytes::from_static(b"partial")),
        Err(Error::IO(std::io::ErrorKind::UnexpectedEof.into())),
        Ok(Bytes::from_static(b"never")),
      ]),
      tracker(),
    );

    let items: Vec<_> = block_on_stream(stream).collect();
    assert_eq!(items.len(), 2);
    assert!(matches!(items[1], Err(Error::StreamWrite(_))));
  }

  #[test]
  fn test_disconnect_releases() {
    let dir = tempfile::tempdir().unwrap();
    let session = ScratchDir::new(dir.path()).session();
    let a = session.allocate("video", "mp4");
    let b = session.allocate("audio", "webm");
    std::fs::write(a.path(), b"a").unwrap();
    std::fs::write(b.path(), b"b").unwrap();

    let stream = GuardedStream::new(
      chunks(vec![Ok(Bytes::from_static(b"first"))]),
      tracker(),
    )
    .holding([a, b]);
    drop(stream);

    assert_eq!(count_files(dir.path()), 0);
  }
}
