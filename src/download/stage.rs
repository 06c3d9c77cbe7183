use std::{fmt, time::Instant};

use tracing::{debug, info, warn};

use crate::{media::DownloadRequest, platform::PlatformKind, Error};

/// Lifecycle of one download request. Stages only move forward; `Failed`
/// absorbs from any non-terminal stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
  Received,
  Detected,
  Validated,
  Extracting,
  Transcoding,
  Streaming,
  Completed,
  Failed,
}

impl Stage {
  pub fn is_terminal(self) -> bool {
    matches!(self, Stage::Completed | Stage::Failed)
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self, f)
  }
}

#[derive(Clone, Debug)]
pub struct Tracker {
  id: String,
  platform: PlatformKind,
  stage: Stage,
  started: Instant,
}

impl Tracker {
  pub fn new(request: &DownloadRequest) -> Self {
    let tracker = Self {
      id: format!("{:08x}", rand::random::<u32>()),
      platform: request.platform,
      stage: Stage::Received,
      started: Instant::now(),
    };
    debug!(
      request_id = %tracker.id,
      url = %request.source_url,
      "download received"
    );
    tracker
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn stage(&self) -> Stage {
    self.stage
  }

  pub fn advance(&mut self, next: Stage) {
    debug_assert!(
      next > self.stage && !self.stage.is_terminal(),
      "illegal transition {} -> {}",
      self.stage,
      next
    );
    if self.stage.is_terminal() {
      return;
    }

    debug!(
      request_id = %self.id,
      platform = %self.platform,
      from = %self.stage,
      to = %next,
      "download stage"
    );
    self.stage = next;
  }

  pub fn complete(&mut self) {
    self.advance(Stage::Completed);
    info!(
      request_id = %self.id,
      platform = %self.platform,
      elapsed_ms = self.started.elapsed().as_millis() as u64,
      "download completed"
    );
  }

  pub fn fail(&mut self, err: &Error) {
    if self.stage.is_terminal() {
      return;
    }
    warn!(
      request_id = %self.id,
      platform = %self.platform,
      stage = %self.stage,
      status = err.status().as_u16(),
      error = %err,
      "download failed"
    );
    self.stage = Stage::Failed;
  }
}
