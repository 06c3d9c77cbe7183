mod instagram;
mod instagram_intercept;
mod youtube;

use async_trait::async_trait;

use crate::{
  media::{DownloadRequest, Extraction},
  platform::PlatformKind,
  scratch::ScratchSession,
  Result,
};

pub use instagram::InstagramPage;
pub use instagram_intercept::InstagramIntercept;
pub use youtube::YouTube;

/// One way of turning a source URL into media bytes.
#[async_trait]
pub trait Extractor: Send + Sync {
  fn platform(&self) -> PlatformKind;

  /// Cheap, local check run before any network or process work.
  fn validate(&self, url: &str) -> Result<()>;

  /// Temp files land in `scratch` and are owned by the returned media.
  async fn extract(
    &self,
    request: &DownloadRequest,
    scratch: &ScratchSession,
  ) -> Result<Extraction>;
}
