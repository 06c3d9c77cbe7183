use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::anyhow;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};
use tracing::info;
use tracing_subscriber::{
  fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

mod api;
mod browser;
mod config;
mod download;
mod error;
mod extractor;
mod fetch;
mod manifest;
mod media;
mod platform;
mod scratch;
#[cfg(test)]
mod testing;
mod transcode;
mod util;

pub use error::{Error, Result};

use crate::{
  api::AppState, browser::Chromium, config::Config, download::Orchestrator,
  manifest::Ytdlp, scratch::ScratchDir, transcode::Ffmpeg,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::registry()
    .with(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("media_relay=info")),
    )
    .with(fmt::layer())
    .init();

  let config = Config::from_env();
  let scratch = ScratchDir::new(&config.scratch_dir);
  scratch.prepare().await?;
  info!(dir = %scratch.path().display(), "scratch directory ready");

  let http = fetch::http_client()?;
  let resolver = Arc::new(Ytdlp::new(&config, http.clone()));
  let orchestrator = Orchestrator::new(
    resolver.clone(),
    Arc::new(Chromium::new(&config)),
    Arc::new(Ffmpeg::new(&config)),
    http,
    scratch.clone(),
    &config,
  );
  let state = AppState {
    orchestrator: Arc::new(orchestrator),
    resolver,
  };

  let addr = config.bind_addr;
  let res = Toplevel::new(move |s| async move {
    s.start(SubsystemBuilder::new("http", move |subsys| {
      serve(subsys, addr, state)
    }));
  })
  .catch_signals()
  .handle_shutdown_requests(SHUTDOWN_TIMEOUT)
  .await;

  let removed = scratch.purge()?;
  info!(removed, "cleaned up scratch directory");

  res.map_err(|e| anyhow!("{e}"))
}

async fn serve(
  subsys: SubsystemHandle,
  addr: SocketAddr,
  state: AppState,
) -> anyhow::Result<()> {
  let app = api::router(state);

  info!("listening on http://{addr}");
  axum::Server::try_bind(&addr)?
    .serve(app.into_make_service())
    .with_graceful_shutdown(subsys.on_shutdown_requested())
    .await?;

  Ok(())
}
