use std::{
  net::{IpAddr, Ipv4Addr, SocketAddr},
  path::PathBuf,
  str::FromStr,
  time::Duration,
};

use tracing::warn;

#[derive(Clone, Debug)]
pub struct Config {
  pub bind_addr: SocketAddr,
  pub scratch_dir: PathBuf,
  pub ytdlp_path: PathBuf,
  pub ytdlp_proxy: Option<String>,
  pub ytdlp_concurrency: usize,
  pub ffmpeg_path: PathBuf,
  pub chrome_path: Option<PathBuf>,
  pub timeouts: Timeouts,
}

#[derive(Clone, Debug)]
pub struct Timeouts {
  pub resolve: Duration,
  pub download: Duration,
  pub transcode: Duration,
  pub navigation: Duration,
  pub element: Duration,
  pub settle: Duration,
}

impl Default for Timeouts {
  fn default() -> Self {
    Self {
      resolve: Duration::from_secs(60),
      download: Duration::from_secs(600),
      transcode: Duration::from_secs(600),
      navigation: Duration::from_secs(30),
      element: Duration::from_secs(10),
      settle: Duration::from_secs(3),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5000),
      scratch_dir: std::env::temp_dir().join("media-relay"),
      ytdlp_path: PathBuf::from("yt-dlp"),
      ytdlp_proxy: None,
      ytdlp_concurrency: 2,
      ffmpeg_path: PathBuf::from("ffmpeg"),
      chrome_path: None,
      timeouts: Timeouts::default(),
    }
  }
}

impl Config {
  pub fn from_env() -> Self {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  // split out so tests don't have to mutate the process environment
  fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let default = Self::default();

    let ip = parse_or(&lookup, "BIND_ADDR", default.bind_addr.ip());
    let port = parse_or(&lookup, "PORT", default.bind_addr.port());

    let secs = |key: &str, fallback: Duration| {
      Duration::from_secs(parse_or(&lookup, key, fallback.as_secs()))
    };
    let t = default.timeouts;
    let timeouts = Timeouts {
      resolve: secs("RESOLVE_TIMEOUT_SECS", t.resolve),
      download: secs("DOWNLOAD_TIMEOUT_SECS", t.download),
      transcode: secs("TRANSCODE_TIMEOUT_SECS", t.transcode),
      navigation: secs("NAVIGATION_TIMEOUT_SECS", t.navigation),
      element: secs("ELEMENT_TIMEOUT_SECS", t.element),
      settle: secs("SETTLE_SECS", t.settle),
    };

    Self {
      bind_addr: SocketAddr::new(ip, port),
      scratch_dir: lookup("SCRATCH_DIR")
        .map(PathBuf::from)
        .unwrap_or(default.scratch_dir),
      ytdlp_path: lookup("YTDLP_PATH")
        .map(PathBuf::from)
        .unwrap_or(default.ytdlp_path),
      ytdlp_proxy: lookup("YTDLP_PROXY").filter(|s| !s.is_empty()),
      ytdlp_concurrency: parse_or(
        &lookup,
        "YTDLP_CONCURRENCY",
        default.ytdlp_concurrency,
      )
      .max(1),
      ffmpeg_path: lookup("FFMPEG_PATH")
        .map(PathBuf::from)
        .unwrap_or(default.ffmpeg_path),
      chrome_path: lookup("CHROME_PATH").map(PathBuf::from),
      timeouts,
    }
  }
}

fn parse_or<T: FromStr>(
  lookup: &impl Fn(&str) -> Option<String>,
  key: &str,
  fallback: T,
) -> T {
  match lookup(key) {
    None => fallback,
    Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
      warn!(key, value = %raw, "ignoring malformed config value");
      fallback
    }),
  }
}
