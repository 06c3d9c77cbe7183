use std::{fmt, sync::LazyLock};

use http_types::Url;
use regex::Regex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformKind {
  YouTube,
  Instagram,
  TikTok,
  Facebook,
  Unsupported,
  Invalid,
}

// first match wins
const HOST_TABLE: &[(&str, PlatformKind)] = &[
  ("youtube.com", PlatformKind::YouTube),
  ("youtu.be", PlatformKind::YouTube),
  ("instagram.com", PlatformKind::Instagram),
  ("tiktok.com", PlatformKind::TikTok),
  ("facebook.com", PlatformKind::Facebook),
];

impl PlatformKind {
  pub fn detect(url: &str) -> Self {
    let Ok(url) = url.parse::<Url>() else {
      return PlatformKind::Invalid;
    };
    let Some(host) = url.host_str() else {
      return PlatformKind::Unsupported;
    };
    let host = host.to_ascii_lowercase();

    HOST_TABLE
      .iter()
      .find(|(needle, _)| host.contains(needle))
      .map(|(_, kind)| *kind)
      .unwrap_or(PlatformKind::Unsupported)
  }

  pub fn name(self) -> &'static str {
    match self {
      PlatformKind::YouTube => "youtube",
      PlatformKind::Instagram => "instagram",
      PlatformKind::TikTok => "tiktok",
      PlatformKind::Facebook => "facebook",
      PlatformKind::Unsupported => "unsupported",
      PlatformKind::Invalid => "invalid",
    }
  }
}

impl fmt::Display for PlatformKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

static YOUTUBE_HOSTS: &[&str] = &[
  "youtube.com",
  "www.youtube.com",
  "m.youtube.com",
  "music.youtube.com",
  "gaming.youtube.com",
  "youtube-nocookie.com",
  "www.youtube-nocookie.com",
];

static YOUTUBE_ID_REGEX: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

/// Canonical YouTube video URL shape: a watch/shorts/embed/live URL or a
/// youtu.be short link carrying an 11 character video id.
pub fn youtube_video_id(url: &str) -> Option<String> {
  let url: Url = url.parse().ok()?;
  if !matches!(url.scheme(), "http" | "https") {
    return None;
  }
  let host = url.host_str()?.to_ascii_lowercase();
  let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

  let id = if host == "youtu.be" {
    segments.next()?.to_string()
  } else if YOUTUBE_HOSTS.contains(&host.as_str()) {
    match segments.next()? {
      "watch" => url
        .query_pairs()
        .find_map(|(k, v)| (k == "v").then(|| v.into_owned()))?,
      "shorts" | "embed" | "live" | "v" => segments.next()?.to_string(),
      _ => return None,
    }
  } else {
    return None;
  };

  YOUTUBE_ID_REGEX.is_match(&id).then_some(id)
}

pub fn is_instagram_url(url: &str) -> bool {
  url.contains("instagram.com")
}
