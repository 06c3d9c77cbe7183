use std::sync::LazyLock;

use regex::Regex;

mod guarded_stream;

pub use guarded_stream::GuardedStream;

const MAX_FILENAME_LEN: usize = 100;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9\-_ ]").unwrap());

// Reduce a media title to something safe for Content-Disposition.
pub fn clean_filename(title: &str) -> String {
  let cleaned = UNSAFE_FILENAME_CHARS.replace_all(title, "");
  let cleaned: String = cleaned.trim().chars().take(MAX_FILENAME_LEN).collect();
  let cleaned = cleaned.trim_end();

  if cleaned.is_empty() {
    "video".to_string()
  } else {
    cleaned.to_string()
  }
}
