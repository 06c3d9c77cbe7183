use std::{
  ffi::OsString,
  path::{Path, PathBuf},
  process::Stdio,
  time::Duration,
};

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::{config::Config, media::OutputFormat};

#[async_trait]
pub trait Transcoder: Send + Sync {
  /// Convert an audio-only input to `format` (mp3).
  async fn convert_audio(
    &self,
    input: &Path,
    output: &Path,
    format: OutputFormat,
  ) -> anyhow::Result<()>;

  /// Copy the video track of `video` and re-encode the audio track of
  /// `audio` into a single `format` container.
  async fn mux(
    &self,
    video: &Path,
    audio: &Path,
    output: &Path,
    format: OutputFormat,
  ) -> anyhow::Result<()>;
}

pub struct Ffmpeg {
  binary: PathBuf,
  timeout: Duration,
}

impl Ffmpeg {
  pub fn new(config: &Config) -> Self {
    Self {
      binary: config.ffmpeg_path.clone(),
      timeout: config.timeouts.transcode,
    }
  }

  async fn run(&self, args: Vec<OsString>) -> anyhow::Result<()> {
    debug!(?args, "running ffmpeg");

    // killed if the request goes away while we wait
    let child = Command::new(&self.binary)
      .args(&args)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .context("failed to spawn ffmpeg")?;

    let output = tokio::time::timeout(self.timeout, child.wait_with_output())
      .await
      .map_err(|_| anyhow!("ffmpeg timed out after {:?}", self.timeout))??;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      let tail = stderr.lines().last().unwrap_or_default();
      bail!("ffmpeg exited with {}: {}", output.status, tail);
    }

    Ok(())
  }
}

#[async_trait]
impl Transcoder for Ffmpeg {
  async fn convert_audio(
    &self,
    input: &Path,
    output: &Path,
    format: OutputFormat,
  ) -> anyhow::Result<()> {
    self.run(audio_args(input, output, format)?).await
  }

  async fn mux(
    &self,
    video: &Path,
    audio: &Path,
    output: &Path,
    format: OutputFormat,
  ) -> anyhow::Result<()> {
    self.run(mux_args(video, audio, output, format)?).await
  }
}

fn audio_args(
  input: &Path,
  output: &Path,
  format: OutputFormat,
) -> anyhow::Result<Vec<OsString>> {
  if format != OutputFormat::Mp3 {
    bail!("cannot convert audio to {format}");
  }

  let mut args = args(&["-hide_banner", "-loglevel", "error", "-y", "-i"]);
  args.push(input.into());
  args.extend(self::args(&[
    "-vn", "-codec:a", "libmp3lame", "-q:a", "2", "-f", "mp3",
  ]));
  args.push(output.into());
  Ok(args)
}

fn mux_args(
  video: &Path,
  audio: &Path,
  output: &Path,
  format: OutputFormat,
) -> anyhow::Result<Vec<OsString>> {
  let audio_codec = match format {
    OutputFormat::Mp4 => "aac",
    OutputFormat::Webm => "libopus",
    OutputFormat::Mp3 => bail!("cannot mux video into mp3"),
  };

  let mut args = args(&["-hide_banner", "-loglevel", "error", "-y", "-i"]);
  args.push(video.into());
  args.push("-i".into());
  args.push(audio.into());
  args.extend(self::args(&[
    "-map",
    "0:v:0",
    "-map",
    "1:a:0",
    "-c:v",
    "copy",
    "-c:a",
    audio_codec,
    "-f",
    format.extension(),
  ]));
  args.push(output.into());
  Ok(args)
}

fn args(list: &[&str]) -> Vec<OsString> {
  list.iter().map(OsString::from).collect()
}
