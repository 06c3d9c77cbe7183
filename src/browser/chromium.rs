use std::{
  path::PathBuf,
  sync::{Arc, Mutex},
  time::Duration,
};

use async_trait::async_trait;
use chromiumoxide::{
  browser::{Browser, BrowserConfig},
  cdp::{
    browser_protocol::{
      network::{EventResponseReceived, SetUserAgentOverrideParams},
      page::NavigateParams,
      target::CreateTargetParams,
    },
    js_protocol::runtime::EvaluateParams,
  },
  page::Page,
};
use futures::StreamExt;
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use crate::config::Config;

use super::{
  is_video_response, BrowserError, BrowserLauncher, BrowserResult,
  BrowserSession, CapturedResponse, USER_AGENT,
};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Launches a fresh headless Chromium per session.
pub struct Chromium {
  executable: Option<PathBuf>,
  navigation_timeout: Duration,
}

impl Chromium {
  pub fn new(config: &Config) -> Self {
    Self {
      executable: config.chrome_path.clone(),
      navigation_timeout: config.timeouts.navigation,
    }
  }

  fn browser_config(&self) -> BrowserResult<BrowserConfig> {
    let args = vec![
      "--disable-setuid-sandbox".to_string(),
      "--disable-dev-shm-usage".to_string(),
      "--disable-web-security".to_string(),
      "--mute-audio".to_string(),
      "--no-first-run".to_string(),
      format!("--user-agent={USER_AGENT}"),
      "--window-size=1920,1080".to_string(),
    ];

    let mut builder = BrowserConfig::builder()
      .no_sandbox()
      .request_timeout(self.navigation_timeout)
      .args(args);
    if let Some(path) = &self.executable {
      builder = builder.chrome_executable(path);
    }

    builder.build().map_err(BrowserError::Configuration)
  }
}

#[async_trait]
impl BrowserLauncher for Chromium {
  async fn launch(&self) -> BrowserResult<Box<dyn BrowserSession>> {
    let config = self.browser_config()?;
    let (browser, mut handler) = Browser::launch(config)
      .await
      .map_err(|err| BrowserError::Launch(err.to_string()))?;

    let handler_task = tokio::spawn(async move {
      while let Some(event) = handler.next().await {
        if let Err(err) = event {
          debug!(error = %err, "chromium handler reported error");
        }
      }
    });

    let captured = Arc::new(Mutex::new(Vec::new()));
    let (page, capture_task) = match open_page(&browser, &captured).await {
      Ok(opened) => opened,
      Err(err) => {
        // dropping the browser kills the process
        handler_task.abort();
        return Err(err);
      }
    };

    info!("launched chromium session");
    Ok(Box::new(ChromiumSession {
      browser,
      page,
      handler_task,
      capture_task,
      captured,
      navigation_timeout: self.navigation_timeout,
      closed: false,
    }))
  }
}

async fn open_page(
  browser: &Browser,
  captured: &Arc<Mutex<Vec<CapturedResponse>>>,
) -> BrowserResult<(Page, JoinHandle<()>)> {
  let page = browser
    .new_page(CreateTargetParams::new("about:blank"))
    .await?;

  let params = SetUserAgentOverrideParams::builder()
    .user_agent(USER_AGENT)
    .accept_language("en-US,en;q=0.9")
    .build()
    .map_err(BrowserError::Configuration)?;
  page.set_user_agent(params).await?;

  let mut responses = page.event_listener::<EventResponseReceived>().await?;
  let captured = Arc::clone(captured);
  let capture_task = tokio::spawn(async move {
    while let Some(event) = responses.next().await {
      let resp = &event.response;
      if !is_video_response(&resp.url, &resp.mime_type, resp.status) {
        continue;
      }
      debug!(url = %resp.url, "captured video response");
      captured
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(CapturedResponse {
          url: resp.url.clone(),
          mime_type: resp.mime_type.clone(),
          status: resp.status,
        });
    }
  });

  Ok((page, capture_task))
}

struct ChromiumSession {
  browser: Browser,
  page: Page,
  handler_task: JoinHandle<()>,
  capture_task: JoinHandle<()>,
  captured: Arc<Mutex<Vec<CapturedResponse>>>,
  navigation_timeout: Duration,
  closed: bool,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
  async fn goto(&mut self, url: &str) -> BrowserResult<()> {
    let params = NavigateParams::builder()
      .url(url)
      .build()
      .map_err(BrowserError::Configuration)?;

    let navigate = async {
      self
        .page
        .goto(params)
        .await
        .map_err(|err| BrowserError::Navigation(err.to_string()))?;
      self.page.wait_for_navigation().await?;
      Ok::<_, BrowserError>(())
    };

    tokio::time::timeout(self.navigation_timeout, navigate)
      .await
      .map_err(|_| BrowserError::Timeout(format!("navigation to {url}")))?
  }

  async fn wait_for(
    &mut self,
    selector: &str,
    timeout: Duration,
  ) -> BrowserResult<()> {
    let deadline = Instant::now() + timeout;
    loop {
      let remaining = deadline.saturating_duration_since(Instant::now());
      if remaining.is_zero() {
        return Err(BrowserError::Timeout(selector.to_string()));
      }

      match tokio::time::timeout(remaining, self.page.find_element(selector))
        .await
      {
        Ok(Ok(_)) => return Ok(()),
        Ok(Err(_)) => (),
        Err(_) => return Err(BrowserError::Timeout(selector.to_string())),
      }

      tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
    }
  }

  async fn evaluate(
    &mut self,
    script: &str,
  ) -> BrowserResult<serde_json::Value> {
    let params = EvaluateParams::builder()
      .expression(script)
      .await_promise(true)
      .return_by_value(true)
      .build()
      .map_err(BrowserError::Configuration)?;

    let result = self
      .page
      .evaluate_expression(params)
      .await
      .map_err(|err| BrowserError::Script(err.to_string()))?;

    Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
  }

  async fn click(
    &mut self,
    selector: &str,
    timeout: Duration,
  ) -> BrowserResult<()> {
    let click = async {
      let element = self
        .page
        .find_element(selector)
        .await
        .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;
      element.click().await?;
      Ok::<_, BrowserError>(())
    };

    tokio::time::timeout(timeout, click)
      .await
      .map_err(|_| BrowserError::Timeout(selector.to_string()))?
  }

  fn video_responses(&self) -> Vec<CapturedResponse> {
    self
      .captured
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .clone()
  }

  async fn close(mut self: Box<Self>) {
    self.closed = true;
    self.capture_task.abort();

    match tokio::time::timeout(CLOSE_TIMEOUT, self.browser.close()).await {
      Ok(Ok(_)) => (),
      Ok(Err(err)) => warn!(error = %err, "failed to close browser gracefully"),
      Err(_) => warn!("timed out closing browser"),
    }
    if tokio::time::timeout(CLOSE_TIMEOUT, &mut self.handler_task)
      .await
      .is_err()
    {
      self.handler_task.abort();
    }
    debug!("closed chromium session");
  }
}

impl Drop for ChromiumSession {
  fn drop(&mut self) {
    if !self.closed {
      warn!("chromium session dropped without explicit close");
    }
    self.capture_task.abort();
    self.handler_task.abort();
  }
}
