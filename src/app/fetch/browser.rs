//! Browser-automation fetch tier
//!
//! Tier 3 drives a real headless browser so that pages gated behind
//! JavaScript-heavy bot mitigation can still be read. The engine sits
//! behind a trait so the fetcher (and its tests) never depend on an actual
//! Chromium install.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::errors::FetchError;

/// A mechanism able to load a URL in a rendered context and hand back the
/// resulting page source.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Load `url`, wait (bounded) for the document to reach a ready state,
    /// and return the rendered page source.
    async fn render(&mut self, url: &Url, ready_timeout: Duration) -> Result<String, FetchError>;

    /// Tear down the underlying browser instance. Called unconditionally
    /// at run end; must be safe to call more than once.
    async fn shutdown(&mut self);
}

/// Chromium-backed engine, launched lazily on first use.
///
/// chromiumoxide needs its event handler polled for the lifetime of the
/// browser, so launch spawns a companion task that is aborted on shutdown.
pub struct ChromiumEngine {
    instance: Option<(Browser, JoinHandle<()>)>,
}

impl ChromiumEngine {
    pub fn new() -> Self {
        Self { instance: None }
    }

    async fn ensure_launched(&mut self) -> Result<&Browser, FetchError> {
        if self.instance.is_none() {
            debug!("launching headless browser for automation tier");
            let config = BrowserConfig::builder()
                .window_size(1920, 1080)
                .build()
                .map_err(|reason| FetchError::Browser { reason })?;
            let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
                FetchError::Browser {
                    reason: e.to_string(),
                }
            })?;
            let handler_task = tokio::spawn(async move {
                while handler.next().await.is_some() {}
            });
            self.instance = Some((browser, handler_task));
        }
        match self.instance.as_ref() {
            Some((browser, _)) => Ok(browser),
            None => Err(FetchError::Browser {
                reason: "browser instance missing after launch".to_string(),
            }),
        }
    }
}

impl Default for ChromiumEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn render(&mut self, url: &Url, ready_timeout: Duration) -> Result<String, FetchError> {
        let browser = self.ensure_launched().await?;

        let page = browser.new_page(url.as_str()).await.map_err(|e| {
            FetchError::Browser {
                reason: e.to_string(),
            }
        })?;

        let navigation = tokio::time::timeout(ready_timeout, page.wait_for_navigation()).await;
        match navigation {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                let _ = page.close().await;
                return Err(FetchError::Browser {
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                let _ = page.close().await;
                return Err(FetchError::Browser {
                    reason: format!("document not ready after {:?}", ready_timeout),
                });
            }
        }

        let content = page.content().await.map_err(|e| FetchError::Browser {
            reason: e.to_string(),
        });
        if let Err(e) = page.close().await {
            warn!("failed to close browser page: {}", e);
        }
        content
    }

    async fn shutdown(&mut self) {
        if let Some((mut browser, handler_task)) = self.instance.take() {
            if let Err(e) = browser.close().await {
                warn!("failed to close browser: {}", e);
            }
            handler_task.abort();
            debug!("browser automation tier shut down");
        }
    }
}
