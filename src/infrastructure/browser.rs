//! Browser driving seam
//!
//! [`BrowserLauncher`] opens an isolated, fingerprinted session and hands out
//! a [`BrowserPage`]. The production launcher talks to chromedriver through
//! `thirtyfour`; tests script pages in memory.

#![allow(clippy::uninlined_format_args)]

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::ChromeCapabilities;
use thirtyfour::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::errors::{SessionError, SessionResult};
use crate::infrastructure::stealth::{SessionProfile, StealthPolicy};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// State of a pagination control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextControl {
    Missing,
    Disabled,
    Enabled,
}

/// One open page of an exclusive browser session
#[async_trait]
pub trait BrowserPage: Send {
    async fn goto(&mut self, url: &str) -> SessionResult<()>;

    /// Wait until `selector` matches; `Ok(false)` on timeout
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> SessionResult<bool>;

    /// Current document markup
    async fn content(&mut self) -> SessionResult<String>;

    async fn next_control(&mut self, selector: &str) -> SessionResult<NextControl>;

    async fn click(&mut self, selector: &str) -> SessionResult<()>;

    /// Release the session; later calls are no-ops
    async fn close(&mut self) -> SessionResult<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, profile: &SessionProfile) -> SessionResult<Box<dyn BrowserPage>>;
}

/// Launcher backed by a chromedriver endpoint
pub struct WebDriverLauncher {
    webdriver_url: String,
    proxy_auth_configured: bool,
}

impl WebDriverLauncher {
    pub fn new(webdriver_url: impl Into<String>, policy: &StealthPolicy) -> Self {
        let proxy_auth_configured = policy.proxy_credentials().is_some();
        if proxy_auth_configured {
            warn!("Proxy credentials are configured but chromedriver sessions cannot answer proxy auth challenges; use an IP-allowlisted proxy");
        }
        Self {
            webdriver_url: webdriver_url.into(),
            proxy_auth_configured,
        }
    }

    fn capabilities(profile: &SessionProfile) -> SessionResult<ChromeCapabilities> {
        let mut caps = DesiredCapabilities::chrome();
        caps.add_chrome_option("args", profile.launch_args())
            .map_err(|e| SessionError::Launch { message: e.to_string() })?;
        caps.add_chrome_option("excludeSwitches", vec!["enable-automation"])
            .map_err(|e| SessionError::Launch { message: e.to_string() })?;
        Ok(caps)
    }

    /// Emulation overrides and the init script, applied through CDP
    async fn apply_stealth(driver: &WebDriver, profile: &SessionProfile) -> WebDriverResult<()> {
        let dev_tools = ChromeDevTools::new(driver.handle.clone());

        dev_tools
            .execute_cdp_with_params(
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": profile.init_script() }),
            )
            .await?;
        dev_tools
            .execute_cdp_with_params("Emulation.setTimezoneOverride", json!({ "timezoneId": profile.timezone }))
            .await?;
        dev_tools
            .execute_cdp_with_params("Emulation.setLocaleOverride", json!({ "locale": profile.locale }))
            .await?;
        dev_tools
            .execute_cdp_with_params(
                "Emulation.setGeolocationOverride",
                json!({
                    "latitude": profile.geolocation.0,
                    "longitude": profile.geolocation.1,
                    "accuracy": 100
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, profile: &SessionProfile) -> SessionResult<Box<dyn BrowserPage>> {
        let caps = Self::capabilities(profile)?;
        let driver = WebDriver::new(&self.webdriver_url, caps)
            .await
            .map_err(|e| SessionError::Launch { message: e.to_string() })?;

        // A session that fails stealth setup must not leak
        if let Err(e) = Self::apply_stealth(&driver, profile).await {
            if let Err(quit_err) = driver.quit().await {
                warn!("Failed to quit browser after stealth failure: {}", quit_err);
            }
            return Err(SessionError::Stealth { message: e.to_string() });
        }

        debug!(
            "Browser session ready (ua: {}, proxy: {}, proxy auth: {})",
            profile.user_agent,
            profile.proxy_server.as_deref().unwrap_or("none"),
            self.proxy_auth_configured
        );
        Ok(Box::new(WebDriverPage { driver: Some(driver) }))
    }
}

/// Page of a live chromedriver session
pub struct WebDriverPage {
    driver: Option<WebDriver>,
}

impl WebDriverPage {
    fn driver(&self) -> SessionResult<&WebDriver> {
        self.driver
            .as_ref()
            .ok_or_else(|| SessionError::driver("browser session already closed"))
    }
}

#[async_trait]
impl BrowserPage for WebDriverPage {
    async fn goto(&mut self, url: &str) -> SessionResult<()> {
        self.driver()?
            .goto(url)
            .await
            .map_err(|e| SessionError::navigation(url, e.to_string()))
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> SessionResult<bool> {
        self.driver()?
            .query(By::Css(selector))
            .wait(timeout, POLL_INTERVAL)
            .exists()
            .await
            .map_err(|e| SessionError::driver(e.to_string()))
    }

    async fn content(&mut self) -> SessionResult<String> {
        self.driver()?
            .source()
            .await
            .map_err(|e| SessionError::driver(e.to_string()))
    }

    async fn next_control(&mut self, selector: &str) -> SessionResult<NextControl> {
        let elements = self
            .driver()?
            .find_all(By::Css(selector))
            .await
            .map_err(|e| SessionError::driver(e.to_string()))?;

        let Some(element) = elements.first() else {
            return Ok(NextControl::Missing);
        };

        let disabled = element
            .attr("disabled")
            .await
            .map_err(|e| SessionError::driver(e.to_string()))?;
        let aria_disabled = element
            .attr("aria-disabled")
            .await
            .map_err(|e| SessionError::driver(e.to_string()))?;

        if disabled.is_some() || aria_disabled.as_deref() == Some("true") {
            Ok(NextControl::Disabled)
        } else {
            Ok(NextControl::Enabled)
        }
    }

    async fn click(&mut self, selector: &str) -> SessionResult<()> {
        let element = self
            .driver()?
            .find(By::Css(selector))
            .await
            .map_err(|e| SessionError::driver(e.to_string()))?;
        element.click().await.map_err(|e| SessionError::driver(e.to_string()))
    }

    async fn close(&mut self) -> SessionResult<()> {
        if let Some(driver) = self.driver.take() {
            driver.quit().await.map_err(|e| SessionError::driver(e.to_string()))?;
            info!("Browser session closed");
        }
        Ok(())
    }
}
