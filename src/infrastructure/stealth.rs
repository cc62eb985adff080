//! Anti-detection and pacing policy shared by every crawl session
//!
//! The policy is injected into sessions instead of living on the adapters,
//! so all sources get the same fingerprint rotation and request pacing.

use std::time::Duration;
use tracing::debug;

use crate::infrastructure::config::{BrowserConfig, CrawlerConfig};

/// Screen height range reported through `screen.availHeight`
pub const AVAIL_HEIGHT_RANGE: (u32, u32) = (1000, 1080);
/// Screen width range reported through `screen.availWidth`
pub const AVAIL_WIDTH_RANGE: (u32, u32) = (1800, 1920);

/// Fingerprint of one browser session, drawn fresh per launch
#[derive(Debug, Clone, PartialEq)]
pub struct SessionProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub avail_screen: (u32, u32),
    pub locale: String,
    pub timezone: String,
    pub geolocation: (f64, f64),
    pub proxy_server: Option<String>,
    pub headless: bool,
}

impl SessionProfile {
    /// Chrome command line for this profile
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            format!("--window-size={},{}", self.viewport.0, self.viewport.1),
            format!("--user-agent={}", self.user_agent),
            format!("--lang={}", self.locale),
        ];
        if self.headless {
            args.insert(0, "--headless=new".to_string());
        }
        if let Some(proxy) = &self.proxy_server {
            args.push(format!("--proxy-server={proxy}"));
        }
        args
    }

    /// Script evaluated before any page script to mask automation markers
    pub fn init_script(&self) -> String {
        let primary_language = self.locale.split('-').next().unwrap_or("en");
        format!(
            r"Object.defineProperty(navigator, 'webdriver', {{ get: () => undefined }});
Object.defineProperty(navigator, 'plugins', {{ get: () => [1, 2, 3, 4, 5] }});
Object.defineProperty(navigator, 'languages', {{ get: () => ['{locale}', '{primary_language}'] }});
window.chrome = {{ runtime: {{}} }};
Object.defineProperty(screen, 'availHeight', {{ get: () => {avail_height} }});
Object.defineProperty(screen, 'availWidth', {{ get: () => {avail_width} }});",
            locale = self.locale,
            avail_height = self.avail_screen.1,
            avail_width = self.avail_screen.0,
        )
    }
}

/// User-agent rotation, fingerprint randomization and pacing
#[derive(Debug, Clone)]
pub struct StealthPolicy {
    browser: BrowserConfig,
    pacing: (Duration, Duration),
}

impl StealthPolicy {
    pub fn new(browser: BrowserConfig, crawler: &CrawlerConfig) -> Self {
        Self {
            browser,
            pacing: (
                Duration::from_millis(crawler.pacing_min_ms),
                Duration::from_millis(crawler.pacing_max_ms),
            ),
        }
    }

    /// Override the pacing bounds (zero disables pacing)
    #[must_use]
    pub const fn with_pacing(mut self, min: Duration, max: Duration) -> Self {
        self.pacing = (min, max);
        self
    }

    /// Draw a fresh session profile
    pub fn profile(&self) -> SessionProfile {
        let user_agent = if self.browser.user_agents.is_empty() {
            String::new()
        } else {
            self.browser.user_agents[fastrand::usize(..self.browser.user_agents.len())].clone()
        };

        let proxy = &self.browser.proxy;
        let proxy_server = if proxy.enabled { proxy.server.clone() } else { None };

        SessionProfile {
            user_agent,
            viewport: (self.browser.viewport_width, self.browser.viewport_height),
            avail_screen: (
                fastrand::u32(AVAIL_WIDTH_RANGE.0..=AVAIL_WIDTH_RANGE.1),
                fastrand::u32(AVAIL_HEIGHT_RANGE.0..=AVAIL_HEIGHT_RANGE.1),
            ),
            locale: self.browser.locale.clone(),
            timezone: self.browser.timezone.clone(),
            geolocation: (self.browser.latitude, self.browser.longitude),
            proxy_server,
            headless: self.browser.headless,
        }
    }

    /// Proxy credentials, when an authenticated proxy is configured
    pub fn proxy_credentials(&self) -> Option<(&str, &str)> {
        let proxy = &self.browser.proxy;
        if !proxy.enabled {
            return None;
        }
        match (proxy.username.as_deref(), proxy.password.as_deref()) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }

    /// Random delay within the pacing bounds
    pub fn pacing_delay(&self) -> Duration {
        let (min, max) = self.pacing;
        let min_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX).max(min_ms);
        Duration::from_millis(fastrand::u64(min_ms..=max_ms))
    }

    /// Sleep for one pacing delay
    pub async fn pace(&self) {
        let delay = self.pacing_delay();
        if !delay.is_zero() {
            debug!("Pacing for {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::ProxyConfig;

    fn policy() -> StealthPolicy {
        StealthPolicy::new(BrowserConfig::default(), &CrawlerConfig::default())
    }

    #[test]
    fn test_profile_draws_from_pool_and_ranges() {
        let policy = policy();
        let pool = BrowserConfig::default().user_agents;
        for _ in 0..50 {
            let profile = policy.profile();
            assert!(pool.contains(&profile.user_agent));
            assert!((1800..=1920).contains(&profile.avail_screen.0));
            assert!((1000..=1080).contains(&profile.avail_screen.1));
            assert_eq!(profile.viewport, (1920, 1080));
        }
    }

    #[test]
    fn test_pacing_delay_within_bounds() {
        let policy = policy();
        for _ in 0..50 {
            let delay = policy.pacing_delay();
            assert!(delay >= Duration::from_secs(2) && delay <= Duration::from_secs(4));
        }
        let quiet = policy.with_pacing(Duration::ZERO, Duration::ZERO);
        assert!(quiet.pacing_delay().is_zero());
    }

    #[test]
    fn test_launch_args_include_proxy_only_when_enabled() {
        let mut browser = BrowserConfig::default();
        let profile = StealthPolicy::new(browser.clone(), &CrawlerConfig::default()).profile();
        assert!(!profile.launch_args().iter().any(|a| a.starts_with("--proxy-server")));

        browser.proxy = ProxyConfig {
            enabled: true,
            server: Some("http://10.0.0.1:3128".into()),
            username: Some("user".into()),
            password: Some("secret".into()),
        };
        let policy = StealthPolicy::new(browser, &CrawlerConfig::default());
        let args = policy.profile().launch_args();
        assert!(args.contains(&"--proxy-server=http://10.0.0.1:3128".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert_eq!(policy.proxy_credentials(), Some(("user", "secret")));
    }

    #[test]
    fn test_init_script_masks_automation() {
        let profile = policy().profile();
        let script = profile.init_script();
        assert!(script.contains("'webdriver', { get: () => undefined }"));
        assert!(script.contains("['en-US', 'en']"));
        assert!(script.contains(&format!("get: () => {}", profile.avail_screen.1)));
    }
}
