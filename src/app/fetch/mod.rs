//! Resilient tiered fetching
//!
//! Retrieves a single URL through an escalating chain of retrieval tiers:
//! direct HTTP with rotating identities, a cookie-carrying challenge
//! solver, and finally full browser automation. Each tier exhausts its own
//! retry budget before escalating; soft blocks rotate the shared identity
//! pool and back off linearly with jitter. All tiers produce the same
//! tagged [`FetchResult`], so callers never see tier-specific response
//! shapes.

mod browser;
mod classify;
mod identity;

pub use browser::{BrowserEngine, ChromiumEngine};
pub use classify::{classify, has_challenge_markers, Classification};
pub use identity::{next_index, Identity, IdentityPool, IDENTITIES};

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use rand::Rng;
use reqwest::header::LOCATION;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::app::models::is_image_url;
use crate::app::tunnel::TunnelSession;
use crate::constants::{http, limits};
use crate::errors::FetchError;

/// One retrieval mechanism in the escalation chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTier {
    /// Plain HTTP with rotating identity
    Direct,
    /// Cookie-carrying client tolerant of JS-challenge interstitials
    ChallengeSolver,
    /// Full rendered browser session
    BrowserAutomation,
}

impl std::fmt::Display for FetchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchTier::Direct => write!(f, "direct"),
            FetchTier::ChallengeSolver => write!(f, "challenge-solver"),
            FetchTier::BrowserAutomation => write!(f, "browser"),
        }
    }
}

/// Uniform fetch output across all tiers
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Response body (or rendered page source for the browser tier)
    pub content: Vec<u8>,
    /// Transport status code; the browser tier reports 200
    pub status: u16,
    /// Tier that produced the result
    pub tier: FetchTier,
}

impl FetchResult {
    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

/// Seam between the fetcher and everything that consumes pages.
///
/// Listing resolution, the download state machine and the pipeline are all
/// generic over this, which keeps them testable without a network.
#[async_trait]
pub trait Fetch: Send {
    async fn fetch(&mut self, url: &Url) -> Result<FetchResult, FetchError>;

    /// Release any held sessions (browser, tunnel). Invoked
    /// unconditionally at run end, on every exit path.
    async fn shutdown(&mut self) {}
}

/// Fetcher configuration, owned by the orchestrator and passed down
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Attempts per tier before escalating
    pub attempts_per_tier: u32,
    /// Base delay for linear backoff (`base × attempt`, jittered)
    pub retry_base_delay: Duration,
    /// Requests per second against the target host
    pub rate_limit_rps: u32,
    /// Request timeout
    pub request_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Wait before re-requesting through the challenge solver
    pub challenge_solve_delay: Duration,
    /// Bounded wait for the browser tier to reach document-ready
    pub browser_ready_timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            attempts_per_tier: limits::DEFAULT_ATTEMPTS_PER_TIER,
            retry_base_delay: limits::RETRY_BASE_DELAY,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            challenge_solve_delay: limits::CHALLENGE_SOLVE_DELAY,
            browser_ready_timeout: limits::BROWSER_READY_TIMEOUT,
        }
    }
}

/// Apply ± jitter to a delay
pub(crate) fn jittered(delay: Duration, factor: f64) -> Duration {
    let millis = delay.as_millis() as f64;
    let spread = millis * factor;
    let jitter = rand::thread_rng().gen_range(-spread..=spread);
    Duration::from_millis((millis + jitter).max(0.0) as u64)
}

type DirectRateLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// Escalating-tier fetcher with bounded retries, identity rotation and
/// host-level rate limiting.
pub struct ResilientFetcher {
    direct: Client,
    solver: Client,
    browser: Option<Box<dyn BrowserEngine>>,
    tunnel: Option<Box<dyn TunnelSession>>,
    identities: IdentityPool,
    rate_limiter: DirectRateLimiter,
    config: FetcherConfig,
}

impl ResilientFetcher {
    /// Build the fetcher and its two HTTP clients.
    ///
    /// Both clients disable automatic redirects so the detector can see
    /// the hop count; the solver additionally keeps cookies so challenge
    /// clearances persist across attempts.
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let direct = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(http::POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(http::POOL_MAX_PER_HOST)
            .build()?;

        let solver = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .cookie_store(true)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.rate_limit_rps.max(1)).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            direct,
            solver,
            browser: None,
            tunnel: None,
            identities: IdentityPool::new(),
            rate_limiter: RateLimiter::direct(quota),
            config,
        })
    }

    /// Enable the browser-automation tier
    pub fn with_browser(mut self, engine: Box<dyn BrowserEngine>) -> Self {
        self.browser = Some(engine);
        self
    }

    /// Attach an egress tunnel, queried before every direct-tier attempt
    pub fn with_tunnel(mut self, tunnel: Box<dyn TunnelSession>) -> Self {
        self.tunnel = Some(tunnel);
        self
    }

    /// If a tunnel is configured and has dropped, request reconnection;
    /// fail the fetch outright if reconnection fails.
    async fn ensure_tunnel(&mut self) -> Result<(), FetchError> {
        if let Some(tunnel) = self.tunnel.as_mut() {
            if !tunnel.is_connected().await {
                warn!("tunnel disconnected, attempting reconnection");
                if !tunnel.connect().await {
                    return Err(FetchError::TunnelUnavailable);
                }
            }
        }
        Ok(())
    }

    /// Run one HTTP tier to completion.
    ///
    /// Returns `Ok(Some(result))` on success, `Ok(None)` when the tier is
    /// exhausted (hard block, escalate), and `Err` only for conditions
    /// that fail the whole fetch, such as a dead tunnel.
    async fn run_http_tier(
        &mut self,
        tier: FetchTier,
        url: &Url,
    ) -> Result<Option<FetchResult>, FetchError> {
        for attempt in 1..=self.config.attempts_per_tier {
            if tier == FetchTier::Direct {
                self.ensure_tunnel().await?;
            }

            self.rate_limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
                .await;

            match self.attempt(tier, url).await {
                Ok((result, hops)) => {
                    match classify(result.status, hops, &result.content) {
                        Classification::Success => {
                            debug!(%tier, attempt, status = result.status, "fetch succeeded");
                            return Ok(Some(result));
                        }
                        Classification::SoftBlock => {
                            let identity = self.identities.rotate();
                            warn!(
                                %tier,
                                attempt,
                                status = result.status,
                                user_agent = identity.user_agent,
                                "soft block, rotating identity"
                            );
                            if tier == FetchTier::ChallengeSolver {
                                // Let the interstitial's clearance window pass
                                // before re-presenting its cookies
                                tokio::time::sleep(self.config.challenge_solve_delay).await;
                            }
                            tokio::time::sleep(self.backoff_delay(attempt)).await;
                        }
                        Classification::HardBlock => {
                            warn!(%tier, attempt, status = result.status, "hard block, escalating");
                            return Ok(None);
                        }
                    }
                }
                Err(e) => {
                    // Transport failures count against the same budget
                    self.identities.rotate();
                    warn!(
                        %tier,
                        attempt,
                        max_attempts = self.config.attempts_per_tier,
                        error = %e,
                        "transport error, retrying"
                    );
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                }
            }
        }
        info!(%tier, "tier retry budget exhausted, escalating");
        Ok(None)
    }

    /// Issue one request with the current identity, following redirects
    /// manually so the hop count reaches the detector.
    async fn attempt(
        &self,
        tier: FetchTier,
        url: &Url,
    ) -> Result<(FetchResult, u32), FetchError> {
        let client = match tier {
            FetchTier::ChallengeSolver => &self.solver,
            _ => &self.direct,
        };
        let identity = self.identities.current();

        let mut current = url.clone();
        let mut hops = 0u32;
        loop {
            // Image hosts commonly reject hotlink-looking Referers, so
            // media requests present the host's own origin instead of
            // the identity's default.
            let media_referer = if is_image_url(current.as_str()) {
                Some(format!("{}/", current.origin().ascii_serialization()))
            } else {
                None
            };

            let mut request = client
                .get(current.as_str())
                .header(reqwest::header::USER_AGENT, identity.user_agent);
            for (name, value) in identity.headers {
                if *name == "Referer" && media_referer.is_some() {
                    continue;
                }
                request = request.header(*name, *value);
            }
            if let Some(origin) = &media_referer {
                request = request.header(reqwest::header::REFERER, origin.as_str());
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() && hops < http::MAX_REDIRECT_HOPS {
                if let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                {
                    current = current.join(location).map_err(|e| FetchError::InvalidUrl {
                        url: location.to_string(),
                        reason: e.to_string(),
                    })?;
                    hops += 1;
                    continue;
                }
            }

            let status = status.as_u16();
            let content = response.bytes().await?.to_vec();
            return Ok((
                FetchResult {
                    content,
                    status,
                    tier,
                },
                hops,
            ));
        }
    }

    /// Single bounded pass through the browser tier
    async fn run_browser_tier(&mut self, url: &Url) -> Option<FetchResult> {
        let ready_timeout = self.config.browser_ready_timeout;
        let engine = self.browser.as_mut()?;
        info!(tier = %FetchTier::BrowserAutomation, "escalating to browser automation");
        match engine.render(url, ready_timeout).await {
            Ok(source) => {
                let content = source.into_bytes();
                if has_challenge_markers(&content) {
                    warn!("browser tier still served a challenge page");
                    return None;
                }
                Some(FetchResult {
                    content,
                    status: 200,
                    tier: FetchTier::BrowserAutomation,
                })
            }
            Err(e) => {
                warn!("browser tier failed: {}", e);
                None
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        jittered(
            self.config.retry_base_delay * attempt,
            limits::BACKOFF_JITTER_FACTOR,
        )
    }
}

#[async_trait]
impl Fetch for ResilientFetcher {
    /// Escalate Direct → ChallengeSolver → BrowserAutomation (if enabled),
    /// each tier exhausting its own budget first. A hard block at the
    /// final tier is terminal for this URL.
    async fn fetch(&mut self, url: &Url) -> Result<FetchResult, FetchError> {
        if let Some(result) = self.run_http_tier(FetchTier::Direct, url).await? {
            return Ok(result);
        }
        if let Some(result) = self.run_http_tier(FetchTier::ChallengeSolver, url).await? {
            return Ok(result);
        }
        if self.browser.is_some() {
            if let Some(result) = self.run_browser_tier(url).await {
                return Ok(result);
            }
        }
        Err(FetchError::TiersExhausted {
            url: url.to_string(),
        })
    }

    /// Tear down browser and tunnel sessions
    async fn shutdown(&mut self) {
        if let Some(engine) = self.browser.as_mut() {
            engine.shutdown().await;
        }
        if let Some(tunnel) = self.tunnel.as_mut() {
            tunnel.disconnect().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick_config() -> FetcherConfig {
        FetcherConfig {
            attempts_per_tier: 2,
            retry_base_delay: Duration::from_millis(1),
            rate_limit_rps: 1000,
            challenge_solve_delay: Duration::from_millis(1),
            browser_ready_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    /// Browser stub that records invocations
    struct CountingEngine {
        calls: Arc<AtomicU32>,
        body: &'static str,
    }

    #[async_trait]
    impl BrowserEngine for CountingEngine {
        async fn render(&mut self, _url: &Url, _t: Duration) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.to_string())
        }

        async fn shutdown(&mut self) {}
    }

    struct RefusingTunnel;

    #[async_trait]
    impl TunnelSession for RefusingTunnel {
        async fn connect(&mut self) -> bool {
            false
        }
        async fn is_connected(&mut self) -> bool {
            false
        }
        async fn disconnect(&mut self) {}
    }

    struct AlwaysUpTunnel;

    #[async_trait]
    impl TunnelSession for AlwaysUpTunnel {
        async fn connect(&mut self) -> bool {
            true
        }
        async fn is_connected(&mut self) -> bool {
            true
        }
        async fn disconnect(&mut self) {}
    }

    #[tokio::test]
    async fn test_tier_escalation_reaches_browser_exactly_once() {
        // Both HTTP tiers are soft-blocked to exhaustion by a wiremock
        // server answering 429; the browser tier must run exactly once.
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let calls = Arc::new(AtomicU32::new(0));
        let mut fetcher = ResilientFetcher::new(quick_config())
            .unwrap()
            .with_browser(Box::new(CountingEngine {
                calls: calls.clone(),
                body: "<html>rendered</html>",
            }));

        let url = Url::parse(&server.uri()).unwrap();
        let result = fetcher.fetch(&url).await.unwrap();

        assert_eq!(result.tier, FetchTier::BrowserAutomation);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_browser_disabled_means_terminal_after_tier_two() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let mut fetcher = ResilientFetcher::new(quick_config()).unwrap();
        let url = Url::parse(&server.uri()).unwrap();

        let result = fetcher.fetch(&url).await;
        assert!(matches!(result, Err(FetchError::TiersExhausted { .. })));
    }

    #[tokio::test]
    async fn test_direct_success_stops_escalation() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>page</html>"))
            .mount(&server)
            .await;

        let calls = Arc::new(AtomicU32::new(0));
        let mut fetcher = ResilientFetcher::new(quick_config())
            .unwrap()
            .with_browser(Box::new(CountingEngine {
                calls: calls.clone(),
                body: "",
            }));

        let url = Url::parse(&server.uri()).unwrap();
        let result = fetcher.fetch(&url).await.unwrap();

        assert_eq!(result.tier, FetchTier::Direct);
        assert_eq!(result.status, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_runs_inside_spawned_task() {
        // A fully equipped fetcher (browser and tunnel attached) must be
        // drivable from tokio::spawn, which requires its fetch future to
        // be Send.
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>page</html>"))
            .mount(&server)
            .await;

        let mut fetcher = ResilientFetcher::new(quick_config())
            .unwrap()
            .with_browser(Box::new(CountingEngine {
                calls: Arc::new(AtomicU32::new(0)),
                body: "",
            }))
            .with_tunnel(Box::new(AlwaysUpTunnel));

        let url = Url::parse(&server.uri()).unwrap();
        let handle = tokio::spawn(async move { fetcher.fetch(&url).await });

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn test_dead_tunnel_fails_fetch_outright() {
        let mut fetcher = ResilientFetcher::new(quick_config())
            .unwrap()
            .with_tunnel(Box::new(RefusingTunnel));

        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let result = fetcher.fetch(&url).await;
        assert!(matches!(result, Err(FetchError::TunnelUnavailable)));
    }

    #[tokio::test]
    async fn test_media_requests_carry_same_origin_referer() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        // Only matches when the Referer is the server's own origin
        Mock::given(method("GET"))
            .and(path("/img/p1.jpg"))
            .and(header("Referer", format!("{}/", server.uri()).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 16]))
            .mount(&server)
            .await;

        let mut fetcher = ResilientFetcher::new(quick_config()).unwrap();
        let url = Url::parse(&format!("{}/img/p1.jpg", server.uri())).unwrap();
        let result = fetcher.fetch(&url).await.unwrap();

        assert_eq!(result.status, 200);
        assert_eq!(result.content.len(), 16);
    }

    #[test]
    fn test_jittered_stays_near_base() {
        let base = Duration::from_millis(1000);
        for _ in 0..50 {
            let d = jittered(base, 0.25);
            assert!(d >= Duration::from_millis(750));
            assert!(d <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_fetch_result_text_lossy() {
        let result = FetchResult {
            content: vec![0x68, 0x69, 0xFF],
            status: 200,
            tier: FetchTier::Direct,
        };
        assert!(result.text().starts_with("hi"));
    }
}
