//! Reachability probes against targets behind the engine.
//!
//! A probe is one HEAD request with the connection pinned to an address that
//! was resolved up front through the shared cache. Pinning matters: a DPI
//! middlebox that poisons interim DNS answers must not be able to redirect
//! the connection away from the address actually under test.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::StatusCode;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;

use crate::ratelimit::RateLimiter;
use crate::resolver::ResolutionCache;
use crate::types::{ProbeResult, ProbeStatus, ProbeTarget, Protocol};

mod curl;
pub use curl::curl_supports_http3;

/// Default per-probe timeout, covering connect through response headers
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

const USER_AGENT: &str = "Mozilla";

/// Knobs shared by every probe a [`Prober`] performs
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Hard bound on one request, end to end
    pub timeout: Duration,
    /// Treat any redirect as success instead of inspecting its location
    pub accept_redirects: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
            accept_redirects: false,
        }
    }
}

/// Performs rate-limited, address-pinned reachability probes
pub struct Prober {
    config: ProbeConfig,
    limiter: Arc<RateLimiter>,
    cache: Arc<ResolutionCache>,
}

impl Prober {
    #[must_use]
    pub fn new(
        config: ProbeConfig,
        limiter: Arc<RateLimiter>,
        cache: Arc<ResolutionCache>,
    ) -> Self {
        Self {
            config,
            limiter,
            cache,
        }
    }

    /// Probe one target and classify the outcome.
    ///
    /// Never returns an error; every failure mode is folded into the
    /// [`ProbeStatus`] so callers can treat the result as data.
    pub async fn perform(&self, target: &ProbeTarget) -> ProbeResult {
        self.limiter.acquire(1).await;

        let Some(addr) = self.cache.resolve(target.host()).await else {
            return ProbeResult::new(target.host(), ProbeStatus::Unresolved, Duration::ZERO);
        };

        let (status, elapsed) = if target.protocol() == Protocol::Http3 {
            curl::perform(target, addr, &self.config).await
        } else {
            self.send_pinned(target, addr).await
        };
        log::debug!("probe {target}: {status}");
        ProbeResult::new(target.host(), status, elapsed)
    }

    async fn send_pinned(
        &self,
        target: &ProbeTarget,
        addr: IpAddr,
    ) -> (ProbeStatus, Duration) {
        let client = match self.build_client(target, addr) {
            Ok(client) => client,
            Err(e) => return (ProbeStatus::Error(e.to_string()), Duration::ZERO),
        };

        let start = Instant::now();
        let response = client.head(target.url()).send().await;
        let elapsed = start.elapsed();

        let status = match response {
            Ok(response) => {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .map(ToString::to_string);
                classify(
                    response.status(),
                    location.as_deref(),
                    target.root_domain(),
                    self.config.accept_redirects,
                )
            }
            Err(e) if e.is_timeout() => ProbeStatus::Timeout,
            Err(e) => ProbeStatus::Error(e.to_string()),
        };
        (status, elapsed)
    }

    fn build_client(
        &self,
        target: &ProbeTarget,
        addr: IpAddr,
    ) -> reqwest::Result<reqwest::Client> {
        // Port 0 tells reqwest to keep the port from the URL.
        let pinned = SocketAddr::new(addr, 0);
        let mut builder = reqwest::ClientBuilder::new()
            .user_agent(USER_AGENT)
            .redirect(Policy::none())
            .timeout(self.config.timeout)
            .resolve(target.host(), pinned);
        if let Some(tls) = target.tls() {
            let version = reqwest::tls::Version::from(tls);
            builder = builder.min_tls_version(version).max_tls_version(version);
        }
        builder.build()
    }
}

/// Map a response's status line and redirect location to a probe outcome.
///
/// HTTP 400 is singled out: servers answer it when the engine's fake
/// packets leak into the real stream. A redirect is suspicious when its
/// location is neither a relative path nor within the probed root domain,
/// or when the response carries no `Location` at all (DPI boxes inject
/// such stubs).
fn classify(
    status: StatusCode,
    location: Option<&str>,
    root_domain: &str,
    accept_redirects: bool,
) -> ProbeStatus {
    if status == StatusCode::BAD_REQUEST {
        return ProbeStatus::MalformedFakes;
    }
    if status.is_redirection() && !accept_redirects {
        match location {
            Some(location) => {
                let relative = location.starts_with('/');
                if !relative && !location.contains(root_domain) {
                    return ProbeStatus::SuspiciousRedirect(location.to_string());
                }
            }
            None => {
                return ProbeStatus::SuspiciousRedirect("<no location>".to_string());
            }
        }
    }
    if status.is_success() || status.is_redirection() {
        ProbeStatus::Ok(status)
    } else {
        ProbeStatus::Error(format!("HTTP error: {status}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DEFAULT_DNS_TTL;
    use crate::types::TlsVersion;
    use crate::mock_server;

    fn prober(config: ProbeConfig) -> Prober {
        Prober::new(
            config,
            Arc::new(RateLimiter::default()),
            Arc::new(ResolutionCache::new(DEFAULT_DNS_TTL)),
        )
    }

    fn local_target(server: &wiremock::MockServer) -> ProbeTarget {
        let addr = server.address();
        ProbeTarget::new("127.0.0.1", Protocol::Http)
            .unwrap()
            .with_port(addr.port())
    }

    #[test]
    fn test_classify_success() {
        assert_eq!(
            classify(StatusCode::OK, None, "example.com", false),
            ProbeStatus::Ok(StatusCode::OK)
        );
    }

    #[test]
    fn test_classify_bad_request_is_malformed_fakes() {
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, None, "example.com", false),
            ProbeStatus::MalformedFakes
        );
    }

    #[test]
    fn test_classify_relative_redirect_is_ok() {
        assert_eq!(
            classify(
                StatusCode::FOUND,
                Some("/forum/login.php"),
                "example.com",
                false
            ),
            ProbeStatus::Ok(StatusCode::FOUND)
        );
    }

    #[test]
    fn test_classify_same_domain_redirect_is_ok() {
        assert_eq!(
            classify(
                StatusCode::MOVED_PERMANENTLY,
                Some("https://www.example.com/"),
                "example.com",
                false
            ),
            ProbeStatus::Ok(StatusCode::MOVED_PERMANENTLY)
        );
    }

    #[test]
    fn test_classify_foreign_redirect_is_suspicious() {
        assert_eq!(
            classify(
                StatusCode::FOUND,
                Some("http://blocked.isp-notice.ru/"),
                "example.com",
                false
            ),
            ProbeStatus::SuspiciousRedirect("http://blocked.isp-notice.ru/".to_string())
        );
    }

    #[test]
    fn test_classify_redirect_without_location_is_suspicious() {
        assert!(matches!(
            classify(StatusCode::FOUND, None, "example.com", false),
            ProbeStatus::SuspiciousRedirect(_)
        ));
        assert_eq!(
            classify(StatusCode::FOUND, None, "example.com", true),
            ProbeStatus::Ok(StatusCode::FOUND)
        );
    }

    #[test]
    fn test_classify_foreign_redirect_accepted_when_configured() {
        assert_eq!(
            classify(
                StatusCode::FOUND,
                Some("http://blocked.isp-notice.ru/"),
                "example.com",
                true
            ),
            ProbeStatus::Ok(StatusCode::FOUND)
        );
    }

    #[test]
    fn test_classify_server_error_is_failure() {
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, None, "example.com", false),
            ProbeStatus::Error(_)
        ));
    }

    #[tokio::test]
    async fn test_perform_success() {
        let server = mock_server!(StatusCode::OK);
        let target = local_target(&server);

        let result = prober(ProbeConfig::default()).perform(&target).await;
        assert!(result.status.is_success());
        assert!(result.elapsed > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_perform_reports_malformed_fakes() {
        let server = mock_server!(StatusCode::BAD_REQUEST);
        let target = local_target(&server);

        let result = prober(ProbeConfig::default()).perform(&target).await;
        assert_eq!(result.status, ProbeStatus::MalformedFakes);
    }

    #[tokio::test]
    async fn test_perform_flags_suspicious_redirect() {
        let server = mock_server!(
            StatusCode::FOUND,
            insert_header("Location", "http://stub.provider.example/")
        );
        let target = local_target(&server);

        let result = prober(ProbeConfig::default()).perform(&target).await;
        assert!(matches!(
            result.status,
            ProbeStatus::SuspiciousRedirect(location)
                if location == "http://stub.provider.example/"
        ));
    }

    #[tokio::test]
    async fn test_perform_timeout() {
        let server = mock_server!(
            StatusCode::OK,
            set_delay(std::time::Duration::from_secs(5))
        );
        let target = local_target(&server);

        let config = ProbeConfig {
            timeout: Duration::from_millis(100),
            ..ProbeConfig::default()
        };
        let result = prober(config).perform(&target).await;
        assert_eq!(result.status, ProbeStatus::Timeout);
        assert!(result.status.is_timeout());
    }

    #[tokio::test]
    async fn test_perform_unresolvable_host() {
        let target =
            ProbeTarget::new("does-not-exist.invalid", Protocol::Https).unwrap();

        let result = prober(ProbeConfig::default()).perform(&target).await;
        assert_eq!(result.status, ProbeStatus::Unresolved);
    }

    #[tokio::test]
    async fn test_perform_honors_tls_pin() {
        // A TLS 1.3-only handshake against a plain-HTTP server must fail,
        // not hang; the point is that the pin reaches the client builder.
        let server = mock_server!(StatusCode::OK);
        let addr = server.address();
        let target = ProbeTarget::new("127.0.0.1", Protocol::Https)
            .unwrap()
            .with_port(addr.port())
            .with_tls(TlsVersion::V1_3);

        let result = prober(ProbeConfig::default()).perform(&target).await;
        assert!(!result.status.is_success());
    }
}
