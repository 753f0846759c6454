//! Authenticated portal session: login with retries, fetch with
//! session-expiry detection and a distinct not-found sentinel.

use anyhow::{Context, Result};
use async_trait::async_trait;
use extraction::has_session_marker;
use rand::seq::SliceRandom;
use std::time::Duration;
use tracing::{error, info, warn};

use super::retry::{jittered_sleep, ErrorClass, RetryPolicy};
use crate::errors::SessionError;
use crate::models::Credential;

/// Minimal view of an HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP transport seam (so the session logic is testable offline).
#[async_trait]
pub trait BaseHttpClient: Send + Sync {
    async fn post_login(&self, login_url: &str, id: &str, secret: &str)
        -> Result<HttpResponse>;

    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

#[async_trait]
impl<T: BaseHttpClient> BaseHttpClient for std::sync::Arc<T> {
    async fn post_login(
        &self,
        login_url: &str,
        id: &str,
        secret: &str,
    ) -> Result<HttpResponse> {
        (**self).post_login(login_url, id, secret).await
    }

    async fn get(&self, url: &str) -> Result<HttpResponse> {
        (**self).get(url).await
    }
}

/// Result of a fetch after all retries.
///
/// `NotFound` is a sentinel, not an error: the caller classifies the
/// item as "target gone" instead of "fetch failed".
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success(String),
    NotFound,
    Failed,
}

/// `reqwest`-backed client with browser impersonation and a random
/// outbound proxy from the configured pool.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(proxies: &[String]) -> Result<Self> {
        // Browser-like headers; the portal rejects obvious bots.
        let user_agent = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .context("invalid accept header")?,
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            "en-US,en;q=0.5".parse().context("invalid language header")?,
        );

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .default_headers(headers)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5));

        // One proxy per session, chosen at random from the pool.
        if let Some(proxy) = proxies.choose(&mut rand::thread_rng()) {
            builder = builder.proxy(
                reqwest::Proxy::all(format!("http://{proxy}"))
                    .with_context(|| format!("invalid proxy {proxy}"))?,
            );
        }

        let client = builder.build().context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BaseHttpClient for ReqwestClient {
    async fn post_login(
        &self,
        login_url: &str,
        id: &str,
        secret: &str,
    ) -> Result<HttpResponse> {
        let response = self
            .client
            .post(login_url)
            .json(&serde_json::json!({ "email": id, "password": secret }))
            .send()
            .await
            .context("login request failed")?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(HttpResponse { status, body })
    }

    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("page request failed")?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(HttpResponse { status, body })
    }
}

/// One worker's authenticated session against the portal.
pub struct ScraperSession<C> {
    client: C,
    credential: Credential,
    login_url: String,
    login_policy: RetryPolicy,
    fetch_policy: RetryPolicy,
}

impl<C: BaseHttpClient> ScraperSession<C> {
    pub fn new(client: C, credential: Credential, login_url: String) -> Self {
        Self::with_policies(
            client,
            credential,
            login_url,
            RetryPolicy::login(),
            RetryPolicy::fetch(),
        )
    }

    pub fn with_policies(
        client: C,
        credential: Credential,
        login_url: String,
        login_policy: RetryPolicy,
        fetch_policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            credential,
            login_url,
            login_policy,
            fetch_policy,
        }
    }

    pub fn credential_id(&self) -> &str {
        &self.credential.id
    }

    /// Authenticate, retrying with a jittered pause before each
    /// attempt. Exhaustion is fatal for this worker run.
    pub async fn login(&self) -> Result<(), SessionError> {
        for attempt in 1..=self.login_policy.max_attempts {
            jittered_sleep(self.login_policy.delay_min, self.login_policy.delay_max).await;
            match self
                .client
                .post_login(&self.login_url, &self.credential.id, &self.credential.secret)
                .await
            {
                Ok(response) if response.is_success() => {
                    info!(credential = %self.credential.id, "login successful");
                    return Ok(());
                }
                Ok(response) => {
                    warn!(
                        credential = %self.credential.id,
                        status = response.status,
                        attempt,
                        "login rejected"
                    );
                }
                Err(e) => {
                    warn!(credential = %self.credential.id, attempt, error = %e, "login error");
                }
            }
        }
        error!(credential = %self.credential.id, "login attempts exhausted");
        Err(SessionError::AuthExhausted {
            credential_id: self.credential.id.clone(),
            attempts: self.login_policy.max_attempts,
        })
    }

    /// Fetch a page within the authenticated session.
    ///
    /// A 2xx body missing the account marker means the session
    /// silently expired: re-authenticate and retry the same url
    /// without burning the outcome. 404 short-circuits to the
    /// `NotFound` sentinel.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        for _ in 0..self.fetch_policy.max_attempts {
            let class = match self.client.get(url).await {
                Ok(response) if response.is_success() => {
                    if has_session_marker(&response.body) {
                        return FetchOutcome::Success(response.body);
                    }
                    warn!(url, "session marker missing, re-authenticating");
                    if self.login().await.is_err() {
                        return FetchOutcome::Failed;
                    }
                    ErrorClass::SessionExpired
                }
                Ok(response) if response.status == 404 => ErrorClass::NotFound,
                Ok(response) => {
                    warn!(url, status = response.status, "fetch rejected");
                    ErrorClass::ServerStatus
                }
                Err(e) => {
                    warn!(url, error = %e, "fetch error");
                    ErrorClass::Transport
                }
            };

            if !self.fetch_policy.retryable(class) {
                return FetchOutcome::NotFound;
            }
            if class != ErrorClass::SessionExpired {
                jittered_sleep(self.fetch_policy.delay_min, self.fetch_policy.delay_max)
                    .await;
            }
        }
        FetchOutcome::Failed
    }
}


#[cfg(test)]
mod tests {
    use super::test_client::{marked, MockHttpClient};
    use super::*;

    fn session(client: MockHttpClient) -> ScraperSession<MockHttpClient> {
        ScraperSession::with_policies(
            client,
            Credential::new("worker@example.com", "secret"),
            "https://portal.example.com/sessions".to_string(),
            RetryPolicy::immediate(10),
            RetryPolicy::immediate(10),
        )
    }

    #[tokio::test]
    async fn login_retries_until_accepted() {
        let session = session(
            MockHttpClient::new().with_login_statuses(vec![500, 500, 201]),
        );
        assert!(session.login().await.is_ok());
    }

    #[tokio::test]
    async fn login_exhaustion_is_fatal() {
        let session = session(MockHttpClient::new().with_login_statuses(vec![403]));
        let err = session.login().await.unwrap_err();
        assert!(matches!(err, SessionError::AuthExhausted { attempts: 10, .. }));
    }

    #[tokio::test]
    async fn fetch_returns_not_found_sentinel() {
        let session = session(MockHttpClient::new().with_page(
            "https://p/org/gone",
            vec![HttpResponse {
                status: 404,
                body: String::new(),
            }],
        ));
        assert!(matches!(
            session.fetch("https://p/org/gone").await,
            FetchOutcome::NotFound
        ));
    }

    #[tokio::test]
    async fn missing_marker_triggers_relogin_and_retry() {
        let client = MockHttpClient::new().with_page(
            "https://p/org/acme",
            vec![
                HttpResponse {
                    status: 200,
                    body: "<html><body>logged out</body></html>".to_string(),
                },
                HttpResponse {
                    status: 200,
                    body: marked("profile"),
                },
            ],
        );
        let session = session(client);

        let outcome = session.fetch("https://p/org/acme").await;
        assert!(matches!(outcome, FetchOutcome::Success(_)));
        // Initial body lacked the marker, so exactly one re-login ran
        assert_eq!(session.client.login_calls(), 1);
        assert_eq!(session.client.get_calls().len(), 2);
    }

    #[tokio::test]
    async fn fetch_exhaustion_returns_failed() {
        let session = session(MockHttpClient::new().with_page(
            "https://p/org/bad",
            vec![HttpResponse {
                status: 503,
                body: String::new(),
            }],
        ));
        assert!(matches!(
            session.fetch("https://p/org/bad").await,
            FetchOutcome::Failed
        ));
        assert_eq!(session.client.get_calls().len(), 10);
    }
}
