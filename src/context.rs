use crate::http_utils::{HttpClient, HttpClientError};

use futures::future::pending;
use thiserror::Error;
use tokio::sync::watch;

use std::fmt::{Debug, Formatter, Result as FormatterResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;


/// Predicate deciding whether a discovered issuer is acceptable. Called with the expected issuer
/// (the URL discovery was performed against) and the issuer reported by the provider.
pub type IssuerValidator = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Reason a network operation was abandoned before completing.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum Cancelled {
    /// The caller's cancellation signal fired.
    #[error("operation cancelled")]
    Signalled,
    /// The configured timeout elapsed.
    #[error("operation timed out")]
    TimedOut,
}

/// Per-call configuration for discovery, key lookups, and user info requests.
///
/// Every setting is optional. An empty context uses the default HTTP client, validates issuers
/// by exact comparison, and never cancels.
#[derive(Clone, Default)]
pub struct OidcContext {
    http_client: Option<Arc<dyn HttpClient>>,
    insecure_issuer: Option<String>,
    issuer_validator: Option<IssuerValidator>,
    cancellation: Option<watch::Receiver<bool>>,
    timeout: Option<Duration>,
}

impl OidcContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the HTTP client used for requests made with this context.
    pub fn set_http_client<C>(self, http_client: C) -> Self
    where
        C: HttpClient + 'static,
    {
        self.set_shared_http_client(Arc::new(http_client))
    }

    /// Overrides the HTTP client with one shared with other contexts.
    pub fn set_shared_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Expects the provider to report `issuer` instead of the URL used for discovery.
    ///
    /// # Security Warning
    ///
    /// Only use this when the discovery URL is known to differ from the canonical issuer (e.g.,
    /// due to network address rewriting). ID tokens are then verified against `issuer`.
    pub fn set_insecure_issuer<I>(mut self, issuer: I) -> Self
    where
        I: Into<String>,
    {
        self.insecure_issuer = Some(issuer.into());
        self
    }

    /// Replaces the default issuer equality check performed during discovery. Takes precedence
    /// over [`OidcContext::set_insecure_issuer`].
    pub fn set_issuer_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        self.issuer_validator = Some(Arc::new(validator));
        self
    }

    /// Abandons in-flight requests once `true` is sent on the corresponding channel.
    pub fn set_cancellation(mut self, cancellation: watch::Receiver<bool>) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Abandons each in-flight request after `timeout`. Requires a Tokio runtime with the time
    /// driver enabled.
    pub fn set_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the insecure issuer override, if any.
    pub fn insecure_issuer(&self) -> Option<&str> {
        self.insecure_issuer.as_deref()
    }

    /// Returns the custom issuer validator, if any.
    pub fn issuer_validator(&self) -> Option<&IssuerValidator> {
        self.issuer_validator.as_ref()
    }

    /// Returns the timeout applied to each request, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn http_client(&self) -> Result<Arc<dyn HttpClient>, HttpClientError> {
        match self.http_client {
            Some(ref http_client) => Ok(http_client.clone()),
            None => default_http_client(),
        }
    }

    /// Drives `future` to completion unless the cancellation signal fires or the timeout elapses
    /// first, in which case `future` is dropped.
    pub(crate) async fn run<F>(&self, future: F) -> Result<F::Output, Cancelled>
    where
        F: Future,
    {
        let cancellation = self.cancellation.clone();
        let signalled = async move {
            match cancellation {
                Some(mut receiver) => loop {
                    if *receiver.borrow_and_update() {
                        break;
                    }
                    // A dropped sender can never cancel.
                    if receiver.changed().await.is_err() {
                        pending::<()>().await;
                    }
                },
                None => pending::<()>().await,
            }
        };
        let timeout = self.timeout;
        let timed_out = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = signalled => Err(Cancelled::Signalled),
            _ = timed_out => Err(Cancelled::TimedOut),
            output = future => Ok(output),
        }
    }
}

impl Debug for OidcContext {
    fn fmt(&self, f: &mut Formatter) -> FormatterResult {
        f.debug_struct("OidcContext")
            .field("http_client", &self.http_client.as_ref().map(|_| "[custom]"))
            .field("insecure_issuer", &self.insecure_issuer)
            .field(
                "issuer_validator",
                &self.issuer_validator.as_ref().map(|_| "[custom]"),
            )
            .field("cancellation", &self.cancellation.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(feature = "reqwest")]
fn default_http_client() -> Result<Arc<dyn HttpClient>, HttpClientError> {
    // Following redirects would allow a provider to point requests at arbitrary hosts.
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map(|client| Arc::new(client) as Arc<dyn HttpClient>)
        .map_err(|err| HttpClientError::Transport(Box::new(err)))
}

#[cfg(not(feature = "reqwest"))]
fn default_http_client() -> Result<Arc<dyn HttpClient>, HttpClientError> {
    Err(HttpClientError::Other(
        "no HTTP client configured; enable the `reqwest` feature or call \
         `OidcContext::set_http_client`"
            .to_string(),
    ))
}
