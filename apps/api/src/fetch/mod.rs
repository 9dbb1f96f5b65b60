//! Safe URL Fetcher: fetches a caller-supplied URL without becoming an SSRF vector.
//!
//! Every hop (the initial URL and each redirect target) passes through
//! `UrlGate::admit` before a request is sent. Redirects are followed here, never
//! by reqwest. The body is streamed through a byte counter and the transfer is
//! dropped as soon as the cap is crossed.

pub mod guard;
mod resolver;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use reqwest::{header, redirect, Client};
use thiserror::Error;
use tracing::{debug, warn};
use url::{Host, Url};

use crate::fetch::guard::BlockList;
use crate::fetch::resolver::{find_blocked, GuardedResolver};

const USER_AGENT: &str = "Mozilla/5.0 (CoverBot/1.0)";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("scheme '{0}' is not allowed; only http and https URLs can be fetched")]
    InvalidScheme(String),

    #[error("host '{host}' resolves to blocked address {addr}")]
    BlockedHost { host: String, addr: IpAddr },

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("response exceeds the {limit}-byte limit")]
    TooLarge { limit: usize },

    #[error("gave up after {0} redirects")]
    TooManyRedirects(usize),

    #[error("fetch failed: {0}")]
    Upstream(String),
}

/// Outcome of a successful fetch. Lives only as long as the fetch+reduce step.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub final_url: Url,
    pub status: u16,
    pub redirects: usize,
    pub elapsed: Duration,
}

/// Limits applied to every fetch.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub max_bytes: usize,
    pub timeout: Duration,
    pub max_redirects: usize,
    pub blocklist: BlockList,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 2 * 1024 * 1024,
            timeout: Duration::from_secs(10),
            max_redirects: 3,
            blocklist: BlockList::default(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Gate
// ────────────────────────────────────────────────────────────────────────────

/// The single admission check for fetch targets.
#[derive(Debug, Clone)]
pub struct UrlGate {
    blocklist: Arc<BlockList>,
}

impl UrlGate {
    pub fn new(blocklist: Arc<BlockList>) -> Self {
        Self { blocklist }
    }

    /// Scheme check only. Runs before anything touches the network.
    pub fn check_scheme(url: &Url) -> Result<(), FetchError> {
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(FetchError::InvalidScheme(other.to_string())),
        }
    }

    /// Pure verdict over already-resolved addresses.
    pub fn judge(&self, host: &str, addrs: &[SocketAddr]) -> Result<(), FetchError> {
        match self.blocklist.first_blocked(addrs.iter().copied()) {
            Some(addr) => Err(FetchError::BlockedHost {
                host: host.to_string(),
                addr,
            }),
            None => Ok(()),
        }
    }

    /// Scheme check, resolution, then `judge`. IP-literal hosts skip DNS.
    pub async fn admit(&self, url: &Url) -> Result<(), FetchError> {
        Self::check_scheme(url)?;

        let host = url
            .host()
            .ok_or_else(|| FetchError::InvalidUrl(format!("'{url}' has no host")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| FetchError::InvalidUrl(format!("'{url}' has no port")))?;

        let (name, addrs) = match host {
            Host::Ipv4(v4) => (v4.to_string(), vec![SocketAddr::new(IpAddr::V4(v4), port)]),
            Host::Ipv6(v6) => (v6.to_string(), vec![SocketAddr::new(IpAddr::V6(v6), port)]),
            Host::Domain(domain) => {
                let addrs: Vec<SocketAddr> = tokio::net::lookup_host((domain, port))
                    .await
                    .map_err(|e| FetchError::Upstream(format!("cannot resolve '{domain}': {e}")))?
                    .collect();
                (domain.to_string(), addrs)
            }
        };

        if addrs.is_empty() {
            return Err(FetchError::Upstream(format!(
                "'{name}' resolved to no addresses"
            )));
        }

        self.judge(&name, &addrs)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fetcher
// ────────────────────────────────────────────────────────────────────────────

/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct SafeFetcher {
    client: Client,
    gate: UrlGate,
    max_bytes: usize,
    max_redirects: usize,
    timeout: Duration,
}

impl SafeFetcher {
    pub fn new(policy: FetchPolicy) -> Result<Self, reqwest::Error> {
        let blocklist = Arc::new(policy.blocklist);
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .dns_resolver(Arc::new(GuardedResolver::new(blocklist.clone())))
            .no_proxy()
            .connect_timeout(policy.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            gate: UrlGate::new(blocklist),
            max_bytes: policy.max_bytes,
            max_redirects: policy.max_redirects,
            timeout: policy.timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetches with the configured timeout.
    pub async fn fetch(&self, raw_url: &str) -> Result<FetchResult, FetchError> {
        self.fetch_with_timeout(raw_url, self.timeout).await
    }

    /// Fetches under an explicit overall deadline covering every hop. Dropping
    /// the returned future drops the in-flight connection.
    pub async fn fetch_with_timeout(
        &self,
        raw_url: &str,
        timeout: Duration,
    ) -> Result<FetchResult, FetchError> {
        let raw_url = raw_url.trim();
        if raw_url.is_empty() {
            return Err(FetchError::InvalidUrl("URL is empty".to_string()));
        }
        let url = Url::parse(raw_url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        UrlGate::check_scheme(&url)?;

        let started = Instant::now();
        match tokio::time::timeout(timeout, self.follow(url, started, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    }

    async fn follow(
        &self,
        mut url: Url,
        started: Instant,
        timeout: Duration,
    ) -> Result<FetchResult, FetchError> {
        let mut redirects = 0usize;

        loop {
            self.gate.admit(&url).await?;

            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| map_send_error(e, timeout))?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned)
                    .ok_or_else(|| {
                        FetchError::Upstream(format!("{url} returned {status} without a Location"))
                    })?;

                if redirects >= self.max_redirects {
                    return Err(FetchError::TooManyRedirects(self.max_redirects));
                }
                redirects += 1;

                let next = url
                    .join(&location)
                    .map_err(|e| FetchError::InvalidUrl(format!("bad redirect target: {e}")))?;
                debug!(from = %url, to = %next, hop = redirects, "following redirect");
                url = next;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::Upstream(format!("{url} returned HTTP {status}")));
            }

            if let Some(declared) = response.content_length() {
                if declared > self.max_bytes as u64 {
                    warn!(%url, declared, limit = self.max_bytes, "declared body over limit");
                    return Err(FetchError::TooLarge {
                        limit: self.max_bytes,
                    });
                }
            }

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);

            let body = read_capped(response, self.max_bytes, timeout).await?;

            debug!(
                final_url = %url,
                bytes = body.len(),
                redirects,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "fetch complete"
            );

            return Ok(FetchResult {
                body,
                content_type,
                final_url: url,
                status: status.as_u16(),
                redirects,
                elapsed: started.elapsed(),
            });
        }
    }
}

fn map_send_error(err: reqwest::Error, timeout: Duration) -> FetchError {
    if let Some(blocked) = find_blocked(&err) {
        return FetchError::BlockedHost {
            host: blocked.host.clone(),
            addr: blocked.addr,
        };
    }
    if err.is_timeout() {
        return FetchError::Timeout(timeout);
    }
    FetchError::Upstream(err.to_string())
}

/// Streams the body, bailing out the moment the running total passes `limit`.
async fn read_capped(
    mut response: reqwest::Response,
    limit: usize,
    timeout: Duration,
) -> Result<Bytes, FetchError> {
    let mut body = CappedBuffer::new(limit);
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| map_send_error(e, timeout))?
    {
        body.push(&chunk)?;
    }
    Ok(body.finish())
}

/// Byte accumulator that refuses to grow past its limit.
#[derive(Debug)]
pub(crate) struct CappedBuffer {
    buf: BytesMut,
    limit: usize,
}

impl CappedBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            limit,
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<(), FetchError> {
        if self.buf.len() + chunk.len() > self.limit {
            return Err(FetchError::TooLarge { limit: self.limit });
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    pub(crate) fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
