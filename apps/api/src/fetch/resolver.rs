//! Connect-time DNS resolver that applies the same `BlockList` as the URL gate.
//!
//! The gate resolves a hostname before each request; the HTTP client resolves
//! it again when it opens the connection. Filtering here closes the window in
//! which a hostile DNS server could answer differently the second time.

use std::error::Error as StdError;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use thiserror::Error;
use tracing::warn;

use crate::fetch::guard::BlockList;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Raised from inside the HTTP client's connector; recovered by walking the
/// `reqwest::Error` source chain.
#[derive(Debug, Error)]
#[error("host '{host}' resolved to blocked address {addr} at connect time")]
pub struct BlockedAtConnect {
    pub host: String,
    pub addr: IpAddr,
}

pub struct GuardedResolver {
    blocklist: Arc<BlockList>,
}

impl GuardedResolver {
    pub fn new(blocklist: Arc<BlockList>) -> Self {
        Self { blocklist }
    }
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(resolve_checked(
            self.blocklist.clone(),
            name.as_str().to_string(),
        ))
    }
}

async fn resolve_checked(blocklist: Arc<BlockList>, host: String) -> Result<Addrs, BoxError> {
    // Port is replaced by the connector.
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0)).await?.collect();

    if let Some(addr) = blocklist.first_blocked(addrs.iter().copied()) {
        warn!(target: "security", %host, %addr, "blocked address at connect time");
        return Err(Box::new(BlockedAtConnect { host, addr }));
    }

    Ok(Box::new(addrs.into_iter()))
}

/// Finds a `BlockedAtConnect` anywhere in an error's source chain.
pub fn find_blocked<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a BlockedAtConnect> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(blocked) = e.downcast_ref::<BlockedAtConnect>() {
            return Some(blocked);
        }
        current = e.source();
    }
    None
}
