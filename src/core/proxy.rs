//! Proxy Resolution
//!
//! Effective proxy for a node, from its proxy configuration or the captured
//! environment, plus the no-proxy exclusion check.

use secrecy::ExposeSecret;
use url::Url;

use crate::telemetry::{Logger, TokenLogContext};
use crate::types::{EnvironmentSnapshot, NodeConfig};

/// Proxy settings applied to one request.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedProxy {
    /// Proxy URL without userinfo.
    pub url: Url,
    /// Lowercased host suffixes that bypass the proxy.
    pub no_proxy: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ResolvedProxy {
    /// Whether requests to `target` go through this proxy.
    pub fn applies_to(&self, target: &Url) -> bool {
        match target.host_str() {
            Some(host) => !self.bypasses(host),
            None => false,
        }
    }

    /// Whether `host` is exempt.
    pub fn bypasses(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.no_proxy.iter().any(|entry| {
            if entry == "*" {
                return true;
            }
            let entry = entry.trim_start_matches('.');
            !entry.is_empty()
                && (host == entry
                    || (host.len() > entry.len()
                        && host.ends_with(entry)
                        && host.as_bytes()[host.len() - entry.len() - 1] == b'.'))
        })
    }
}

impl std::fmt::Debug for ResolvedProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProxy")
            .field("url", &self.url.as_str())
            .field("no_proxy", &self.no_proxy)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Resolve the proxy for a node.
///
/// The node's proxy configuration wins over `http_proxy`/`HTTP_PROXY`. A proxy
/// URL that cannot be used is logged and ignored.
pub fn resolve_proxy(
    config: &NodeConfig,
    env: &EnvironmentSnapshot,
    logger: &dyn Logger,
) -> Option<ResolvedProxy> {
    let configured = config.proxy.as_ref().filter(|p| !p.url.trim().is_empty());

    let raw_url = match configured {
        Some(proxy) => proxy.url.trim(),
        None => env.http_proxy()?,
    };

    let context = TokenLogContext::new()
        .node_id(&config.id)
        .operation("resolve_proxy");

    let mut url = match Url::parse(raw_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => url,
        _ => {
            logger.warn(&format!("Bad proxy URL: {}", raw_url), &context);
            return None;
        }
    };

    let no_proxy = configured
        .map(|p| p.no_proxy.clone())
        .filter(|list| !list.is_empty())
        .unwrap_or_else(|| env.no_proxy())
        .into_iter()
        .map(|entry| entry.trim().to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect();

    let from_config = configured
        .and_then(|p| p.credentials.as_ref())
        .filter(|c| !c.username.is_empty());
    let (username, password) = match from_config {
        Some(creds) => (
            Some(creds.username.clone()),
            creds.password.as_ref().map(|p| p.expose_secret().clone()),
        ),
        None => (
            Some(url.username().to_string()).filter(|u| !u.is_empty()),
            url.password().map(String::from),
        ),
    };

    // Credentials travel separately; setting userinfo only fails for
    // cannot-be-a-base URLs, which were rejected above.
    let _ = url.set_username("");
    let _ = url.set_password(None);

    logger.debug(&format!("Using proxy {}", url), &context);

    Some(ResolvedProxy {
        url,
        no_proxy,
        username,
        password,
    })
}
