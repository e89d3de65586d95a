use crate::config::{DialectConfig, Network, TargetConfig};
use http::Uri;
use http::uri::InvalidUri;
use std::net::IpAddr;
use url::{Host, Url};

const INTERNAL_SUFFIXES: &[&str] = &[".internal", ".local", ".svc", ".cluster.local", ".lan"];

/// A mounted upstream: requests under `prefix` are forwarded to `upstream`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProxyTarget {
    prefix: String,
    upstream: Url,
    network: Network,
    dialect: DialectConfig,
}

impl ProxyTarget {
    pub fn new(config: &TargetConfig) -> Self {
        let network = config
            .network
            .unwrap_or_else(|| infer_network(&config.upstream));

        ProxyTarget {
            prefix: config.prefix.trim_end_matches('/').to_string(),
            upstream: config.upstream.clone(),
            network,
            dialect: config.dialect.clone(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn upstream(&self) -> &Url {
        &self.upstream
    }

    /// The part of `path` after the mount prefix, if this target serves it.
    fn strip_prefix<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(&self.prefix)?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// Rewrites the path below the mount prefix into the upstream's dialect.
    /// Internal upstreams receive it unchanged.
    pub fn translate_path(&self, remainder: &str) -> String {
        let remainder = if remainder.is_empty() { "/" } else { remainder };

        let translated = match self.network {
            Network::Internal => remainder.to_string(),
            Network::External => match remainder.strip_prefix(self.dialect.from.as_str()) {
                Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                    format!("{}{rest}", self.dialect.to)
                }
                _ => remainder.to_string(),
            },
        };

        format!("{}{translated}", self.upstream.path().trim_end_matches('/'))
    }

    /// Full upstream URI for a request path below the mount prefix.
    pub fn upstream_uri(&self, remainder: &str, query: Option<&str>) -> Result<Uri, InvalidUri> {
        let mut uri = format!(
            "{}://{}{}",
            self.upstream.scheme(),
            authority(&self.upstream),
            self.translate_path(remainder)
        );
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            uri.push('?');
            uri.push_str(query);
        }
        uri.parse()
    }
}

fn authority(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

/// Upstreams reachable on private addresses or cluster DNS are internal.
pub fn infer_network(upstream: &Url) -> Network {
    let internal = match upstream.host() {
        Some(Host::Ipv4(ip)) => is_private_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_private_ip(IpAddr::V6(ip)),
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost"
                || !domain.contains('.')
                || INTERNAL_SUFFIXES.iter().any(|s| domain.ends_with(s))
        }
        None => false,
    };

    if internal {
        Network::Internal
    } else {
        Network::External
    }
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Removes every `name=...` pair from a raw query string, leaving the others
/// byte-for-byte intact.
pub fn strip_query_param(query: &str, name: &str) -> Option<String> {
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split_once('=').map_or(*pair, |(k, _)| k);
            url::form_urlencoded::parse(key.as_bytes())
                .next()
                .is_none_or(|(k, _)| k != name)
        })
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("&"))
    }
}

/// All mounted targets, matched longest prefix first.
pub struct Targets {
    targets: Vec<ProxyTarget>,
}

impl Targets {
    pub fn new(configs: &[TargetConfig]) -> Self {
        let mut targets: Vec<ProxyTarget> = configs.iter().map(ProxyTarget::new).collect();
        targets.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        for target in &targets {
            tracing::info!(
                prefix = %target.prefix,
                upstream = %target.upstream,
                network = ?target.network,
                "mounted upstream"
            );
        }
        Targets { targets }
    }

    pub fn resolve<'a>(&self, path: &'a str) -> Option<(&ProxyTarget, &'a str)> {
        self.targets
            .iter()
            .find_map(|target| target.strip_prefix(path).map(|rest| (target, rest)))
    }
}
