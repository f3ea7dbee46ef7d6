//! Canonicalizing instance URLs.
//!
//! [`normalize`] turns a candidate taken from issue text into a
//! [`NormalizedUrl`] or rejects it. The steps, in order:
//!
//! 1. Split the candidate with the generic RFC 3986 grammar
//! 2. Repair a scheme-less, host-less candidate (`example.com/foo`) by
//!    re-reading it as a network path (`//example.com/foo`)
//! 3. Infer a missing scheme from the host (see [`infer_scheme`])
//! 4. Canonicalize: lower-case scheme, IDNA host, drop query and fragment,
//!    collapse a root path
//! 5. Enforce the transport policy (see [`Scheme::allowed_for`])
//! 6. Rebuild the URL with standard URI normalization
//!
//! An accepted URL is a fixed point: normalizing it again returns it
//! unchanged.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use tracing::trace;
use url::{Host, Url};

/// The two schemes an instance may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    fn parse(scheme: &str) -> Option<Self> {
        if scheme.eq_ignore_ascii_case("https") {
            Some(Scheme::Https)
        } else if scheme.eq_ignore_ascii_case("http") {
            Some(Scheme::Http)
        } else {
            None
        }
    }

    /// Transport policy.
    ///
    /// | Host | `https` | `http` |
    /// |------|---------|--------|
    /// | onion / i2p | rejected | accepted |
    /// | anything else | accepted | rejected |
    pub fn allowed_for(&self, host: &str) -> bool {
        match self {
            Scheme::Https => !is_overlay_host(host),
            Scheme::Http => is_overlay_host(host),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An accepted, canonical instance URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedUrl {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    path: String,
}

impl NormalizedUrl {
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// ASCII (IDNA) host, lower-cased. IPv6 literals keep their brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit non-default port, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Path, empty for the root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns true for `.onion` and `.i2p` hosts.
    pub fn is_overlay(&self) -> bool {
        is_overlay_host(&self.host)
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        f.write_str(&self.path)
    }
}

/// Top-level labels of overlay networks where public-CA TLS is unavailable.
const OVERLAY_TLDS: [&str; 2] = ["onion", "i2p"];

/// Returns true if the host's last label is `onion` or `i2p`.
pub fn is_overlay_host(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    host.rsplit('.')
        .next()
        .is_some_and(|tld| OVERLAY_TLDS.iter().any(|o| tld.eq_ignore_ascii_case(o)))
}

/// Scheme for a candidate that did not name one.
///
/// | Host | Scheme |
/// |------|--------|
/// | `*.onion`, `*.i2p` | `http` |
/// | anything else | `https` |
pub fn infer_scheme(host: &str) -> Scheme {
    if is_overlay_host(host) {
        Scheme::Http
    } else {
        Scheme::Https
    }
}

/// Normalizes a candidate instance URL.
///
/// Returns `None` when the candidate has no usable host, uses a scheme other
/// than `http`/`https`, or violates the transport policy. An explicit `http`
/// URL for a public host is rejected rather than upgraded.
///
/// # Examples
///
/// ```
/// use searx_instances_bot::instances::normalize;
///
/// let url = normalize("example.com/foo").unwrap();
/// assert_eq!(url.to_string(), "https://example.com/foo");
///
/// assert_eq!(normalize("http://example.onion").unwrap().to_string(), "http://example.onion");
/// assert!(normalize("https://example.onion").is_none());
/// assert!(normalize("http://example.com").is_none());
/// ```
pub fn normalize(candidate: &str) -> Option<NormalizedUrl> {
    let candidate = candidate.trim();
    let network_path;

    // Step 1
    let mut parts = UriParts::split(candidate);

    // Step 2. A bare `host:port` splits as scheme `host` with path `port`,
    // so it is not repaired here and fails the scheme check below.
    if parts.scheme.is_none() && parts.authority.is_none() && !parts.path.is_empty() {
        network_path = format!("//{}", candidate);
        parts = UriParts::split(&network_path);
    }

    let authority = Authority::parse(parts.authority?)?;

    // Step 4 runs on the host before step 3 so that inference sees the same
    // TLD the policy check does.
    let host = canonical_host(authority.host)?;

    // Step 3
    let scheme = match parts.scheme {
        Some(explicit) => Scheme::parse(explicit)?,
        None => infer_scheme(&host),
    };

    // Step 4. Query and fragment are never carried past this point.
    if parts.query.is_some() || parts.fragment.is_some() {
        trace!(candidate, "Dropping query and fragment");
    }
    let path = normalize_percent_encoding(parts.path);

    // Step 5
    if !scheme.allowed_for(&host) {
        return None;
    }

    // Step 6
    rebuild(scheme, &host, authority.port, &path)
}

// ─── Step 1: generic URI grammar ─────────────────────────────────────────────

/// RFC 3986, appendix B.
fn uri_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:([^:/?#]+):)?(?://([^/?#]*))?([^?#]*)(?:\?([^#]*))?(?:#(.*))?$")
            .expect("RFC 3986 regex")
    })
}

/// The five components of a URI reference. Only scheme, authority and path
/// survive normalization; query and fragment are recognized so that they can
/// be dropped.
#[derive(Debug, Default, PartialEq, Eq)]
struct UriParts<'a> {
    scheme: Option<&'a str>,
    authority: Option<&'a str>,
    path: &'a str,
    query: Option<&'a str>,
    fragment: Option<&'a str>,
}

impl<'a> UriParts<'a> {
    fn split(input: &'a str) -> Self {
        // The pattern matches every string, since each group is optional.
        let Some(caps) = uri_re().captures(input) else {
            return UriParts {
                path: input,
                ..UriParts::default()
            };
        };

        UriParts {
            scheme: caps.get(1).map(|m| m.as_str()),
            authority: caps.get(2).map(|m| m.as_str()),
            path: caps.get(3).map_or("", |m| m.as_str()),
            query: caps.get(4).map(|m| m.as_str()),
            fragment: caps.get(5).map(|m| m.as_str()),
        }
    }
}

/// Host and port of an authority; user-info is discarded.
#[derive(Debug, PartialEq, Eq)]
struct Authority<'a> {
    host: &'a str,
    port: Option<u16>,
}

impl<'a> Authority<'a> {
    fn parse(authority: &'a str) -> Option<Self> {
        let host_port = match authority.rsplit_once('@') {
            Some((_userinfo, rest)) => rest,
            None => authority,
        };

        let (host, port) = if host_port.starts_with('[') {
            // IP literal: "[v6]" or "[v6]:port"
            let end = host_port.find(']')?;
            let (host, rest) = host_port.split_at(end + 1);
            if rest.is_empty() {
                (host, None)
            } else {
                (host, Some(rest.strip_prefix(':')?))
            }
        } else {
            match host_port.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (host_port, None),
            }
        };

        if host.is_empty() {
            return None;
        }

        let port = match port {
            None | Some("") => None,
            Some(digits) if digits.bytes().all(|b| b.is_ascii_digit()) => Some(digits.parse().ok()?),
            Some(_) => return None,
        };

        Some(Authority { host, port })
    }
}

// ─── Step 4: canonicalization ────────────────────────────────────────────────

/// IDNA-encodes and lower-cases a host. IP literals are kept in their
/// canonical textual form.
fn canonical_host(host: &str) -> Option<String> {
    match Host::parse(host).ok()? {
        Host::Domain(domain) if domain.is_empty() => None,
        Host::Domain(domain) => Some(domain.to_ascii_lowercase()),
        ip => Some(ip.to_string()),
    }
}

/// Decodes percent-escapes of unreserved characters and upper-cases the hex
/// digits of every other escape.
fn normalize_percent_encoding(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = String::with_capacity(path.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = &path[i + 1..i + 3];
            let decoded = u8::from_str_radix(hex, 16).unwrap_or_default();
            if is_unreserved(decoded) {
                out.push(decoded as char);
            } else {
                out.push('%');
                out.push_str(&hex.to_ascii_uppercase());
            }
            i += 3;
            continue;
        }

        let ch = path[i..].chars().next().unwrap_or_default();
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

// ─── Step 6: reconstruction ──────────────────────────────────────────────────

/// Rebuilds the URL through the WHATWG parser, which removes dot-segments,
/// escapes characters that are not allowed in a path and drops default
/// ports.
fn rebuild(scheme: Scheme, host: &str, port: Option<u16>, path: &str) -> Option<NormalizedUrl> {
    let mut raw = format!("{}://{}", scheme, host);
    if let Some(port) = port {
        raw.push_str(&format!(":{}", port));
    }
    if !path.is_empty() && !path.starts_with('/') {
        raw.push('/');
    }
    raw.push_str(path);

    let url = Url::parse(&raw).ok()?;
    let host = url.host_str()?.to_string();

    let path = match url.path() {
        "" | "/" => String::new(),
        other => other.to_string(),
    };

    Some(NormalizedUrl {
        scheme,
        host,
        port: url.port(),
        path,
    })
}
