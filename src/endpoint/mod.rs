//! Mapping of container-internal ports to externally reachable endpoints.
//!
//! The container runtime only assigns host ports once a container has been
//! started with all ports published. This module turns those bindings into an
//! [`Endpoint`] a test can dial. When the runtime reports a wildcard bind
//! address the host portion of the runtime's own address is substituted, since
//! `0.0.0.0` is not dialable from a remote client.
//!
//! Everything here is a pure function of its inputs.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::engine::ContainerHandle;
use crate::error::EndpointError;

/// Schemes whose authority is a filesystem path rather than a host.
const SOCKET_SCHEMES: &[&str] = &["unix", "npipe"];

/// A single host binding reported by the runtime for an internal port.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostBinding {
    /// The host interface the port is bound on. Empty means all interfaces.
    pub host_ip: String,

    /// The host port assigned by the runtime.
    pub host_port: String,
}

impl HostBinding {
    /// Create a binding from its host address and port.
    #[must_use]
    pub fn new(host_ip: impl Into<String>, host_port: impl Into<String>) -> Self {
        Self {
            host_ip: host_ip.into(),
            host_port: host_port.into(),
        }
    }
}

/// Published bindings keyed by internal port spec (e.g. `6379/tcp`).
///
/// Entries keep the order reported by the runtime.
pub type PortBindings = BTreeMap<String, Vec<HostBinding>>;

/// A parsed bind host, distinguishing the unspecified address from a usable
/// one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAddress {
    /// The runtime bound on every interface (`0.0.0.0`, `::` or empty).
    Wildcard,

    /// A concrete IP address or host name.
    Concrete(String),
}

impl HostAddress {
    /// Classify a host string reported by the runtime.
    #[must_use]
    pub fn parse(host: &str) -> Self {
        let trimmed = host.trim();
        if trimmed.is_empty() {
            return Self::Wildcard;
        }

        match trimmed.parse::<IpAddr>() {
            Ok(ip) if ip.is_unspecified() => Self::Wildcard,
            _ => Self::Concrete(String::from(trimmed)),
        }
    }

    /// Render the address as a host string.
    ///
    /// The wildcard renders as `0.0.0.0`, which a client on the same host
    /// interprets as any local interface.
    #[must_use]
    pub fn as_host(&self) -> &str {
        match self {
            Self::Wildcard => "0.0.0.0",
            Self::Concrete(host) => host,
        }
    }
}

/// An externally reachable `host:port` pair for a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: String,
}

impl Endpoint {
    /// Create an endpoint from a host and port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
        }
    }

    /// Parse a `host:port` or `[v6]:port` address.
    ///
    /// Returns `None` when no port separator is present.
    #[must_use]
    pub fn parse(address: &str) -> Option<Self> {
        split_host_port(address.trim()).map(|(host, port)| Self::new(host, port))
    }

    /// Return the host portion.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Return the port portion.
    #[must_use]
    pub fn port(&self) -> &str {
        &self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Resolve the external endpoint for `internal_port` on a started container.
///
/// See [`resolve_bindings`] for the selection and substitution rules.
///
/// # Errors
///
/// Returns `EndpointError::PortNotPublished` when the container has no
/// binding for `internal_port`, and `EndpointError::NoBindingEntries` when the
/// binding list is empty.
pub fn resolve(
    handle: &ContainerHandle,
    internal_port: &str,
    runtime_host_hint: Option<&str>,
) -> Result<Endpoint, EndpointError> {
    resolve_bindings(handle.port_bindings(), internal_port, runtime_host_hint)
}

/// Resolve the external endpoint for `internal_port` from raw bindings.
///
/// The first binding entry is used. A wildcard bind host is replaced by the
/// host of `runtime_host_hint` when the hint parses as `host:port` or as a URL
/// with a network authority; otherwise the wildcard is returned unchanged.
///
/// # Errors
///
/// Returns `EndpointError::PortNotPublished` when `bindings` has no entry for
/// `internal_port`, and `EndpointError::NoBindingEntries` when the entry list
/// is empty or its first entry carries no host port.
pub fn resolve_bindings(
    bindings: &PortBindings,
    internal_port: &str,
    runtime_host_hint: Option<&str>,
) -> Result<Endpoint, EndpointError> {
    let entries = bindings
        .get(internal_port)
        .ok_or_else(|| EndpointError::PortNotPublished {
            port: String::from(internal_port),
        })?;

    let binding = entries
        .first()
        .filter(|binding| !binding.host_port.trim().is_empty())
        .ok_or_else(|| EndpointError::NoBindingEntries {
            port: String::from(internal_port),
        })?;

    let host = match HostAddress::parse(&binding.host_ip) {
        HostAddress::Wildcard => runtime_host_hint
            .and_then(hint_host)
            .unwrap_or(HostAddress::Wildcard),
        concrete @ HostAddress::Concrete(_) => concrete,
    };

    Ok(Endpoint::new(host.as_host(), binding.host_port.trim()))
}

/// Extract the host portion of a runtime address hint.
///
/// Accepts `host:port`, `[v6]:port` and `scheme://host[:port][/path]`. Socket
/// schemes carry no network host and yield `None`.
#[must_use]
pub fn hint_host(hint: &str) -> Option<HostAddress> {
    let trimmed = hint.trim();

    if let Ok(addr) = trimmed.parse::<SocketAddr>() {
        return Some(HostAddress::parse(&addr.ip().to_string()));
    }

    let authority = match trimmed.split_once("://") {
        Some((scheme, _)) if SOCKET_SCHEMES.contains(&scheme) => return None,
        Some((_, rest)) => rest.split('/').next().unwrap_or_default(),
        None => trimmed,
    };

    let host_part = split_host_port(authority).map_or(authority, |(host, _)| host);
    let bare_host = host_part.trim_start_matches('[').trim_end_matches(']');
    if bare_host.is_empty() || bare_host.contains('/') {
        return None;
    }

    Some(HostAddress::parse(bare_host))
}

fn split_host_port(address: &str) -> Option<(&str, &str)> {
    if let Some(rest) = address.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port = after.strip_prefix(':')?;
        return (!port.is_empty()).then_some((host, port));
    }

    let (host, port) = address.rsplit_once(':')?;
    if host.contains(':') || port.is_empty() {
        return None;
    }
    Some((host, port))
}
