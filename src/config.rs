//! Configuration for mDNS queries and servers.
//!
//! [`QueryParams`] customizes a one-shot service lookup and
//! [`ServerConfig`] customizes a responder. Both use the builder pattern:
//!
//! ```rust
//! use std::time::Duration;
//! use mdns_discovery::QueryParams;
//!
//! let params = QueryParams::new("_http._tcp")
//!     .with_domain("local")
//!     .with_timeout(Duration::from_millis(500));
//! ```

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::client::ServiceEntry;
use crate::transport::BindOptions;
use crate::zone::Zone;

/// TTL applied to every record synthesized by a zone (10 seconds).
pub(crate) const DEFAULT_TTL: u32 = 10;

/// Default lookup timeout (1 second).
pub(crate) const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(1);

/// Default lookup domain.
pub(crate) const DEFAULT_DOMAIN: &str = "local";

/// Receive buffer size, large enough for any UDP datagram.
pub(crate) const MAX_PACKET_SIZE: usize = 65536;

/// Capacity of the channel funneling received messages to a consumer.
pub(crate) const INBOUND_CHANNEL_CAPACITY: usize = 32;

/// Parameters for a one-shot service lookup.
///
/// Defaults: domain `local`, timeout 1 second, both address families
/// enabled, no multicast interface override, no entries sink.
///
/// Without an entries sink the query still runs (and still sends
/// follow-up questions), but completed entries are not delivered
/// anywhere. Attach a sink with [`with_entries`](Self::with_entries).
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use mdns_discovery::{QueryParams, ServiceEntry};
/// use tokio::sync::mpsc;
///
/// let (tx, _rx) = mpsc::channel::<ServiceEntry>(8);
/// let params = QueryParams::new("_foobar._tcp")
///     .with_timeout(Duration::from_millis(50))
///     .with_ipv6(false)
///     .with_entries(tx);
/// ```
#[derive(Clone, Debug)]
pub struct QueryParams {
    /// Service to look up, e.g. `_http._tcp`.
    pub(crate) service: String,

    /// Lookup domain. Empty means `local`.
    pub(crate) domain: String,

    /// How long to collect answers before the query returns.
    /// Zero means the 1 second default.
    pub(crate) timeout: Duration,

    /// IPv4 address of the interface multicast queries should leave
    /// through. `None` uses the system default route.
    pub(crate) interface_v4: Option<Ipv4Addr>,

    /// Interface index for IPv6 multicast egress. `None` uses the
    /// system default.
    pub(crate) interface_v6: Option<u32>,

    /// Whether to bind an IPv4 socket.
    pub(crate) ipv4: bool,

    /// Whether to bind an IPv6 socket.
    pub(crate) ipv6: bool,

    /// Sink for discovered entries. Sends never block; a slow consumer
    /// loses entries, so size the channel generously or drain it.
    pub(crate) entries: Option<mpsc::Sender<ServiceEntry>>,
}

impl QueryParams {
    /// Creates lookup parameters for `service` with all defaults.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            domain: DEFAULT_DOMAIN.to_string(),
            timeout: DEFAULT_QUERY_TIMEOUT,
            interface_v4: None,
            interface_v6: None,
            ipv4: true,
            ipv6: true,
            entries: None,
        }
    }

    /// Sets the lookup domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Sets how long the query collects answers before returning.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends multicast queries out of the interface with this IPv4
    /// address instead of the system default.
    pub fn with_interface_v4(mut self, interface: Ipv4Addr) -> Self {
        self.interface_v4 = Some(interface);
        self
    }

    /// Sends IPv6 multicast queries out of the interface with this
    /// index instead of the system default.
    pub fn with_interface_v6(mut self, index: u32) -> Self {
        self.interface_v6 = Some(index);
        self
    }

    /// Enables or disables the IPv4 socket. Disabling both families is
    /// a construction error.
    pub fn with_ipv4(mut self, enabled: bool) -> Self {
        self.ipv4 = enabled;
        self
    }

    /// Enables or disables the IPv6 socket.
    pub fn with_ipv6(mut self, enabled: bool) -> Self {
        self.ipv6 = enabled;
        self
    }

    /// Attaches the sink that receives discovered [`ServiceEntry`]s.
    pub fn with_entries(mut self, entries: mpsc::Sender<ServiceEntry>) -> Self {
        self.entries = Some(entries);
        self
    }

    pub(crate) fn bind_options(&self) -> BindOptions {
        BindOptions {
            ipv4: self.ipv4,
            ipv6: self.ipv6,
            interface_v4: self.interface_v4,
            interface_v6: self.interface_v6,
        }
    }
}

/// Configuration for an mDNS server.
///
/// A server needs a [`Zone`] to answer questions from; everything else
/// has defaults. By default it binds both address families on every
/// non-loopback interface and answers with unicast replies to the
/// asker.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use mdns_discovery::{MdnsService, Server, ServerConfig};
///
/// # #[tokio::main]
/// # async fn main() -> mdns_discovery::Result<()> {
/// let zone = MdnsService::new("office-printer", "_ipp._tcp", "", "", 631, None, "rp=ipp/print")?;
/// let server = Server::new(ServerConfig::new(Arc::new(zone))).await?;
/// // ... later
/// server.shutdown();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ServerConfig {
    /// Zone consulted for every incoming question.
    pub(crate) zone: Arc<dyn Zone>,

    /// IPv4 address of the interface to serve on. `None` serves on all
    /// multicast-capable interfaces.
    pub(crate) interface_v4: Option<Ipv4Addr>,

    /// Interface index to serve IPv6 on. `None` serves on all.
    pub(crate) interface_v6: Option<u32>,

    /// Whether to bind an IPv4 socket.
    pub(crate) ipv4: bool,

    /// Whether to bind an IPv6 socket.
    pub(crate) ipv6: bool,

    /// When true, responses are multicast to the group instead of
    /// unicast back to the asker. The unicast default matches common
    /// in-the-wild behavior; the group responses follow RFC 6762 more
    /// strictly and let passive listeners cache answers.
    pub(crate) multicast_responses: bool,
}

impl ServerConfig {
    /// Creates a server configuration serving `zone` with all defaults.
    pub fn new(zone: Arc<dyn Zone>) -> Self {
        Self {
            zone,
            interface_v4: None,
            interface_v6: None,
            ipv4: true,
            ipv6: true,
            multicast_responses: false,
        }
    }

    /// Serves only on the interface with this IPv4 address.
    pub fn with_interface_v4(mut self, interface: Ipv4Addr) -> Self {
        self.interface_v4 = Some(interface);
        self
    }

    /// Serves IPv6 only on the interface with this index.
    pub fn with_interface_v6(mut self, index: u32) -> Self {
        self.interface_v6 = Some(index);
        self
    }

    /// Enables or disables the IPv4 socket. Disabling both families is
    /// a construction error.
    pub fn with_ipv4(mut self, enabled: bool) -> Self {
        self.ipv4 = enabled;
        self
    }

    /// Enables or disables the IPv6 socket.
    pub fn with_ipv6(mut self, enabled: bool) -> Self {
        self.ipv6 = enabled;
        self
    }

    /// Multicasts responses to the mDNS group instead of answering the
    /// asker directly.
    pub fn with_multicast_responses(mut self, enabled: bool) -> Self {
        self.multicast_responses = enabled;
        self
    }

    pub(crate) fn bind_options(&self) -> BindOptions {
        BindOptions {
            ipv4: self.ipv4,
            ipv6: self.ipv6,
            interface_v4: self.interface_v4,
            interface_v6: self.interface_v6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_defaults() {
        let params = QueryParams::new("_http._tcp");
        assert_eq!(params.service, "_http._tcp");
        assert_eq!(params.domain, DEFAULT_DOMAIN);
        assert_eq!(params.timeout, DEFAULT_QUERY_TIMEOUT);
        assert!(params.ipv4);
        assert!(params.ipv6);
        assert!(params.interface_v4.is_none());
        assert!(params.entries.is_none());
    }

    #[test]
    fn test_query_params_builder() {
        let params = QueryParams::new("_http._tcp")
            .with_domain("lan")
            .with_timeout(Duration::from_millis(250))
            .with_interface_v4(Ipv4Addr::new(192, 168, 1, 2))
            .with_ipv6(false);
        assert_eq!(params.domain, "lan");
        assert_eq!(params.timeout, Duration::from_millis(250));
        assert_eq!(params.interface_v4, Some(Ipv4Addr::new(192, 168, 1, 2)));
        assert!(!params.ipv6);

        let opts = params.bind_options();
        assert!(opts.ipv4);
        assert!(!opts.ipv6);
        assert_eq!(opts.interface_v4, Some(Ipv4Addr::new(192, 168, 1, 2)));
    }
}
