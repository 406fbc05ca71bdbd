//! # mdns-discovery
//!
//! Multicast DNS (mDNS, [RFC 6762]) with DNS-based Service Discovery
//! (DNS-SD, [RFC 6763]) over IPv4 and IPv6, in a single process:
//!
//! - a **querier** that multicasts service questions on the local link,
//!   correlates the answer cascade (PTR, SRV, TXT, A/AAAA, in any order
//!   and across any number of packets) and streams assembled
//!   [`ServiceEntry`] values to the caller, and
//! - a **responder** ([`Server`]) that joins the mDNS groups, answers
//!   questions matching a locally published [`Zone`] and synthesizes
//!   the correct record set for each question type.
//!
//! ## Discovering services
//!
//! ```rust,no_run
//! use mdns_discovery::{lookup, ServiceEntry};
//! use tokio::sync::mpsc;
//!
//! # #[tokio::main]
//! # async fn main() -> mdns_discovery::Result<()> {
//! let (tx, mut rx) = mpsc::channel::<ServiceEntry>(16);
//! tokio::spawn(async move {
//!     while let Some(entry) = rx.recv().await {
//!         println!("{} -> {}:{}", entry.name, entry.host, entry.port);
//!     }
//! });
//!
//! // Collects answers for one second (the default timeout).
//! lookup("_http._tcp", tx).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Use [`QueryParams`] with [`query`] for a custom domain, timeout or
//! interface. Entry delivery never blocks: a slow consumer loses
//! entries, so read promptly or buffer generously.
//!
//! ## Publishing a service
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mdns_discovery::{MdnsService, Server, ServerConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> mdns_discovery::Result<()> {
//! let zone = MdnsService::new(
//!     "web1",        // instance
//!     "_http._tcp",  // service
//!     "",            // domain, defaults to "local"
//!     "",            // host name, defaults to the OS hostname
//!     80,
//!     None,          // address, derived per asker when None
//!     "path=/",      // TXT content
//! )?;
//!
//! let server = Server::new(ServerConfig::new(Arc::new(zone))).await?;
//! tokio::signal::ctrl_c().await?;
//! server.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Protocol details
//!
//! - Groups: `224.0.0.251:5353` and `[ff02::fb]:5353`; either address
//!   family alone is enough to operate.
//! - Queries are sent with recursion-desired false; responses are
//!   marked authoritative and unicast back to the asker (group
//!   responses are available through
//!   [`ServerConfig::with_multicast_responses`]).
//! - Synthesized records use TTL 10 and class IN.
//! - A query is a one-shot: it runs until its timeout and an empty
//!   result is a normal outcome, not an error.
//!
//! [RFC 6762]: https://tools.ietf.org/html/rfc6762
//! [RFC 6763]: https://tools.ietf.org/html/rfc6763

#![warn(rust_2018_idioms)]

pub(crate) mod client;
pub(crate) mod config;
pub(crate) mod dnssd;
pub(crate) mod error;
pub(crate) mod server;
pub(crate) mod socket;
pub(crate) mod transport;
pub(crate) mod zone;

pub use client::{lookup, query, ServiceEntry};
pub use config::{QueryParams, ServerConfig};
pub use dnssd::{parse_txt_properties, TxtProperties};
pub use error::{Error, Result};
pub use server::Server;
pub use transport::{MDNS_ADDR_V4, MDNS_ADDR_V6, MDNS_GROUP_V4, MDNS_GROUP_V6, MDNS_PORT};
pub use zone::{MdnsService, Zone};
