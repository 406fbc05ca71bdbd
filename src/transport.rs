//! Dual-stack multicast transport.
//!
//! A [`Transport`] owns up to two UDP sockets, one per address family,
//! and moves DNS messages between them and its consumer:
//!
//! - [`send_query`](Transport::send_query) packs a message once and
//!   writes it to both group addresses; a failed write on one family is
//!   logged, not propagated.
//! - [`spawn_receivers`](Transport::spawn_receivers) starts one task
//!   per socket. Each task reads datagrams, parses them and pushes
//!   [`Inbound`] values into a single bounded channel, so the consumer
//!   sees the two sockets as one interleaved stream. Per socket,
//!   arrival order is preserved.
//! - [`close`](Transport::close) is idempotent and wakes every receiver
//!   task through a watch channel written exactly once.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use hickory_proto::op::Message;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

use crate::config::MAX_PACKET_SIZE;
use crate::error::{Error, Result};
use crate::socket::MulticastSocket;

/// The mDNS port (5353).
pub const MDNS_PORT: u16 = 5353;

/// The IPv4 mDNS group address (224.0.0.251).
pub const MDNS_GROUP_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// The IPv6 mDNS group address (ff02::fb).
pub const MDNS_GROUP_V6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

/// IPv4 destination for mDNS queries and group responses.
pub const MDNS_ADDR_V4: SocketAddr = SocketAddr::new(IpAddr::V4(MDNS_GROUP_V4), MDNS_PORT);

/// IPv6 destination for mDNS queries and group responses.
pub const MDNS_ADDR_V6: SocketAddr = SocketAddr::new(IpAddr::V6(MDNS_GROUP_V6), MDNS_PORT);

/// Which sockets to bind and which interfaces they should use.
#[derive(Debug, Clone, Default)]
pub(crate) struct BindOptions {
    pub(crate) ipv4: bool,
    pub(crate) ipv6: bool,
    pub(crate) interface_v4: Option<Ipv4Addr>,
    pub(crate) interface_v6: Option<u32>,
}

/// A parsed message and the address it came from.
pub(crate) struct Inbound {
    pub(crate) msg: Message,
    pub(crate) from: SocketAddr,
}

pub(crate) struct Transport {
    v4: Option<Arc<UdpSocket>>,
    v6: Option<Arc<UdpSocket>>,
    closed: Mutex<bool>,
    shutdown: watch::Sender<bool>,
}

impl Transport {
    /// Opens a client transport: ephemeral binds, no group membership.
    /// Responders answer the query's source port directly.
    pub(crate) fn client(options: &BindOptions) -> Result<Self> {
        Self::bind(false, options).ok_or(Error::ErrBindFailed)
    }

    /// Opens a server transport: port 5353 binds with group membership
    /// per interface.
    pub(crate) fn server(options: &BindOptions) -> Result<Self> {
        Self::bind(true, options).ok_or(Error::ErrNoListeners)
    }

    /// Binds the requested sockets. Returns `None` only when no socket
    /// could be bound at all; a single family is enough to operate.
    fn bind(server: bool, options: &BindOptions) -> Option<Self> {
        let v4 = if options.ipv4 {
            let mut builder = MulticastSocket::v4();
            if server {
                builder = builder.server();
            }
            if let Some(interface) = options.interface_v4 {
                builder = builder.with_interface_v4(interface);
            }
            Self::into_tokio(builder, "udp4")
        } else {
            None
        };

        let v6 = if options.ipv6 {
            let mut builder = MulticastSocket::v6();
            if server {
                builder = builder.server();
            }
            if let Some(index) = options.interface_v6 {
                builder = builder.with_interface_v6(index);
            }
            Self::into_tokio(builder, "udp6")
        } else {
            None
        };

        if v4.is_none() && v6.is_none() {
            return None;
        }

        let (shutdown, _) = watch::channel(false);
        Some(Self {
            v4,
            v6,
            closed: Mutex::new(false),
            shutdown,
        })
    }

    fn into_tokio(builder: MulticastSocket, family: &str) -> Option<Arc<UdpSocket>> {
        let socket = match builder.into_std() {
            Ok(socket) => socket,
            Err(err) => {
                log::error!("mdns: failed to bind to {family} port: {err}");
                return None;
            }
        };
        match UdpSocket::from_std(socket) {
            Ok(socket) => Some(Arc::new(socket)),
            Err(err) => {
                log::error!("mdns: failed to register {family} socket: {err}");
                None
            }
        }
    }

    /// Multicasts `msg` to the group address of every bound family.
    /// Send failures are logged and swallowed; only a packing failure
    /// is returned.
    pub(crate) async fn send_query(&self, msg: &Message) -> Result<()> {
        let buf = msg.to_vec()?;
        if let Some(v4) = &self.v4 {
            if let Err(err) = v4.send_to(&buf, MDNS_ADDR_V4).await {
                log::error!("mdns: failed to send query to {MDNS_ADDR_V4}: {err}");
            }
        }
        if let Some(v6) = &self.v6 {
            if let Err(err) = v6.send_to(&buf, MDNS_ADDR_V6).await {
                log::error!("mdns: failed to send query to {MDNS_ADDR_V6}: {err}");
            }
        }
        Ok(())
    }

    /// Sends a packed message to `to` over the socket of the matching
    /// address family.
    pub(crate) async fn send_to(&self, buf: &[u8], to: SocketAddr) -> Result<()> {
        let socket = match to {
            SocketAddr::V4(_) => self.v4.as_ref(),
            SocketAddr::V6(_) => self.v6.as_ref(),
        };
        if let Some(socket) = socket {
            socket.send_to(buf, to).await?;
        }
        Ok(())
    }

    /// Spawns one receiver task per bound socket, funneling parsed
    /// messages into `sink`. The tasks run until the transport closes
    /// or every receiver of `sink` goes away.
    pub(crate) fn spawn_receivers(&self, sink: mpsc::Sender<Inbound>) {
        if let Some(socket) = &self.v4 {
            spawn_recv_loop(Arc::clone(socket), sink.clone(), self.shutdown.subscribe());
        }
        if let Some(socket) = &self.v6 {
            spawn_recv_loop(Arc::clone(socket), sink, self.shutdown.subscribe());
        }
    }

    /// Signals every receiver task to exit. Idempotent; the sockets are
    /// released when the last task drops its handle.
    pub(crate) fn close(&self) {
        let mut closed = match self.closed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *closed {
            return;
        }
        *closed = true;
        self.shutdown.send_replace(true);
    }
}

fn spawn_recv_loop(
    socket: Arc<UdpSocket>,
    sink: mpsc::Sender<Inbound>,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                result = socket.recv_from(&mut buf) => {
                    let (len, from) = match result {
                        Ok(received) => received,
                        Err(err) => {
                            if *shutdown.borrow() {
                                return;
                            }
                            log::error!("mdns: socket read failed: {err}");
                            continue;
                        }
                    };
                    let msg = match Message::from_vec(&buf[..len]) {
                        Ok(msg) => msg,
                        Err(err) => {
                            log::error!("mdns: failed to unpack packet from {from}: {err}");
                            continue;
                        }
                    };
                    // The sink is bounded; keep watching for shutdown
                    // rather than parking on a full channel forever.
                    tokio::select! {
                        _ = shutdown.changed() => return,
                        result = sink.send(Inbound { msg, from }) => {
                            if result.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_constants() {
        assert_eq!(MDNS_PORT, 5353);
        assert_eq!(MDNS_ADDR_V4.to_string(), "224.0.0.251:5353");
        assert_eq!(MDNS_ADDR_V6.to_string(), "[ff02::fb]:5353");
    }

    #[tokio::test]
    async fn test_client_close_is_idempotent() {
        let options = BindOptions {
            ipv4: true,
            ipv6: true,
            ..Default::default()
        };
        let transport = Transport::client(&options).expect("client binds ephemeral ports");
        transport.close();
        transport.close();
    }

    #[tokio::test]
    async fn test_no_families_is_an_error() {
        let options = BindOptions::default();
        assert!(Transport::client(&options).is_err());
        assert!(Transport::server(&options).is_err());
    }

    #[tokio::test]
    async fn test_receivers_exit_on_close() {
        let options = BindOptions {
            ipv4: true,
            ipv6: false,
            ..Default::default()
        };
        let transport = Transport::client(&options).unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        transport.spawn_receivers(tx);
        transport.close();
        // The receiver task drops its sender once it observes shutdown.
        assert!(rx.recv().await.is_none());
    }
}
