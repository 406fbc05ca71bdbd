//! Multicast UDP socket construction.
//!
//! [`MulticastSocket`] is a builder over `socket2` that produces the
//! configured `std::net::UdpSocket`s the transport converts to tokio
//! sockets. Two modes exist:
//!
//! - *client*: an ephemeral wildcard bind with no group membership.
//!   Responders answer the source port directly, so no join is needed.
//! - *server*: a port 5353 bind with `SO_REUSEADDR`/`SO_REUSEPORT` and
//!   group membership on the chosen interface, or on every non-loopback
//!   interface when none is given.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::transport::{MDNS_GROUP_V4, MDNS_GROUP_V6, MDNS_PORT};

/// Builder for a single-family multicast UDP socket.
#[derive(Debug, Clone)]
pub(crate) struct MulticastSocket {
    ipv6: bool,
    server: bool,
    interface_v4: Option<Ipv4Addr>,
    interface_v6: Option<u32>,
}

impl MulticastSocket {
    /// Starts building an IPv4 socket in client mode.
    pub(crate) fn v4() -> Self {
        Self {
            ipv6: false,
            server: false,
            interface_v4: None,
            interface_v6: None,
        }
    }

    /// Starts building an IPv6 socket in client mode.
    pub(crate) fn v6() -> Self {
        Self {
            ipv6: true,
            server: false,
            interface_v4: None,
            interface_v6: None,
        }
    }

    /// Switches to server mode: bind port 5353 and join the group.
    pub(crate) fn server(mut self) -> Self {
        self.server = true;
        self
    }

    /// Pins multicast membership and egress to the interface with this
    /// IPv4 address.
    pub(crate) fn with_interface_v4(mut self, interface: Ipv4Addr) -> Self {
        self.interface_v4 = Some(interface);
        self
    }

    /// Pins IPv6 multicast membership and egress to this interface
    /// index.
    pub(crate) fn with_interface_v6(mut self, index: u32) -> Self {
        self.interface_v6 = Some(index);
        self
    }

    /// Builds the configured `std::net::UdpSocket`.
    ///
    /// The socket is non-blocking so it can be handed to
    /// `tokio::net::UdpSocket::from_std`.
    pub(crate) fn into_std(self) -> io::Result<UdpSocket> {
        if self.ipv6 {
            self.into_std_v6()
        } else {
            self.into_std_v4()
        }
    }

    fn into_std_v4(self) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;

        let bind_addr = if self.server {
            let ip = if cfg!(target_os = "linux") {
                IpAddr::V4(MDNS_GROUP_V4)
            } else {
                // Binding the group address only works on Linux; everywhere
                // else the wildcard is the only bind that sees group traffic.
                IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            };
            SocketAddr::new(ip, MDNS_PORT)
        } else {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
        };
        socket.bind(&bind_addr.into())?;

        if self.server {
            self.join_group_v4(&socket);
        }
        if let Some(interface) = self.interface_v4 {
            socket.set_multicast_if_v4(&interface)?;
        }

        Ok(socket.into())
    }

    fn into_std_v6(self) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_only_v6(true)?;
        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;

        let port = if self.server { MDNS_PORT } else { 0 };
        let bind_addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port);
        socket.bind(&bind_addr.into())?;

        if self.server {
            self.join_group_v6(&socket);
        }
        if let Some(index) = self.interface_v6 {
            socket.set_multicast_if_v6(index)?;
        }

        Ok(socket.into())
    }

    /// Joins 224.0.0.251 on the configured interface, or on every
    /// non-loopback IPv4 interface. A failed join is logged; as long as
    /// the bind succeeded the socket is still usable on the interfaces
    /// that did join.
    fn join_group_v4(&self, socket: &Socket) {
        if let Some(interface) = self.interface_v4 {
            if let Err(err) = socket.join_multicast_v4(&MDNS_GROUP_V4, &interface) {
                log::warn!("mdns: failed to join {MDNS_GROUP_V4} on {interface}: {err}");
            }
            return;
        }

        let mut joined = false;
        for interface in multicast_interfaces() {
            if let IpAddr::V4(ip) = interface.ip() {
                match socket.join_multicast_v4(&MDNS_GROUP_V4, &ip) {
                    Ok(()) => joined = true,
                    Err(err) => {
                        log::warn!("mdns: failed to join {MDNS_GROUP_V4} on {ip}: {err}")
                    }
                }
            }
        }
        if !joined {
            // No eligible interface; let the OS pick one.
            if let Err(err) = socket.join_multicast_v4(&MDNS_GROUP_V4, &Ipv4Addr::UNSPECIFIED) {
                log::warn!("mdns: failed to join {MDNS_GROUP_V4}: {err}");
            }
        }
    }

    /// Joins ff02::fb on the configured interface index, or on every
    /// interface carrying a non-loopback IPv6 address.
    fn join_group_v6(&self, socket: &Socket) {
        if let Some(index) = self.interface_v6 {
            if let Err(err) = socket.join_multicast_v6(&MDNS_GROUP_V6, index) {
                log::warn!("mdns: failed to join {MDNS_GROUP_V6} on index {index}: {err}");
            }
            return;
        }

        let mut indexes: Vec<u32> = Vec::new();
        for interface in multicast_interfaces() {
            if !interface.ip().is_ipv6() {
                continue;
            }
            if let Some(index) = interface.index {
                if !indexes.contains(&index) {
                    indexes.push(index);
                }
            }
        }

        let mut joined = false;
        for index in indexes {
            match socket.join_multicast_v6(&MDNS_GROUP_V6, index) {
                Ok(()) => joined = true,
                Err(err) => {
                    log::warn!("mdns: failed to join {MDNS_GROUP_V6} on index {index}: {err}")
                }
            }
        }
        if !joined {
            if let Err(err) = socket.join_multicast_v6(&MDNS_GROUP_V6, 0) {
                log::warn!("mdns: failed to join {MDNS_GROUP_V6}: {err}");
            }
        }
    }
}

/// Non-loopback interfaces of the host.
fn multicast_interfaces() -> Vec<if_addrs::Interface> {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter(|i| !i.is_loopback())
            .collect(),
        Err(err) => {
            log::error!("mdns: failed to enumerate interfaces: {err}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = MulticastSocket::v4();
        assert!(!builder.ipv6);
        assert!(!builder.server);
        assert!(builder.interface_v4.is_none());
        assert!(builder.interface_v6.is_none());

        let builder = MulticastSocket::v6().server();
        assert!(builder.ipv6);
        assert!(builder.server);
    }

    #[test]
    fn test_builder_with_interface() {
        let interface = Ipv4Addr::new(192, 168, 1, 100);
        let builder = MulticastSocket::v4().server().with_interface_v4(interface);
        assert_eq!(builder.interface_v4, Some(interface));

        let builder = MulticastSocket::v6().with_interface_v6(3);
        assert_eq!(builder.interface_v6, Some(3));
    }

    #[test]
    fn test_client_bind_is_ephemeral() {
        let socket = MulticastSocket::v4()
            .into_std()
            .expect("client sockets bind the wildcard address");
        let local = socket.local_addr().unwrap();
        assert_ne!(local.port(), 0);
    }

    // Server-mode socket tests need multicast-capable interfaces and a
    // free 5353, so they live in the integration tests.
}
