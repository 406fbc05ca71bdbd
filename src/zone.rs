//! Zones answer DNS questions from a locally published service
//! description.
//!
//! The [`Zone`] trait is the seam between the server and whatever
//! record source backs it; [`MdnsService`] is the stock implementation,
//! synthesizing the DNS-SD record set (PTR, SRV, TXT, A, AAAA) for a
//! single service instance.

use std::net::{IpAddr, SocketAddr};

use hickory_proto::op::Query;
use hickory_proto::rr::rdata::{A, AAAA, PTR, SRV, TXT};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use if_addrs::IfAddr;

use crate::config::{DEFAULT_DOMAIN, DEFAULT_TTL};
use crate::error::{Error, Result};

/// A source of DNS records for incoming questions.
///
/// Implementations must be safe to consult from concurrent tasks
/// without locking; the stock implementation is read-only after
/// construction.
pub trait Zone: Send + Sync {
    /// Returns the records answering `question`, or an empty list when
    /// the question does not concern this zone. `from` is the address
    /// of the asker and is used to pick a source-appropriate interface
    /// address for A and AAAA answers.
    fn records(&self, question: &Query, from: SocketAddr) -> Vec<Record>;
}

/// A zone exporting one named service instance.
///
/// Given a question for the service name (`_http._tcp.local.`) or the
/// instance name (`web1._http._tcp.local.`), it synthesizes the
/// RFC 6763 record set: a PTR from the service to the instance, an SRV
/// and TXT for the instance, and A/AAAA records for the target host.
///
/// When no explicit address is configured, the A/AAAA address is
/// derived per query from the interface on the same link as the asker,
/// which keeps multi-homed hosts answering with a reachable address.
#[derive(Debug)]
pub struct MdnsService {
    port: u16,
    info: String,
    addr: Option<IpAddr>,

    /// Fully qualified host name, e.g. `myhost.`.
    host_name: Name,
    /// Fully qualified service address, e.g. `_http._tcp.local.`.
    service_addr: Name,
    /// Fully qualified instance address, e.g. `web1._http._tcp.local.`.
    instance_addr: Name,
}

impl MdnsService {
    /// Creates a zone for one service instance.
    ///
    /// `instance`, `service` and `port` are required. An empty `domain`
    /// defaults to `local`. An empty `host_name` is seeded from the OS
    /// hostname; a supplied one must be fully qualified (trailing dot).
    /// `addr` pins the advertised address; `None` derives it from the
    /// interface facing each asker. `info` is served as the TXT record.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::net::{IpAddr, Ipv4Addr};
    /// use mdns_discovery::MdnsService;
    ///
    /// let zone = MdnsService::new(
    ///     "web1",
    ///     "_http._tcp",
    ///     "local",
    ///     "myhost.",
    ///     80,
    ///     Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 4))),
    ///     "path=/",
    /// ).unwrap();
    /// assert_eq!(zone.instance_name().to_utf8(), "web1._http._tcp.local.");
    /// ```
    pub fn new(
        instance: &str,
        service: &str,
        domain: &str,
        host_name: &str,
        port: u16,
        addr: Option<IpAddr>,
        info: &str,
    ) -> Result<Self> {
        if trim_dot(instance).is_empty() {
            return Err(Error::ErrMissingInstance);
        }
        if trim_dot(service).is_empty() {
            return Err(Error::ErrMissingService);
        }
        if port == 0 {
            return Err(Error::ErrMissingPort);
        }

        let domain = if domain.is_empty() {
            DEFAULT_DOMAIN
        } else {
            domain
        };

        let host_name = if host_name.is_empty() {
            let host = hostname::get().map_err(|_| Error::ErrHostname)?;
            format!("{}.", host.to_string_lossy())
        } else {
            host_name.to_string()
        };
        if !host_name.ends_with('.') {
            return Err(Error::ErrHostnameNotFqdn);
        }

        let service_addr = format!("{}.{}.", trim_dot(service), trim_dot(domain));
        let instance_addr = format!("{}.{}", trim_dot(instance), service_addr);

        Ok(Self {
            port,
            info: info.to_string(),
            addr,
            host_name: Name::from_utf8(&host_name)?,
            service_addr: Name::from_utf8(&service_addr)?,
            instance_addr: Name::from_utf8(&instance_addr)?,
        })
    }

    /// The fully qualified service address, e.g. `_http._tcp.local.`.
    pub fn service_name(&self) -> &Name {
        &self.service_addr
    }

    /// The fully qualified instance address, e.g.
    /// `web1._http._tcp.local.`.
    pub fn instance_name(&self) -> &Name {
        &self.instance_addr
    }

    fn service_records(&self, qtype: RecordType, from: SocketAddr) -> Vec<Record> {
        match qtype {
            RecordType::ANY | RecordType::PTR => {
                let mut records = vec![new_record(
                    self.service_addr.clone(),
                    RData::PTR(PTR(self.instance_addr.clone())),
                )];
                records.extend(self.instance_records(RecordType::ANY, from));
                records
            }
            _ => Vec::new(),
        }
    }

    fn instance_records(&self, qtype: RecordType, from: SocketAddr) -> Vec<Record> {
        match qtype {
            RecordType::ANY => {
                let mut records = self.instance_records(RecordType::SRV, from);
                records.extend(self.instance_records(RecordType::TXT, from));
                records
            }
            RecordType::SRV => {
                let mut records = vec![new_record(
                    self.instance_addr.clone(),
                    RData::SRV(SRV::new(10, 1, self.port, self.host_name.clone())),
                )];
                records.extend(self.instance_records(RecordType::A, from));
                records.extend(self.instance_records(RecordType::AAAA, from));
                records
            }
            RecordType::A => match self.response_ip(from) {
                Some(IpAddr::V4(ip)) => {
                    vec![new_record(self.host_name.clone(), RData::A(A::from(ip)))]
                }
                _ => Vec::new(),
            },
            RecordType::AAAA => match self.response_ip(from) {
                Some(IpAddr::V6(ip)) => {
                    vec![new_record(
                        self.host_name.clone(),
                        RData::AAAA(AAAA::from(ip)),
                    )]
                }
                _ => Vec::new(),
            },
            RecordType::TXT => {
                vec![new_record(
                    self.instance_addr.clone(),
                    RData::TXT(TXT::new(vec![self.info.clone()])),
                )]
            }
            _ => Vec::new(),
        }
    }

    /// The address to advertise to `from`: the configured one when
    /// present, otherwise the address of the interface on the same link
    /// as the asker. A and AAAA decisions are independent; a v4-only
    /// result simply yields no AAAA record and vice versa.
    fn response_ip(&self, from: SocketAddr) -> Option<IpAddr> {
        if let Some(addr) = self.addr {
            return Some(addr);
        }
        source_ip_for(from.ip())
    }
}

impl Zone for MdnsService {
    fn records(&self, question: &Query, from: SocketAddr) -> Vec<Record> {
        if *question.name() == self.service_addr {
            self.service_records(question.query_type(), from)
        } else if *question.name() == self.instance_addr {
            self.instance_records(question.query_type(), from)
        } else {
            Vec::new()
        }
    }
}

/// Strips leading and trailing dots.
pub(crate) fn trim_dot(s: &str) -> &str {
    s.trim_matches('.')
}

fn new_record(name: Name, rdata: RData) -> Record {
    let mut record = Record::from_rdata(name, DEFAULT_TTL, rdata);
    record.set_dns_class(DNSClass::IN);
    record
}

/// Walks the non-loopback interfaces looking for the one whose subnet
/// contains `from`, returning its address.
fn source_ip_for(from: IpAddr) -> Option<IpAddr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(err) => {
            log::error!("mdns: failed to enumerate interfaces: {err}");
            return None;
        }
    };

    for interface in interfaces {
        if interface.is_loopback() {
            continue;
        }
        match (&interface.addr, from) {
            (IfAddr::V4(v4), IpAddr::V4(from)) => {
                let mask = u32::from(v4.netmask);
                if u32::from(v4.ip) & mask == u32::from(from) & mask {
                    return Some(IpAddr::V4(v4.ip));
                }
            }
            (IfAddr::V6(v6), IpAddr::V6(from)) => {
                let mask = u128::from(v6.netmask);
                if u128::from(v6.ip) & mask == u128::from(from) & mask {
                    return Some(IpAddr::V6(v6.ip));
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn make_service() -> MdnsService {
        MdnsService::new(
            "hostname.",
            "_http._tcp.",
            "local.",
            "testhost.",
            80,
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            "Local web server",
        )
        .unwrap()
    }

    fn question(name: &str, qtype: RecordType) -> Query {
        Query::query(Name::from_utf8(name).unwrap(), qtype)
    }

    fn asker() -> SocketAddr {
        "192.168.1.20:5353".parse().unwrap()
    }

    #[test]
    fn test_unknown_name() {
        let zone = make_service();
        let records = zone.records(&question("random.", RecordType::ANY), asker());
        assert!(records.is_empty());
    }

    #[test]
    fn test_service_addr_any() {
        let zone = make_service();
        let records = zone.records(&question("_http._tcp.local.", RecordType::ANY), asker());
        let types: Vec<RecordType> = records.iter().map(|r| r.record_type()).collect();
        assert_eq!(
            types,
            vec![
                RecordType::PTR,
                RecordType::SRV,
                RecordType::A,
                RecordType::TXT
            ]
        );

        match records[0].data() {
            RData::PTR(ptr) => assert_eq!(ptr.0.to_utf8(), "hostname._http._tcp.local."),
            other => panic!("expected PTR, got {other:?}"),
        }

        // PTR questions answer with the same composite list.
        let ptr_records = zone.records(&question("_http._tcp.local.", RecordType::PTR), asker());
        assert_eq!(records, ptr_records);
    }

    #[test]
    fn test_instance_addr_any() {
        let zone = make_service();
        let records = zone.records(
            &question("hostname._http._tcp.local.", RecordType::ANY),
            asker(),
        );
        let types: Vec<RecordType> = records.iter().map(|r| r.record_type()).collect();
        assert_eq!(
            types,
            vec![RecordType::SRV, RecordType::A, RecordType::TXT]
        );
    }

    #[test]
    fn test_instance_addr_srv() {
        let zone = make_service();
        let records = zone.records(
            &question("hostname._http._tcp.local.", RecordType::SRV),
            asker(),
        );
        assert_eq!(records.len(), 2);
        match records[0].data() {
            RData::SRV(srv) => {
                assert_eq!(srv.target().to_utf8(), "testhost.");
                assert_eq!(srv.port(), 80);
                assert_eq!(srv.priority(), 10);
                assert_eq!(srv.weight(), 1);
            }
            other => panic!("expected SRV, got {other:?}"),
        }
        assert_eq!(records[1].record_type(), RecordType::A);
    }

    #[test]
    fn test_instance_addr_a() {
        let zone = make_service();
        let records = zone.records(
            &question("hostname._http._tcp.local.", RecordType::A),
            asker(),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name().to_utf8(), "testhost.");
        assert_eq!(records[0].ttl(), 10);
        match records[0].data() {
            RData::A(a) => assert_eq!(a.0, Ipv4Addr::LOCALHOST),
            other => panic!("expected A, got {other:?}"),
        }
    }

    #[test]
    fn test_family_checks_are_independent() {
        // An explicit IPv4 address answers A and suppresses AAAA.
        let zone = make_service();
        let aaaa = zone.records(
            &question("hostname._http._tcp.local.", RecordType::AAAA),
            asker(),
        );
        assert!(aaaa.is_empty());

        // And the other way around for IPv6.
        let zone = MdnsService::new(
            "hostname",
            "_http._tcp",
            "local",
            "testhost.",
            80,
            Some("2001:db8::1".parse().unwrap()),
            "Local web server",
        )
        .unwrap();
        let a = zone.records(
            &question("hostname._http._tcp.local.", RecordType::A),
            asker(),
        );
        assert!(a.is_empty());
        let aaaa = zone.records(
            &question("hostname._http._tcp.local.", RecordType::AAAA),
            asker(),
        );
        assert_eq!(aaaa.len(), 1);
        match aaaa[0].data() {
            RData::AAAA(addr) => assert_eq!(addr.0, "2001:db8::1".parse::<std::net::Ipv6Addr>().unwrap()),
            other => panic!("expected AAAA, got {other:?}"),
        }
    }

    #[test]
    fn test_instance_addr_txt() {
        let zone = make_service();
        let records = zone.records(
            &question("hostname._http._tcp.local.", RecordType::TXT),
            asker(),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name().to_utf8(), "hostname._http._tcp.local.");
        match records[0].data() {
            RData::TXT(txt) => {
                let joined: Vec<String> = txt
                    .txt_data()
                    .iter()
                    .map(|s| String::from_utf8_lossy(s).into_owned())
                    .collect();
                assert_eq!(joined, vec!["Local web server"]);
            }
            other => panic!("expected TXT, got {other:?}"),
        }
    }

    #[test]
    fn test_required_fields() {
        let err = MdnsService::new("", "_http._tcp", "", "h.", 80, None, "").unwrap_err();
        assert!(matches!(err, Error::ErrMissingInstance));

        let err = MdnsService::new("i", "", "", "h.", 80, None, "").unwrap_err();
        assert!(matches!(err, Error::ErrMissingService));

        let err = MdnsService::new("i", "_http._tcp", "", "h.", 0, None, "").unwrap_err();
        assert!(matches!(err, Error::ErrMissingPort));

        let err = MdnsService::new("i", "_http._tcp", "", "not-fqdn", 80, None, "").unwrap_err();
        assert!(matches!(err, Error::ErrHostnameNotFqdn));
    }
}
