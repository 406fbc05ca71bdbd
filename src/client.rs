//! Service lookup: the querier side of DNS-SD.
//!
//! One logical discovery produces a cascade of PTR, SRV, TXT and A/AAAA
//! records arriving in arbitrary order, split across packets, possibly
//! from several responders, with the SRV target aliasing the records of
//! the host away from the instance name. [`query`] correlates that
//! stream into [`ServiceEntry`] values and delivers each complete entry
//! at most once.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use hickory_proto::op::{Message, Query};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tokio::sync::mpsc;

use crate::config::{QueryParams, DEFAULT_DOMAIN, DEFAULT_QUERY_TIMEOUT, INBOUND_CHANNEL_CAPACITY};
use crate::dnssd::{parse_txt_properties, TxtProperties};
use crate::error::Result;
use crate::transport::Transport;
use crate::zone::trim_dot;

/// A discovered service instance.
///
/// Entries are delivered once they are complete: an address is known,
/// the port is known and a TXT record has been seen.
#[derive(Debug, Clone, Default)]
pub struct ServiceEntry {
    /// Fully qualified instance name, e.g. `web1._http._tcp.local.`.
    pub name: String,
    /// Target host from the SRV record, e.g. `myhost.`.
    pub host: String,
    /// Service port from the SRV record.
    pub port: u16,
    /// IPv4 address of the host, when one was seen.
    pub addr_v4: Option<Ipv4Addr>,
    /// IPv6 address of the host, when one was seen.
    pub addr_v6: Option<Ipv6Addr>,
    /// TXT record content; multiple strings are joined with `|`.
    pub info: String,

    has_txt: bool,
    sent: bool,
}

impl ServiceEntry {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Whether enough records arrived to deliver this entry. An empty
    /// TXT record counts; `has_txt` tracks presence, not content.
    fn complete(&self) -> bool {
        (self.addr_v4.is_some() || self.addr_v6.is_some()) && self.port != 0 && self.has_txt
    }

    /// Parses the TXT content as DNS-SD `key=value` attributes.
    ///
    /// See [`parse_txt_properties`] for the parsing rules.
    pub fn txt_properties(&self) -> TxtProperties {
        parse_txt_properties(self.info.split('|'))
    }
}

/// In-progress table for one query.
///
/// Entries live in an append-only vector and the name map holds
/// indexes, so an SRV whose target differs from its owner can alias two
/// names to the same entry: records addressed to either name land on
/// the same aggregate.
#[derive(Default)]
struct EntryTable {
    names: HashMap<String, usize>,
    entries: Vec<ServiceEntry>,
}

impl EntryTable {
    /// Index of the entry being built under `name`, inserting a fresh
    /// one when the name is new.
    fn ensure(&mut self, name: &str) -> usize {
        if let Some(&index) = self.names.get(name) {
            return index;
        }
        let index = self.entries.len();
        self.entries.push(ServiceEntry::new(name.to_string()));
        self.names.insert(name.to_string(), index);
        index
    }

    /// Makes `dst` an alias of `src`, so records for either name update
    /// the same entry.
    fn alias(&mut self, src: &str, dst: &str) {
        let index = self.ensure(src);
        self.names.insert(dst.to_string(), index);
    }

    fn apply_record(&mut self, record: &Record) -> Option<usize> {
        let owner = record.name().to_utf8();
        match record.data() {
            RData::PTR(ptr) => Some(self.ensure(&ptr.0.to_utf8())),
            RData::SRV(srv) => {
                let target = srv.target().to_utf8();
                if srv.target() != record.name() {
                    self.alias(&owner, &target);
                }
                let index = self.ensure(&owner);
                let entry = &mut self.entries[index];
                entry.host = target;
                entry.port = srv.port();
                Some(index)
            }
            RData::TXT(txt) => {
                let index = self.ensure(&owner);
                let entry = &mut self.entries[index];
                entry.info = txt
                    .txt_data()
                    .iter()
                    .map(|s| String::from_utf8_lossy(s))
                    .collect::<Vec<_>>()
                    .join("|");
                entry.has_txt = true;
                Some(index)
            }
            RData::A(a) => {
                let index = self.ensure(&owner);
                self.entries[index].addr_v4 = Some(a.0);
                Some(index)
            }
            RData::AAAA(aaaa) => {
                let index = self.ensure(&owner);
                self.entries[index].addr_v6 = Some(aaaa.0);
                Some(index)
            }
            _ => None,
        }
    }

    /// Applies every answer and extra record of `msg` in section order,
    /// returning the distinct entries touched, in first-touch order.
    fn apply_message(&mut self, msg: &Message) -> Vec<usize> {
        let mut touched = Vec::new();
        for record in msg.answers().iter().chain(msg.additionals()) {
            if let Some(index) = self.apply_record(record) {
                if !touched.contains(&index) {
                    touched.push(index);
                }
            }
        }
        touched
    }

    /// Splits the touched entries into completed ones to deliver,
    /// marking them sent so they cannot be delivered twice, and the
    /// names of entries still missing records.
    fn check_touched(&mut self, touched: &[usize]) -> (Vec<ServiceEntry>, Vec<String>) {
        let mut completed = Vec::new();
        let mut incomplete = Vec::new();
        for &index in touched {
            let entry = &mut self.entries[index];
            if entry.complete() {
                if !entry.sent {
                    entry.sent = true;
                    completed.push(entry.clone());
                }
            } else {
                incomplete.push(entry.name.clone());
            }
        }
        (completed, incomplete)
    }
}

/// Looks up `service` with default parameters, streaming discovered
/// entries to `entries`.
///
/// # Example
///
/// ```rust,no_run
/// use mdns_discovery::{lookup, ServiceEntry};
/// use tokio::sync::mpsc;
///
/// # #[tokio::main]
/// # async fn main() -> mdns_discovery::Result<()> {
/// let (tx, mut rx) = mpsc::channel::<ServiceEntry>(16);
/// tokio::spawn(async move {
///     while let Some(entry) = rx.recv().await {
///         println!("found {} at {}:{}", entry.name, entry.host, entry.port);
///     }
/// });
/// lookup("_http._tcp", tx).await?;
/// # Ok(())
/// # }
/// ```
pub async fn lookup(service: &str, entries: mpsc::Sender<ServiceEntry>) -> Result<()> {
    query(QueryParams::new(service).with_entries(entries)).await
}

/// Looks up a service, streaming discovered entries to the params'
/// sink until the timeout elapses.
///
/// Entry delivery never blocks: when the sink is full the entry is
/// dropped for good, so read promptly or buffer generously. Returning
/// at the timeout with no entries delivered is a normal outcome when no
/// responder serves the queried name.
///
/// Fails only when no socket could be bound or the question could not
/// be packed; transient network errors are logged and absorbed.
pub async fn query(mut params: QueryParams) -> Result<()> {
    if params.domain.is_empty() {
        params.domain = DEFAULT_DOMAIN.to_string();
    }
    if params.timeout.is_zero() {
        params.timeout = DEFAULT_QUERY_TIMEOUT;
    }

    let service_addr = format!(
        "{}.{}.",
        trim_dot(&params.service),
        trim_dot(&params.domain)
    );

    let transport = Transport::client(&params.bind_options())?;

    let (msg_tx, mut msg_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
    transport.spawn_receivers(msg_tx);

    let question = question_message(&service_addr, RecordType::PTR)?;
    transport.send_query(&question).await?;

    let mut table = EntryTable::default();

    let timeout = tokio::time::sleep(params.timeout);
    tokio::pin!(timeout);

    loop {
        let inbound = tokio::select! {
            _ = &mut timeout => break,
            inbound = msg_rx.recv() => match inbound {
                Some(inbound) => inbound,
                None => break,
            },
        };

        let touched = table.apply_message(&inbound.msg);
        let (completed, incomplete) = table.check_touched(&touched);

        for entry in completed {
            if let Some(entries) = &params.entries {
                // Never block on the consumer; a full sink loses the
                // entry but it stays marked sent.
                let _ = entries.try_send(entry);
            }
        }

        // Prompt responders for the record types still missing.
        for name in incomplete {
            match question_message(&name, RecordType::ANY) {
                Ok(msg) => {
                    if let Err(err) = transport.send_query(&msg).await {
                        log::error!("mdns: failed to query instance {name}: {err}");
                    }
                }
                Err(err) => log::error!("mdns: failed to query instance {name}: {err}"),
            }
        }
    }

    transport.close();
    Ok(())
}

fn question_message(name: &str, qtype: RecordType) -> Result<Message> {
    let mut msg = Message::new();
    msg.set_recursion_desired(false);
    msg.add_query(Query::query(Name::from_utf8(name)?, qtype));
    Ok(msg)
}
