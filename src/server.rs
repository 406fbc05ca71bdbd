//! The responder side: answering mDNS questions from a zone.

use std::net::SocketAddr;
use std::sync::Arc;

use hickory_proto::op::{Message, MessageType, OpCode};
use hickory_proto::rr::Record;
use tokio::sync::mpsc;

use crate::config::{ServerConfig, INBOUND_CHANNEL_CAPACITY};
use crate::error::Result;
use crate::transport::{Inbound, Transport, MDNS_ADDR_V4, MDNS_ADDR_V6};

/// An mDNS server answering questions that match its zone.
///
/// The server binds the multicast group on the configured interfaces,
/// parses each incoming datagram, consults the zone for every question
/// and sends one authoritative reply per datagram that produced at
/// least one answer. Replies go back to the asker directly unless
/// [`with_multicast_responses`](ServerConfig::with_multicast_responses)
/// routes them to the group.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use mdns_discovery::{MdnsService, Server, ServerConfig};
///
/// # #[tokio::main]
/// # async fn main() -> mdns_discovery::Result<()> {
/// let zone = MdnsService::new("web1", "_http._tcp", "", "", 80, None, "path=/")?;
/// let server = Server::new(ServerConfig::new(Arc::new(zone))).await?;
/// tokio::signal::ctrl_c().await?;
/// server.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct Server {
    transport: Arc<Transport>,
}

impl Server {
    /// Binds the multicast listeners and starts answering questions.
    ///
    /// Fails with [`Error::ErrNoListeners`](crate::Error::ErrNoListeners)
    /// when no socket could be bound at all; a single address family is
    /// enough to operate.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let transport = Arc::new(Transport::server(&config.bind_options())?);

        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        transport.spawn_receivers(tx);
        tokio::spawn(serve(Arc::clone(&transport), config, rx));

        Ok(Self { transport })
    }

    /// Stops the server. Idempotent; the receiver tasks observe the
    /// shutdown signal and exit.
    pub fn shutdown(&self) {
        self.transport.close();
    }
}

async fn serve(transport: Arc<Transport>, config: ServerConfig, mut rx: mpsc::Receiver<Inbound>) {
    while let Some(inbound) = rx.recv().await {
        handle_query(&transport, &config, inbound).await;
    }
}

async fn handle_query(transport: &Transport, config: &ServerConfig, inbound: Inbound) {
    let Inbound { msg: query, from } = inbound;

    // Responses also circulate on the group socket; only questions get
    // answered, otherwise a group-responding server would answer itself.
    if query.message_type() != MessageType::Query {
        return;
    }

    let mut answers = Vec::new();
    for question in query.queries() {
        answers.extend(config.zone.records(question, from));
    }
    if answers.is_empty() {
        return;
    }

    let reply = build_reply(&query, answers);
    let buf = match reply.to_vec() {
        Ok(buf) => buf,
        Err(err) => {
            log::error!("mdns: failed to pack response: {err}");
            return;
        }
    };

    let to = response_target(config.multicast_responses, from);
    if let Err(err) = transport.send_to(&buf, to).await {
        log::error!("mdns: failed to send response to {to}: {err}");
    }
}

/// Where a reply to `from` goes: straight back to the asker, or to the
/// group of the matching address family when group responses are
/// configured.
fn response_target(multicast_responses: bool, from: SocketAddr) -> SocketAddr {
    if !multicast_responses {
        return from;
    }
    if from.is_ipv4() {
        MDNS_ADDR_V4
    } else {
        MDNS_ADDR_V6
    }
}

/// Builds an authoritative reply to `query` carrying `answers`.
fn build_reply(query: &Message, answers: Vec<Record>) -> Message {
    let mut reply = Message::new();
    reply.set_id(query.id());
    reply.set_message_type(MessageType::Response);
    reply.set_op_code(OpCode::Query);
    reply.set_authoritative(true);
    for question in query.queries() {
        reply.add_query(question.clone());
    }
    for answer in answers {
        reply.add_answer(answer);
    }
    reply
}
