use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced while constructing or driving mDNS endpoints.
///
/// Transient network failures (a failed send on one socket family, an
/// unparseable datagram) are logged and swallowed rather than surfaced
/// here; only construction failures and packing errors reach the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to bind to any udp port")]
    ErrBindFailed,
    #[error("no multicast listeners could be started")]
    ErrNoListeners,
    #[error("missing service instance name")]
    ErrMissingInstance,
    #[error("missing service name")]
    ErrMissingService,
    #[error("missing service port")]
    ErrMissingPort,
    #[error("could not determine host name")]
    ErrHostname,
    #[error("host name must be fully qualified (trailing dot)")]
    ErrHostnameNotFqdn,
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("dns: {0}")]
    Proto(#[from] hickory_proto::ProtoError),
}
