use std::string::FromUtf8Error;

use nix::errno::Errno;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("The buffer is too small to hold a valid message")]
    BufTooSmall,

    #[error("The message is too small")]
    NlMsgTooSmall,

    #[error("The message holds unexpected data")]
    InvalidDataSize,

    #[error("Invalid subsystem, expected NFTABLES")]
    InvalidSubsystem(u8),

    #[error("Invalid version, expected NFNETLINK_V0")]
    InvalidVersion(u8),

    #[error("The generation number was bumped in the kernel while the operation was running, interrupting it")]
    ConcurrentGenerationUpdate,

    #[error("Unsupported message type")]
    UnsupportedType(u16),

    #[error("Unexpected message type")]
    UnexpectedType(u16),

    #[error("Invalid type for a chain")]
    UnknownChainType,

    #[error("Invalid policy for a chain")]
    UnknownChainPolicy,

    #[error("Invalid value {1} for the netlink enumeration {0}")]
    UnknownEnumValue(&'static str, i64),

    #[error("The object does not contain a name for the expression being parsed")]
    MissingExpressionName,

    #[error("The decoded String is not UTF8 compliant")]
    StringDecodeFailure(#[from] FromUtf8Error),

    #[error("Invalid value for a protocol family")]
    UnknownProtocolFamily(i32),
}

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("The length of the arguments are not compatible with each other")]
    IncompatibleLength,

    #[error("The table does not have a name")]
    MissingTableName,

    #[error("Missing information in the chain to create a rule")]
    MissingChainInformationError,

    #[error("The rule has no handle, it cannot be deleted")]
    MissingRuleHandle,
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Unable to open netlink socket to netfilter")]
    NetlinkOpenError(#[source] nix::Error),

    #[error("Unable to configure the netlink socket")]
    NetlinkConfigError(#[source] nix::Error),

    #[error("Unable to send netlink command to netfilter")]
    NetlinkSendError(#[source] nix::Error),

    #[error("Error while reading from netlink socket")]
    NetlinkRecvError(#[source] nix::Error),

    #[error("Timed out while waiting for netfilter to answer")]
    Timeout,

    #[error("Error while processing an incoming netlink message")]
    ProcessNetlinkError(#[from] DecodeError),

    #[error("Error while building netlink objects in Rust")]
    BuilderError(#[from] BuilderError),

    #[error("Error received from the kernel: {0}")]
    NetlinkError(Errno),

    #[error("Only a part of the message was sent")]
    TruncatedSend,

    #[error("Couldn't close the socket")]
    CloseFailed(#[source] Errno),
}

/// Errors surfaced by the [`Firewall`] engine to its callers.
///
/// [`Firewall`]: crate::Firewall
#[derive(Error, Debug)]
pub enum Error {
    #[error("netfilter is not reachable, the firewall engine is disabled")]
    KernelUnavailable,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("no rule with handle {0}")]
    NotFound(u64),

    #[error("rule {0} is a protected system rule")]
    Forbidden(u64),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<QueryError> for Error {
    fn from(e: QueryError) -> Self {
        Error::Internal(e.to_string())
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Internal(e.to_string())
    }
}

impl From<BuilderError> for Error {
    fn from(e: BuilderError) -> Self {
        Error::Internal(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read the configuration file")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("I/O error on the rule mirror: {0}")]
    Io(#[from] std::io::Error),

    #[error("The rule mirror is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Unable to move the new rule mirror in place: {0}")]
    Persist(#[from] tempfile::PersistError),
}
