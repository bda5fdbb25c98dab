#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacParseError {
    #[error("empty device address")]
    Empty,

    #[error("device address has {0} characters, expected 12 hex digits")]
    Length(usize),

    #[error("device address has {0} octets, expected 6")]
    OctetCount(usize),

    #[error("invalid octet {0:?} in device address")]
    InvalidOctet(Box<str>),
}
