use core::fmt;

/// Errors returned by the LLCP engine's byte-level codec and queue plumbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Packet specified an invalid length value or was too short.
    ///
    /// This indicates a protocol violation; callers that receive this while decoding an inbound
    /// PDU should treat it as a malformed PDU (see spec's malformed-PDU handling), not panic.
    InvalidLength,

    /// Invalid value supplied for a field.
    InvalidValue,

    /// Unexpectedly reached EOF while reading or writing data.
    ///
    /// Returned when a PDU or queue slot doesn't fit the available buffer space, and also when
    /// reading past the end of a buffer.
    Eof,

    /// Parsing didn't consume the entire buffer.
    IncompleteParse,

    /// A fixed-capacity queue or pool had no space left.
    QueueFull,

    /// The procedure context pool had no free slots.
    Exhausted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InvalidLength => "invalid length value specified",
            Error::InvalidValue => "invalid value for field",
            Error::Eof => "end of buffer",
            Error::IncompleteParse => "excess data in buffer",
            Error::QueueFull => "queue is full",
            Error::Exhausted => "pool exhausted",
        })
    }
}
