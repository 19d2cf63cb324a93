//! Protocol error taxonomy
//!
//! Every variant except `Io` maps to a strict-conformance failure: the
//! offending connection is torn down, never partially recovered.

/// Errors raised while decoding or dispatching client messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The remaining buffer was shorter than a field required.
    #[error("message truncated while reading {0}")]
    Truncated(&'static str),

    /// A structurally invalid message (e.g. declared length below header size).
    #[error("malformed message: {0}")]
    Malformed(&'static str),

    /// A message targeted an id with no bound object.
    #[error("unknown object {0}")]
    UnknownObject(u32),

    /// A message referenced an object of the wrong kind.
    #[error("object {id} is not a {expected}")]
    WrongObject { id: u32, expected: &'static str },

    /// No request with this opcode exists on the interface.
    #[error("unsupported opcode {opcode} on {interface}")]
    UnsupportedOpcode {
        interface: &'static str,
        opcode: u16,
    },

    /// An oversized or otherwise unsatisfiable resource request.
    #[error("resource error: {0}")]
    Resource(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether this error came from a read that may succeed on retry.
    ///
    /// Transient read failures trigger a liveness ping instead of an
    /// immediate teardown; see the connection loop.
    pub fn is_transient(&self) -> bool {
        match self {
            ProtocolError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = ProtocolError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert!(timeout.is_transient());

        let eof = ProtocolError::Io(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        assert!(!eof.is_transient());

        assert!(!ProtocolError::UnknownObject(7).is_transient());
    }
}
