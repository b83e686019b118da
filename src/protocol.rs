//! Application protocol identifiers.
//!
//! A [`Protocol`] selects the parser a task is bound to. The discriminants are
//! stable because they cross the C boundary as plain integers.

use std::{ffi::c_int, fmt};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::InvalidDiscriminant;

/// Protocols a [`Task`](crate::Task) can be bound to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode,
)]
pub enum Protocol {
    /// Simple Mail Transfer Protocol.
    Smtp = 0,
    /// Hypertext Transfer Protocol (1.x).
    Http = 1,
}

impl Protocol {
    /// Every protocol identifier, in discriminant order.
    pub const ALL: [Protocol; 2] = [Protocol::Smtp, Protocol::Http];

    /// Lower-case label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Smtp => "smtp",
            Protocol::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl TryFrom<c_int> for Protocol {
    type Error = InvalidDiscriminant;

    fn try_from(value: c_int) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Protocol::Smtp),
            1 => Ok(Protocol::Http),
            _ => Err(InvalidDiscriminant::new("protocol", value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, Protocol::Smtp)]
    #[case(1, Protocol::Http)]
    fn converts_stable_discriminants(#[case] raw: c_int, #[case] expected: Protocol) {
        assert_eq!(Protocol::try_from(raw), Ok(expected));
        assert_eq!(expected as c_int, raw);
    }

    #[test]
    fn rejects_unknown_discriminant() {
        let err = Protocol::try_from(7).expect_err("7 is not a protocol");
        assert_eq!(err.to_string(), "invalid protocol value 7");
    }
}
