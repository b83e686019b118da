//! Flow-relative direction of payload fragments.

use std::ffi::c_int;

use serde::{Deserialize, Serialize};

use crate::error::InvalidDiscriminant;

/// Origin of a payload fragment relative to the flow initiator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Bytes sent by the client (connection originator).
    ClientToServer = 0,
    /// Bytes sent by the server (connection responder).
    ServerToClient = 1,
    /// Bytes whose origin covers both peers.
    BiDirectional = 2,
    /// Bytes whose origin the caller could not determine.
    Unknown = 3,
}

/// Buffer owner inside a task. Only unidirectional traffic maps to a side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Client-to-server byte stream.
    Client,
    /// Server-to-client byte stream.
    Server,
}

impl Direction {
    /// The buffer this direction feeds, or `None` for
    /// [`BiDirectional`](Self::BiDirectional) and [`Unknown`](Self::Unknown).
    #[must_use]
    pub const fn side(self) -> Option<Side> {
        match self {
            Direction::ClientToServer => Some(Side::Client),
            Direction::ServerToClient => Some(Side::Server),
            Direction::BiDirectional | Direction::Unknown => None,
        }
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::ClientToServer => "c2s",
            Direction::ServerToClient => "s2c",
            Direction::BiDirectional => "bidir",
            Direction::Unknown => "unknown",
        }
    }
}

impl Side {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Side::Client => "client",
            Side::Server => "server",
        }
    }
}

impl TryFrom<c_int> for Direction {
    type Error = InvalidDiscriminant;

    fn try_from(value: c_int) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::ClientToServer),
            1 => Ok(Direction::ServerToClient),
            2 => Ok(Direction::BiDirectional),
            3 => Ok(Direction::Unknown),
            _ => Err(InvalidDiscriminant::new("direction", value)),
        }
    }
}
