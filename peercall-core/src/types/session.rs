//! Session identity.
//!
//! On the wire a session id is the caller id and the callee id joined by a
//! `-`. Ids may themselves contain `-`, so the string is never split to
//! recover the parties when they are known: [`SessionKey::resolve`] compares
//! the whole string against the two candidate orderings instead.

use super::peer::PeerId;
use std::fmt;

const SEPARATOR: char = '-';

/// Registry key of one two-party call session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// A session whose parties are known. `caller` created the offer.
    Pair { caller: PeerId, callee: PeerId },
    /// A session id in a format this side cannot attribute.
    Opaque(String),
}

impl SessionKey {
    /// Key of a session initiated locally towards `peer`.
    pub fn outgoing(local: &PeerId, peer: &PeerId) -> Self {
        Self::Pair {
            caller: local.clone(),
            callee: peer.clone(),
        }
    }

    /// Key of a session initiated by `peer` towards the local side.
    pub fn incoming(peer: &PeerId, local: &PeerId) -> Self {
        Self::Pair {
            caller: peer.clone(),
            callee: local.clone(),
        }
    }

    /// Map a wire session id received from `remote` onto a key.
    pub fn resolve(wire: &str, local: &PeerId, remote: &PeerId) -> Self {
        if joins(wire, local, remote) {
            Self::outgoing(local, remote)
        } else if joins(wire, remote, local) {
            Self::incoming(remote, local)
        } else {
            Self::Opaque(wire.to_string())
        }
    }

    /// The session id exactly as it travels on the wire.
    pub fn wire_id(&self) -> String {
        match self {
            Self::Pair { caller, callee } => format!("{caller}{SEPARATOR}{callee}"),
            Self::Opaque(raw) => raw.clone(),
        }
    }

    /// Whether `peer` is either party of this session.
    pub fn involves(&self, peer: &PeerId) -> bool {
        match self {
            Self::Pair { caller, callee } => caller == peer || callee == peer,
            Self::Opaque(raw) => raw.split(SEPARATOR).any(|part| part == peer.as_str()),
        }
    }

    /// The party that is not `local`, when it can be determined.
    pub fn remote_party(&self, local: &PeerId) -> Option<&PeerId> {
        match self {
            Self::Pair { caller, callee } if caller == local => Some(callee),
            Self::Pair { caller, callee } if callee == local => Some(caller),
            _ => None,
        }
    }

    pub fn is_initiated_by(&self, peer: &PeerId) -> bool {
        matches!(self, Self::Pair { caller, .. } if caller == peer)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pair { caller, callee } => write!(f, "{caller}{SEPARATOR}{callee}"),
            Self::Opaque(raw) => f.write_str(raw),
        }
    }
}

fn joins(wire: &str, first: &PeerId, second: &PeerId) -> bool {
    wire.strip_prefix(first.as_str())
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
        .is_some_and(|rest| rest == second.as_str())
}
