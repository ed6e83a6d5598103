use serde::{Deserialize, Serialize};

use crate::address::OwnerAddress;

/// Ledger network (chain) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub u64);

/// Explicit wallet session state.
///
/// A session value is passed to whatever needs it instead of living in a
/// shared mutable singleton. Connect, account switch, network switch and
/// disconnect are validated transitions; anything else is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletSession {
    Disconnected,
    Connecting,
    Connected {
        address: OwnerAddress,
        network: NetworkId,
    },
}

impl WalletSession {
    /// Begin connecting. Only valid from `Disconnected`.
    pub fn connect(&self) -> Result<WalletSession, String> {
        match self {
            WalletSession::Disconnected => Ok(WalletSession::Connecting),
            other => Err(format!("cannot connect from {other:?}")),
        }
    }

    /// The wallet reported a connected account. Only valid from `Connecting`.
    pub fn established(
        &self,
        address: OwnerAddress,
        network: NetworkId,
    ) -> Result<WalletSession, String> {
        match self {
            WalletSession::Connecting => Ok(WalletSession::Connected { address, network }),
            other => Err(format!("cannot establish a session from {other:?}")),
        }
    }

    /// The wallet switched to a different account while connected.
    pub fn account_switched(&self, address: OwnerAddress) -> Result<WalletSession, String> {
        match self {
            WalletSession::Connected { network, .. } => Ok(WalletSession::Connected {
                address,
                network: *network,
            }),
            other => Err(format!("cannot switch accounts from {other:?}")),
        }
    }

    /// The wallet switched networks while connected. This is the only way out
    /// of a network mismatch; it never happens implicitly.
    pub fn network_switched(&self, network: NetworkId) -> Result<WalletSession, String> {
        match self {
            WalletSession::Connected { address, .. } => Ok(WalletSession::Connected {
                address: address.clone(),
                network,
            }),
            other => Err(format!("cannot switch networks from {other:?}")),
        }
    }

    /// Drop the session. Valid from every state.
    pub fn disconnect(&self) -> WalletSession {
        WalletSession::Disconnected
    }

    /// Connected, but on the wrong network for the target ledger.
    pub fn network_mismatch(&self, expected: NetworkId) -> bool {
        matches!(self, WalletSession::Connected { network, .. } if *network != expected)
    }

    /// Writes are permitted only when connected on the expected network.
    pub fn writes_permitted(&self, expected: NetworkId) -> bool {
        matches!(self, WalletSession::Connected { network, .. } if *network == expected)
    }

    /// The connected account, when there is one.
    pub fn address(&self) -> Option<&OwnerAddress> {
        match self {
            WalletSession::Connected { address, .. } => Some(address),
            _ => None,
        }
    }
}
