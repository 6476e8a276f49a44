//! Nonce bookkeeping and the login state machine.
//!
//! The nonce map is transient, process-lifetime state owned by the auth
//! client: one issued nonce per wallet address, single-use per login
//! attempt. [`LoginStep`] is never stored; it is recomputed on demand from
//! wallet-connection state, nonce membership, and cache presence.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Ordered login progression, recomputed each time it is queried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LoginStep {
    /// No connected wallet address is known.
    Uninitialized,
    /// A wallet address has been obtained from the wallet collaborator.
    Connected,
    /// A nonce has been issued for the address but no valid session exists.
    ReadyToLogin,
    /// A valid, non-expired cached token entry exists.
    LoggedIn,
}

/// Transient map from normalized wallet address to its issued nonce.
///
/// A nonce is idempotent per address until consumed: repeated requests
/// return the cached value without a network call. Consumption — on login
/// attempt completion, success or failure — clears the entry
/// unconditionally so every attempt signs a fresh challenge.
#[derive(Default)]
pub struct NonceMap {
    inner: Mutex<HashMap<String, String>>,
}

/// Normalizes a wallet address for use as a map key.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

impl NonceMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when an unconsumed nonce exists for `address`.
    pub fn is_fetched(&self, address: &str) -> bool {
        self.inner.lock().contains_key(&normalize_address(address))
    }

    /// Returns the unconsumed nonce for `address`, if any.
    pub fn peek(&self, address: &str) -> Option<String> {
        self.inner.lock().get(&normalize_address(address)).cloned()
    }

    /// Records an issued nonce for `address`.
    pub fn record(&self, address: &str, nonce: String) {
        self.inner.lock().insert(normalize_address(address), nonce);
    }

    /// Consumes the nonce for `address`, removing it whether or not the
    /// login attempt succeeded.
    pub fn consume(&self, address: &str) {
        self.inner.lock().remove(&normalize_address(address));
    }
}
