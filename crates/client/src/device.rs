//! Per-install device identifier.
//!
//! A 24-character alphanumeric id is generated once per installation,
//! persisted under a fixed key in the shared store, and reused across
//! sessions. It accompanies every token endpoint call so the server can
//! scope refresh tokens to a device. If the store is unavailable the id
//! falls back to a fresh value for the lifetime of the process.

use rand::distr::{Alphanumeric, SampleString};
use tracing::warn;
use walletauth_cache::CacheStore;

/// Storage key the device id is persisted under.
pub const DEVICE_ID_KEY: &str = "_walletauth-device-id";

/// Length of a generated device id.
const DEVICE_ID_LEN: usize = 24;

/// Generates a fresh random device id.
fn generate() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), DEVICE_ID_LEN)
}

/// Loads the persisted device id, creating and persisting one on first use.
pub async fn load_or_create(store: &dyn CacheStore) -> String {
    match store.get(DEVICE_ID_KEY).await {
        Ok(Some(existing)) if !existing.is_empty() => return existing,
        Ok(_) => {}
        Err(err) => {
            warn!(error = %err, "device id read failed; using a process-lifetime id");
            return generate();
        }
    }

    let fresh = generate();
    if let Err(err) = store.set(DEVICE_ID_KEY, fresh.clone()).await {
        warn!(error = %err, "device id write failed; id will not survive this process");
    }
    fresh
}
