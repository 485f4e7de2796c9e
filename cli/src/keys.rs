//! Optional gateway auth token storage via the OS keychain, grounded in
//! the teacher's `alpaca-broker::keys` (`Keys::read`/`store`/`delete` over
//! `keyring::Entry`). `ibkr-broker`'s `Broker::connect` takes only
//! host/port/client_id/timeout, so a token (when the gateway requires one)
//! is not plumbed through the trait; it lives here, read by the daemon at
//! boot and handed to the gateway out of band if ever needed.

use keyring::Entry;

const SERVICE: &str = "trust-gateway";

/// Reads the stored gateway token for `profile`, if any.
pub fn read_token(profile: &str) -> keyring::Result<String> {
    Entry::new(SERVICE, profile)?.get_password()
}

/// Stores `token` for `profile`, overwriting any existing value.
pub fn store_token(profile: &str, token: &str) -> keyring::Result<()> {
    Entry::new(SERVICE, profile)?.set_password(token)
}

/// Removes the stored token for `profile`.
pub fn delete_token(profile: &str) -> keyring::Result<()> {
    Entry::new(SERVICE, profile)?.delete_credential()
}
