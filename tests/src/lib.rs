//! # Keywatch Test Suite
//!
//! Unified test crate for cross-component scenarios that no single crate's
//! inline tests cover: the full monitoring pipeline from registration to
//! notification, and the unsubscribe side channel driven through the real
//! axum router.
//!
//! ```bash
//! cargo test -p keywatch-tests
//! ```

#[cfg(test)]
mod integration;
