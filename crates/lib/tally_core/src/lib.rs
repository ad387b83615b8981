//! # tally_core
//!
//! Core domain logic for Tally: credential verification, rotating session
//! tokens, effective-dated pricing and the customer balance ledger.

pub mod auth;
pub mod billing;
pub mod migrate;
pub mod models;
pub mod money;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
