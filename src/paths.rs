//! Storage key constants.
//!
//! Centralized registry for every key the connector persists.

/// Connector state
pub mod connector {
    pub const SITES_PREFIX: &str = "connector/sites/";
    pub const WHITELIST: &str = "connector/whitelist";
    pub const PENDING_SEQ: &str = "connector/pending-seq";

    pub fn site(tab_id: u64) -> String { format!("{SITES_PREFIX}{tab_id}") }

    pub fn tab_from_key(key: &str) -> Option<u64> { key.strip_prefix(SITES_PREFIX)?.parse().ok() }
}

/// Wallet-side journals
pub mod wallet {
    pub const SUBMITTED_PREFIX: &str = "wallet/submitted/";

    pub fn submitted(wallet_id: &str) -> String { format!("{SUBMITTED_PREFIX}{wallet_id}") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_key_roundtrip() {
        assert_eq!(connector::site(12), "connector/sites/12");
        assert_eq!(connector::tab_from_key("connector/sites/12"), Some(12));
        assert_eq!(connector::tab_from_key("connector/whitelist"), None);
    }
}
