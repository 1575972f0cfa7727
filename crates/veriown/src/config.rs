//! Configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`crate::Provenance`] instance.
#[derive(Debug, Clone, Default)]
pub struct ProvenanceConfig {
    pub issuer: IssuerConfig,
    pub ledger: LedgerConfig,
}

/// Contract issuance settings.
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    /// Prefix of verification URLs; the product id is appended.
    pub verify_base_url: String,
    /// Prefix of contract numbers.
    pub contract_prefix: String,
    /// Upper bound on rendering plus blob upload for one contract.
    pub issuance_timeout: Duration,
    /// Directory for a local, disposable copy of rendered documents.
    /// `None` disables the cache.
    pub cache_dir: Option<PathBuf>,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            verify_base_url: "https://localhost:5173/verify/".to_string(),
            contract_prefix: "VO".to_string(),
            issuance_timeout: Duration::from_secs(10),
            cache_dir: None,
        }
    }
}

impl IssuerConfig {
    pub fn verification_url(&self, product_id: veriown_core::ProductId) -> String {
        format!("{}{}", self.verify_base_url, product_id)
    }
}

/// Ledger settings.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How many times an append re-links onto a moved head before giving up.
    pub append_retries: u32,
    /// Verify a product's chain before deriving its owner from it.
    pub verify_on_read: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            append_retries: 8,
            verify_on_read: false,
        }
    }
}
