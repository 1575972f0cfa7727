//! Rendering contract documents into human-readable artifacts.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use veriown_core::{ContractDocument, ContractHash};

/// A renderer could not produce a document.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Renders a contract document, embedding its stored hash.
///
/// Implementations never compute the hash themselves: the hash printed on
/// the artifact is the one stored with the contract.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(
        &self,
        document: &ContractDocument,
        contract_hash: &ContractHash,
    ) -> Result<Bytes, RenderError>;

    /// File extension of the rendered artifact, used for cache files.
    fn file_extension(&self) -> &str {
        "txt"
    }
}

/// Plain-text ownership certificate.
#[derive(Debug, Clone)]
pub struct TextRenderer {
    title: String,
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self {
            title: "VeriOwn Ownership Certificate".to_string(),
        }
    }
}

impl TextRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    fn certificate(&self, document: &ContractDocument, contract_hash: &ContractHash) -> String {
        let mut lines = vec![
            self.title.clone(),
            "=".repeat(self.title.len()),
            format!("Certificate #: {}", document.contract_number),
            format!("Issue Date:    {}", format_millis(document.issued_at)),
            String::new(),
            "PRODUCT INFORMATION".to_string(),
            format!("Serial Number: {}", document.product_serial),
            format!("Manufacturer:  {}", document.manufacturer),
            format!("Model:         {}", document.model),
            String::new(),
            "OWNERSHIP INFORMATION".to_string(),
            format!("Current Owner: {}", document.owner_username),
            format!("Transfer Date: {}", format_millis(document.transfer_date)),
        ];
        if let Some(previous) = &document.previous_owner_name {
            lines.push(format!("Previous Owner: {previous}"));
        }
        lines.extend([
            String::new(),
            "VERIFICATION INFORMATION".to_string(),
            format!("Contract Hash: {contract_hash}"),
            format!("Verify URL:    {}", document.verification_url),
            String::new(),
            "This document certifies the ownership of the above product.".to_string(),
            "Re-hash the stored contract data with SHA-256 to check the contract hash.".to_string(),
        ]);

        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

#[async_trait]
impl DocumentRenderer for TextRenderer {
    async fn render(
        &self,
        document: &ContractDocument,
        contract_hash: &ContractHash,
    ) -> Result<Bytes, RenderError> {
        Ok(Bytes::from(self.certificate(document, contract_hash)))
    }
}

/// `January 14, 2025 16:00:00 UTC`, or the raw value if out of range.
fn format_millis(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%B %-d, %Y %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("{ms} ms"))
}
