//! Golden test vectors for contract hashes.
//!
//! A contract hash must be reproducible by anyone holding the stored JSON,
//! with any SHA-256 tool. These vectors pin the canonical serialization and
//! the hash of it.

use veriown_core::{contract_number, ContractDocument, ContractHash, ProductId, UserId};

/// A golden contract vector.
#[derive(Debug, Clone)]
pub struct ContractVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub document: ContractDocument,
    /// Expected `document_data`.
    pub expected_json: &'static str,
    /// Expected contract hash (hex).
    pub expected_hash: &'static str,
}

/// Get all golden contract vectors.
pub fn all_vectors() -> Vec<ContractVector> {
    vec![
        ContractVector {
            name: "first contract at registration",
            document: ContractDocument {
                product_id: ProductId(1),
                product_serial: "SN-0".into(),
                manufacturer: "Acme".into(),
                model: "One".into(),
                owner_id: UserId(1),
                owner_username: "acme".into(),
                previous_owner_id: None,
                previous_owner_name: None,
                transfer_date: 0,
                contract_number: contract_number("VO", ProductId(1), UserId(1), 0, 0),
                issued_at: 0,
                verification_url: "https://localhost:5173/verify/1".into(),
            },
            expected_json: r#"{"product_id":1,"product_serial":"SN-0","manufacturer":"Acme","model":"One","owner_id":1,"owner_username":"acme","transfer_date":0,"contract_number":"VO-1-1-0-00000000","issued_at":0,"verification_url":"https://localhost:5173/verify/1"}"#,
            expected_hash: "60661448f3ee5dd80454a3b91b73cb7b7f5d12d88d2b2f2ee598276ebcd336a7",
        },
        ContractVector {
            name: "transfer from manufacturer to first buyer",
            document: ContractDocument {
                product_id: ProductId(7),
                product_serial: "SN-001".into(),
                manufacturer: "Acme".into(),
                model: "Roadster".into(),
                owner_id: UserId(3),
                owner_username: "alice".into(),
                previous_owner_id: Some(UserId(2)),
                previous_owner_name: Some("acme".into()),
                transfer_date: 1736870400000,
                contract_number: contract_number("VO", ProductId(7), UserId(3), 1736870400000, 42),
                issued_at: 1736870400000,
                verification_url: "https://localhost:5173/verify/7".into(),
            },
            expected_json: r#"{"product_id":7,"product_serial":"SN-001","manufacturer":"Acme","model":"Roadster","owner_id":3,"owner_username":"alice","previous_owner_id":2,"previous_owner_name":"acme","transfer_date":1736870400000,"contract_number":"VO-7-3-1736870400000-0000002a","issued_at":1736870400000,"verification_url":"https://localhost:5173/verify/7"}"#,
            expected_hash: "bdcd14c4bfc1dd79d8e93c24c5353d18798efc1037f2d44130d6c324f9eec50a",
        },
    ]
}

/// Hash an arbitrary stored `document_data` the way a third party would.
pub fn rehash(document_data: &str) -> String {
    ContractHash::hash(document_data.as_bytes()).to_hex()
}
