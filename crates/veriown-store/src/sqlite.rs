//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for VeriOwn. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.
//!
//! Every mutating operation runs inside an IMMEDIATE transaction, so the
//! read-check-write sequences of append, register and transfer commit are
//! atomic even when other connections share the database file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::error;

use veriown_core::{
    now_millis, ContentId, ContractHash, ContractId, Event, EventHash, EventPayload, EventType,
    NewContract, NewProduct, NewUser, OwnerContract, PendingTransfer, Product, ProductId, Role,
    User, UserId, VerificationStatus,
};

use crate::blob::{content_id_for, BlobStore};
use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{
    check_append, GenesisBuilder, InsertResult, PendingInsert, Store, TransferCommit,
};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Execute a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn to_i64(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| StoreError::InvalidData(format!("{field} out of range: {value}")))
}

fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| StoreError::InvalidData(format!("{field} out of range: {value}")))
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn user_from_row((id, username, role, status): (i64, String, String, String)) -> Result<User> {
    Ok(User {
        id: UserId(to_u64(id, "user id")?),
        username,
        role: role.parse::<Role>().map_err(StoreError::InvalidData)?,
        verification_status: status
            .parse::<VerificationStatus>()
            .map_err(StoreError::InvalidData)?,
    })
}

const USER_COLUMNS: &str = "id, username, role, verification_status";

fn load_user(conn: &Connection, sql: &str, key: &dyn rusqlite::ToSql) -> Result<Option<User>> {
    conn.query_row(sql, [key], row_to_user)
        .optional()?
        .map(user_from_row)
        .transpose()
}

fn row_to_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn product_from_row(
    (id, serial_number, manufacturer, model, created_at): (i64, String, String, String, i64),
) -> Result<Product> {
    Ok(Product {
        id: ProductId(to_u64(id, "product id")?),
        serial_number,
        manufacturer,
        model,
        created_at,
    })
}

fn product_exists(conn: &Connection, product_id: ProductId) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM products WHERE id = ?1",
            params![to_i64(product_id.get(), "product id")?],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

/// An events row as stored, before its payload is decoded.
struct EventRow {
    product_id: i64,
    seq: i64,
    event_type: String,
    event_data: String,
    created_by: i64,
    created_at: i64,
    previous_event_hash: Vec<u8>,
    event_hash: Vec<u8>,
}

const EVENT_COLUMNS: &str = "product_id, seq, event_type, event_data, created_by, created_at, \
                             previous_event_hash, event_hash";

impl EventRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            product_id: row.get(0)?,
            seq: row.get(1)?,
            event_type: row.get(2)?,
            event_data: row.get(3)?,
            created_by: row.get(4)?,
            created_at: row.get(5)?,
            previous_event_hash: row.get(6)?,
            event_hash: row.get(7)?,
        })
    }

    /// Decode the payload. A row edited into something no payload schema
    /// accepts is kept as an `unreadable` custom entry, whose digest can
    /// never match the stored one, so verification reports it at its index.
    fn payload(&self) -> EventPayload {
        let decoded = self
            .event_type
            .parse::<EventType>()
            .and_then(|event_type| {
                let data = serde_json::from_str(&self.event_data)
                    .map_err(|e| veriown_core::CoreError::EncodingError(e.to_string()))?;
                EventPayload::decode(event_type, data)
            });

        decoded.unwrap_or_else(|e| {
            error!(
                product_id = self.product_id,
                seq = self.seq,
                event_type = %self.event_type,
                error = %e,
                "stored event does not decode"
            );
            EventPayload::Custom {
                details: format!("unreadable {} entry: {}", self.event_type, self.event_data),
            }
        })
    }

    fn into_event(self) -> Result<Event> {
        let payload = self.payload();

        Ok(Event::from_stored(
            ProductId(to_u64(self.product_id, "product id")?),
            to_u64(self.seq, "seq")?,
            payload,
            UserId(to_u64(self.created_by, "created_by")?),
            self.created_at,
            hash_from_blob(&self.previous_event_hash, "previous_event_hash")?,
            hash_from_blob(&self.event_hash, "event_hash")?,
        ))
    }
}

fn hash_from_blob(bytes: &[u8], field: &str) -> Result<EventHash> {
    EventHash::try_from(bytes)
        .map_err(|_| StoreError::InvalidData(format!("{field} is not 32 bytes")))
}

fn load_event(conn: &Connection, product_id: ProductId, seq: u64) -> Result<Option<Event>> {
    conn.query_row(
        &format!("SELECT {EVENT_COLUMNS} FROM events WHERE product_id = ?1 AND seq = ?2"),
        params![to_i64(product_id.get(), "product id")?, to_i64(seq, "seq")?],
        EventRow::read,
    )
    .optional()?
    .map(EventRow::into_event)
    .transpose()
}

fn load_head(conn: &Connection, product_id: ProductId) -> Result<Option<Event>> {
    conn.query_row(
        &format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE product_id = ?1 ORDER BY seq DESC LIMIT 1"
        ),
        params![to_i64(product_id.get(), "product id")?],
        EventRow::read,
    )
    .optional()?
    .map(EventRow::into_event)
    .transpose()
}

/// Digest of the product's last stored event, or genesis.
fn head_hash(conn: &Connection, product_id: ProductId) -> Result<EventHash> {
    let stored: Option<Vec<u8>> = conn
        .query_row(
            "SELECT event_hash FROM events WHERE product_id = ?1 ORDER BY seq DESC LIMIT 1",
            params![to_i64(product_id.get(), "product id")?],
            |row| row.get(0),
        )
        .optional()?;
    match stored {
        Some(bytes) => hash_from_blob(&bytes, "event_hash"),
        None => Ok(EventHash::GENESIS),
    }
}

/// Decide an append against the rows currently stored.
fn check_stored(conn: &Connection, event: &Event) -> Result<(InsertResult, EventHash)> {
    let at_position = load_event(conn, event.product_id(), event.seq())?;
    let head = load_head(conn, event.product_id())?;
    let head_hash = head
        .as_ref()
        .map(|h| *h.event_hash())
        .unwrap_or(EventHash::GENESIS);
    Ok((check_append(at_position.as_ref(), head.as_ref(), event), head_hash))
}

fn insert_event_row(conn: &Connection, event: &Event) -> Result<()> {
    let event_data = serde_json::to_string(&event.payload().data_json())
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    conn.execute(
        "INSERT INTO events (
            product_id, seq, event_type, event_data, created_by, created_at,
            previous_event_hash, event_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            to_i64(event.product_id().get(), "product id")?,
            to_i64(event.seq(), "seq")?,
            event.event_type().as_str(),
            event_data,
            to_i64(event.created_by().get(), "created_by")?,
            event.created_at(),
            event.previous_event_hash().as_bytes().as_slice(),
            event.event_hash().as_bytes().as_slice(),
        ],
    )?;
    Ok(())
}

fn row_to_pending(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, i64, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn pending_from_row((product_id, new_owner_id, initiated_at): (i64, i64, i64)) -> Result<PendingTransfer> {
    Ok(PendingTransfer {
        product_id: ProductId(to_u64(product_id, "product id")?),
        new_owner_id: UserId(to_u64(new_owner_id, "new_owner_id")?),
        initiated_at,
    })
}

fn load_pending(conn: &Connection, product_id: ProductId) -> Result<Option<PendingTransfer>> {
    conn.query_row(
        "SELECT product_id, new_owner_id, initiated_at FROM pending_transfers WHERE product_id = ?1",
        params![to_i64(product_id.get(), "product id")?],
        row_to_pending,
    )
    .optional()?
    .map(pending_from_row)
    .transpose()
}

/// An owner_contracts row as stored.
struct ContractRow {
    id: i64,
    product_id: i64,
    owner_id: i64,
    previous_owner_id: Option<i64>,
    transfer_date: i64,
    contract_number: String,
    document_data: String,
    contract_hash: String,
    content_id: String,
    cache_path: Option<String>,
    created_at: i64,
    updated_at: i64,
}

const CONTRACT_COLUMNS: &str = "id, product_id, owner_id, previous_owner_id, transfer_date, \
                                contract_number, document_data, contract_hash, content_id, \
                                cache_path, created_at, updated_at";

impl ContractRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            product_id: row.get(1)?,
            owner_id: row.get(2)?,
            previous_owner_id: row.get(3)?,
            transfer_date: row.get(4)?,
            contract_number: row.get(5)?,
            document_data: row.get(6)?,
            contract_hash: row.get(7)?,
            content_id: row.get(8)?,
            cache_path: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_contract(self) -> Result<OwnerContract> {
        Ok(OwnerContract {
            id: ContractId(to_u64(self.id, "contract id")?),
            product_id: ProductId(to_u64(self.product_id, "product id")?),
            owner_id: UserId(to_u64(self.owner_id, "owner_id")?),
            previous_owner_id: self
                .previous_owner_id
                .map(|id| to_u64(id, "previous_owner_id").map(UserId))
                .transpose()?,
            transfer_date: self.transfer_date,
            contract_number: self.contract_number,
            document_data: self.document_data,
            contract_hash: ContractHash::from_hex(&self.contract_hash)
                .map_err(|e| StoreError::InvalidData(format!("contract_hash: {e}")))?,
            content_id: ContentId::new(self.content_id),
            cache_path: self.cache_path.map(PathBuf::from),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn load_contract(conn: &Connection, id: ContractId) -> Result<Option<OwnerContract>> {
    conn.query_row(
        &format!("SELECT {CONTRACT_COLUMNS} FROM owner_contracts WHERE id = ?1"),
        params![to_i64(id.get(), "contract id")?],
        ContractRow::read,
    )
    .optional()?
    .map(ContractRow::into_contract)
    .transpose()
}

fn path_to_text(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| StoreError::InvalidData(format!("cache path is not UTF-8: {}", path.display())))
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl Store for SqliteStore {
    async fn insert_user(&self, user: &NewUser) -> Result<User> {
        let user = user.clone();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let taken = tx
                .query_row(
                    "SELECT 1 FROM users WHERE username = ?1",
                    params![user.username],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if taken {
                return Err(StoreError::DuplicateUsername(user.username));
            }

            tx.execute(
                "INSERT INTO users (username, role, verification_status) VALUES (?1, ?2, ?3)",
                params![
                    user.username,
                    user.role.as_str(),
                    user.verification_status.as_str()
                ],
            )?;
            let id = UserId(to_u64(tx.last_insert_rowid(), "user id")?);
            tx.commit()?;

            Ok(User {
                id,
                username: user.username,
                role: user.role,
                verification_status: user.verification_status,
            })
        })
        .await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let id = to_i64(id.get(), "user id")?;
        self.run(move |conn| {
            load_user(
                conn,
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                &id,
            )
        })
        .await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let username = username.to_owned();
        self.run(move |conn| {
            load_user(
                conn,
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                &username,
            )
        })
        .await
    }

    async fn set_verification_status(
        &self,
        id: UserId,
        status: VerificationStatus,
    ) -> Result<Option<User>> {
        let id = to_i64(id.get(), "user id")?;
        self.run(move |conn| {
            conn.execute(
                "UPDATE users SET verification_status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )?;
            load_user(
                conn,
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                &id,
            )
        })
        .await
    }

    async fn users_with_status(&self, status: VerificationStatus) -> Result<Vec<User>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE verification_status = ?1 ORDER BY id"
            ))?;
            let rows = stmt
                .query_map(params![status.as_str()], row_to_user)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(user_from_row).collect()
        })
        .await
    }

    async fn register_product(
        &self,
        product: &NewProduct,
        genesis: GenesisBuilder,
    ) -> Result<(Product, Event)> {
        let product = product.clone();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            tx.execute(
                "INSERT INTO products (serial_number, manufacturer, model, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    product.serial_number,
                    product.manufacturer,
                    product.model,
                    product.created_at
                ],
            )?;
            let created = Product {
                id: ProductId(to_u64(tx.last_insert_rowid(), "product id")?),
                serial_number: product.serial_number,
                manufacturer: product.manufacturer,
                model: product.model,
                created_at: product.created_at,
            };

            // Dropping `tx` on any error below rolls back the product row.
            let event = genesis(&created)?;
            if event.product_id() != created.id
                || check_append(None, None, &event) != InsertResult::Inserted
            {
                return Err(StoreError::InvalidData(format!(
                    "genesis event does not open the chain of product {}",
                    created.id
                )));
            }
            insert_event_row(&tx, &event)?;
            tx.commit()?;

            Ok((created, event))
        })
        .await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let id = to_i64(id.get(), "product id")?;
        self.run(move |conn| {
            conn.query_row(
                "SELECT id, serial_number, manufacturer, model, created_at
                 FROM products WHERE id = ?1",
                params![id],
                row_to_product,
            )
            .optional()?
            .map(product_from_row)
            .transpose()
        })
        .await
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, serial_number, manufacturer, model, created_at
                 FROM products ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], row_to_product)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(product_from_row).collect()
        })
        .await
    }

    async fn append_event(&self, event: &Event) -> Result<InsertResult> {
        let event = event.clone();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if !product_exists(&tx, event.product_id())? {
                return Err(StoreError::NotFound(format!("product {}", event.product_id())));
            }

            let (result, _) = check_stored(&tx, &event)?;
            if result == InsertResult::Inserted {
                insert_event_row(&tx, &event)?;
                tx.commit()?;
            }
            Ok(result)
        })
        .await
    }

    async fn events_for_product(&self, product_id: ProductId) -> Result<Vec<Event>> {
        let id = to_i64(product_id.get(), "product id")?;
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE product_id = ?1 ORDER BY seq"
            ))?;
            let rows = stmt
                .query_map(params![id], EventRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(EventRow::into_event).collect()
        })
        .await
    }

    async fn head_event(&self, product_id: ProductId) -> Result<Option<Event>> {
        self.run(move |conn| load_head(conn, product_id)).await
    }

    async fn get_pending_transfer(&self, product_id: ProductId) -> Result<Option<PendingTransfer>> {
        self.run(move |conn| load_pending(conn, product_id)).await
    }

    async fn pending_transfers_for_user(&self, user: UserId) -> Result<Vec<PendingTransfer>> {
        let user = to_i64(user.get(), "user id")?;
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT product_id, new_owner_id, initiated_at FROM pending_transfers
                 WHERE new_owner_id = ?1 ORDER BY initiated_at, product_id",
            )?;
            let rows = stmt
                .query_map(params![user], row_to_pending)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(pending_from_row).collect()
        })
        .await
    }

    async fn insert_pending_transfer(
        &self,
        pending: &PendingTransfer,
        head: &EventHash,
    ) -> Result<PendingInsert> {
        let pending = *pending;
        let head = *head;

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if !product_exists(&tx, pending.product_id)? {
                return Err(StoreError::NotFound(format!("product {}", pending.product_id)));
            }
            if let Some(existing) = load_pending(&tx, pending.product_id)? {
                return Ok(PendingInsert::AlreadyPending(existing));
            }
            let existing = head_hash(&tx, pending.product_id)?;
            if existing != head {
                return Ok(PendingInsert::Conflict { existing });
            }

            tx.execute(
                "INSERT INTO pending_transfers (product_id, new_owner_id, initiated_at)
                 VALUES (?1, ?2, ?3)",
                params![
                    to_i64(pending.product_id.get(), "product id")?,
                    to_i64(pending.new_owner_id.get(), "new_owner_id")?,
                    pending.initiated_at
                ],
            )?;
            tx.commit()?;
            Ok(PendingInsert::Inserted)
        })
        .await
    }

    async fn commit_transfer(
        &self,
        pending: &PendingTransfer,
        event: &Event,
    ) -> Result<TransferCommit> {
        let pending = *pending;
        let event = event.clone();

        if event.product_id() != pending.product_id
            || event.payload().new_owner() != Some(pending.new_owner_id)
        {
            return Err(StoreError::InvalidData(format!(
                "event does not record the pending transfer of product {}",
                pending.product_id
            )));
        }

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            match load_pending(&tx, pending.product_id)? {
                Some(current) if current.new_owner_id == pending.new_owner_id => {}
                _ => return Ok(TransferCommit::PendingMissing),
            }

            let (result, head) = check_stored(&tx, &event)?;
            if result != InsertResult::Inserted {
                return Ok(TransferCommit::Conflict { existing: head });
            }

            insert_event_row(&tx, &event)?;
            tx.execute(
                "DELETE FROM pending_transfers WHERE product_id = ?1",
                params![to_i64(pending.product_id.get(), "product id")?],
            )?;
            tx.commit()?;
            Ok(TransferCommit::Committed)
        })
        .await
    }

    async fn insert_contract(&self, contract: &NewContract) -> Result<OwnerContract> {
        let contract = contract.clone();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if !product_exists(&tx, contract.product_id)? {
                return Err(StoreError::NotFound(format!("product {}", contract.product_id)));
            }
            let taken = tx
                .query_row(
                    "SELECT 1 FROM owner_contracts WHERE contract_number = ?1",
                    params![contract.contract_number],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if taken {
                return Err(StoreError::DuplicateContractNumber(contract.contract_number));
            }

            let cache_path = contract.cache_path.as_deref().map(path_to_text).transpose()?;
            tx.execute(
                "INSERT INTO owner_contracts (
                    product_id, owner_id, previous_owner_id, transfer_date, contract_number,
                    document_data, contract_hash, content_id, cache_path, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    to_i64(contract.product_id.get(), "product id")?,
                    to_i64(contract.owner_id.get(), "owner_id")?,
                    contract
                        .previous_owner_id
                        .map(|id| to_i64(id.get(), "previous_owner_id"))
                        .transpose()?,
                    contract.transfer_date,
                    contract.contract_number,
                    contract.document_data,
                    contract.contract_hash.to_hex(),
                    contract.content_id.as_str(),
                    cache_path,
                    contract.created_at,
                ],
            )?;
            let id = ContractId(to_u64(tx.last_insert_rowid(), "contract id")?);
            tx.commit()?;

            Ok(OwnerContract {
                id,
                product_id: contract.product_id,
                owner_id: contract.owner_id,
                previous_owner_id: contract.previous_owner_id,
                transfer_date: contract.transfer_date,
                contract_number: contract.contract_number,
                document_data: contract.document_data,
                contract_hash: contract.contract_hash,
                content_id: contract.content_id,
                cache_path: contract.cache_path,
                created_at: contract.created_at,
                updated_at: contract.created_at,
            })
        })
        .await
    }

    async fn get_contract(&self, id: ContractId) -> Result<Option<OwnerContract>> {
        self.run(move |conn| load_contract(conn, id)).await
    }

    async fn contracts_for_product(&self, product_id: ProductId) -> Result<Vec<OwnerContract>> {
        let id = to_i64(product_id.get(), "product id")?;
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTRACT_COLUMNS} FROM owner_contracts
                 WHERE product_id = ?1 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map(params![id], ContractRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(ContractRow::into_contract).collect()
        })
        .await
    }

    async fn update_contract_storage(
        &self,
        id: ContractId,
        content_id: &ContentId,
        cache_path: Option<&Path>,
        updated_at: i64,
    ) -> Result<Option<OwnerContract>> {
        let content_id = content_id.clone();
        let cache_path = cache_path.map(path_to_text).transpose()?;

        self.run(move |conn| {
            conn.execute(
                "UPDATE owner_contracts SET content_id = ?1, cache_path = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![
                    content_id.as_str(),
                    cache_path,
                    updated_at,
                    to_i64(id.get(), "contract id")?
                ],
            )?;
            load_contract(conn, id)
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Blob storage
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl BlobStore for SqliteStore {
    async fn put(&self, bytes: Bytes) -> Result<ContentId> {
        let id = content_id_for(&bytes);
        let key = id.clone();

        self.run(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO blobs (content_id, bytes, stored_at) VALUES (?1, ?2, ?3)",
                params![key.as_str(), bytes.as_ref(), now_millis()],
            )?;
            Ok(())
        })
        .await?;
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Option<Bytes>> {
        let id = id.clone();
        self.run(move |conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT bytes FROM blobs WHERE content_id = ?1",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(bytes.map(Bytes::from))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn test_users() {
        test_support::exercise_users(&SqliteStore::open_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_register_and_append() {
        test_support::exercise_register_and_append(&SqliteStore::open_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_append_conflict_and_idempotence() {
        test_support::exercise_append_conflict(&SqliteStore::open_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_pending_transfer_slot() {
        test_support::exercise_pending_slot(&SqliteStore::open_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_commit_transfer() {
        test_support::exercise_commit_transfer(&SqliteStore::open_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_contracts() {
        test_support::exercise_contracts(&SqliteStore::open_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_failed_genesis_leaves_nothing() {
        test_support::exercise_failed_genesis(&SqliteStore::open_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_blobs() {
        let store = SqliteStore::open_memory().unwrap();
        let id = store.put(Bytes::from_static(b"rendered")).await.unwrap();
        assert_eq!(id, content_id_for(b"rendered"));
        assert_eq!(
            store.get(&id).await.unwrap(),
            Some(Bytes::from_static(b"rendered"))
        );
        assert_eq!(store.put(Bytes::from_static(b"rendered")).await.unwrap(), id);
        assert!(store.get(&ContentId::new("b3-none")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reopen_file_keeps_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let (product_id, genesis) = {
            let store = SqliteStore::open(&path).unwrap();
            test_support::register(&store, UserId(1)).await
        };

        let store = SqliteStore::open(&path).unwrap();
        let events = store.events_for_product(product_id).await.unwrap();
        assert_eq!(events, vec![genesis]);
        veriown_core::verify_chain(&events).unwrap();
    }

    #[tokio::test]
    async fn test_tampered_row_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let store = SqliteStore::open(&path).unwrap();

        let (product_id, genesis) = test_support::register(&store, UserId(1)).await;
        let repair = test_support::next(
            &genesis,
            EventPayload::Repair {
                repair_details: "screen".into(),
                parts_used: None,
            },
            UserId(2),
            2_000,
        );
        store.append_event(&repair).await.unwrap();

        let raw = Connection::open(&path).unwrap();
        raw.execute(
            "UPDATE events SET event_data = ?1 WHERE product_id = ?2 AND seq = 1",
            params![r#"{"repair_details":"nothing happened"}"#, product_id.get() as i64],
        )
        .unwrap();

        let events = store.events_for_product(product_id).await.unwrap();
        assert_eq!(
            veriown_core::verify_chain(&events),
            Err(veriown_core::VerificationError::ChainBroken { at_index: 1 })
        );
    }

    #[tokio::test]
    async fn test_undecodable_row_breaks_chain_at_its_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let store = SqliteStore::open(&path).unwrap();
        let (product_id, genesis) = test_support::register(&store, UserId(1)).await;
        let repair = test_support::next(
            &genesis,
            EventPayload::Repair {
                repair_details: "screen".into(),
                parts_used: None,
            },
            UserId(2),
            2_000,
        );
        store.append_event(&repair).await.unwrap();

        let raw = Connection::open(&path).unwrap();
        raw.execute(
            "UPDATE events SET event_type = 'inspection' WHERE product_id = ?1 AND seq = 1",
            params![product_id.get() as i64],
        )
        .unwrap();

        let events = store.events_for_product(product_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type(), EventType::Custom);
        assert_eq!(
            veriown_core::verify_chain(&events),
            Err(veriown_core::VerificationError::ChainBroken { at_index: 1 })
        );

        raw.execute(
            "UPDATE events SET event_type = 'teleport' WHERE product_id = ?1 AND seq = 0",
            params![product_id.get() as i64],
        )
        .unwrap();
        let events = store.events_for_product(product_id).await.unwrap();
        assert_eq!(
            veriown_core::verify_chain(&events),
            Err(veriown_core::VerificationError::ChainBroken { at_index: 0 })
        );
    }

    #[tokio::test]
    async fn test_pending_insert_is_bound_to_head() {
        let store = SqliteStore::open_memory().unwrap();
        let (product_id, genesis) = test_support::register(&store, UserId(1)).await;
        let pending = PendingTransfer {
            product_id,
            new_owner_id: UserId(2),
            initiated_at: 3_000,
        };

        let stale = EventHash([7; 32]);
        assert_eq!(
            store.insert_pending_transfer(&pending, &stale).await.unwrap(),
            PendingInsert::Conflict {
                existing: *genesis.event_hash()
            }
        );
        assert!(store.get_pending_transfer(product_id).await.unwrap().is_none());
        assert_eq!(
            store
                .insert_pending_transfer(&pending, genesis.event_hash())
                .await
                .unwrap(),
            PendingInsert::Inserted
        );
    }
}
