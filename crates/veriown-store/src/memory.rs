//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use veriown_core::{
    ContentId, ContractId, Event, EventHash, NewContract, NewProduct, NewUser, OwnerContract,
    PendingTransfer, Product, ProductId, User, UserId, VerificationStatus,
};

use crate::error::{Result, StoreError};
use crate::traits::{
    check_append, GenesisBuilder, InsertResult, PendingInsert, Store, TransferCommit,
};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; every
/// mutation holds the write lock for its whole read-check-write sequence.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    users: BTreeMap<UserId, User>,
    products: BTreeMap<ProductId, Product>,
    /// Events per product, indexed by seq.
    events: HashMap<ProductId, Vec<Event>>,
    pending: BTreeMap<ProductId, PendingTransfer>,
    contracts: BTreeMap<ContractId, OwnerContract>,
    next_user: u64,
    next_product: u64,
    next_contract: u64,
}

impl MemoryStoreInner {
    fn chain(&self, product_id: ProductId) -> &[Event] {
        self.events.get(&product_id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn check(&self, event: &Event) -> InsertResult {
        let chain = self.chain(event.product_id());
        let at_position = usize::try_from(event.seq())
            .ok()
            .and_then(|i| chain.get(i));
        check_append(at_position, chain.last(), event)
    }

    fn head_hash(&self, product_id: ProductId) -> EventHash {
        self.chain(product_id)
            .last()
            .map(|e| *e.event_hash())
            .unwrap_or(EventHash::GENESIS)
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &NewUser) -> Result<User> {
        let mut inner = self.write()?;

        if inner.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::DuplicateUsername(user.username.clone()));
        }

        inner.next_user += 1;
        let created = User {
            id: UserId(inner.next_user),
            username: user.username.clone(),
            role: user.role,
            verification_status: user.verification_status,
        };
        inner.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn set_verification_status(
        &self,
        id: UserId,
        status: VerificationStatus,
    ) -> Result<Option<User>> {
        let mut inner = self.write()?;
        Ok(inner.users.get_mut(&id).map(|u| {
            u.verification_status = status;
            u.clone()
        }))
    }

    async fn users_with_status(&self, status: VerificationStatus) -> Result<Vec<User>> {
        let mut users: Vec<_> = self
            .read()?
            .users
            .values()
            .filter(|u| u.verification_status == status)
            .cloned()
            .collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn register_product(
        &self,
        product: &NewProduct,
        genesis: GenesisBuilder,
    ) -> Result<(Product, Event)> {
        let mut inner = self.write()?;

        let id = ProductId(inner.next_product + 1);
        let created = Product {
            id,
            serial_number: product.serial_number.clone(),
            manufacturer: product.manufacturer.clone(),
            model: product.model.clone(),
            created_at: product.created_at,
        };

        let event = genesis(&created)?;
        if event.product_id() != id || check_append(None, None, &event) != InsertResult::Inserted {
            return Err(StoreError::InvalidData(format!(
                "genesis event does not open the chain of product {id}"
            )));
        }

        inner.next_product += 1;
        inner.products.insert(id, created.clone());
        inner.events.insert(id, vec![event.clone()]);
        Ok((created, event))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.read()?.products.values().cloned().collect())
    }

    async fn append_event(&self, event: &Event) -> Result<InsertResult> {
        let mut inner = self.write()?;
        let product_id = event.product_id();

        if !inner.products.contains_key(&product_id) {
            return Err(StoreError::NotFound(format!("product {product_id}")));
        }

        let result = inner.check(event);
        if result == InsertResult::Inserted {
            inner
                .events
                .entry(product_id)
                .or_default()
                .push(event.clone());
        }
        Ok(result)
    }

    async fn events_for_product(&self, product_id: ProductId) -> Result<Vec<Event>> {
        Ok(self.read()?.chain(product_id).to_vec())
    }

    async fn head_event(&self, product_id: ProductId) -> Result<Option<Event>> {
        Ok(self.read()?.chain(product_id).last().cloned())
    }

    async fn get_pending_transfer(&self, product_id: ProductId) -> Result<Option<PendingTransfer>> {
        Ok(self.read()?.pending.get(&product_id).copied())
    }

    async fn pending_transfers_for_user(&self, user: UserId) -> Result<Vec<PendingTransfer>> {
        let mut pending: Vec<_> = self
            .read()?
            .pending
            .values()
            .filter(|p| p.new_owner_id == user)
            .copied()
            .collect();
        pending.sort_by_key(|p| (p.initiated_at, p.product_id));
        Ok(pending)
    }

    async fn insert_pending_transfer(
        &self,
        pending: &PendingTransfer,
        head: &EventHash,
    ) -> Result<PendingInsert> {
        let mut inner = self.write()?;

        if !inner.products.contains_key(&pending.product_id) {
            return Err(StoreError::NotFound(format!("product {}", pending.product_id)));
        }
        if let Some(existing) = inner.pending.get(&pending.product_id) {
            return Ok(PendingInsert::AlreadyPending(*existing));
        }
        let existing = inner.head_hash(pending.product_id);
        if existing != *head {
            return Ok(PendingInsert::Conflict { existing });
        }

        inner.pending.insert(pending.product_id, *pending);
        Ok(PendingInsert::Inserted)
    }

    async fn commit_transfer(
        &self,
        pending: &PendingTransfer,
        event: &Event,
    ) -> Result<TransferCommit> {
        let mut inner = self.write()?;
        let product_id = pending.product_id;

        if event.product_id() != product_id || event.payload().new_owner() != Some(pending.new_owner_id) {
            return Err(StoreError::InvalidData(format!(
                "event does not record the pending transfer of product {product_id}"
            )));
        }

        match inner.pending.get(&product_id) {
            Some(current) if current.new_owner_id == pending.new_owner_id => {}
            _ => return Ok(TransferCommit::PendingMissing),
        }

        if inner.check(event) != InsertResult::Inserted {
            return Ok(TransferCommit::Conflict {
                existing: inner.head_hash(product_id),
            });
        }

        inner
            .events
            .entry(product_id)
            .or_default()
            .push(event.clone());
        inner.pending.remove(&product_id);
        Ok(TransferCommit::Committed)
    }

    async fn insert_contract(&self, contract: &NewContract) -> Result<OwnerContract> {
        let mut inner = self.write()?;

        if !inner.products.contains_key(&contract.product_id) {
            return Err(StoreError::NotFound(format!("product {}", contract.product_id)));
        }
        if inner
            .contracts
            .values()
            .any(|c| c.contract_number == contract.contract_number)
        {
            return Err(StoreError::DuplicateContractNumber(
                contract.contract_number.clone(),
            ));
        }

        inner.next_contract += 1;
        let created = OwnerContract {
            id: ContractId(inner.next_contract),
            product_id: contract.product_id,
            owner_id: contract.owner_id,
            previous_owner_id: contract.previous_owner_id,
            transfer_date: contract.transfer_date,
            contract_number: contract.contract_number.clone(),
            document_data: contract.document_data.clone(),
            contract_hash: contract.contract_hash,
            content_id: contract.content_id.clone(),
            cache_path: contract.cache_path.clone(),
            created_at: contract.created_at,
            updated_at: contract.created_at,
        };
        inner.contracts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_contract(&self, id: ContractId) -> Result<Option<OwnerContract>> {
        Ok(self.read()?.contracts.get(&id).cloned())
    }

    async fn contracts_for_product(&self, product_id: ProductId) -> Result<Vec<OwnerContract>> {
        let mut contracts: Vec<_> = self
            .read()?
            .contracts
            .values()
            .filter(|c| c.product_id == product_id)
            .cloned()
            .collect();
        contracts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(contracts)
    }

    async fn update_contract_storage(
        &self,
        id: ContractId,
        content_id: &ContentId,
        cache_path: Option<&Path>,
        updated_at: i64,
    ) -> Result<Option<OwnerContract>> {
        let mut inner = self.write()?;
        Ok(inner.contracts.get_mut(&id).map(|c| {
            c.content_id = content_id.clone();
            c.cache_path = cache_path.map(Path::to_path_buf);
            c.updated_at = updated_at;
            c.clone()
        }))
    }
}
