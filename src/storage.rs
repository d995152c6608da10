use crate::domain::{Address, AddressPatch};
use crate::error::{GeofullError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Storage trait for persisting address records
#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Insert a new record. Fails when the raw text is already registered.
    async fn create(&self, address: Address) -> Result<Address>;
    async fn get(&self, id: Uuid) -> Result<Option<Address>>;
    async fn get_by_original(&self, original_address: &str) -> Result<Option<Address>>;
    /// Page through records in creation order.
    async fn list(&self, skip: usize, limit: usize) -> Result<Vec<Address>>;
    async fn list_all(&self) -> Result<Vec<Address>>;
    /// Apply the populated fields of `patch` and refresh `updated_at`.
    /// Returns `None` when the id is unknown.
    async fn update(&self, id: Uuid, patch: AddressPatch) -> Result<Option<Address>>;
    async fn delete(&self, id: Uuid) -> Result<Option<Address>>;
}

/// In-memory store, the default backend for a single-process deployment
pub struct InMemoryAddressStore {
    addresses: Arc<Mutex<HashMap<Uuid, Address>>>,
}

impl InMemoryAddressStore {
    pub fn new() -> Self {
        Self {
            addresses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn sorted(&self) -> Vec<Address> {
        let addresses = self.addresses.lock().unwrap();
        let mut all: Vec<Address> = addresses.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }
}

impl Default for InMemoryAddressStore {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_patch(address: &mut Address, patch: AddressPatch) {
    if let Some(normalized_address) = patch.normalized_address {
        address.normalized_address = Some(normalized_address);
    }
    if let Some(suggested_address) = patch.suggested_address {
        address.suggested_address = Some(suggested_address);
    }
    if let Some(street_info) = patch.street_info {
        address.street_info = Some(street_info);
    }
    if let Some(neighborhood) = patch.neighborhood {
        address.neighborhood = Some(neighborhood);
    }
    if let Some(apartment_info) = patch.apartment_info {
        address.apartment_info = Some(apartment_info);
    }
    if let Some(notes) = patch.notes {
        address.notes = Some(notes);
    }
    if let Some(latitude) = patch.latitude {
        address.latitude = Some(latitude);
    }
    if let Some(longitude) = patch.longitude {
        address.longitude = Some(longitude);
    }
    if let Some(postal_code) = patch.postal_code {
        address.postal_code = Some(postal_code);
    }
    if let Some(status) = patch.status {
        address.status = status;
    }
    address.updated_at = Some(Utc::now());
}

#[async_trait]
impl AddressStore for InMemoryAddressStore {
    async fn create(&self, address: Address) -> Result<Address> {
        let mut addresses = self.addresses.lock().unwrap();

        let duplicate = addresses
            .values()
            .any(|a| a.original_address == address.original_address);
        if duplicate {
            return Err(GeofullError::DuplicateAddress(
                address.original_address.clone(),
            ));
        }

        addresses.insert(address.id, address.clone());
        debug!("Created address {} ({})", address.id, address.original_address);
        Ok(address)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Address>> {
        let addresses = self.addresses.lock().unwrap();
        Ok(addresses.get(&id).cloned())
    }

    async fn get_by_original(&self, original_address: &str) -> Result<Option<Address>> {
        let addresses = self.addresses.lock().unwrap();
        let address = addresses
            .values()
            .find(|a| a.original_address == original_address)
            .cloned();
        Ok(address)
    }

    async fn list(&self, skip: usize, limit: usize) -> Result<Vec<Address>> {
        Ok(self.sorted().into_iter().skip(skip).take(limit).collect())
    }

    async fn list_all(&self) -> Result<Vec<Address>> {
        Ok(self.sorted())
    }

    async fn update(&self, id: Uuid, patch: AddressPatch) -> Result<Option<Address>> {
        let mut addresses = self.addresses.lock().unwrap();
        let Some(address) = addresses.get_mut(&id) else {
            return Ok(None);
        };

        apply_patch(address, patch);
        debug!("Updated address {} to status {}", id, address.status.as_str());
        Ok(Some(address.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Address>> {
        let mut addresses = self.addresses.lock().unwrap();
        let removed = addresses.remove(&id);
        if removed.is_some() {
            debug!("Deleted address {}", id);
        }
        Ok(removed)
    }
}
