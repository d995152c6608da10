use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an address record. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressStatus {
    Pending,
    Normalized,
    Verified,
}

impl AddressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressStatus::Pending => "pending",
            AddressStatus::Normalized => "normalized",
            AddressStatus::Verified => "verified",
        }
    }
}

/// An address record in the system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub original_address: String,
    pub normalized_address: Option<String>,
    pub suggested_address: Option<String>,
    pub street_info: Option<String>,
    pub neighborhood: Option<String>,
    pub apartment_info: Option<String>,
    pub notes: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub postal_code: Option<String>,
    pub status: AddressStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Address {
    /// Fresh record for a raw address, before any enrichment has run.
    pub fn new(original_address: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_address: original_address.into(),
            normalized_address: None,
            suggested_address: None,
            street_info: None,
            neighborhood: None,
            apartment_info: None,
            notes: None,
            latitude: None,
            longitude: None,
            postal_code: None,
            status: AddressStatus::Pending,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Payload for registering a new address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAddress {
    pub original_address: String,
}

/// Partial update for an address record. Fields left as `None` are unchanged.
/// The original raw text and the id are immutable after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressPatch {
    pub normalized_address: Option<String>,
    pub suggested_address: Option<String>,
    pub street_info: Option<String>,
    pub neighborhood: Option<String>,
    pub apartment_info: Option<String>,
    pub notes: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub postal_code: Option<String>,
    pub status: Option<AddressStatus>,
}

impl AddressPatch {
    pub fn is_empty(&self) -> bool {
        self.normalized_address.is_none()
            && self.suggested_address.is_none()
            && self.street_info.is_none()
            && self.neighborhood.is_none()
            && self.apartment_info.is_none()
            && self.notes.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.postal_code.is_none()
            && self.status.is_none()
    }
}
