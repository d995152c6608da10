use crate::csv_io;
use crate::domain::Address;
use crate::error::{GeofullError, Result};
use crate::storage::AddressStore;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// What a CSV import did. `created_ids` drive the per-address enrichment
/// triggers; duplicates and blank cells are skipped, never an error.
#[derive(Debug, Default, Clone)]
pub struct ImportSummary {
    pub rows_found: usize,
    pub skipped: usize,
    pub created_ids: Vec<Uuid>,
}

impl ImportSummary {
    pub fn created(&self) -> usize {
        self.created_ids.len()
    }
}

/// Register every new address found in a CSV document.
pub async fn import_csv_text(store: &Arc<dyn AddressStore>, text: &str) -> Result<ImportSummary> {
    let found = csv_io::extract_addresses(text)?;

    let mut summary = ImportSummary {
        rows_found: found.rows_found,
        ..ImportSummary::default()
    };
    for raw in found.addresses {
        match store.create(Address::new(raw)).await {
            Ok(address) => summary.created_ids.push(address.id),
            Err(GeofullError::DuplicateAddress(_)) => summary.skipped += 1,
            Err(e) => return Err(e),
        }
    }

    info!(
        rows = summary.rows_found,
        created = summary.created(),
        skipped = summary.skipped,
        "imported CSV addresses"
    );
    Ok(summary)
}

/// Register every new address found in a CSV file on disk.
pub async fn import_csv_file(store: &Arc<dyn AddressStore>, path: &Path) -> Result<ImportSummary> {
    let text = fs::read_to_string(path)?;
    import_csv_text(store, &text).await
}

/// Write every stored record to a CSV file on disk. Returns the record count.
pub async fn export_csv_file(store: &Arc<dyn AddressStore>, path: &Path) -> Result<usize> {
    let addresses = store.list_all().await?;
    fs::write(path, csv_io::render(&addresses))?;
    info!(records = addresses.len(), path = %path.display(), "exported CSV file");
    Ok(addresses.len())
}
