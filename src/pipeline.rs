use crate::domain::{AddressPatch, AddressStatus};
use crate::error::Result;
use crate::extractor::{AddressExtractor, StructuredFields};
use crate::geocoder::Geocoder;
use crate::storage::AddressStore;
use metrics::counter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// How one enrichment run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Both steps succeeded; the record is verified.
    Verified,
    /// Extraction failed; the record is untouched and stays pending.
    HaltedAtExtraction,
    /// Geocoding failed; extraction results are kept and the record
    /// stays normalized. A later trigger resumes from geocoding.
    HaltedAtGeocoding,
    /// The record was already verified; nothing was done.
    AlreadyVerified,
    /// The id did not resolve to a record.
    NotFound,
}

/// Tallies for a batch re-trigger over the whole store
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub attempted: usize,
    pub verified: usize,
    pub halted: usize,
}

/// Build the geocoder input from extracted fields: the street and
/// neighborhood when present, then the configured locality literals.
pub fn build_normalized_address(fields: &StructuredFields, city: &str, region: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(street_info) = fields.street_info.as_deref() {
        parts.push(street_info);
    }
    if let Some(neighborhood) = fields.neighborhood.as_deref() {
        parts.push(neighborhood);
    }
    parts.push(city);
    parts.push(region);
    parts.join(", ")
}

/// Drives one address at a time through extraction and geocoding,
/// persisting after each successful step.
pub struct EnrichmentPipeline {
    store: Arc<dyn AddressStore>,
    extractor: Arc<dyn AddressExtractor>,
    geocoder: Arc<dyn Geocoder>,
    city: String,
    region: String,
    // One advisory lock per address id; overlapping triggers for the
    // same id serialize instead of racing on read-modify-write.
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for EnrichmentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentPipeline")
            .field("store", &"<Arc<dyn AddressStore>>")
            .field("extractor", &"<Arc<dyn AddressExtractor>>")
            .field("geocoder", &"<Arc<dyn Geocoder>>")
            .field("city", &self.city)
            .field("region", &self.region)
            .finish()
    }
}

impl EnrichmentPipeline {
    pub fn new(
        store: Arc<dyn AddressStore>,
        extractor: Arc<dyn AddressExtractor>,
        geocoder: Arc<dyn Geocoder>,
        city: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            store,
            extractor,
            geocoder,
            city: city.into(),
            region: region.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        Arc::clone(locks.entry(id).or_default())
    }

    /// Fire-and-forget trigger. The caller gets no outcome back; progress
    /// is observable through the record store.
    pub fn spawn_run(self: &Arc<Self>, id: Uuid) {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            match pipeline.run(id).await {
                Ok(outcome) => debug!(%id, ?outcome, "enrichment run finished"),
                Err(e) => warn!(%id, error = %e, "enrichment run failed"),
            }
        });
    }

    /// Run the two-step pipeline for one address id.
    ///
    /// Each successful step is persisted before the next starts, so a run
    /// halted at geocoding leaves a normalized record that the next
    /// trigger picks up from the geocoding step.
    #[instrument(skip(self))]
    pub async fn run(&self, id: Uuid) -> Result<RunOutcome> {
        let id_lock = self.lock_for(id);
        let _guard = id_lock.lock().await;

        counter!("geofull_pipeline_runs_started").increment(1);

        let Some(mut address) = self.store.get(id).await? else {
            warn!(%id, "address not found at run start");
            return Ok(RunOutcome::NotFound);
        };

        if address.status == AddressStatus::Verified {
            debug!(%id, "address already verified, nothing to do");
            return Ok(RunOutcome::AlreadyVerified);
        }

        if address.status == AddressStatus::Pending {
            info!(%id, original = %address.original_address, "extracting structured fields");
            let fields = match self.extractor.extract(&address.original_address).await {
                Ok(fields) => fields,
                Err(e) => {
                    counter!("geofull_extraction_failures").increment(1);
                    counter!("geofull_pipeline_runs_halted").increment(1);
                    warn!(%id, error = %e, "extraction failed, record stays pending");
                    return Ok(RunOutcome::HaltedAtExtraction);
                }
            };

            let normalized = build_normalized_address(&fields, &self.city, &self.region);
            debug!(%id, normalized, "persisting extraction results");
            let patch = AddressPatch {
                street_info: fields.street_info,
                neighborhood: fields.neighborhood,
                apartment_info: fields.apartment_info,
                notes: fields.notes,
                normalized_address: Some(normalized),
                status: Some(AddressStatus::Normalized),
                ..AddressPatch::default()
            };
            address = match self.store.update(id, patch).await? {
                Some(updated) => updated,
                None => {
                    warn!(%id, "address deleted while extracting");
                    return Ok(RunOutcome::NotFound);
                }
            };
        }

        let Some(query) = address.normalized_address.clone() else {
            // Unreachable through the pipeline's own transitions, but the
            // record can be edited from outside.
            warn!(%id, "normalized record has no normalized address, halting");
            counter!("geofull_pipeline_runs_halted").increment(1);
            return Ok(RunOutcome::HaltedAtGeocoding);
        };

        info!(%id, query, "geocoding normalized address");
        let geo = match self.geocoder.geocode(&query).await {
            Ok(geo) => geo,
            Err(e) => {
                counter!("geofull_geocode_failures").increment(1);
                counter!("geofull_pipeline_runs_halted").increment(1);
                warn!(%id, error = %e, "geocoding failed, record stays normalized");
                return Ok(RunOutcome::HaltedAtGeocoding);
            }
        };

        let patch = AddressPatch {
            latitude: Some(geo.latitude),
            longitude: Some(geo.longitude),
            suggested_address: Some(geo.suggested_address),
            postal_code: geo.postal_code,
            status: Some(AddressStatus::Verified),
            ..AddressPatch::default()
        };
        if self.store.update(id, patch).await?.is_none() {
            warn!(%id, "address deleted while geocoding");
            return Ok(RunOutcome::NotFound);
        }

        counter!("geofull_pipeline_runs_verified").increment(1);
        info!(%id, "address verified");
        Ok(RunOutcome::Verified)
    }

    /// Re-trigger every stored address that is not yet verified, one at a
    /// time. Used by the batch CLI path.
    #[instrument(skip(self))]
    pub async fn process_unverified(&self) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();

        for address in self.store.list_all().await? {
            if address.status == AddressStatus::Verified {
                continue;
            }
            summary.attempted += 1;
            match self.run(address.id).await? {
                RunOutcome::Verified => summary.verified += 1,
                RunOutcome::HaltedAtExtraction | RunOutcome::HaltedAtGeocoding => {
                    summary.halted += 1;
                }
                RunOutcome::AlreadyVerified | RunOutcome::NotFound => {}
            }
        }

        info!(
            attempted = summary.attempted,
            verified = summary.verified,
            halted = summary.halted,
            "batch enrichment finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_address_joins_non_null_parts() {
        let fields = StructuredFields {
            street_info: Some("Carrera 44B # 13-16".to_string()),
            neighborhood: None,
            apartment_info: Some("2do piso".to_string()),
            notes: None,
        };
        assert_eq!(
            build_normalized_address(&fields, "Medellin", "Colombia"),
            "Carrera 44B # 13-16, Medellin, Colombia"
        );
    }

    #[test]
    fn normalized_address_includes_neighborhood_when_present() {
        let fields = StructuredFields {
            street_info: Some("Carrera 30 CC # 100 B-7".to_string()),
            neighborhood: Some("la aldea santo domingo Medellín".to_string()),
            apartment_info: None,
            notes: None,
        };
        assert_eq!(
            build_normalized_address(&fields, "Medellin", "Colombia"),
            "Carrera 30 CC # 100 B-7, la aldea santo domingo Medellín, Medellin, Colombia"
        );
    }

    #[test]
    fn normalized_address_falls_back_to_locality_alone() {
        let fields = StructuredFields::default();
        assert_eq!(
            build_normalized_address(&fields, "Medellin", "Colombia"),
            "Medellin, Colombia"
        );
    }
}
