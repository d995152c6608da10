use anyhow::Result;
use async_trait::async_trait;
use geofull::domain::{Address, AddressStatus};
use geofull::extractor::{AddressExtractor, ExtractError, StructuredFields};
use geofull::geocoder::{GeoResult, GeocodeError, Geocoder};
use geofull::pipeline::{EnrichmentPipeline, RunOutcome};
use geofull::storage::{AddressStore, InMemoryAddressStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct StubExtractor {
    fields: StructuredFields,
    calls: AtomicUsize,
}

impl StubExtractor {
    fn new(fields: StructuredFields) -> Self {
        Self {
            fields,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressExtractor for StubExtractor {
    async fn extract(&self, _raw_address: &str) -> Result<StructuredFields, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.fields.clone())
    }
}

struct FailingExtractor {
    calls: AtomicUsize,
}

impl FailingExtractor {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressExtractor for FailingExtractor {
    async fn extract(&self, _raw_address: &str) -> Result<StructuredFields, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ExtractError::EmptyReply)
    }
}

/// Succeeds only for one known raw address, fails for everything else.
struct KeyedExtractor {
    ok_for: String,
    fields: StructuredFields,
}

#[async_trait]
impl AddressExtractor for KeyedExtractor {
    async fn extract(&self, raw_address: &str) -> Result<StructuredFields, ExtractError> {
        if raw_address == self.ok_for {
            Ok(self.fields.clone())
        } else {
            Err(ExtractError::EmptyReply)
        }
    }
}

struct StubGeocoder {
    result: GeoResult,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubGeocoder {
    fn new(result: GeoResult) -> Self {
        Self {
            result,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn slow(result: GeoResult, delay: Duration) -> Self {
        Self {
            result,
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn geocode(&self, _normalized_address: &str) -> Result<GeoResult, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.result.clone())
    }
}

struct FailingGeocoder {
    calls: AtomicUsize,
}

impl FailingGeocoder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for FailingGeocoder {
    async fn geocode(&self, _normalized_address: &str) -> Result<GeoResult, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GeocodeError::NoMatch)
    }
}

fn sample_fields() -> StructuredFields {
    StructuredFields {
        street_info: Some("Carrera 72a # 113-21".to_string()),
        neighborhood: None,
        apartment_info: Some("2do piso".to_string()),
        notes: None,
    }
}

fn sample_geo() -> GeoResult {
    GeoResult {
        latitude: 6.2529,
        longitude: -75.5646,
        suggested_address: "Carrera 72a, Castilla, Medellín, Antioquia, Colombia".to_string(),
        postal_code: Some("050034".to_string()),
    }
}

fn make_pipeline(
    store: Arc<dyn AddressStore>,
    extractor: Arc<dyn AddressExtractor>,
    geocoder: Arc<dyn Geocoder>,
) -> Arc<EnrichmentPipeline> {
    Arc::new(EnrichmentPipeline::new(
        store, extractor, geocoder, "Medellin", "Colombia",
    ))
}

#[tokio::test]
async fn pending_address_runs_to_verified() -> Result<()> {
    let store: Arc<dyn AddressStore> = Arc::new(InMemoryAddressStore::new());
    let extractor = Arc::new(StubExtractor::new(sample_fields()));
    let geocoder = Arc::new(StubGeocoder::new(sample_geo()));
    let pipeline = make_pipeline(store.clone(), extractor.clone(), geocoder.clone());

    let created = store.create(Address::new("Cra72a#113-21 2do piso")).await?;
    let outcome = pipeline.run(created.id).await?;
    assert_eq!(outcome, RunOutcome::Verified);

    let stored = store.get(created.id).await?.unwrap();
    assert_eq!(stored.status, AddressStatus::Verified);
    assert_eq!(stored.street_info.as_deref(), Some("Carrera 72a # 113-21"));
    assert_eq!(stored.apartment_info.as_deref(), Some("2do piso"));
    assert!(stored.neighborhood.is_none());
    assert_eq!(
        stored.normalized_address.as_deref(),
        Some("Carrera 72a # 113-21, Medellin, Colombia")
    );
    assert_eq!(stored.latitude, Some(6.2529));
    assert_eq!(stored.longitude, Some(-75.5646));
    assert_eq!(
        stored.suggested_address.as_deref(),
        Some("Carrera 72a, Castilla, Medellín, Antioquia, Colombia")
    );
    assert_eq!(stored.postal_code.as_deref(), Some("050034"));
    assert!(stored.updated_at.is_some());

    assert_eq!(extractor.calls(), 1);
    assert_eq!(geocoder.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn extraction_failure_leaves_record_untouched() -> Result<()> {
    let store: Arc<dyn AddressStore> = Arc::new(InMemoryAddressStore::new());
    let extractor = Arc::new(FailingExtractor::new());
    let geocoder = Arc::new(StubGeocoder::new(sample_geo()));
    let pipeline = make_pipeline(store.clone(), extractor.clone(), geocoder.clone());

    let created = store.create(Address::new("not an address at all")).await?;
    let outcome = pipeline.run(created.id).await?;
    assert_eq!(outcome, RunOutcome::HaltedAtExtraction);

    let stored = store.get(created.id).await?.unwrap();
    assert_eq!(stored.status, AddressStatus::Pending);
    assert!(stored.normalized_address.is_none());
    assert!(stored.street_info.is_none());
    assert!(stored.latitude.is_none());
    assert!(stored.longitude.is_none());
    // The halt happened before any write, so the record was never touched.
    assert!(stored.updated_at.is_none());

    assert_eq!(extractor.calls(), 1);
    assert_eq!(geocoder.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn geocode_failure_keeps_extraction_results() -> Result<()> {
    let store: Arc<dyn AddressStore> = Arc::new(InMemoryAddressStore::new());
    let extractor = Arc::new(StubExtractor::new(sample_fields()));
    let geocoder = Arc::new(FailingGeocoder::new());
    let pipeline = make_pipeline(store.clone(), extractor.clone(), geocoder.clone());

    let created = store.create(Address::new("Cra72a#113-21 2do piso")).await?;
    let outcome = pipeline.run(created.id).await?;
    assert_eq!(outcome, RunOutcome::HaltedAtGeocoding);

    let stored = store.get(created.id).await?.unwrap();
    assert_eq!(stored.status, AddressStatus::Normalized);
    assert_eq!(stored.street_info.as_deref(), Some("Carrera 72a # 113-21"));
    assert_eq!(
        stored.normalized_address.as_deref(),
        Some("Carrera 72a # 113-21, Medellin, Colombia")
    );
    assert!(stored.latitude.is_none());
    assert!(stored.longitude.is_none());
    assert!(stored.suggested_address.is_none());

    assert_eq!(extractor.calls(), 1);
    assert_eq!(geocoder.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn re_trigger_resumes_at_geocoding() -> Result<()> {
    let store: Arc<dyn AddressStore> = Arc::new(InMemoryAddressStore::new());

    // First run halts at geocoding.
    let halted_pipeline = make_pipeline(
        store.clone(),
        Arc::new(StubExtractor::new(sample_fields())),
        Arc::new(FailingGeocoder::new()),
    );
    let created = store.create(Address::new("Cra72a#113-21 2do piso")).await?;
    assert_eq!(
        halted_pipeline.run(created.id).await?,
        RunOutcome::HaltedAtGeocoding
    );

    // The re-trigger must not repeat extraction.
    let second_extractor = Arc::new(StubExtractor::new(sample_fields()));
    let retry_pipeline = make_pipeline(
        store.clone(),
        second_extractor.clone(),
        Arc::new(StubGeocoder::new(sample_geo())),
    );
    assert_eq!(retry_pipeline.run(created.id).await?, RunOutcome::Verified);
    assert_eq!(second_extractor.calls(), 0);

    let stored = store.get(created.id).await?.unwrap();
    assert_eq!(stored.status, AddressStatus::Verified);
    assert_eq!(stored.latitude, Some(6.2529));
    Ok(())
}

#[tokio::test]
async fn verified_address_is_not_rerun() -> Result<()> {
    let store: Arc<dyn AddressStore> = Arc::new(InMemoryAddressStore::new());
    let extractor = Arc::new(StubExtractor::new(sample_fields()));
    let geocoder = Arc::new(StubGeocoder::new(sample_geo()));
    let pipeline = make_pipeline(store.clone(), extractor.clone(), geocoder.clone());

    let created = store.create(Address::new("Cra72a#113-21 2do piso")).await?;
    assert_eq!(pipeline.run(created.id).await?, RunOutcome::Verified);
    let first_pass = store.get(created.id).await?.unwrap();

    assert_eq!(pipeline.run(created.id).await?, RunOutcome::AlreadyVerified);
    let second_pass = store.get(created.id).await?.unwrap();

    assert_eq!(extractor.calls(), 1);
    assert_eq!(geocoder.calls(), 1);
    assert_eq!(first_pass.updated_at, second_pass.updated_at);
    Ok(())
}

#[tokio::test]
async fn unknown_id_is_not_found() -> Result<()> {
    let store: Arc<dyn AddressStore> = Arc::new(InMemoryAddressStore::new());
    let pipeline = make_pipeline(
        store,
        Arc::new(StubExtractor::new(sample_fields())),
        Arc::new(StubGeocoder::new(sample_geo())),
    );

    assert_eq!(pipeline.run(Uuid::new_v4()).await?, RunOutcome::NotFound);
    Ok(())
}

#[tokio::test]
async fn overlapping_runs_for_one_id_serialize() -> Result<()> {
    let store: Arc<dyn AddressStore> = Arc::new(InMemoryAddressStore::new());
    let extractor = Arc::new(StubExtractor::new(sample_fields()));
    let geocoder = Arc::new(StubGeocoder::slow(sample_geo(), Duration::from_millis(25)));
    let pipeline = make_pipeline(store.clone(), extractor.clone(), geocoder.clone());

    let created = store.create(Address::new("Cra72a#113-21 2do piso")).await?;
    let (first, second) = tokio::join!(pipeline.run(created.id), pipeline.run(created.id));
    let mut outcomes = vec![first?, second?];
    outcomes.sort_by_key(|o| *o == RunOutcome::AlreadyVerified);

    assert_eq!(outcomes, vec![RunOutcome::Verified, RunOutcome::AlreadyVerified]);
    // The second run waited for the first and saw its persisted result,
    // so neither external call happened twice.
    assert_eq!(extractor.calls(), 1);
    assert_eq!(geocoder.calls(), 1);

    let stored = store.get(created.id).await?.unwrap();
    assert_eq!(stored.status, AddressStatus::Verified);
    Ok(())
}

#[tokio::test]
async fn batch_reprocessing_skips_verified_and_tallies_outcomes() -> Result<()> {
    let store: Arc<dyn AddressStore> = Arc::new(InMemoryAddressStore::new());
    let extractor = Arc::new(KeyedExtractor {
        ok_for: "Calle 9 # 4-18".to_string(),
        fields: StructuredFields {
            street_info: Some("Calle 9 # 4-18".to_string()),
            ..StructuredFields::default()
        },
    });
    let geocoder = Arc::new(StubGeocoder::new(sample_geo()));
    let pipeline = make_pipeline(store.clone(), extractor, geocoder);

    let good = store.create(Address::new("Calle 9 # 4-18")).await?;
    let bad = store.create(Address::new("no address here")).await?;

    let summary = pipeline.process_unverified().await?;
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.verified, 1);
    assert_eq!(summary.halted, 1);

    assert_eq!(
        store.get(good.id).await?.unwrap().status,
        AddressStatus::Verified
    );
    assert_eq!(
        store.get(bad.id).await?.unwrap().status,
        AddressStatus::Pending
    );

    // A second batch only retries the halted record.
    let summary = pipeline.process_unverified().await?;
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.verified, 0);
    assert_eq!(summary.halted, 1);
    Ok(())
}
