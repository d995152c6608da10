use crate::config::GeocoderConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Coordinates and canonical address for one geocoding match
#[derive(Debug, Clone, PartialEq)]
pub struct GeoResult {
    pub latitude: f64,
    pub longitude: f64,
    pub suggested_address: String,
    pub postal_code: Option<String>,
}

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("geocoding service returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("no geocoding match for the supplied address")]
    NoMatch,

    #[error("could not parse geocoding reply: {0}")]
    MalformedReply(String),
}

/// Core trait for geocoding backends
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a normalized address string to coordinates.
    async fn geocode(&self, normalized_address: &str) -> Result<GeoResult, GeocodeError>;
}

// Nominatim serializes lat/lon as strings.
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    postcode: Option<String>,
}

fn first_match(places: Vec<NominatimPlace>) -> Result<GeoResult, GeocodeError> {
    let place = places.into_iter().next().ok_or(GeocodeError::NoMatch)?;

    let latitude: f64 = place
        .lat
        .parse()
        .map_err(|_| GeocodeError::MalformedReply(format!("bad latitude '{}'", place.lat)))?;
    let longitude: f64 = place
        .lon
        .parse()
        .map_err(|_| GeocodeError::MalformedReply(format!("bad longitude '{}'", place.lon)))?;

    Ok(GeoResult {
        latitude,
        longitude,
        suggested_address: place.display_name,
        postal_code: place.address.postcode,
    })
}

/// Geocoding backed by the Nominatim search API
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    /// Nominatim's usage policy requires a client identity in the
    /// User-Agent header, so it is set on the client itself.
    pub fn new(config: &GeocoderConfig) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, normalized_address: &str) -> Result<GeoResult, GeocodeError> {
        let url = format!("{}/search", self.base_url);

        debug!(query = %normalized_address, "requesting geocoding match");
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", normalized_address),
                ("format", "json"),
                ("addressdetails", "1"),
                ("limit", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status));
        }

        let payload = response.text().await?;
        let places: Vec<NominatimPlace> = serde_json::from_str(&payload)
            .map_err(|e| GeocodeError::MalformedReply(e.to_string()))?;

        first_match(places)
    }
}
