//! Upstream fetch capabilities.
//!
//! Each third-party service the pipeline consumes is modeled as a small trait
//! returning parsed JSON shapes, so the resolvers can be exercised against
//! in-memory fakes. The production implementations are thin reqwest clients.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use snafu::{ensure, Location, ResultExt, Snafu};
use url::Url;

pub type Result<T, E = FetchError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum FetchError {
    /// could not reach the upstream service
    Transport {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// upstream answered with a non-success status
    #[snafu(display("upstream answered with status {status}"))]
    Status {
        status: u16,
        #[snafu(implicit)]
        location: Location,
    },

    /// upstream body does not match the expected shape
    Decode {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

impl FetchError {
    /// Transport failures and 5xx answers are worth another attempt; 4xx and
    /// malformed bodies are not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => (500..600).contains(status),
            FetchError::Decode { .. } => false,
        }
    }
}

fn shared_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

async fn get_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client,
    url: Url,
) -> Result<T> {
    let response = http.get(url).send().await.context(TransportSnafu)?;
    ensure!(
        response.status().is_success(),
        StatusSnafu {
            status: response.status().as_u16()
        }
    );
    response.json().await.context(DecodeSnafu)
}

/// Region ids arrive as bare numbers from the provider but travel as opaque
/// strings everywhere else.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(id) => id.to_string(),
        Raw::Text(id) => id,
    })
}

// --- schedule-by-region provider ---

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RegionRecord {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub region: Option<String>,
}

/// One raw day as the region provider reports it. The date may carry a time
/// suffix and the sunrise field is named `sun` upstream.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RegionDayRecord {
    pub date: String,
    pub fajr: String,
    pub sun: String,
    pub dhuhr: String,
    pub asr: String,
    pub maghrib: String,
    pub isha: String,
}

#[async_trait]
pub trait RegionScheduleApi: Send + Sync {
    async fn countries(&self) -> Result<Vec<String>>;
    async fn cities(&self, country: &str) -> Result<Vec<String>>;
    async fn locations(&self, country: &str, city: &str) -> Result<Vec<RegionRecord>>;
    async fn prayer_times(&self, location_id: &str) -> Result<Vec<RegionDayRecord>>;
}

#[derive(Debug, Clone)]
pub struct RegionScheduleClient {
    http: reqwest::Client,
    base: Url,
}

impl RegionScheduleClient {
    pub fn new(base: Url) -> Self {
        Self {
            http: shared_client(),
            base,
        }
    }

    fn endpoint(&self, path: &str) -> Url {
        // joining on a base without a trailing slash would drop its last segment
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path.split('/'));
        }
        url
    }
}

#[async_trait]
impl RegionScheduleApi for RegionScheduleClient {
    async fn countries(&self) -> Result<Vec<String>> {
        get_json(&self.http, self.endpoint("countries")).await
    }

    async fn cities(&self, country: &str) -> Result<Vec<String>> {
        let url = self.endpoint(&format!("countries/{country}/cities"));
        get_json(&self.http, url).await
    }

    async fn locations(&self, country: &str, city: &str) -> Result<Vec<RegionRecord>> {
        let mut url = self.endpoint("locations");
        url.query_pairs_mut()
            .append_pair("country", country)
            .append_pair("city", city);
        get_json(&self.http, url).await
    }

    async fn prayer_times(&self, location_id: &str) -> Result<Vec<RegionDayRecord>> {
        let mut url = self.endpoint("prayertimes");
        url.query_pairs_mut().append_pair("location_id", location_id);
        get_json(&self.http, url).await
    }
}

// --- coordinate-based schedule provider ---

/// The six raw timing strings for one day, each possibly suffixed with extra
/// text after a space (`"04:30 (+03)"`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CoordinateTimings {
    pub fajr: String,
    pub sunrise: String,
    pub dhuhr: String,
    pub asr: String,
    pub maghrib: String,
    pub isha: String,
}

#[async_trait]
pub trait CoordinateScheduleApi: Send + Sync {
    async fn timings(
        &self,
        date: NaiveDate,
        latitude: f64,
        longitude: f64,
    ) -> Result<CoordinateTimings>;
}

#[derive(Debug, Clone)]
pub struct CoordinateScheduleClient {
    http: reqwest::Client,
    base: Url,
    method: u8,
}

impl CoordinateScheduleClient {
    pub fn new(base: Url, method: u8) -> Self {
        Self {
            http: shared_client(),
            base,
            method,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TimingsEnvelope {
    data: TimingsData,
}

#[derive(Debug, Deserialize)]
struct TimingsData {
    timings: CoordinateTimings,
}

#[async_trait]
impl CoordinateScheduleApi for CoordinateScheduleClient {
    async fn timings(
        &self,
        date: NaiveDate,
        latitude: f64,
        longitude: f64,
    ) -> Result<CoordinateTimings> {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("timings")
                .push(&date.format("%d-%m-%Y").to_string());
        }
        url.query_pairs_mut()
            .append_pair("latitude", &latitude.to_string())
            .append_pair("longitude", &longitude.to_string())
            .append_pair("method", &self.method.to_string());

        let envelope: TimingsEnvelope = get_json(&self.http, url).await?;
        Ok(envelope.data.timings)
    }
}

// --- reverse/forward geocoder ---

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GeocodeCandidate {
    #[serde(default)]
    pub components: serde_json::Map<String, serde_json::Value>,
    pub geometry: Geometry,
}

impl GeocodeCandidate {
    /// A named component, when present and textual.
    pub fn component(&self, key: &str) -> Option<&str> {
        self.components.get(key).and_then(|value| value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Geometry {
    pub lat: f64,
    pub lng: f64,
}

#[async_trait]
pub trait GeocodeApi: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeCandidate>>;
}

#[derive(Debug, Clone)]
pub struct GeocodeClient {
    http: reqwest::Client,
    base: Url,
    api_key: String,
}

impl GeocodeClient {
    pub fn new(base: Url, api_key: String) -> Self {
        Self {
            http: shared_client(),
            base,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeEnvelope {
    #[serde(default)]
    results: Vec<GeocodeCandidate>,
}

#[async_trait]
impl GeocodeApi for GeocodeClient {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeCandidate>> {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("key", &self.api_key)
            .append_pair("no_annotations", "1");

        let envelope: GeocodeEnvelope = get_json(&self.http, url).await?;
        Ok(envelope.results)
    }
}

// --- timezone lookup ---

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ZoneInfo {
    pub status: String,
    #[serde(rename = "zoneName")]
    pub zone_name: Option<String>,
}

#[async_trait]
pub trait TimezoneApi: Send + Sync {
    async fn zone_at(&self, latitude: f64, longitude: f64) -> Result<ZoneInfo>;
}

#[derive(Debug, Clone)]
pub struct TimezoneClient {
    http: reqwest::Client,
    base: Url,
    api_key: String,
}

impl TimezoneClient {
    pub fn new(base: Url, api_key: String) -> Self {
        Self {
            http: shared_client(),
            base,
            api_key,
        }
    }
}

#[async_trait]
impl TimezoneApi for TimezoneClient {
    async fn zone_at(&self, latitude: f64, longitude: f64) -> Result<ZoneInfo> {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("format", "json")
            .append_pair("by", "position")
            .append_pair("lat", &latitude.to_string())
            .append_pair("lng", &longitude.to_string());

        get_json(&self.http, url).await
    }
}
