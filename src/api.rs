use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use derive_new::new;
use serde::{Deserialize, Serialize};
use snafu::{Location, OptionExt, ResultExt, Snafu};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::clock::{self, ClockState};
use crate::config::Config;
use crate::error::{ApplicationError, BindAddressSnafu, WebServerSnafu};
use crate::fetch::{FetchError, RegionRecord, RegionScheduleApi};
use crate::geolocation::{self, GeolocationFailure};
use crate::model::{LocationDescriptor, Session};
use crate::orchestrator::Orchestrator;
use crate::texts::{SampledText, TextLibrary};

/// Everything the handlers need, shared by cloning.
#[derive(Clone, new)]
pub struct App {
    pub orchestrator: Arc<Orchestrator>,
    pub clock: watch::Receiver<ClockState>,
    pub regions: Arc<dyn RegionScheduleApi>,
    pub texts: Arc<TextLibrary>,
}

impl App {
    fn snapshot(&self) -> StateResponse {
        let session = self.orchestrator.current_session();
        let loading = self.orchestrator.is_loading();
        let error = self.orchestrator.current_error();

        StateResponse {
            phase: Phase::of(&session, loading, &error),
            session,
            clock: self.clock.borrow().clone(),
            loading,
            error,
        }
    }
}

/// Wire up the full application and serve it until shutdown.
pub async fn serve(config: Config) -> Result<(), ApplicationError> {
    let orchestrator = Orchestrator::new(
        config.geo_resolver(),
        config.timezone_resolver(),
        config.schedule_fetcher(),
        config.store(),
    );

    // replay the saved location without holding up the listener
    tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.restore().await }
    });

    let clock = clock::spawn(orchestrator.sessions());
    let texts = Arc::new(TextLibrary::load(&config.texts_dir).await);

    let app = App::new(orchestrator, clock, config.region_api(), texts);
    let router = create_router(app);

    let listener = tokio::net::TcpListener::bind(config.host)
        .await
        .context(BindAddressSnafu {
            address: config.host,
        })?;

    tracing::info!("listening on {}", config.host);
    axum::serve(listener, router).await.context(WebServerSnafu)
}

pub fn create_router(app: App) -> Router {
    Router::new()
        .route("/api/state", get(state))
        .route("/api/location", post(submit_location).delete(clear_location))
        .route("/api/geolocation", get(geolocation_options))
        .route("/api/geolocation/failure", post(geolocation_failure))
        .route("/api/countries", get(countries))
        .route("/api/countries/:country/cities", get(cities))
        .route("/api/locations", get(locations))
        .route("/api/hadith", get(hadith))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app)
}

/// The consumer-facing snapshot: the current session, the live clock, and
/// the loading/error pair, summarized by a single phase.
#[derive(Debug, Clone, Serialize)]
pub struct StateResponse {
    pub phase: Phase,
    pub session: Option<Session>,
    pub clock: ClockState,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NoLocation,
    Loading,
    Ready,
    /// A session is on screen while a newer resolution is in flight.
    Stale,
    Error,
}

impl Phase {
    fn of(session: &Option<Session>, loading: bool, error: &Option<String>) -> Phase {
        match (session, loading, error) {
            (_, _, Some(_)) => Phase::Error,
            (Some(_), true, None) => Phase::Stale,
            (None, true, None) => Phase::Loading,
            (Some(_), false, None) => Phase::Ready,
            (None, false, None) => Phase::NoLocation,
        }
    }
}

#[derive(Debug, Snafu)]
pub enum ApiError {
    /// the upstream provider request failed
    Upstream {
        source: FetchError,
        #[snafu(implicit)]
        location: Location,
    },

    /// no text datasets are available
    NoTexts {
        #[snafu(implicit)]
        location: Location,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ApiError::NoTexts { .. } => StatusCode::NOT_FOUND,
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

async fn state(State(app): State<App>) -> Json<StateResponse> {
    Json(app.snapshot())
}

async fn submit_location(
    State(app): State<App>,
    Json(descriptor): Json<LocationDescriptor>,
) -> Json<StateResponse> {
    app.orchestrator.submit(descriptor).await;
    Json(app.snapshot())
}

async fn clear_location(State(app): State<App>) -> Json<StateResponse> {
    app.orchestrator.clear().await;
    Json(app.snapshot())
}

/// The acquisition options the front end must hand to the device API.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GeolocationOptions {
    pub timeout_ms: u32,
    pub maximum_age_ms: u32,
    pub hint_delay_ms: u32,
}

async fn geolocation_options() -> Json<GeolocationOptions> {
    Json(GeolocationOptions {
        timeout_ms: geolocation::FIX_TIMEOUT_MS,
        maximum_age_ms: geolocation::MAX_FIX_AGE_MS,
        hint_delay_ms: geolocation::HINT_DELAY_MS,
    })
}

#[derive(Debug, Deserialize)]
struct FailureReport {
    code: GeolocationFailure,
}

#[derive(Debug, Serialize)]
struct FailureResponse {
    message: &'static str,
    hint: &'static str,
}

/// The front end reports a failed fix; the cause becomes the displayed
/// error and the response carries the delayed remediation hint.
async fn geolocation_failure(
    State(app): State<App>,
    Json(report): Json<FailureReport>,
) -> Json<FailureResponse> {
    app.orchestrator.report_failure(report.code.message());

    Json(FailureResponse {
        message: report.code.message(),
        hint: report.code.remediation_hint(),
    })
}

async fn countries(State(app): State<App>) -> Result<Json<Vec<String>>> {
    let countries = app.regions.countries().await.context(UpstreamSnafu)?;
    Ok(Json(countries))
}

async fn cities(
    State(app): State<App>,
    Path(country): Path<String>,
) -> Result<Json<Vec<String>>> {
    let cities = app.regions.cities(&country).await.context(UpstreamSnafu)?;
    Ok(Json(cities))
}

#[derive(Debug, Deserialize)]
struct LocationsQuery {
    country: String,
    city: String,
}

async fn locations(
    State(app): State<App>,
    Query(query): Query<LocationsQuery>,
) -> Result<Json<Vec<RegionRecord>>> {
    let records = app
        .regions
        .locations(&query.country, &query.city)
        .await
        .context(UpstreamSnafu)?;
    Ok(Json(records))
}

async fn hadith(State(app): State<App>) -> Result<Json<SampledText>> {
    let sampled = app
        .texts
        .sample(&mut rand::thread_rng())
        .context(NoTextsSnafu)?;
    Ok(Json(sampled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{
        CoordinateScheduleApi, CoordinateTimings, GeocodeApi, GeocodeCandidate, RegionDayRecord,
        TimezoneApi, ZoneInfo,
    };
    use crate::geocode::GeoResolver;
    use crate::schedule::ScheduleFetcher;
    use crate::store::LocationStore;
    use crate::texts::{Collection, Hadith};
    use crate::timezone::TimezoneResolver;
    use async_trait::async_trait;
    use axum_test::TestServer;
    use serde_json::{json, Value};

    struct Fakes;

    #[async_trait]
    impl GeocodeApi for Fakes {
        async fn search(&self, _query: &str) -> crate::fetch::Result<Vec<GeocodeCandidate>> {
            Ok(vec![serde_json::from_value(json!({
                "components": { "country": "Turkey", "city": "Ankara", "state": "Ankara" },
                "geometry": { "lat": 39.92, "lng": 32.85 }
            }))
            .unwrap()])
        }
    }

    #[async_trait]
    impl RegionScheduleApi for Fakes {
        async fn countries(&self) -> crate::fetch::Result<Vec<String>> {
            Ok(vec!["TURKEY".into()])
        }

        async fn cities(&self, _country: &str) -> crate::fetch::Result<Vec<String>> {
            Ok(vec!["ANKARA".into()])
        }

        async fn locations(
            &self,
            _country: &str,
            _city: &str,
        ) -> crate::fetch::Result<Vec<RegionRecord>> {
            Ok(vec![
                serde_json::from_value(json!({ "id": "9541", "region": "ÇANKAYA" })).unwrap(),
            ])
        }

        async fn prayer_times(
            &self,
            _location_id: &str,
        ) -> crate::fetch::Result<Vec<RegionDayRecord>> {
            Ok(vec![RegionDayRecord {
                date: "2024-06-01".into(),
                fajr: "03:30".into(),
                sun: "05:20".into(),
                dhuhr: "13:05".into(),
                asr: "17:05".into(),
                maghrib: "20:40".into(),
                isha: "22:15".into(),
            }])
        }
    }

    #[async_trait]
    impl CoordinateScheduleApi for Fakes {
        async fn timings(
            &self,
            _date: chrono::NaiveDate,
            _lat: f64,
            _lng: f64,
        ) -> crate::fetch::Result<CoordinateTimings> {
            Ok(CoordinateTimings {
                fajr: "04:30".into(),
                sunrise: "06:10".into(),
                dhuhr: "13:02".into(),
                asr: "16:45".into(),
                maghrib: "19:50".into(),
                isha: "21:20".into(),
            })
        }
    }

    #[async_trait]
    impl TimezoneApi for Fakes {
        async fn zone_at(&self, _lat: f64, _lng: f64) -> crate::fetch::Result<ZoneInfo> {
            Ok(ZoneInfo {
                status: "OK".into(),
                zone_name: Some("Europe/Istanbul".into()),
            })
        }
    }

    fn server(name: &str, texts: TextLibrary) -> TestServer {
        let fakes = Arc::new(Fakes);
        let store = LocationStore::new(
            std::env::temp_dir()
                .join(format!("vakit-api-{}-{name}", std::process::id()))
                .join("location.json"),
        );

        let orchestrator = Orchestrator::new(
            GeoResolver::new(fakes.clone(), fakes.clone()),
            TimezoneResolver::new(fakes.clone()),
            ScheduleFetcher::new(fakes.clone(), fakes.clone()),
            store,
        );
        let clock = clock::spawn(orchestrator.sessions());

        let app = App::new(orchestrator, clock, fakes, Arc::new(texts));
        TestServer::new(create_router(app)).unwrap()
    }

    fn manual_descriptor() -> Value {
        json!({
            "kind": "manual",
            "id": "9541",
            "country": "TURKEY",
            "city": "ANKARA",
            "region": "ÇANKAYA"
        })
    }

    #[tokio::test]
    async fn state_starts_with_no_location() {
        let server = server("empty-state", TextLibrary::default());

        let response = server.get("/api/state").await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["phase"], "no_location");
        assert_eq!(body["session"], Value::Null);
        assert_eq!(body["loading"], false);
        assert_eq!(body["error"], Value::Null);
    }

    #[tokio::test]
    async fn submitting_and_clearing_a_location() {
        let server = server("submit", TextLibrary::default());

        let response = server.post("/api/location").json(&manual_descriptor()).await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["phase"], "ready");
        assert_eq!(body["session"]["location"]["region"], "ÇANKAYA");
        assert_eq!(body["session"]["timezone"], "Europe/Istanbul");
        assert_eq!(body["session"]["schedule"].as_array().unwrap().len(), 1);

        let response = server.delete("/api/location").await;
        let body: Value = response.json();
        assert_eq!(body["phase"], "no_location");
        assert_eq!(body["session"], Value::Null);
    }

    #[tokio::test]
    async fn picker_endpoints_pass_through_the_provider() {
        let server = server("picker", TextLibrary::default());

        let countries: Value = server.get("/api/countries").await.json();
        assert_eq!(countries, json!(["TURKEY"]));

        let cities: Value = server.get("/api/countries/TURKEY/cities").await.json();
        assert_eq!(cities, json!(["ANKARA"]));

        let response = server
            .get("/api/locations")
            .add_query_param("country", "TURKEY")
            .add_query_param("city", "ANKARA")
            .await;
        let locations: Value = response.json();
        assert_eq!(locations[0]["id"], "9541");
        assert_eq!(locations[0]["region"], "ÇANKAYA");
    }

    #[tokio::test]
    async fn geolocation_failure_becomes_the_displayed_error() {
        let server = server("geo-failure", TextLibrary::default());

        let options: Value = server.get("/api/geolocation").await.json();
        assert_eq!(options["timeout_ms"], 15_000);
        assert_eq!(options["maximum_age_ms"], 300_000);

        let response = server
            .post("/api/geolocation/failure")
            .json(&json!({ "code": "timeout" }))
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert!(body["message"].as_str().unwrap().contains("zaman aşımı"));
        assert!(!body["hint"].as_str().unwrap().is_empty());

        let state: Value = server.get("/api/state").await.json();
        assert_eq!(state["phase"], "error");
    }

    #[tokio::test]
    async fn hadith_sampling() {
        let library = TextLibrary::new(vec![Collection {
            name: "Sahih-i Buhârî".into(),
            hadiths: vec![Hadith {
                text: "Ameller niyetlere göredir.".into(),
                reference: None,
            }],
        }]);
        let app = server("hadith", library);

        let body: Value = app.get("/api/hadith").await.json();
        assert_eq!(body["text"], "Ameller niyetlere göredir.");
        assert_eq!(body["source"], "Sahih-i Buhârî");

        let empty = server("hadith-empty", TextLibrary::default());
        empty.get("/api/hadith").await.assert_status_not_found();
    }
}
