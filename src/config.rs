use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use chrono_tz::Tz;
use serde::Deserialize;
use snafu::ResultExt;
use url::Url;

use crate::error::{ApplicationError, ConfigLoadSnafu};
use crate::fetch::{
    CoordinateScheduleClient, GeocodeClient, RegionScheduleApi, RegionScheduleClient,
    TimezoneClient,
};
use crate::geocode::GeoResolver;
use crate::schedule::ScheduleFetcher;
use crate::store::LocationStore;
use crate::timezone::TimezoneResolver;

pub fn load() -> Result<Config, ApplicationError> {
    envy::prefixed("VAKIT_").from_env().context(ConfigLoadSnafu)
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(rename = "host_address", default = "default_host")]
    pub host: SocketAddr,
    #[serde(rename = "log_dir", default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(rename = "store_path", default)]
    pub store_path: Option<PathBuf>,
    #[serde(rename = "texts_dir", default = "default_texts_dir")]
    pub texts_dir: PathBuf,
    #[serde(rename = "fallback_zone", default = "default_fallback_zone")]
    pub fallback_zone: Tz,
    #[serde(flatten)]
    pub providers: ProviderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(rename = "region_api_url", default = "default_region_api")]
    pub region_api: Url,
    #[serde(rename = "coordinate_api_url", default = "default_coordinate_api")]
    pub coordinate_api: Url,
    /// Solar-angle convention the coordinate provider calculates with.
    #[serde(rename = "coordinate_method", default = "default_coordinate_method")]
    pub coordinate_method: u8,
    #[serde(rename = "geocode_api_url", default = "default_geocode_api")]
    pub geocode_api: Url,
    #[serde(rename = "geocode_api_key", default)]
    pub geocode_api_key: String,
    #[serde(rename = "timezone_api_url", default = "default_timezone_api")]
    pub timezone_api: Url,
    #[serde(rename = "timezone_api_key", default)]
    pub timezone_api_key: String,
}

impl Config {
    pub fn region_api(&self) -> Arc<dyn RegionScheduleApi> {
        Arc::new(RegionScheduleClient::new(self.providers.region_api.clone()))
    }

    pub fn geo_resolver(&self) -> GeoResolver {
        let geocoder = GeocodeClient::new(
            self.providers.geocode_api.clone(),
            self.providers.geocode_api_key.clone(),
        );
        GeoResolver::new(Arc::new(geocoder), self.region_api())
    }

    pub fn timezone_resolver(&self) -> TimezoneResolver {
        let lookup = TimezoneClient::new(
            self.providers.timezone_api.clone(),
            self.providers.timezone_api_key.clone(),
        );
        TimezoneResolver::with_fallback(Arc::new(lookup), self.fallback_zone)
    }

    pub fn schedule_fetcher(&self) -> ScheduleFetcher {
        let coordinates = CoordinateScheduleClient::new(
            self.providers.coordinate_api.clone(),
            self.providers.coordinate_method,
        );
        ScheduleFetcher::new(self.region_api(), Arc::new(coordinates))
    }

    pub fn store(&self) -> LocationStore {
        let path = self
            .store_path
            .clone()
            .unwrap_or_else(LocationStore::default_path);
        LocationStore::new(path)
    }
}

fn default_host() -> SocketAddr {
    ([127, 0, 0, 1], 8745).into()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_texts_dir() -> PathBuf {
    PathBuf::from("texts")
}

fn default_fallback_zone() -> Tz {
    crate::timezone::FALLBACK_ZONE
}

fn default_region_api() -> Url {
    Url::parse("https://namaz-vakti.vercel.app/api/diyanet").expect("static default url")
}

fn default_coordinate_api() -> Url {
    Url::parse("https://api.aladhan.com/v1").expect("static default url")
}

fn default_coordinate_method() -> u8 {
    13
}

fn default_geocode_api() -> Url {
    Url::parse("https://api.opencagedata.com/geocode/v1/json").expect("static default url")
}

fn default_timezone_api() -> Url {
    Url::parse("https://api.timezonedb.com/v2.1/get-time-zone").expect("static default url")
}
