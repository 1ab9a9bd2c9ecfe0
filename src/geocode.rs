use std::sync::Arc;

use derive_new::new;
use snafu::{ensure, Location, OptionExt, ResultExt, Snafu};

use crate::fetch::{FetchError, GeocodeApi, GeocodeCandidate, RegionScheduleApi};
use crate::model::{LocationDescriptor, ResolvedLocation};

pub type Result<T, E = ResolutionError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum ResolutionError {
    /// the selected region is not known to the schedule provider
    #[snafu(display("region `{id}` is not known to the schedule provider"))]
    UnknownRegion {
        id: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not list the regions for the selected city
    RegionLookup {
        source: FetchError,
        #[snafu(implicit)]
        location: Location,
    },

    /// reverse geocoding found no match for the coordinates
    #[snafu(display("no geocoding match at {latitude}, {longitude}"))]
    NoMatch {
        latitude: f64,
        longitude: f64,
        #[snafu(implicit)]
        location: Location,
    },

    /// the geocoding lookup failed
    Geocode {
        source: FetchError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Geocoders populate whichever locality field they happen to know, so the
/// fallback order must stay fixed for reproducible results.
const CITY_PRECEDENCE: [&str; 4] = ["city", "town", "village", "county"];
const REGION_PRECEDENCE: [&str; 4] = ["state", "province", "suburb", "village"];

fn first_component<'a>(candidate: &'a GeocodeCandidate, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| candidate.component(key))
}

/// Turns a [LocationDescriptor] into a [ResolvedLocation].
#[derive(Clone, new)]
pub struct GeoResolver {
    geocoder: Arc<dyn GeocodeApi>,
    regions: Arc<dyn RegionScheduleApi>,
}

impl GeoResolver {
    pub async fn resolve(&self, descriptor: &LocationDescriptor) -> Result<ResolvedLocation> {
        match descriptor {
            LocationDescriptor::Manual {
                id,
                country,
                city,
                region,
            } => self.resolve_manual(id, country, city, region).await,
            LocationDescriptor::Gps {
                latitude,
                longitude,
            } => self.resolve_gps(*latitude, *longitude).await,
        }
    }

    /// Manual selections already carry their human-readable fields; the id
    /// only needs to be checked against the provider's region listing.
    /// Coordinates are filled best-effort by a forward geocode so the
    /// timezone lookup has something to work with.
    async fn resolve_manual(
        &self,
        id: &str,
        country: &str,
        city: &str,
        region: &str,
    ) -> Result<ResolvedLocation> {
        let known = self
            .regions
            .locations(country, city)
            .await
            .context(RegionLookupSnafu)?;

        ensure!(
            known.iter().any(|record| record.id == id),
            UnknownRegionSnafu { id }
        );

        let coordinates = match self.geocoder.search(&format!("{city}, {country}")).await {
            Ok(candidates) => candidates.first().map(|candidate| candidate.geometry),
            Err(err) => {
                tracing::warn!("forward geocode for `{city}, {country}` failed: {err}");
                None
            }
        };

        Ok(ResolvedLocation {
            country: country.to_string(),
            city: city.to_string(),
            region: region.to_string(),
            latitude: coordinates.map(|geometry| geometry.lat),
            longitude: coordinates.map(|geometry| geometry.lng),
            source_id: Some(id.to_string()),
        })
    }

    async fn resolve_gps(&self, latitude: f64, longitude: f64) -> Result<ResolvedLocation> {
        let candidates = self
            .geocoder
            .search(&format!("{latitude}+{longitude}"))
            .await
            .context(GeocodeSnafu)?;

        let first = candidates.first().context(NoMatchSnafu {
            latitude,
            longitude,
        })?;

        Ok(ResolvedLocation {
            country: first.component("country").unwrap_or_default().to_string(),
            city: first_component(first, &CITY_PRECEDENCE)
                .unwrap_or_default()
                .to_string(),
            region: first_component(first, &REGION_PRECEDENCE)
                .unwrap_or_default()
                .to_string(),
            // the device fix is more precise than the candidate's centroid
            latitude: Some(latitude),
            longitude: Some(longitude),
            source_id: None,
        })
    }
}
