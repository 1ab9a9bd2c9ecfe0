use std::str::FromStr;
use std::sync::Arc;

use chrono_tz::Tz;
use derive_new::new;

use crate::fetch::TimezoneApi;

/// The zone the clock falls back to whenever resolution degrades. The app
/// must always be able to render a usable clock, so timezone resolution is
/// availability-over-accuracy and never surfaces an error.
pub const FALLBACK_ZONE: Tz = chrono_tz::Europe::Istanbul;

/// Turns coordinates into an IANA timezone, absorbing every failure mode
/// into [FALLBACK_ZONE].
#[derive(Clone, new)]
pub struct TimezoneResolver {
    lookup: Arc<dyn TimezoneApi>,
    #[new(value = "FALLBACK_ZONE")]
    fallback: Tz,
}

impl TimezoneResolver {
    pub fn with_fallback(lookup: Arc<dyn TimezoneApi>, fallback: Tz) -> Self {
        Self { lookup, fallback }
    }

    /// Infallible by contract. `None` coordinates (a manual selection whose
    /// forward geocode came up empty) skip the lookup entirely.
    pub async fn resolve(&self, coordinates: Option<(f64, f64)>) -> Tz {
        let Some((latitude, longitude)) = coordinates else {
            return self.fallback;
        };

        let info = match self.lookup.zone_at(latitude, longitude).await {
            Ok(info) => info,
            Err(err) => {
                tracing::warn!("timezone lookup failed, using {}: {err}", self.fallback);
                return self.fallback;
            }
        };

        if info.status != "OK" {
            tracing::warn!(
                "timezone lookup reported status `{}`, using {}",
                info.status,
                self.fallback
            );
            return self.fallback;
        }

        info.zone_name
            .as_deref()
            .and_then(|name| Tz::from_str(name).ok())
            .unwrap_or_else(|| {
                tracing::warn!("timezone lookup returned an unusable zone name: {info:?}");
                self.fallback
            })
    }
}
