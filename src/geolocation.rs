//! The device-geolocation boundary.
//!
//! The fix itself is acquired by the front end (the browser owns the
//! geolocation permission); this module is the contract it works against:
//! the acquisition options the UI must request, and the mapping from the
//! standard failure codes to what the user should read.

use serde::{Deserialize, Serialize};

/// Bounded wait for a fix; devices with poor signal must not hang forever.
pub const FIX_TIMEOUT_MS: u32 = 15_000;

/// A cached position younger than this still counts as a fix.
pub const MAX_FIX_AGE_MS: u32 = 5 * 60 * 1000;

/// How long the UI waits before adding the remediation hint to the message.
pub const HINT_DELAY_MS: u32 = 3_000;

/// The standard device geolocation failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeolocationFailure {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

impl GeolocationFailure {
    /// The human-readable cause the UI displays immediately.
    pub fn message(self) -> &'static str {
        match self {
            GeolocationFailure::PermissionDenied => {
                "Konum izni reddedildi. Vakitleri görmek için konum erişimine izin verin."
            }
            GeolocationFailure::PositionUnavailable => "Konum bilgisi şu anda alınamıyor.",
            GeolocationFailure::Timeout => "Konum isteği zaman aşımına uğradı.",
        }
    }

    /// The platform-specific remediation step shown after [HINT_DELAY_MS].
    pub fn remediation_hint(self) -> &'static str {
        match self {
            GeolocationFailure::PermissionDenied => {
                "Tarayıcı ayarlarından bu site için konum iznini açın ve sayfayı yenileyin."
            }
            GeolocationFailure::PositionUnavailable => {
                "Cihazınızın konum servisinin açık olduğundan emin olun."
            }
            GeolocationFailure::Timeout => {
                "Açık bir alanda tekrar deneyin veya konumu elle seçin."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_codes_use_the_standard_names() {
        let code: GeolocationFailure = serde_json::from_str("\"permission-denied\"").unwrap();
        assert_eq!(code, GeolocationFailure::PermissionDenied);

        let json = serde_json::to_string(&GeolocationFailure::PositionUnavailable).unwrap();
        assert_eq!(json, "\"position-unavailable\"");
    }

    #[test]
    fn every_failure_has_a_message_and_a_hint() {
        for code in [
            GeolocationFailure::PermissionDenied,
            GeolocationFailure::PositionUnavailable,
            GeolocationFailure::Timeout,
        ] {
            assert!(!code.message().is_empty());
            assert!(!code.remediation_hint().is_empty());
            assert_ne!(code.message(), code.remediation_hint());
        }
    }
}
