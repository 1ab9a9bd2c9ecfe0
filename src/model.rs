use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use derive_new::new;
use serde::{Deserialize, Serialize};

/// Where the user wants prayer times for.
///
/// Either a region picked through the country/city/region dropdown flow, or a
/// raw device fix. The manual variant carries the human-readable selections
/// alongside the provider's opaque region id, since the dropdown flow already
/// knows them.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationDescriptor {
    Manual {
        id: String,
        country: String,
        city: String,
        region: String,
    },
    Gps {
        latitude: f64,
        longitude: f64,
    },
}

impl LocationDescriptor {
    pub fn is_gps(&self) -> bool {
        matches!(self, LocationDescriptor::Gps { .. })
    }
}

/// A descriptor resolved to a concrete place.
///
/// `source_id` is the region provider's id when the location came from the
/// dropdown flow; GPS-derived locations have none.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, new)]
pub struct ResolvedLocation {
    pub country: String,
    pub city: String,
    pub region: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub source_id: Option<String>,
}

impl ResolvedLocation {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// The six daily instants the clock cycles through. Sunrise is a displayed
/// reference time, not itself a prayer, but it participates in the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrayerName {
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl PrayerName {
    /// The Turkish name the UI displays.
    pub fn display_name(self) -> &'static str {
        match self {
            PrayerName::Fajr => "İmsak",
            PrayerName::Sunrise => "Güneş",
            PrayerName::Dhuhr => "Öğle",
            PrayerName::Asr => "İkindi",
            PrayerName::Maghrib => "Akşam",
            PrayerName::Isha => "Yatsı",
        }
    }
}

impl std::fmt::Display for PrayerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl Serialize for PrayerName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_name())
    }
}

/// One calendar day of wall-clock prayer times, minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DailyPrayerRecord {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub fajr: NaiveTime,
    #[serde(with = "hhmm")]
    pub sunrise: NaiveTime,
    #[serde(with = "hhmm")]
    pub dhuhr: NaiveTime,
    #[serde(with = "hhmm")]
    pub asr: NaiveTime,
    #[serde(with = "hhmm")]
    pub maghrib: NaiveTime,
    #[serde(with = "hhmm")]
    pub isha: NaiveTime,
}

impl DailyPrayerRecord {
    /// The day's times in cycle order.
    pub fn times(&self) -> [(PrayerName, NaiveTime); 6] {
        [
            (PrayerName::Fajr, self.fajr),
            (PrayerName::Sunrise, self.sunrise),
            (PrayerName::Dhuhr, self.dhuhr),
            (PrayerName::Asr, self.asr),
            (PrayerName::Maghrib, self.maghrib),
            (PrayerName::Isha, self.isha),
        ]
    }

    /// Whether the six times are non-decreasing within the day. Upstream data
    /// occasionally violates this; callers log and tolerate it.
    pub fn is_ordered(&self) -> bool {
        self.times().windows(2).all(|pair| pair[0].1 <= pair[1].1)
    }
}

/// The canonical day-indexed sequence for the current location, dates
/// ascending and unique. Replaced wholesale on every location change.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct PrayerSchedule(pub Vec<DailyPrayerRecord>);

impl PrayerSchedule {
    pub fn record_for(&self, date: NaiveDate) -> Option<&DailyPrayerRecord> {
        self.0.iter().find(|record| record.date == date)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn dates_strictly_ascending(&self) -> bool {
        self.0.windows(2).all(|pair| pair[0].date < pair[1].date)
    }
}

/// Everything one location change produces, committed together and never
/// partially updated.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, new)]
pub struct Session {
    pub location: ResolvedLocation,
    pub timezone: Tz,
    pub schedule: PrayerSchedule,
}

/// `HH:MM` wall-clock (de)serialization for record times.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&text, FORMAT).map_err(serde::de::Error::custom)
    }
}
