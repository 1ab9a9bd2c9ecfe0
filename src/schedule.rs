use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use derive_new::new;
use snafu::{ensure, Location, OptionExt, ResultExt, Snafu};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;

use crate::fetch::{
    CoordinateScheduleApi, CoordinateTimings, FetchError, RegionDayRecord, RegionScheduleApi,
};
use crate::model::{DailyPrayerRecord, PrayerSchedule, ResolvedLocation};

pub type Result<T, E = ScheduleError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum ScheduleError {
    /// the schedule provider could not be reached
    Provider {
        source: FetchError,
        #[snafu(implicit)]
        location: Location,
    },

    /// the provider returned no usable day records
    #[snafu(display("the schedule provider returned no usable data"))]
    Empty {
        #[snafu(implicit)]
        location: Location,
    },

    /// the location carries neither a region id nor coordinates
    #[snafu(display("cannot fetch a schedule without a region id or coordinates"))]
    Unlocatable {
        #[snafu(implicit)]
        location: Location,
    },
}

/// Fetches the day-indexed schedule for a resolved location, normalizing the
/// two provider shapes into one canonical record sequence.
///
/// Region-id lookups return a multi-day official schedule; coordinate lookups
/// only ever yield today, so their schedules have no next-day record and the
/// clock must cope (see the rollover handling in [crate::clock]).
#[derive(Clone, new)]
pub struct ScheduleFetcher {
    regions: Arc<dyn RegionScheduleApi>,
    coordinates: Arc<dyn CoordinateScheduleApi>,
}

impl ScheduleFetcher {
    pub async fn fetch(&self, location: &ResolvedLocation, timezone: Tz) -> Result<PrayerSchedule> {
        if let Some(id) = &location.source_id {
            return self.fetch_by_region(id).await;
        }

        let (latitude, longitude) = location.coordinates().context(UnlocatableSnafu)?;
        self.fetch_by_coordinates(latitude, longitude, timezone)
            .await
    }

    async fn fetch_by_region(&self, id: &str) -> Result<PrayerSchedule> {
        let days = retry_transient(|| self.regions.prayer_times(id))
            .await
            .context(ProviderSnafu)?;

        let schedule = normalize_region_days(days);
        ensure!(!schedule.is_empty(), EmptySnafu);
        Ok(schedule)
    }

    async fn fetch_by_coordinates(
        &self,
        latitude: f64,
        longitude: f64,
        timezone: Tz,
    ) -> Result<PrayerSchedule> {
        let today = Utc::now().with_timezone(&timezone).date_naive();

        let timings = retry_transient(|| self.coordinates.timings(today, latitude, longitude))
            .await
            .context(ProviderSnafu)?;

        let record = single_day_record(today, &timings).context(EmptySnafu)?;
        Ok(PrayerSchedule(vec![record]))
    }
}

async fn retry_transient<T, F, Fut>(action: F) -> crate::fetch::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::fetch::Result<T>>,
{
    let backoff = ExponentialBackoff::from_millis(2).factor(100).take(2);
    RetryIf::spawn(backoff, action, FetchError::is_transient).await
}

/// Region-provider days into canonical records: calendar date extracted from
/// a possibly timestamped date field, `sun` renamed to sunrise, unparseable
/// days dropped, sorted ascending and de-duplicated by date.
fn normalize_region_days(days: Vec<RegionDayRecord>) -> PrayerSchedule {
    let mut records: Vec<DailyPrayerRecord> = days
        .iter()
        .filter_map(|day| match region_day(day) {
            Some(record) => Some(record),
            None => {
                tracing::warn!("dropping unparseable schedule day: {day:?}");
                None
            }
        })
        .collect();

    records.sort_by_key(|record| record.date);
    records.dedup_by_key(|record| record.date);

    for record in &records {
        if !record.is_ordered() {
            tracing::warn!("prayer times out of order on {}", record.date);
        }
    }

    PrayerSchedule(records)
}

fn region_day(day: &RegionDayRecord) -> Option<DailyPrayerRecord> {
    Some(DailyPrayerRecord {
        date: parse_date(&day.date)?,
        fajr: parse_time(&day.fajr)?,
        sunrise: parse_time(&day.sun)?,
        dhuhr: parse_time(&day.dhuhr)?,
        asr: parse_time(&day.asr)?,
        maghrib: parse_time(&day.maghrib)?,
        isha: parse_time(&day.isha)?,
    })
}

fn single_day_record(date: NaiveDate, timings: &CoordinateTimings) -> Option<DailyPrayerRecord> {
    Some(DailyPrayerRecord {
        date,
        fajr: parse_time(&timings.fajr)?,
        sunrise: parse_time(&timings.sunrise)?,
        dhuhr: parse_time(&timings.dhuhr)?,
        asr: parse_time(&timings.asr)?,
        maghrib: parse_time(&timings.maghrib)?,
        isha: parse_time(&timings.isha)?,
    })
}

/// The date field may be `2024-06-01` or `2024-06-01T00:00:00...`; only the
/// calendar date matters.
fn parse_date(text: &str) -> Option<NaiveDate> {
    text.get(..10)?.parse().ok()
}

/// Timing strings may carry a zone suffix after a space (`"04:30 (+03)"`)
/// and occasionally arrive with seconds.
fn parse_time(text: &str) -> Option<NaiveTime> {
    let cleaned = text.split_whitespace().next()?;
    NaiveTime::parse_from_str(cleaned, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(cleaned, "%H:%M:%S"))
        .ok()
}
