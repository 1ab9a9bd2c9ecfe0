use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::watch;

use crate::model::{DailyPrayerRecord, PrayerName, PrayerSchedule, Session};

/// What the clock knows this second. Rebuilt from the current session on
/// every tick; owns no identity of its own.
///
/// `next_instant` is strictly in the future relative to `now`, or absent
/// together with `next_prayer` and `countdown`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ClockState {
    pub now: Option<DateTime<Tz>>,
    pub today: Option<DailyPrayerRecord>,
    pub next_prayer: Option<PrayerName>,
    pub next_instant: Option<DateTime<Tz>>,
    pub countdown: Option<String>,
}

/// One full recomputation at `now_utc`. Pure; the ticking lives in [spawn].
pub fn compute(session: &Session, now_utc: DateTime<Utc>) -> ClockState {
    let now = now_utc.with_timezone(&session.timezone);
    let today = session.schedule.record_for(now.date_naive()).copied();
    let next = next_prayer(&session.schedule, session.timezone, now);

    let countdown = next.and_then(|(_, instant)| {
        let remaining = instant.signed_duration_since(now);
        // skew guard: a stale instant clears the countdown instead of
        // rendering a negative duration
        (remaining >= Duration::zero()).then(|| format_countdown(remaining))
    });

    ClockState {
        now: Some(now),
        today,
        next_prayer: next.map(|(name, _)| name),
        next_instant: next.map(|(_, instant)| instant),
        countdown,
    }
}

/// The first of today's six instants strictly after `now`. A prayer whose
/// instant equals `now` exactly counts as already passed, so the state never
/// flaps between "now" and "next" within the same second.
///
/// Once all six have passed: tomorrow's Fajr if the schedule has tomorrow;
/// otherwise today's Fajr time-of-day re-anchored one day forward. The
/// re-anchoring is an approximation (tomorrow's real Fajr drifts by a minute
/// or two) that keeps a countdown on screen until the next real fetch.
fn next_prayer(
    schedule: &PrayerSchedule,
    timezone: Tz,
    now: DateTime<Tz>,
) -> Option<(PrayerName, DateTime<Tz>)> {
    let today = now.date_naive();
    let record = schedule.record_for(today)?;

    for (name, time) in record.times() {
        if let Some(instant) = local_instant(today, time, timezone) {
            if instant > now {
                return Some((name, instant));
            }
        }
    }

    let tomorrow = today.succ_opt()?;
    let fajr = schedule
        .record_for(tomorrow)
        .map(|next_record| next_record.fajr)
        .unwrap_or(record.fajr);

    local_instant(tomorrow, fajr, timezone).map(|instant| (PrayerName::Fajr, instant))
}

/// A wall-clock time on a date as an instant in `timezone`. DST folds take
/// the earlier mapping; nonexistent local times yield nothing.
fn local_instant(date: NaiveDate, time: NaiveTime, timezone: Tz) -> Option<DateTime<Tz>> {
    timezone.from_local_datetime(&date.and_time(time)).earliest()
}

/// Zero-padded `HH:MM:SS`, clamped at zero.
pub fn format_countdown(remaining: Duration) -> String {
    let total = remaining.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Drives the 1-second recomputation loop.
///
/// The timer only runs while a session exists; with no session the task
/// parks on the session channel and the published state is empty. The tick
/// never performs I/O and never fails; it simply has nothing to show until
/// a schedule arrives.
pub fn spawn(mut sessions: watch::Receiver<Option<Session>>) -> watch::Receiver<ClockState> {
    let (tx, rx) = watch::channel(ClockState::default());

    tokio::spawn(async move {
        loop {
            let session = sessions.borrow_and_update().clone();

            let Some(session) = session else {
                tx.send_replace(ClockState::default());
                if sessions.changed().await.is_err() {
                    break;
                }
                continue;
            };

            tx.send_replace(compute(&session, Utc::now()));

            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
                changed = sessions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::record;
    use crate::model::ResolvedLocation;
    use crate::timezone::FALLBACK_ZONE;

    fn ankara() -> ResolvedLocation {
        ResolvedLocation::new(
            "TURKEY".into(),
            "ANKARA".into(),
            "ÇANKAYA".into(),
            Some(39.92),
            Some(32.85),
            Some("9541".into()),
        )
    }

    fn session(records: Vec<DailyPrayerRecord>) -> Session {
        Session::new(ankara(), FALLBACK_ZONE, PrayerSchedule(records))
    }

    fn at(date: &str, hms: (u32, u32, u32)) -> DateTime<Utc> {
        let date: NaiveDate = date.parse().unwrap();
        FALLBACK_ZONE
            .from_local_datetime(&date.and_hms_opt(hms.0, hms.1, hms.2).unwrap())
            .unwrap()
            .with_timezone(&Utc)
    }

    const JUNE_FIRST: [&str; 6] = ["03:30", "05:20", "13:05", "17:05", "20:40", "22:15"];

    #[test]
    fn midday_counts_down_to_dhuhr() {
        let session = session(vec![record("2024-06-01", JUNE_FIRST)]);

        let state = compute(&session, at("2024-06-01", (12, 0, 0)));
        assert_eq!(state.next_prayer, Some(PrayerName::Dhuhr));
        assert_eq!(state.next_prayer.unwrap().to_string(), "Öğle");
        assert_eq!(state.countdown.as_deref(), Some("01:05:00"));
        assert!(state.today.is_some());
    }

    #[test]
    fn exact_prayer_instant_is_already_passed() {
        let session = session(vec![record("2024-06-01", JUNE_FIRST)]);

        let state = compute(&session, at("2024-06-01", (13, 5, 0)));
        assert_eq!(state.next_prayer, Some(PrayerName::Asr));

        let just_before = compute(&session, at("2024-06-01", (13, 4, 59)));
        assert_eq!(just_before.next_prayer, Some(PrayerName::Dhuhr));
        assert_eq!(just_before.countdown.as_deref(), Some("00:00:01"));
    }

    #[test]
    fn rollover_uses_tomorrows_fajr_when_present() {
        let session = session(vec![
            record(
                "2024-06-01",
                ["03:30", "05:20", "13:05", "17:05", "20:40", "23:50"],
            ),
            record(
                "2024-06-02",
                ["03:29", "05:20", "13:05", "17:05", "20:41", "23:51"],
            ),
        ]);

        let state = compute(&session, at("2024-06-01", (23, 55, 0)));
        assert_eq!(state.next_prayer, Some(PrayerName::Fajr));

        let expected = FALLBACK_ZONE
            .from_local_datetime(
                &"2024-06-02"
                    .parse::<NaiveDate>()
                    .unwrap()
                    .and_time("03:29".parse().unwrap()),
            )
            .unwrap();
        assert_eq!(state.next_instant, Some(expected));
    }

    #[test]
    fn rollover_without_tomorrow_reanchors_todays_fajr() {
        let session = session(vec![record(
            "2024-06-01",
            ["03:30", "05:20", "13:05", "17:05", "20:40", "23:50"],
        )]);

        let state = compute(&session, at("2024-06-01", (23, 55, 0)));
        assert_eq!(state.next_prayer, Some(PrayerName::Fajr));
        assert_eq!(state.next_prayer.unwrap().to_string(), "İmsak");

        let expected = FALLBACK_ZONE
            .from_local_datetime(
                &"2024-06-02"
                    .parse::<NaiveDate>()
                    .unwrap()
                    .and_time("03:30".parse().unwrap()),
            )
            .unwrap();
        assert_eq!(state.next_instant, Some(expected));
        assert_eq!(state.countdown.as_deref(), Some("03:35:00"));
    }

    #[test]
    fn missing_today_clears_everything_but_now() {
        let session = session(vec![record("2024-06-01", JUNE_FIRST)]);

        let state = compute(&session, at("2024-06-05", (12, 0, 0)));
        assert!(state.now.is_some());
        assert_eq!(state.today, None);
        assert_eq!(state.next_prayer, None);
        assert_eq!(state.next_instant, None);
        assert_eq!(state.countdown, None);
    }

    #[test]
    fn countdown_formatting_is_zero_padded() {
        assert_eq!(format_countdown(Duration::seconds(3661)), "01:01:01");
        assert_eq!(format_countdown(Duration::seconds(0)), "00:00:00");
        assert_eq!(format_countdown(Duration::seconds(-5)), "00:00:00");
        assert_eq!(format_countdown(Duration::seconds(25 * 3600)), "25:00:00");
    }

    #[test]
    fn fallback_zone_still_produces_a_countdown() {
        // a schedule fetched under the fallback zone keeps the clock usable
        let session = session(vec![record("2024-06-01", JUNE_FIRST)]);
        let state = compute(&session, at("2024-06-01", (4, 0, 0)));
        assert_eq!(state.next_prayer, Some(PrayerName::Sunrise));
        assert!(state.countdown.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_task_follows_the_session() {
        let (tx, sessions) = watch::channel(None);
        let mut clock = spawn(sessions);

        let today = Utc::now().with_timezone(&FALLBACK_ZONE).date_naive();
        let session = Session::new(
            ankara(),
            FALLBACK_ZONE,
            PrayerSchedule(vec![record(
                &today.to_string(),
                ["00:00", "00:00", "00:00", "00:00", "00:00", "00:00"],
            )]),
        );

        tx.send(Some(session)).unwrap();
        let state = wait_for(&mut clock, |state| state.next_prayer.is_some()).await;
        // every instant has passed, so the re-anchored Fajr is next
        assert_eq!(state.next_prayer, Some(PrayerName::Fajr));
        assert!(state.countdown.is_some());

        tx.send(None).unwrap();
        let cleared = wait_for(&mut clock, |state| state.next_prayer.is_none()).await;
        assert_eq!(cleared, ClockState::default());
    }

    async fn wait_for(
        clock: &mut watch::Receiver<ClockState>,
        predicate: impl Fn(&ClockState) -> bool,
    ) -> ClockState {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                if predicate(&clock.borrow()) {
                    return clock.borrow().clone();
                }
                clock.changed().await.unwrap();
            }
        })
        .await
        .expect("clock state never matched")
    }
}
