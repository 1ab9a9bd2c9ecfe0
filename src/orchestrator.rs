use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::geocode::GeoResolver;
use crate::model::{LocationDescriptor, PrayerSchedule, Session};
use crate::schedule::ScheduleFetcher;
use crate::store::LocationStore;
use crate::timezone::TimezoneResolver;

/// Owns the current location session and runs the resolution chain:
/// geocode → persist → timezone → schedule.
///
/// Single-writer: everything downstream (the clock task, the HTTP surface)
/// observes immutable snapshots through watch channels. A new submission
/// supersedes any chain still in flight; superseded chains notice through a
/// sequence token compared after every await and abandon their work without
/// touching shared state.
pub struct Orchestrator {
    geo: GeoResolver,
    timezones: TimezoneResolver,
    schedules: ScheduleFetcher,
    store: LocationStore,
    sequence: AtomicU64,
    session: watch::Sender<Option<Session>>,
    loading: watch::Sender<bool>,
    error: watch::Sender<Option<String>>,
}

impl Orchestrator {
    pub fn new(
        geo: GeoResolver,
        timezones: TimezoneResolver,
        schedules: ScheduleFetcher,
        store: LocationStore,
    ) -> Arc<Self> {
        Arc::new(Self {
            geo,
            timezones,
            schedules,
            store,
            sequence: AtomicU64::new(0),
            session: watch::channel(None).0,
            loading: watch::channel(false).0,
            error: watch::channel(None).0,
        })
    }

    pub fn sessions(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn current_error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    /// The single mutating entry point: resolve the descriptor into a fresh
    /// session. Failures set the displayed error; they never corrupt a
    /// previously committed session mid-chain.
    pub async fn submit(&self, descriptor: LocationDescriptor) {
        let token = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let _loading = LoadingGuard::engage(self, token);

        tracing::info!(gps = descriptor.is_gps(), "location change submitted");

        let resolved = match self.geo.resolve(&descriptor).await {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::warn!("location resolution failed: {err}");
                self.reject(token, err.to_string());
                return;
            }
        };
        if self.superseded(token) {
            return;
        }

        // the slot remembers the raw descriptor so a restart replays the
        // same resolution chain
        if let Err(err) = self.store.save(&descriptor).await {
            tracing::warn!("could not persist the location: {err}");
        }
        if self.superseded(token) {
            return;
        }

        let timezone = self.timezones.resolve(resolved.coordinates()).await;
        if self.superseded(token) {
            return;
        }

        match self.schedules.fetch(&resolved, timezone).await {
            Ok(schedule) => {
                tracing::info!(days = schedule.len(), %timezone, "location session ready");
                self.commit(token, Session::new(resolved, timezone, schedule), None);
            }
            Err(err) => {
                // location and timezone are still worth showing; only the
                // schedule is missing
                tracing::warn!("schedule fetch failed: {err}");
                let session = Session::new(resolved, timezone, PrayerSchedule::default());
                self.commit(token, session, Some(err.to_string()));
            }
        }
    }

    /// Replay the persisted descriptor, if any, through the same chain.
    pub async fn restore(&self) {
        if let Some(descriptor) = self.store.load().await {
            tracing::info!("replaying the saved location");
            self.submit(descriptor).await;
        }
    }

    /// Show a failure that happened outside the resolution chain (the
    /// device refusing to produce a fix, for instance). Replaced wholesale
    /// by the next state transition, like every other displayed error.
    pub fn report_failure(&self, message: impl Into<String>) {
        self.error.send_replace(Some(message.into()));
    }

    /// Drop the session and the saved slot; supersedes any chain in flight.
    pub async fn clear(&self) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        self.session.send_replace(None);
        self.error.send_replace(None);
        if let Err(err) = self.store.clear().await {
            tracing::warn!("{err}");
        }
    }

    fn superseded(&self, token: u64) -> bool {
        self.sequence.load(Ordering::SeqCst) != token
    }

    /// Fatal resolution failure: the session is gone, not stale.
    fn reject(&self, token: u64, message: String) {
        if self.superseded(token) {
            return;
        }
        self.session.send_replace(None);
        self.error.send_replace(Some(message));
    }

    fn commit(&self, token: u64, session: Session, error: Option<String>) {
        if self.superseded(token) {
            return;
        }
        self.session.send_replace(Some(session));
        self.error.send_replace(error);
    }
}

/// Keeps the loading flag honest on every exit path. A superseded chain
/// leaves the flag alone; the newer chain owns it now.
struct LoadingGuard<'a> {
    orchestrator: &'a Orchestrator,
    token: u64,
}

impl<'a> LoadingGuard<'a> {
    fn engage(orchestrator: &'a Orchestrator, token: u64) -> Self {
        orchestrator.loading.send_replace(true);
        Self {
            orchestrator,
            token,
        }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.orchestrator.superseded(self.token) {
            self.orchestrator.loading.send_replace(false);
        }
    }
}
