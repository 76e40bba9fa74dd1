use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::execution::session::TradingSession;
use crate::models::PriceTick;

pub type SharedSession = Arc<Mutex<TradingSession>>;

/// Inbound calls from the feed and the operator
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Tick(PriceTick),
    ForceClose,
    ForceClear,
}

fn lock(session: &SharedSession) -> MutexGuard<'_, TradingSession> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

/// Apply one event to the session
pub fn handle_event(session: &SharedSession, event: FeedEvent) {
    let mut session = lock(session);

    match event {
        FeedEvent::Tick(tick) => {
            let outcome = session.on_tick(tick);
            if let Some(committed) = outcome.committed {
                tracing::debug!(?committed, "Committed on tick");
            }
        }
        FeedEvent::ForceClose => match session.on_force_close() {
            Ok(record) => tracing::info!(id = %record.id, "Forced close complete"),
            Err(e) => tracing::warn!(error = %e, "Forced close refused"),
        },
        FeedEvent::ForceClear => match session.on_force_clear() {
            Ok(removed) => tracing::info!(removed, "Forced clear complete"),
            Err(e) => tracing::warn!(error = %e, "Forced clear refused"),
        },
    }
}

fn commit_on_timer(session: &SharedSession) {
    match lock(session).commit_due(Utc::now()) {
        Ok(Some(committed)) => tracing::debug!(?committed, "Committed on timer"),
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "Pending decision rejected at commit"),
    }
}

/// Drive a session from an event channel until the sender side closes
///
/// Pending decisions are also checked against the wall clock every
/// `commit_poll`, so a confirmation delay can elapse between ticks.
pub async fn run_session(
    session: SharedSession,
    mut events: mpsc::Receiver<FeedEvent>,
    commit_poll: Duration,
) {
    let mut commit_timer = interval(commit_poll);
    commit_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!("Session runner started");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => handle_event(&session, event),
                    None => break,
                }
            }
            _ = commit_timer.tick() => commit_on_timer(&session),
        }
    }

    tracing::info!("Session runner stopped: feed closed");
}
