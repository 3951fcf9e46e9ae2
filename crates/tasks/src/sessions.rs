//! Session accounting.
//!
//! Pure mutations over [`TimeTracking`] so the bookkeeping is testable
//! without storage. Sessions are append-only; closed sessions are never
//! edited.

use fieldops_core::{Session, Time, TimeTracking};

/// Open a new session at `now`.
///
/// The caller guarantees no session is currently open (the state machine
/// only enters InProgress from states without one).
pub fn begin_session(tracking: &mut TimeTracking, now: Time, location_valid: bool) {
    if tracking.started_at.is_none() {
        tracking.started_at = Some(now);
    }
    tracking.sessions.push(Session {
        start: now,
        end: None,
        duration_ms: None,
        location_valid,
    });
}

/// Close the open session at `now`, if one is open.
pub fn end_open_session(tracking: &mut TimeTracking, now: Time) {
    if let Some(session) = tracking.sessions.iter_mut().find(|s| s.end.is_none()) {
        let duration = (now - session.start).num_milliseconds().max(0);
        session.end = Some(now);
        session.duration_ms = Some(duration);
    }
}

/// Minutes across all closed sessions.
pub fn accumulated_minutes(tracking: &TimeTracking) -> u64 {
    let total_ms: i64 = tracking
        .sessions
        .iter()
        .filter_map(|s| s.duration_ms)
        .map(|d| d.max(0))
        .sum();
    (total_ms / 60_000) as u64
}
