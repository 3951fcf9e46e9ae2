//! Attendance engine.

use std::sync::Arc;

use chrono::NaiveDate;
use fieldops_core::{
    AttendanceId, AttendanceRecord, AttendanceStatus, CheckEvent, CheckMethod, FieldEvent,
    Geofence, GeofenceId, Time, UserId,
};
use fieldops_geo::GeoPoint;
use fieldops_location::GeofenceRegistry;
use fieldops_outbox::Outbox;
use fieldops_store::{Store, StoreError};
use tracing::{debug, info};

use crate::compute::{compute_totals, is_late};

/// Error type for attendance operations.
pub type Result<T> = std::result::Result<T, AttendanceError>;

/// Errors that can occur during attendance operations.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    /// Check-out precedes check-in
    #[error("Check-out at {check_out} precedes check-in at {check_in}")]
    InvalidOrder {
        /// Opening time of the record
        check_in: Time,
        /// Offending check-out time
        check_out: Time,
    },

    /// Check-out without an open record
    #[error("No check-in recorded for this day")]
    NotCheckedIn,

    /// Manual check rejected outside every attendance region
    #[error("Not inside any attendance region")]
    OutsideGeofence,

    /// Storage failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration for the attendance engine.
#[derive(Debug, Clone)]
pub struct AttendanceConfig {
    /// Check-ins after this minute of the local day are late
    pub late_after_minute: u16,

    /// Nominal workday length, in hours
    pub workday_hours: f64,

    /// Days shorter than this many hours classify as half days
    pub half_day_below_hours: f64,

    /// Local-time offset from UTC, in minutes
    pub utc_offset_minutes: i32,

    /// Reject manual checks from outside every attendance region
    pub require_geofence_for_manual: bool,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            late_after_minute: 9 * 60,
            workday_hours: 8.0,
            half_day_below_hours: 4.0,
            utc_offset_minutes: 0,
            require_geofence_for_manual: false,
        }
    }
}

impl AttendanceConfig {
    /// Set the lateness threshold, minutes after local midnight.
    pub fn with_late_after_minute(mut self, minute: u16) -> Self {
        self.late_after_minute = minute;
        self
    }

    /// Set the nominal workday length.
    pub fn with_workday_hours(mut self, hours: f64) -> Self {
        self.workday_hours = hours;
        self
    }

    /// Set the half-day bound.
    pub fn with_half_day_below_hours(mut self, hours: f64) -> Self {
        self.half_day_below_hours = hours;
        self
    }

    /// Set the local-time offset.
    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    /// Require manual checks to come from inside an attendance region.
    pub fn with_require_geofence_for_manual(mut self, required: bool) -> Self {
        self.require_geofence_for_manual = required;
        self
    }
}

/// Drives the one-record-per-worker-day attendance cycle.
///
/// Check-ins open the day's record, check-outs close it exactly once and
/// derive the worked totals. Location validity is always recomputed here
/// from the submitted coordinates, never taken from the client.
pub struct AttendanceEngine {
    store: Arc<dyn Store>,
    registry: Arc<GeofenceRegistry>,
    outbox: Outbox,
    config: AttendanceConfig,
}

impl AttendanceEngine {
    /// Create an engine with default configuration.
    pub fn new(store: Arc<dyn Store>, registry: Arc<GeofenceRegistry>, outbox: Outbox) -> Self {
        Self::with_config(store, registry, outbox, AttendanceConfig::default())
    }

    /// Create an engine with explicit configuration.
    pub fn with_config(
        store: Arc<dyn Store>,
        registry: Arc<GeofenceRegistry>,
        outbox: Outbox,
        config: AttendanceConfig,
    ) -> Self {
        Self {
            store,
            registry,
            outbox,
            config,
        }
    }

    /// React to the user entering a region.
    ///
    /// Opens the day's record when the region takes attendance and no
    /// record exists yet. Anything else is a no-op.
    pub async fn on_region_enter(
        &self,
        user_id: UserId,
        fence: &Geofence,
        point: GeoPoint,
        at: Time,
    ) -> Result<Option<AttendanceRecord>> {
        if !fence.allow_attendance {
            return Ok(None);
        }

        let date = self.local_date(at);
        if self.store.find_attendance(user_id, date).await?.is_some() {
            debug!(%user_id, %date, "record already exists, enter ignored");
            return Ok(None);
        }

        let late = is_late(at, &self.config);
        let record = AttendanceRecord {
            id: AttendanceId::new(),
            user_id,
            date,
            check_in: Some(CheckEvent {
                time: at,
                location: point,
                geofence_id: Some(fence.id),
                method: CheckMethod::Geofence,
            }),
            check_out: None,
            break_ms: 0,
            total_hours: 0.0,
            overtime_hours: 0.0,
            status: if late {
                AttendanceStatus::Late
            } else {
                AttendanceStatus::Present
            },
            is_valid_location: true,
        };
        self.store.save_attendance(&record).await?;

        info!(%user_id, geofence_id = %fence.id, late, "checked in on region enter");
        self.outbox
            .publish(FieldEvent::CheckedIn {
                user_id,
                geofence_id: Some(fence.id),
                late,
                at,
            })
            .await;

        Ok(Some(record))
    }

    /// React to the user exiting a region.
    ///
    /// Closes the day's record when it is open and was opened by this
    /// very region. Anything else is a no-op.
    pub async fn on_region_exit(
        &self,
        user_id: UserId,
        geofence_id: GeofenceId,
        point: GeoPoint,
        at: Time,
    ) -> Result<Option<AttendanceRecord>> {
        let date = self.local_date(at);
        let Some(mut record) = self.store.find_attendance(user_id, date).await? else {
            return Ok(None);
        };
        if record.check_out.is_some() {
            return Ok(None);
        }

        let witnessed_here = record.check_in.as_ref().and_then(|c| c.geofence_id)
            == Some(geofence_id);
        if !witnessed_here {
            return Ok(None);
        }

        self.close(
            &mut record,
            CheckEvent {
                time: at,
                location: point,
                geofence_id: Some(geofence_id),
                method: CheckMethod::Geofence,
            },
        )?;
        self.store.save_attendance(&record).await?;

        info!(%user_id, %geofence_id, total_hours = record.total_hours, "checked out on region exit");
        self.outbox
            .publish(FieldEvent::CheckedOut {
                user_id,
                geofence_id: Some(geofence_id),
                total_hours: record.total_hours,
                at,
            })
            .await;

        Ok(Some(record))
    }

    /// Manual check-in.
    ///
    /// Idempotent per day: when a record already exists, it is returned
    /// unchanged.
    pub async fn check_in(
        &self,
        user_id: UserId,
        point: GeoPoint,
        at: Time,
    ) -> Result<AttendanceRecord> {
        let witness = self.attendance_region(user_id, point).await?;
        if self.config.require_geofence_for_manual && witness.is_none() {
            return Err(AttendanceError::OutsideGeofence);
        }

        let date = self.local_date(at);
        if let Some(existing) = self.store.find_attendance(user_id, date).await? {
            debug!(%user_id, %date, "duplicate manual check-in is a no-op");
            return Ok(existing);
        }

        let geofence_id = witness.as_ref().map(|g| g.id);
        let late = is_late(at, &self.config);
        let record = AttendanceRecord {
            id: AttendanceId::new(),
            user_id,
            date,
            check_in: Some(CheckEvent {
                time: at,
                location: point,
                geofence_id,
                method: CheckMethod::Manual,
            }),
            check_out: None,
            break_ms: 0,
            total_hours: 0.0,
            overtime_hours: 0.0,
            status: if late {
                AttendanceStatus::Late
            } else {
                AttendanceStatus::Present
            },
            is_valid_location: witness.is_some(),
        };
        self.store.save_attendance(&record).await?;

        info!(%user_id, valid_location = record.is_valid_location, late, "manual check-in");
        self.outbox
            .publish(FieldEvent::CheckedIn {
                user_id,
                geofence_id,
                late,
                at,
            })
            .await;

        Ok(record)
    }

    /// Manual check-out.
    ///
    /// Closing an already-closed day returns the record unchanged.
    pub async fn check_out(
        &self,
        user_id: UserId,
        point: GeoPoint,
        at: Time,
    ) -> Result<AttendanceRecord> {
        let date = self.local_date(at);
        let Some(mut record) = self.store.find_attendance(user_id, date).await? else {
            return Err(AttendanceError::NotCheckedIn);
        };
        if record.check_out.is_some() {
            debug!(%user_id, %date, "day already closed, check-out ignored");
            return Ok(record);
        }

        let witness = self.attendance_region(user_id, point).await?;
        if self.config.require_geofence_for_manual && witness.is_none() {
            return Err(AttendanceError::OutsideGeofence);
        }
        let geofence_id = witness.as_ref().map(|g| g.id);
        if witness.is_none() {
            record.is_valid_location = false;
        }

        self.close(
            &mut record,
            CheckEvent {
                time: at,
                location: point,
                geofence_id,
                method: CheckMethod::Manual,
            },
        )?;
        self.store.save_attendance(&record).await?;

        info!(%user_id, total_hours = record.total_hours, "manual check-out");
        self.outbox
            .publish(FieldEvent::CheckedOut {
                user_id,
                geofence_id,
                total_hours: record.total_hours,
                at,
            })
            .await;

        Ok(record)
    }

    fn close(&self, record: &mut AttendanceRecord, check_out: CheckEvent) -> Result<()> {
        let check_in = record
            .check_in
            .as_ref()
            .ok_or(AttendanceError::NotCheckedIn)?;
        if check_out.time < check_in.time {
            return Err(AttendanceError::InvalidOrder {
                check_in: check_in.time,
                check_out: check_out.time,
            });
        }

        let totals = compute_totals(check_in.time, check_out.time, record.break_ms, &self.config);
        record.total_hours = totals.total_hours;
        record.overtime_hours = totals.overtime_hours;
        record.status = totals.status;
        record.check_out = Some(check_out);
        Ok(())
    }

    async fn attendance_region(
        &self,
        user_id: UserId,
        point: GeoPoint,
    ) -> std::result::Result<Option<Geofence>, StoreError> {
        Ok(self
            .registry
            .regions_containing(user_id, point)
            .await?
            .into_iter()
            .find(|g| g.allow_attendance))
    }

    fn local_date(&self, at: Time) -> NaiveDate {
        (at + chrono::Duration::minutes(self.config.utc_offset_minutes as i64)).date_naive()
    }
}
