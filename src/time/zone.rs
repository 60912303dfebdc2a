//! Local time under an optional timezone override
//!
//! The C library reads the zone from the process-wide `TZ` variable, so an
//! override has to be written there for the length of one computation. Every
//! access to `TZ` made by this module holds [`ENV_LOCK`], and the previous
//! value is put back by [`ZoneOverride`]'s `Drop`, whichever way the
//! computation exits.

use std::env;
use std::ffi::OsString;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use super::record::TimeRecord;
use crate::core::{Error, Result};

const TZ: &str = "TZ";

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn lock_env() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Applies a zone to `TZ` and restores the ambient value when dropped
struct ZoneOverride {
    saved: Option<OsString>,
}

impl ZoneOverride {
    fn apply(zone: &str) -> Self {
        let saved = env::var_os(TZ);
        debug!("using time zone {}", zone);
        env::set_var(TZ, zone);
        tzset();
        ZoneOverride { saved }
    }
}

impl Drop for ZoneOverride {
    fn drop(&mut self) {
        match self.saved.take() {
            Some(ambient) => {
                debug!("restoring TZ to {:?}", ambient);
                env::set_var(TZ, ambient);
            }
            None => {
                debug!("restoring TZ to <unset>");
                env::remove_var(TZ);
            }
        }
        tzset();
    }
}

/// Breaks `instant` (seconds since the epoch) down into local time
///
/// With a zone, the computation runs as if `TZ` were set to it; the ambient
/// `TZ` is unchanged once this returns. Not re-entrant.
pub fn local_time(instant: i64, zone: Option<&str>) -> Result<TimeRecord> {
    let env = lock_env();
    local_time_locked(&env, instant, zone)
}

/// `local_time` for a caller already holding [`ENV_LOCK`]
fn local_time_locked(_env: &MutexGuard<'static, ()>, instant: i64, zone: Option<&str>) -> Result<TimeRecord> {
    if let Some(zone) = zone {
        if zone.is_empty() || zone.contains('\0') {
            return Err(Error::config(format!("Invalid time zone {:?}", zone)));
        }
    }

    let _override = zone.map(ZoneOverride::apply);
    broken_down(instant)
}

/// Current ambient `TZ`, read under the same lock as the override
pub fn ambient_timezone() -> Option<OsString> {
    let _env = lock_env();
    env::var_os(TZ)
}

#[cfg(unix)]
fn tzset() {
    extern "C" {
        fn tzset();
    }
    unsafe { tzset() }
}

#[cfg(not(unix))]
fn tzset() {}

#[cfg(unix)]
fn broken_down(instant: i64) -> Result<TimeRecord> {
    let time = instant as libc::time_t;
    // All-zero is a valid `tm`; localtime_r overwrites every field it uses.
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::localtime_r(&time, &mut tm) };
    if result.is_null() {
        return Err(Error::timing(format!("Cannot convert {} to local time", instant)));
    }
    Ok(TimeRecord::from_tm(&tm))
}

// Zone overrides have no effect here: chrono reads the zone from the OS.
#[cfg(not(unix))]
fn broken_down(instant: i64) -> Result<TimeRecord> {
    use chrono::{Local, TimeZone};

    let dt = Local
        .timestamp_opt(instant, 0)
        .single()
        .ok_or_else(|| Error::timing(format!("Cannot convert {} to local time", instant)))?;
    Ok(TimeRecord::from_datetime(&dt))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    // 2024-03-15 12:34:56 UTC
    const INSTANT: i64 = 1_710_506_096;

    #[test]
    fn test_override_applies_zone() {
        let utc = local_time(INSTANT, Some("UTC0")).unwrap();
        assert_eq!(utc.to_bytes(), [15, 3, 24, 12, 34, 56]);

        let est = local_time(INSTANT, Some("EST5")).unwrap();
        assert_eq!(est.to_bytes(), [15, 3, 24, 7, 34, 56]);

        let east = local_time(INSTANT, Some("JST-9")).unwrap();
        assert_eq!(east.to_bytes(), [15, 3, 24, 21, 34, 56]);
    }

    #[test]
    fn test_override_crosses_date_line() {
        // 2024-01-01 02:00:00 UTC is still New Year's Eve in EST
        let est = local_time(1_704_074_400, Some("EST5")).unwrap();
        assert_eq!(est.to_bytes(), [31, 12, 23, 21, 0, 0]);
    }

    #[test]
    fn test_ambient_zone_restored() {
        let before = ambient_timezone();
        local_time(INSTANT, Some("EST5")).unwrap();
        assert_eq!(ambient_timezone(), before);

        let plain_before = local_time(INSTANT, None).unwrap();
        local_time(INSTANT, Some("JST-9")).unwrap();
        assert_eq!(local_time(INSTANT, None).unwrap(), plain_before);
    }

    #[test]
    fn test_preset_ambient_zone_restored() {
        let env = lock_env();
        let previous = env::var_os(TZ);
        env::set_var(TZ, "CET-1");
        tzset();

        let est = local_time_locked(&env, INSTANT, Some("EST5")).unwrap();
        let restored = env::var_os(TZ);
        let plain = local_time_locked(&env, INSTANT, None).unwrap();

        match previous {
            Some(value) => env::set_var(TZ, value),
            None => env::remove_var(TZ),
        }
        tzset();
        drop(env);

        assert_eq!(est.hour, 7);
        assert_eq!(restored, Some(OsString::from("CET-1")));
        assert_eq!(plain.hour, 13);
    }

    #[test]
    fn test_invalid_zone_rejected() {
        assert!(matches!(local_time(INSTANT, Some("EST\05")), Err(Error::Config(_))));
        assert!(local_time(INSTANT, Some("")).is_err());
    }
}
