// Utility functions

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Safely acquire a mutex lock, recovering from poisoning by returning the guard.
/// The protected state may be inconsistent if a previous holder panicked.
pub fn lock_mutex_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Mutex was poisoned, recovering: {}", poisoned);
            poisoned.into_inner()
        }
    }
}

/// Acquire a shared read lock, recovering from poisoning
pub fn read_lock_recover<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("RwLock was poisoned, recovering read guard: {}", poisoned);
            poisoned.into_inner()
        }
    }
}

/// Acquire the exclusive write lock, recovering from poisoning
pub fn write_lock_recover<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("RwLock was poisoned, recovering write guard: {}", poisoned);
            poisoned.into_inner()
        }
    }
}

/// Current time, never earlier than `previous`.
///
/// Wall clocks can step backwards; activity timestamps must not.
pub fn monotonic_now(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now < previous {
        previous
    } else {
        now
    }
}
