//! Per-division generation lock: a three-state machine guarded by a staleness
//! timeout.
//!
//! Transitions are pure functions returning the next state; the store applies
//! them with an atomic compare-and-set so two callers can never both observe a
//! free lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Lock status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    #[default]
    Idle,
    Generating,
    Generated,
}

impl LockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockStatus::Idle => "idle",
            LockStatus::Generating => "generating",
            LockStatus::Generated => "generated",
        }
    }
}

impl FromStr for LockStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(LockStatus::Idle),
            "generating" => Ok(LockStatus::Generating),
            "generated" => Ok(LockStatus::Generated),
            other => Err(format!("unknown lock status: {other}")),
        }
    }
}

/// Generation family guarded by its own lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockFamily {
    PoolSchedule,
    Bracket,
}

impl LockFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockFamily::PoolSchedule => "pool_schedule",
            LockFamily::Bracket => "bracket",
        }
    }
}

impl fmt::Display for LockFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pool_schedule" => Ok(LockFamily::PoolSchedule),
            "bracket" => Ok(LockFamily::Bracket),
            other => Err(format!("unknown lock family: {other}")),
        }
    }
}

/// Lock held by another caller and not yet stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConflict {
    pub holder: Option<Uuid>,
    pub held_since: Option<DateTime<Utc>>,
    /// Time until the lock becomes stale and can be taken over
    pub retry_after: Duration,
}

/// Lock fields stored on the division record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerationLock {
    pub status: LockStatus,
    /// Time of the last transition
    pub updated_at: Option<DateTime<Utc>>,
    /// Incremented on every successful generation
    pub version: u64,
    /// Run currently holding the lock; cleared on release
    pub holder: Option<Uuid>,
}

impl GenerationLock {
    /// Time spent in the current state, `None` if unknown or in the future
    fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.updated_at.and_then(|t| (now - t).to_std().ok())
    }

    /// A `generating` lock whose last transition is at least `timeout` old
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        if self.status != LockStatus::Generating {
            return false;
        }
        match self.updated_at {
            None => true,
            Some(_) => self.age(now).is_some_and(|age| age >= timeout),
        }
    }

    /// `generating` and not stale
    pub fn is_held(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.status == LockStatus::Generating && !self.is_stale(now, timeout)
    }

    /// Next state after a successful acquire by `holder`.
    ///
    /// Idle, generated and stale generating locks may be acquired.
    ///
    /// # Errors
    ///
    /// Returns a [`LockConflict`] while another caller holds the lock.
    pub fn try_acquire(
        &self,
        holder: Uuid,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<GenerationLock, LockConflict> {
        if self.is_held(now, timeout) {
            let age = self.age(now).unwrap_or_default();
            return Err(LockConflict {
                holder: self.holder,
                held_since: self.updated_at,
                retry_after: timeout.saturating_sub(age),
            });
        }

        if self.status == LockStatus::Generating {
            log::warn!(
                "Taking over stale generation lock (holder {:?}, since {:?})",
                self.holder,
                self.updated_at
            );
        }

        Ok(GenerationLock {
            status: LockStatus::Generating,
            updated_at: Some(now),
            version: self.version,
            holder: Some(holder),
        })
    }

    /// Next state when `holder` releases the lock.
    ///
    /// Success moves to `generated` and bumps the version; failure returns to
    /// `idle`. Returns `None` when `holder` no longer owns the lock (it went
    /// stale and was taken over), in which case nothing must be written.
    pub fn release(
        &self,
        holder: Uuid,
        now: DateTime<Utc>,
        success: bool,
    ) -> Option<GenerationLock> {
        if self.status != LockStatus::Generating || self.holder != Some(holder) {
            return None;
        }

        Some(if success {
            GenerationLock {
                status: LockStatus::Generated,
                updated_at: Some(now),
                version: self.version + 1,
                holder: None,
            }
        } else {
            GenerationLock {
                status: LockStatus::Idle,
                updated_at: Some(now),
                version: self.version,
                holder: None,
            }
        })
    }
}

/// Time source for lock staleness
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
