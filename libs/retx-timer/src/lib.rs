//! Poll-driven retransmission timing.
//!
//! `RetransmissionTimer` is a passive clock abstraction: callers arm it,
//! then poll the boundary queries with an injected `Instant`. There is no
//! background thread and nothing fires on its own; the surrounding event
//! loop owns all scheduling and decides what to do when a boundary has
//! passed. The dual-interval mode nests a retry boundary inside a total
//! deadline, which is the shape a DTLS-confirmable exchange needs: resend
//! on the intermediate boundary, give up on the total one.

use thiserror::Error;
use tracing::{debug, trace};

use std::time::{Duration, Instant};

/// What an armed timer is pacing. Tags are for the consumer's dispatch
/// only; they do not change timing behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// An outgoing observe notification
    Notification,
    /// Minimum period (pmin) between notifications for one resource
    MinPeriod,
    /// Maximum period (pmax) forcing a notification for one resource
    MaxPeriod,
    /// DTLS flight retransmission
    Dtls,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    #[error("intermediate interval {intermediate:?} must be shorter than total {total:?}")]
    InvalidInterval {
        intermediate: Duration,
        total: Duration,
    },
}

pub type Result<T> = std::result::Result<T, TimerError>;

#[derive(Debug, Clone, Copy)]
enum Schedule {
    Simple {
        interval: Duration,
        single_shot: bool,
    },
    Dual {
        intermediate: Duration,
        // advances on restart_intermediate, the total deadline does not
        intermediate_from: Instant,
        total: Duration,
    },
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    kind: TimerKind,
    started: Instant,
    schedule: Schedule,
}

/// A restartable interval timer, armed in either a simple one-shot/periodic
/// mode or a dual-interval mode for confirmable exchanges.
///
/// All queries take `now` from the caller, so tests (and hosts with their
/// own clock discipline) control time explicitly.
#[derive(Debug, Clone, Default)]
pub struct RetransmissionTimer {
    armed: Option<Armed>,
}

impl RetransmissionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm in simple mode, replacing any previous schedule.
    ///
    /// A `single_shot` timer reports expiry through [`poll_expired`] once
    /// and disarms; a periodic one re-arms itself on each reported expiry.
    ///
    /// [`poll_expired`]: Self::poll_expired
    pub fn start_timer(
        &mut self,
        interval: Duration,
        kind: TimerKind,
        single_shot: bool,
        now: Instant,
    ) {
        debug!(?kind, ?interval, single_shot, "timer armed");
        self.armed = Some(Armed {
            kind,
            started: now,
            schedule: Schedule::Simple {
                interval,
                single_shot,
            },
        });
    }

    /// Arm in dual-interval mode: an intermediate retry boundary nested
    /// inside a total deadline. `intermediate` must be strictly shorter
    /// than `total` (conventionally about a quarter of it); anything else
    /// is rejected rather than clamped so a broken retransmission policy
    /// surfaces at the call site.
    pub fn start_dtls_timer(
        &mut self,
        intermediate: Duration,
        total: Duration,
        kind: TimerKind,
        now: Instant,
    ) -> Result<()> {
        if intermediate >= total {
            return Err(TimerError::InvalidInterval {
                intermediate,
                total,
            });
        }
        debug!(?kind, ?intermediate, ?total, "dual-interval timer armed");
        self.armed = Some(Armed {
            kind,
            started: now,
            schedule: Schedule::Dual {
                intermediate,
                intermediate_from: now,
                total,
            },
        });
        Ok(())
    }

    /// Disarm. Idempotent; queries on a stopped timer return false.
    pub fn stop_timer(&mut self) {
        if let Some(armed) = self.armed.take() {
            debug!(kind = ?armed.kind, "timer stopped");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Purpose tag of the armed schedule, for consumer dispatch.
    pub fn kind(&self) -> Option<TimerKind> {
        self.armed.map(|armed| armed.kind)
    }

    /// Whether the retry boundary of a dual-interval schedule has passed.
    /// Pure query: polling never mutates, and the caller decides whether
    /// to retransmit and re-arm the boundary. Always false in simple mode
    /// and when stopped.
    pub fn is_intermediate_interval_passed(&self, now: Instant) -> bool {
        match &self.armed {
            Some(Armed {
                schedule:
                    Schedule::Dual {
                        intermediate,
                        intermediate_from,
                        ..
                    },
                ..
            }) => now.saturating_duration_since(*intermediate_from) >= *intermediate,
            _ => false,
        }
    }

    /// Whether the full interval has passed: the total deadline in
    /// dual-interval mode, the plain interval in simple mode. Pure query;
    /// false when stopped.
    pub fn is_total_interval_passed(&self, now: Instant) -> bool {
        match &self.armed {
            Some(armed) => {
                let elapsed = now.saturating_duration_since(armed.started);
                match armed.schedule {
                    Schedule::Simple { interval, .. } => elapsed >= interval,
                    Schedule::Dual { total, .. } => elapsed >= total,
                }
            }
            None => false,
        }
    }

    /// Restart the retry boundary from `now` after a retransmission; the
    /// total deadline keeps running from the original start. No-op outside
    /// dual-interval mode.
    pub fn restart_intermediate(&mut self, now: Instant) {
        if let Some(Armed {
            schedule:
                Schedule::Dual {
                    intermediate_from, ..
                },
            ..
        }) = &mut self.armed
        {
            trace!("retry boundary re-armed");
            *intermediate_from = now;
        }
    }

    /// Report expiry of a simple-mode schedule, at most once per interval.
    ///
    /// Single-shot timers disarm on the first report. Periodic timers
    /// advance their start to the most recent missed boundary, so a late
    /// poll yields one report rather than a burst. Always false in
    /// dual-interval mode and when stopped.
    pub fn poll_expired(&mut self, now: Instant) -> bool {
        let Some(armed) = &mut self.armed else {
            return false;
        };
        let Schedule::Simple {
            interval,
            single_shot,
        } = armed.schedule
        else {
            return false;
        };
        let elapsed = now.saturating_duration_since(armed.started);
        if elapsed < interval {
            return false;
        }
        if !single_shot {
            armed.started = if interval.is_zero() {
                now
            } else {
                now - Duration::from_nanos((elapsed.as_nanos() % interval.as_nanos()) as u64)
            };
            return true;
        }
        let kind = armed.kind;
        self.armed = None;
        debug!(?kind, "single-shot timer expired");
        true
    }
}
