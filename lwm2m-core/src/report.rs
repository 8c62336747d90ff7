//! Attribute-driven notification triggering
//!
//! A server controls how chatty an observed resource may be through the
//! write-attributes `pmin`, `pmax`, and `st`. [`ReportHandler`] holds the
//! parsed attributes plus the evaluation state from the last notification
//! and answers one question: does this value change go out now?

use thiserror::Error;
use tracing::debug;

use retx_timer::{RetransmissionTimer, TimerKind};

use std::time::{Duration, Instant};

/// Rejected observation attributes. Surfaced through [`ReportHandler::configure`]
/// as a boolean verdict, the structured cause only reaches the log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    /// an entry is not of the form key=value
    #[error("attribute entry {entry:?} is not key=value")]
    Malformed {
        /// offending entry
        entry: String,
    },
    /// key is none of pmin, pmax, st
    #[error("unrecognized attribute key {key:?}")]
    UnknownKey {
        /// offending key
        key: String,
    },
    /// value failed to parse or is out of range
    #[error("attribute {key} has invalid value {value:?}")]
    InvalidValue {
        /// attribute the value belongs to
        key: &'static str,
        /// offending value
        value: String,
    },
    /// contradictory period bounds
    #[error("pmin {min:?} exceeds pmax {max:?}")]
    InvertedPeriods {
        /// configured minimum period
        min: Duration,
        /// configured maximum period
        max: Duration,
    },
}

/// Decides whether a value change on one observed resource becomes a
/// notification.
///
/// Period bounds are tracked with single-shot [`RetransmissionTimer`]s armed
/// at each notification, so the evaluation is a pure function of the
/// injected `now`. The very first evaluation always notifies; that is the
/// initial notification a fresh Observe registration expects, and it seeds
/// the value baseline the step comparison needs.
#[derive(Debug, Clone, Default)]
pub struct ReportHandler {
    min_period: Option<Duration>,
    max_period: Option<Duration>,
    step: Option<f64>,
    last_value: Option<f64>,
    min_timer: RetransmissionTimer,
    max_timer: RetransmissionTimer,
}

impl ReportHandler {
    /// Handler with no attributes set; every change notifies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `key=value;key=value` attribute query and apply it.
    ///
    /// Keys present in the query overwrite the stored attribute, absent
    /// keys keep their previous value. A rejected query changes nothing.
    /// Attributes take effect when the period timers are next re-armed,
    /// at the notification that follows.
    pub fn configure(&mut self, query: &str) -> bool {
        match self.try_configure(query) {
            Ok(()) => true,
            Err(err) => {
                debug!(?err, "rejected observation attributes");
                false
            }
        }
    }

    fn try_configure(&mut self, query: &str) -> Result<(), AttributeError> {
        let mut min_period = self.min_period;
        let mut max_period = self.max_period;
        let mut step = self.step;
        if query.is_empty() {
            return Err(AttributeError::Malformed {
                entry: String::new(),
            });
        }
        for entry in query.split(';') {
            let (key, value) = entry.split_once('=').ok_or_else(|| AttributeError::Malformed {
                entry: entry.to_owned(),
            })?;
            match key {
                "pmin" => min_period = Some(parse_period("pmin", value)?),
                "pmax" => max_period = Some(parse_period("pmax", value)?),
                "st" => step = Some(parse_step(value)?),
                _ => {
                    return Err(AttributeError::UnknownKey {
                        key: key.to_owned(),
                    })
                }
            }
        }
        if let (Some(min), Some(max)) = (min_period, max_period) {
            if min > max {
                return Err(AttributeError::InvertedPeriods { min, max });
            }
        }
        self.min_period = min_period;
        self.max_period = max_period;
        self.step = step;
        Ok(())
    }

    /// Whether `value` must be notified at `now`.
    ///
    /// True when the minimum period has passed and either the maximum
    /// period forces a notification, or the change clears the configured
    /// step (any change qualifies with no step set). The baseline and the
    /// period timers advance only on a true verdict, a suppressed change
    /// leaves the evaluation state untouched.
    pub fn should_notify(&mut self, value: f64, now: Instant) -> bool {
        let notify = match self.last_value {
            // nothing has been sent yet, the registration notification
            // always goes out and seeds the baseline
            None => true,
            Some(last) => {
                let min_ok =
                    !self.min_timer.is_armed() || self.min_timer.is_total_interval_passed(now);
                let max_forced =
                    self.max_timer.is_armed() && self.max_timer.is_total_interval_passed(now);
                let step_ok = match self.step {
                    Some(step) => (value - last).abs() >= step,
                    None => true,
                };
                min_ok && (max_forced || step_ok)
            }
        };
        if notify {
            self.last_value = Some(value);
            self.rearm(now);
        }
        notify
    }

    fn rearm(&mut self, now: Instant) {
        match self.min_period {
            Some(period) => self
                .min_timer
                .start_timer(period, TimerKind::MinPeriod, true, now),
            None => self.min_timer.stop_timer(),
        }
        match self.max_period {
            Some(period) => self
                .max_timer
                .start_timer(period, TimerKind::MaxPeriod, true, now),
            None => self.max_timer.stop_timer(),
        }
    }

    /// Configured minimum period between notifications, if any.
    pub fn min_period(&self) -> Option<Duration> {
        self.min_period
    }

    /// Configured maximum quiet period, if any.
    pub fn max_period(&self) -> Option<Duration> {
        self.max_period
    }

    /// Configured value-change step, if any.
    pub fn step(&self) -> Option<f64> {
        self.step
    }
}

fn parse_period(key: &'static str, value: &str) -> Result<Duration, AttributeError> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| AttributeError::InvalidValue {
            key,
            value: value.to_owned(),
        })
}

fn parse_step(value: &str) -> Result<f64, AttributeError> {
    match value.parse::<f64>() {
        Ok(step) if step.is_finite() && step >= 0.0 => Ok(step),
        _ => Err(AttributeError::InvalidValue {
            key: "st",
            value: value.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn first_evaluation_always_notifies() {
        let now = Instant::now();
        let mut handler = ReportHandler::new();
        assert!(handler.configure("pmin=5;pmax=60;st=2"));
        assert!(handler.should_notify(20.0, now));
    }

    #[test]
    fn period_and_step_gate_notifications() {
        let t0 = Instant::now();
        let mut handler = ReportHandler::new();
        assert!(handler.configure("pmin=5;pmax=60;st=2"));
        // registration notification seeds the baseline at 20.0
        assert!(handler.should_notify(20.0, t0));

        // pmin not met, even though the delta clears the step
        assert!(!handler.should_notify(25.0, t0 + secs(3)));
        // pmin met but the delta against the 20.0 baseline is below the step
        assert!(!handler.should_notify(21.0, t0 + secs(6)));
        // pmin met and delta of 3 clears the step
        assert!(handler.should_notify(23.0, t0 + secs(6)));

        // the baseline moved to 23.0 and the window restarted at t0+6
        assert!(!handler.should_notify(30.0, t0 + secs(8)));
        assert!(handler.should_notify(30.0, t0 + secs(11)));
    }

    #[test]
    fn suppressed_change_leaves_state_untouched() {
        let t0 = Instant::now();
        let mut handler = ReportHandler::new();
        assert!(handler.configure("pmin=5;st=2"));
        assert!(handler.should_notify(20.0, t0));

        // rejected by pmin; must not become the new baseline
        assert!(!handler.should_notify(25.0, t0 + secs(1)));
        // delta still measured against 20.0, not 25.0
        assert!(!handler.should_notify(21.0, t0 + secs(6)));
        assert!(handler.should_notify(25.0, t0 + secs(6)));
    }

    #[test]
    fn pmax_forces_notification_without_value_change() {
        let t0 = Instant::now();
        let mut handler = ReportHandler::new();
        assert!(handler.configure("pmin=1;pmax=10;st=5"));
        assert!(handler.should_notify(20.0, t0));

        // below the step inside the window
        assert!(!handler.should_notify(21.0, t0 + secs(2)));
        // pmax passed, the same small delta now goes out
        assert!(handler.should_notify(21.0, t0 + secs(11)));
    }

    #[test]
    fn no_step_means_any_change_qualifies() {
        let t0 = Instant::now();
        let mut handler = ReportHandler::new();
        assert!(handler.configure("pmin=5"));
        assert!(handler.should_notify(20.0, t0));

        assert!(!handler.should_notify(20.1, t0 + secs(2)));
        assert!(handler.should_notify(20.1, t0 + secs(5)));
        // even an identical value notifies once the window opens
        assert!(handler.should_notify(20.1, t0 + secs(10)));
    }

    #[test]
    fn no_attributes_notifies_every_change() {
        let t0 = Instant::now();
        let mut handler = ReportHandler::new();
        assert!(handler.should_notify(1.0, t0));
        assert!(handler.should_notify(1.0, t0));
        assert!(handler.should_notify(2.0, t0 + secs(1)));
    }

    #[test]
    fn rejects_malformed_queries() {
        let mut handler = ReportHandler::new();
        assert!(!handler.configure(""));
        assert!(!handler.configure("pmin"));
        assert!(!handler.configure("pmin=5;"));
        assert!(!handler.configure("pmin=abc"));
        assert!(!handler.configure("cancel=1"));
        assert!(!handler.configure("st=-2"));
        assert!(!handler.configure("st=NaN"));
        assert!(!handler.configure("pmin=10;pmax=5"));
        assert_eq!(
            handler.try_configure("pmin=10;pmax=5"),
            Err(AttributeError::InvertedPeriods {
                min: secs(10),
                max: secs(5),
            })
        );
    }

    #[test]
    fn rejected_query_preserves_previous_attributes() {
        let mut handler = ReportHandler::new();
        assert!(handler.configure("pmin=5;st=2"));
        assert!(!handler.configure("pmin=9;bogus=1"));
        assert_eq!(handler.min_period(), Some(secs(5)));
        assert_eq!(handler.step(), Some(2.0));
        assert_eq!(handler.max_period(), None);
    }

    #[test]
    fn absent_keys_keep_their_values() {
        let mut handler = ReportHandler::new();
        assert!(handler.configure("pmin=5"));
        assert!(handler.configure("st=2"));
        assert_eq!(handler.min_period(), Some(secs(5)));
        assert_eq!(handler.step(), Some(2.0));
        // the stored pmin participates in bounds checking of a later pmax
        assert!(!handler.configure("pmax=3"));
        assert!(handler.configure("pmax=30"));
        assert_eq!(handler.max_period(), Some(secs(30)));
    }

    #[test]
    fn attributes_apply_at_the_next_rearm() {
        let t0 = Instant::now();
        let mut handler = ReportHandler::new();
        assert!(handler.configure("pmin=5"));
        assert!(handler.should_notify(20.0, t0));

        // shrinking pmin does not reopen the already-armed window
        assert!(handler.configure("pmin=1"));
        assert!(!handler.should_notify(30.0, t0 + secs(2)));
        assert!(handler.should_notify(30.0, t0 + secs(5)));
        // from here on the new pmin governs
        assert!(handler.should_notify(40.0, t0 + secs(7)));
    }
}
