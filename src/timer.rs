//! Countdown task: one tokio task per running attempt.
//!
//! Ticks the session once per period. When the clock reaches zero it asks the
//! session to submit (guarded there against a racing manual submit) and exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::attempt::Tick;
use crate::error::SubmitError;
use crate::session::{AttemptSession, SubmitTrigger};

pub fn spawn_countdown(session: Arc<AttemptSession>, period: Duration) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval completes immediately.
    interval.tick().await;

    loop {
      interval.tick().await;
      match session.tick().await {
        Tick::Running { .. } => {}
        Tick::Idle => {
          debug!(target: "attempt", attempt_id = %session.id(), "Clock stopped");
          break;
        }
        Tick::Expired => {
          match session.submit(SubmitTrigger::TimeUp).await {
            Ok(report) => {
              info!(target: "attempt", attempt_id = %session.id(), report_id = %report.report_id, "Auto-submitted on time up")
            }
            Err(SubmitError::InFlight) | Err(SubmitError::AlreadySubmitted) => {
              debug!(target: "attempt", attempt_id = %session.id(), "Manual submission already handled it")
            }
            Err(e) => {
              warn!(target: "attempt", attempt_id = %session.id(), error = %e, "Auto-submit failed; user can retry")
            }
          }
          break;
        }
      }
    }
  })
}
