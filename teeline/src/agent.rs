//! Boundary to the browser-automation agent that performs the booking.
//!
//! The agent is an external collaborator; the engine only cares that it
//! returns a tagged outcome. Error text is never inspected to decide
//! retriability: the variants carry that decision.

use async_trait::async_trait;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::AttemptContext;
use crate::reservation::SlotRequest;

/// A successful booking, with the slot the agent actually secured (which
/// may be an alternate inside the allowed window).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub booked_time: NaiveTime,
    pub confirmation_code: Option<String>,
}

/// Why a booking attempt did not produce a confirmation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BookingFailure {
    /// The site had no acceptable slot in the requested window. Retrying
    /// will not conjure one; terminal regardless of remaining budget.
    #[error("no available tee times within the allowed range")]
    NoSlotInWindow,

    /// Anything else that went wrong driving the site: navigation timeout,
    /// element not found, popup mismatch. Worth another attempt.
    #[error("{0}")]
    Transient(String),
}

pub type BookingResult = std::result::Result<BookingConfirmation, BookingFailure>;

#[async_trait]
pub trait AutomationAgent: Send + Sync {
    /// Drive one booking attempt for the given slot. Long-running: real
    /// browser automation against a live site, possibly minutes. Evidence
    /// goes through `ctx`.
    async fn book(&self, slot: &SlotRequest, ctx: &AttemptContext) -> BookingResult;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Scripted agent for tests: pops one pre-programmed outcome per call.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{AutomationAgent, BookingResult};
    use crate::artifact::AttemptContext;
    use crate::reservation::SlotRequest;

    #[derive(Default)]
    pub struct ScriptedAgent {
        outcomes: Mutex<VecDeque<BookingResult>>,
        calls: Mutex<Vec<SlotRequest>>,
    }

    impl ScriptedAgent {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, outcome: BookingResult) {
            self.outcomes.lock().unwrap().push_back(outcome);
        }

        pub fn with(outcomes: impl IntoIterator<Item = BookingResult>) -> Self {
            let agent = Self::new();
            for outcome in outcomes {
                agent.push(outcome);
            }
            agent
        }

        pub fn calls(&self) -> Vec<SlotRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AutomationAgent for ScriptedAgent {
        async fn book(&self, slot: &SlotRequest, ctx: &AttemptContext) -> BookingResult {
            self.calls.lock().unwrap().push(slot.clone());
            ctx.log(format!("scripted attempt for {} {}", slot.date, slot.time));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("ScriptedAgent ran out of scripted outcomes")
        }
    }
}
