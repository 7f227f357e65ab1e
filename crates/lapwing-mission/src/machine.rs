use lapwing_fc::Telemetry;
use lapwing_link::CommHandle;
use lapwing_proto::StateTag;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::states::State;
use crate::{FlightContext, MissionError};

/// How a run of the state machine ended.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionOutcome {
    /// `Final`, or `Exit` when the vehicle touched down mid-mission.
    pub end: StateTag,
    /// Every state that was stepped, in order, ending with `Final` unless
    /// the machine was stopped by a touchdown.
    pub trace: Vec<State>,
    /// Failure that triggered the forced landing, if any.
    pub recovered: Option<String>,
}

/// Drives states until `Final`, with the flight-mode logger and touchdown
/// monitor running alongside.
pub struct StateMachine<'a> {
    ctx: &'a FlightContext,
}

impl<'a> StateMachine<'a> {
    pub fn new(ctx: &'a FlightContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, initial: State) -> Result<MissionOutcome, MissionError> {
        let telemetry = self.ctx.drone.telemetry();
        let logger = tokio::spawn(log_flight_modes(telemetry.clone()));
        let landed = Arc::new(AtomicBool::new(false));
        let mut touchdown: JoinHandle<()> =
            tokio::spawn(watch_touchdown(telemetry, self.ctx.comm.clone(), landed.clone()));

        let mut state = initial;
        let mut outcome = MissionOutcome { end: StateTag::Final, trace: Vec::new(), recovered: None };
        let result = loop {
            state = self.forced_land(state).await;
            let mut stopped = landed.load(Ordering::SeqCst);
            if !stopped {
                self.publish(state.tag()).await;
                // the watcher may have written exit while we published
                if landed.load(Ordering::SeqCst) {
                    self.publish(StateTag::Exit).await;
                    stopped = true;
                }
            }
            if stopped {
                warn!("state machine stopped by touchdown before {:?}", state);
                outcome.end = StateTag::Exit;
                break Ok(());
            }
            outcome.trace.push(state);
            if state.is_terminal() {
                break Ok(());
            }

            info!("state: {:?}", state);
            tokio::select! {
                next = state.step(self.ctx) => match next {
                    Ok(next) => state = next,
                    Err(e) => {
                        error!("state {:?} failed: {}; forcing landing", state, e);
                        outcome.recovered = Some(e.to_string());
                        if let Err(e) = self.recover().await {
                            break Err(e);
                        }
                        state = State::Final;
                    }
                },
                _ = &mut touchdown => {
                    warn!("state machine stopped by touchdown during {:?}", state);
                    outcome.end = StateTag::Exit;
                    break Ok(());
                }
            }
        };

        logger.abort();
        touchdown.abort();
        result.map(|_| outcome)
    }

    /// An externally written `land` preempts whatever state comes next.
    async fn forced_land(&self, next: State) -> State {
        if matches!(next, State::Land | State::Final) {
            return next;
        }
        match self.ctx.comm.get_state().await {
            Ok(StateTag::Land) => {
                warn!("state: land requested externally, skipping {:?}", next);
                State::Land
            }
            Ok(_) => next,
            Err(e) => {
                warn!("state: cannot read shared state: {}", e);
                next
            }
        }
    }

    async fn publish(&self, tag: StateTag) {
        if let Err(e) = self.ctx.comm.set_state(tag).await {
            warn!("state: cannot publish {}: {}", tag, e);
        }
    }

    async fn recover(&self) -> Result<(), MissionError> {
        let drone = &self.ctx.drone;
        match drone.offboard_stop().await {
            Ok(()) => {}
            Err(e) if e.is_offboard() => info!("recover: offboard already inactive: {}", e),
            Err(e) => warn!("recover: offboard stop failed: {}", e),
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        drone.land().await?;
        info!("recover: landing commanded");
        Ok(())
    }
}

async fn log_flight_modes(telemetry: Telemetry) {
    let mut modes = telemetry.flight_mode();
    let mut last = None;
    while let Ok(mode) = modes.next().await {
        if last != Some(mode) {
            info!("flight mode: {}", mode);
            last = Some(mode);
        }
    }
}

/// Resolves once the vehicle has been airborne and is back on the ground,
/// after raising `landed` and writing `exit` to the shared state.
async fn watch_touchdown(telemetry: Telemetry, comm: CommHandle, landed: Arc<AtomicBool>) {
    let mut in_air = telemetry.in_air();
    let mut airborne = false;
    while let Ok(now) = in_air.next().await {
        if now {
            airborne = true;
        } else if airborne {
            info!("touchdown detected");
            landed.store(true, Ordering::SeqCst);
            if let Err(e) = comm.set_state(StateTag::Exit).await {
                warn!("touchdown: cannot publish exit: {}", e);
            }
            return;
        }
    }
    std::future::pending::<()>().await
}
