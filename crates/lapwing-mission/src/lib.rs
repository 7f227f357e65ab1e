//! Flight side of the mission: movement control, mission states and the
//! state machine that drives them.

pub mod machine;
pub mod movement;
pub mod states;

pub use machine::{MissionOutcome, StateMachine};
pub use movement::{MoveOutcome, Movement};
pub use states::State;

use lapwing_fc::{Drone, FcError};
use lapwing_link::{CommHandle, LinkError};
use lapwing_nav::MissionPlan;
use lapwing_proto::StateSettings;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MissionError {
    #[error(transparent)]
    Fc(#[from] FcError),

    #[error("shared state: {0}")]
    Link(#[from] LinkError),
}

/// Everything a state needs. Owned by the flight process for the whole run.
pub struct FlightContext {
    pub drone: Drone,
    pub comm: CommHandle,
    pub plan: MissionPlan,
    pub settings: StateSettings,
}
