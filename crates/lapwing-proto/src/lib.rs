//! Types shared between the flight and vision processes.

pub mod command;
pub mod detection;
pub mod state;
pub mod wire;

pub use command::{DetectionReport, ModuleObservation, VisionCommand, VisionMode};
pub use detection::{BoundingBox, FailureFlags, ObjectType, Vertex};
pub use state::{StateSettings, StateTag, VisionTestKind};
