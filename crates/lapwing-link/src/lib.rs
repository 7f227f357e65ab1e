//! Shared communication record between the flight and vision processes.
//!
//! The supervisor owns the record and serves it over a local TCP socket;
//! children reach it through [`CommClient`]. Both sides only ever see a
//! [`CommHandle`], never the record itself.

pub mod client;
pub mod doctor;
pub mod error;
pub mod record;
pub mod server;

pub use client::CommClient;
pub use error::{LinkError, LinkResult};
pub use record::CommState;
pub use server::CommServer;

use lapwing_proto::wire::{Request, Response};
use lapwing_proto::{BoundingBox, DetectionReport, StateTag, VisionCommand};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Loopback address the supervisor serves the record on.
    pub bind: String,
    pub connect_attempts: u32,
    pub connect_backoff_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self { bind: "127.0.0.1:47600".into(), connect_attempts: 20, connect_backoff_ms: 250 }
    }
}

impl LinkConfig {
    pub async fn connect(&self, addr: &str) -> LinkResult<CommHandle> {
        let client =
            CommClient::connect_with_retry(addr, self.connect_attempts, Duration::from_millis(self.connect_backoff_ms))
                .await?;
        Ok(CommHandle::Remote(client))
    }
}

/// Accessor-only view of the shared record.
#[derive(Clone)]
pub enum CommHandle {
    Local(Arc<Mutex<CommState>>),
    Remote(CommClient),
}

impl CommHandle {
    pub fn local(state: StateTag) -> Self {
        CommHandle::Local(Arc::new(Mutex::new(CommState::new(state))))
    }

    async fn call(&self, req: Request) -> LinkResult<Response> {
        match self {
            CommHandle::Local(rec) => {
                let resp = lock(rec).apply(req);
                Ok(resp)
            }
            CommHandle::Remote(client) => client.call(&req).await,
        }
    }

    pub async fn get_state(&self) -> LinkResult<StateTag> {
        match self.call(Request::GetState).await? {
            Response::State { state } => Ok(state),
            other => Err(unexpected("get_state", other)),
        }
    }

    pub async fn set_state(&self, state: StateTag) -> LinkResult<()> {
        self.expect_ok("set_state", Request::SetState { state }).await
    }

    pub async fn push_command(&self, command: VisionCommand) -> LinkResult<()> {
        self.expect_ok("push_command", Request::PushCommand { command }).await
    }

    pub async fn pop_command(&self) -> LinkResult<Option<VisionCommand>> {
        match self.call(Request::PopCommand).await? {
            Response::Command { command } => Ok(command),
            other => Err(unexpected("pop_command", other)),
        }
    }

    pub async fn push_detection(&self, report: DetectionReport) -> LinkResult<()> {
        self.expect_ok("push_detection", Request::PushDetection { report }).await
    }

    pub async fn drain_detections(&self) -> LinkResult<Vec<DetectionReport>> {
        match self.call(Request::DrainDetections).await? {
            Response::Detections { reports } => Ok(reports),
            other => Err(unexpected("drain_detections", other)),
        }
    }

    pub async fn set_environment(&self, boxes: Vec<BoundingBox>) -> LinkResult<()> {
        self.expect_ok("set_environment", Request::SetEnvironment { boxes }).await
    }

    pub async fn get_environment(&self) -> LinkResult<Vec<BoundingBox>> {
        match self.call(Request::GetEnvironment).await? {
            Response::Environment { boxes } => Ok(boxes),
            other => Err(unexpected("get_environment", other)),
        }
    }

    async fn expect_ok(&self, op: &'static str, req: Request) -> LinkResult<()> {
        match self.call(req).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(op, other)),
        }
    }
}

fn unexpected(op: &'static str, got: Response) -> LinkError {
    LinkError::Unexpected { op, got: format!("{:?}", got) }
}

pub(crate) fn lock(m: &Mutex<CommState>) -> MutexGuard<'_, CommState> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
