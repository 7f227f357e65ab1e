//! Owns the shared record, runs the flight and vision children and keeps
//! them alive until the mission is over.

use anyhow::{Context, Result};
use lapwing_link::{CommHandle, CommServer, CommState};
use lapwing_proto::{StateTag, VisionCommand, VisionMode, VisionTestKind};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use crate::config::Config;

/// What to do after the flight child exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Done,
    Respawn(StateTag),
    GiveUp,
}

pub fn after_flight_exit(state: StateTag, restarts: u32, max_restarts: u32) -> Next {
    if state.is_terminal() {
        Next::Done
    } else if restarts < max_restarts {
        Next::Respawn(state)
    } else {
        Next::GiveUp
    }
}

/// Restart budgets, one per child, each bounded by `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restarts {
    pub flight: u32,
    pub vision: u32,
    pub max: u32,
}

impl Restarts {
    pub fn new(max: u32) -> Self {
        Self { flight: 0, vision: 0, max }
    }

    /// Decides on a flight exit and charges the flight budget on respawn.
    pub fn flight_exit(&mut self, state: StateTag) -> Next {
        let next = after_flight_exit(state, self.flight, self.max);
        if matches!(next, Next::Respawn(_)) {
            self.flight += 1;
        }
        next
    }

    /// True when vision should be respawned; charges the vision budget.
    pub fn vision_exit(&mut self, state: StateTag) -> bool {
        if state.is_terminal() || self.vision >= self.max {
            return false;
        }
        self.vision += 1;
        true
    }
}

/// Builds child command lines from our own invocation.
#[derive(Debug, Clone)]
pub struct Launcher {
    pub exe: PathBuf,
    pub config: Option<PathBuf>,
    pub simulation: bool,
    pub link: String,
}

impl Launcher {
    pub fn args(&self, role: &[&str]) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(c) = &self.config {
            args.push("--config".into());
            args.push(c.display().to_string());
        }
        if self.simulation {
            args.push("--simulation".into());
        }
        args.extend(role.iter().map(|s| s.to_string()));
        args.push("--link".into());
        args.push(self.link.clone());
        args
    }

    pub fn flight_args(&self, resume: StateTag) -> Vec<String> {
        self.args(&["flight", "--resume", resume.as_str()])
    }

    pub fn vision_args(&self, mode: VisionMode) -> Vec<String> {
        self.args(&["vision", "--mode", mode_arg(mode)])
    }

    fn spawn(&self, args: Vec<String>) -> Result<Child> {
        let child = Command::new(&self.exe)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn {} {}", self.exe.display(), args.join(" ")))?;
        info!("supervisor: started pid {:?}: {}", child.id(), args.join(" "));
        Ok(child)
    }
}

pub fn mode_arg(mode: VisionMode) -> &'static str {
    match mode {
        VisionMode::ObstacleDetection => "obstacle_detection",
        VisionMode::TextDetection => "text_detection",
        VisionMode::ModuleDetection => "module_detection",
        VisionMode::Idle => "idle",
    }
}

pub struct Supervisor {
    cfg: Config,
    launcher: Launcher,
    comm: CommHandle,
    restarts: Restarts,
}

impl Supervisor {
    /// Binds the shared record and serves it in the background.
    pub async fn start(cfg: Config, config: Option<PathBuf>, simulation: bool) -> Result<Self> {
        let server = CommServer::bind(&cfg.link.bind, CommState::new(StateTag::Start))
            .await
            .with_context(|| format!("bind shared record on {}", cfg.link.bind))?;
        let link = server.local_addr()?.to_string();
        let comm = server.handle();
        tokio::spawn(server.serve());

        let exe = std::env::current_exe().context("locate own executable")?;
        let restarts = Restarts::new(cfg.supervisor.max_restarts);
        Ok(Self { cfg, launcher: Launcher { exe, config, simulation, link }, comm, restarts })
    }

    pub async fn run(mut self) -> Result<()> {
        match self.cfg.mission.settings.vision_test_kind {
            VisionTestKind::None => self.mission().await,
            VisionTestKind::Text => self.bench(VisionMode::TextDetection).await,
            VisionTestKind::Module => self.bench(VisionMode::ModuleDetection).await,
        }
    }

    async fn mission(&mut self) -> Result<()> {
        let settings = &self.cfg.mission.settings;
        info!("supervisor: mission {:?} starting", settings.run_title);
        let vision_enabled = settings.vision_enabled;

        let mut flight = self.launcher.spawn(self.launcher.flight_args(StateTag::Start))?;
        let mut vision =
            if vision_enabled { Some(self.launcher.spawn(self.launcher.vision_args(VisionMode::Idle))?) } else { None };
        let mut poll = tokio::time::interval(Duration::from_millis(self.cfg.supervisor.poll_interval_ms.max(10)));
        let mut last_state = StateTag::Start;
        let mut land_forced = false;

        loop {
            tokio::select! {
                r = tokio::signal::ctrl_c() => {
                    r.context("install ctrl-c handler")?;
                    if land_forced {
                        error!("supervisor: second interrupt, waiting for the landing to finish");
                        self.stop_vision(vision.take()).await;
                        match flight.wait().await {
                            Ok(status) => info!("supervisor: landing child exited ({})", status),
                            Err(e) => warn!("supervisor: wait for landing child: {}", e),
                        }
                        anyhow::bail!("supervisor killed during forced landing");
                    }
                    warn!("supervisor: interrupt, forcing land");
                    land_forced = true;
                    self.comm.set_state(StateTag::Land).await?;
                    stop(&mut flight).await;
                    flight = self.launcher.spawn(self.launcher.flight_args(StateTag::Land))?;
                }
                status = flight.wait() => {
                    let status = status.context("wait for flight child")?;
                    let state = self.comm.get_state().await?;
                    match self.restarts.flight_exit(state) {
                        Next::Done => {
                            info!("supervisor: flight child exited ({}) with state {}", status, state);
                            break;
                        }
                        Next::Respawn(resume) => {
                            warn!(
                                "supervisor: flight child died ({}) in {}, restart {}/{}",
                                status, state, self.restarts.flight, self.restarts.max
                            );
                            flight = self.launcher.spawn(self.launcher.flight_args(resume))?;
                        }
                        Next::GiveUp => {
                            self.stop_vision(vision.take()).await;
                            anyhow::bail!("flight child died ({}) in {} and restarts are exhausted", status, state);
                        }
                    }
                }
                status = wait_opt(&mut vision) => {
                    let status = status.context("wait for vision child")?;
                    vision = None;
                    let state = self.comm.get_state().await?;
                    if self.restarts.vision_exit(state) {
                        warn!("supervisor: vision child died ({}), restart {}/{}", status, self.restarts.vision, self.restarts.max);
                        vision = Some(self.launcher.spawn(self.launcher.vision_args(VisionMode::Idle))?);
                    } else {
                        warn!("supervisor: vision child exited ({}), continuing without it", status);
                    }
                }
                _ = poll.tick() => {
                    let state = self.comm.get_state().await?;
                    if state != last_state {
                        info!("supervisor: state {} -> {}", last_state, state);
                        last_state = state;
                    }
                }
            }
        }

        self.stop_vision(vision).await;
        info!("supervisor: mission over");
        Ok(())
    }

    /// Vision alone in a fixed mode; no flight child.
    async fn bench(&mut self, mode: VisionMode) -> Result<()> {
        info!("supervisor: vision bench test in {:?}", mode);
        let mut vision = self.launcher.spawn(self.launcher.vision_args(mode))?;
        tokio::select! {
            status = vision.wait() => {
                let status = status.context("wait for vision child")?;
                anyhow::ensure!(status.success(), "vision child failed: {}", status);
            }
            r = tokio::signal::ctrl_c() => {
                r.context("install ctrl-c handler")?;
                info!("supervisor: interrupt, stopping vision");
                self.stop_vision(Some(vision)).await;
            }
        }
        Ok(())
    }

    /// Asks vision to stop and kills it if it does not within the grace period.
    async fn stop_vision(&self, child: Option<Child>) {
        let Some(mut child) = child else { return };
        if let Err(e) = self.comm.push_command(VisionCommand::Stop).await {
            warn!("supervisor: cannot queue vision stop: {}", e);
        }
        let grace = Duration::from_millis(self.cfg.supervisor.vision_grace_ms);
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => info!("supervisor: vision child exited ({})", status),
            Ok(Err(e)) => warn!("supervisor: vision child wait failed: {}", e),
            Err(_) => {
                warn!("supervisor: vision child ignored stop, killing");
                stop(&mut child).await;
            }
        }
    }
}

async fn stop(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("supervisor: kill pid {:?}: {}", child.id(), e);
    }
}

async fn wait_opt(child: &mut Option<Child>) -> std::io::Result<ExitStatus> {
    match child {
        Some(c) => c.wait().await,
        None => std::future::pending().await,
    }
}
