use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionNed {
    pub north_m: f32,
    pub east_m: f32,
    pub down_m: f32,
    pub yaw_deg: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VelocityNed {
    pub north_mps: f32,
    pub east_mps: f32,
    pub down_mps: f32,
    pub yaw_deg: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VelocityBody {
    pub forward_mps: f32,
    pub right_mps: f32,
    pub down_mps: f32,
    pub yawspeed_dps: f32,
}

impl VelocityBody {
    pub fn new(forward_mps: f32, right_mps: f32, down_mps: f32, yawspeed_dps: f32) -> Self {
        Self { forward_mps, right_mps, down_mps, yawspeed_dps }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setpoint {
    PositionNed(PositionNed),
    VelocityNed(VelocityNed),
    VelocityBody(VelocityBody),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetpointKind {
    PositionNed,
    VelocityNed,
    VelocityBody,
}

impl fmt::Display for SetpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SetpointKind::PositionNed => "position_ned",
            SetpointKind::VelocityNed => "velocity_ned",
            SetpointKind::VelocityBody => "velocity_body",
        })
    }
}

impl Setpoint {
    pub fn kind(&self) -> SetpointKind {
        match self {
            Setpoint::PositionNed(_) => SetpointKind::PositionNed,
            Setpoint::VelocityNed(_) => SetpointKind::VelocityNed,
            Setpoint::VelocityBody(_) => SetpointKind::VelocityBody,
        }
    }

    pub fn is_finite(&self) -> bool {
        let v = match *self {
            Setpoint::PositionNed(p) => [p.north_m, p.east_m, p.down_m, p.yaw_deg],
            Setpoint::VelocityNed(v) => [v.north_mps, v.east_mps, v.down_mps, v.yaw_deg],
            Setpoint::VelocityBody(b) => [b.forward_mps, b.right_mps, b.down_mps, b.yawspeed_dps],
        };
        v.iter().all(|x| x.is_finite())
    }
}

/// Tracks which setpoint variants were written since the last offboard stop.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedSet {
    position: bool,
    velocity: bool,
    body: bool,
}

impl SeedSet {
    pub fn record(&mut self, kind: SetpointKind) {
        match kind {
            SetpointKind::PositionNed => self.position = true,
            SetpointKind::VelocityNed => self.velocity = true,
            SetpointKind::VelocityBody => self.body = true,
        }
    }

    pub fn missing(&self) -> Vec<SetpointKind> {
        let mut out = Vec::new();
        if !self.position { out.push(SetpointKind::PositionNed); }
        if !self.velocity { out.push(SetpointKind::VelocityNed); }
        if !self.body { out.push(SetpointKind::VelocityBody); }
        out
    }

    pub fn complete(&self) -> bool {
        self.position && self.velocity && self.body
    }
}
