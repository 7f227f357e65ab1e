use std::fmt;

/// PX4 parameters are either 32-bit integers or floats on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Int(i32),
    Float(f32),
}

impl ParamValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParamValue::Int(v) => v as f64,
            ParamValue::Float(v) => v as f64,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Parameter set written at flight-process startup.
pub const AUTOPILOT_PARAMS: &[(&str, ParamValue)] = &[
    ("MIS_TAKEOFF_ALT", ParamValue::Float(6.0)),
    ("MPC_CRUISE_90", ParamValue::Float(6.352)),
    ("MPC_XY_VEL_MAX", ParamValue::Float(6.352)),
    ("MPC_XY_CRUISE", ParamValue::Float(6.352)),
    ("NAV_DLL_ACT", ParamValue::Int(1)),
    ("COM_OBL_ACT", ParamValue::Int(1)),
    ("NAV_RCL_ACT", ParamValue::Int(1)),
    ("COM_OBL_RC_ACT", ParamValue::Int(5)),
    ("LNDMC_XY_VEL_MAX", ParamValue::Float(0.5)),
    ("LNDMC_FFALL_THR", ParamValue::Float(3.0)),
    ("LNDMC_FFALL_TTRI", ParamValue::Float(0.15)),
    ("LNDMC_ALT_MAX", ParamValue::Float(9.0)),
    ("LNDMC_LOW_T_THR", ParamValue::Float(0.2)),
];

/// MAVLink param ids are at most 16 bytes, NUL padded.
pub fn param_id(name: &str) -> Option<[u8; 16]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > 16 || !name.is_ascii() {
        return None;
    }
    let mut id = [0u8; 16];
    id[..bytes.len()].copy_from_slice(bytes);
    Some(id)
}

pub fn param_name(id: &[u8]) -> String {
    let end = id.iter().position(|b| *b == 0).unwrap_or(id.len());
    String::from_utf8_lossy(&id[..end]).into_owned()
}
