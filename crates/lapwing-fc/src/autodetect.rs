use mavlink::common::MavMessage;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub dev: String,
    pub baud: u32,
    pub hb_seen: bool,
    pub elapsed_ms: u64,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct AutodetectResult {
    pub chosen: Option<(String, u32)>,
    pub probes: Vec<ProbeResult>,
}

impl AutodetectResult {
    pub fn address(&self) -> Option<String> {
        self.chosen.as_ref().map(|(dev, baud)| serial_address(dev, *baud))
    }
}

pub fn serial_address(dev: &str, baud: u32) -> String {
    format!("serial:{}:{}", dev, baud)
}

pub fn default_candidate_devs() -> Vec<String> {
    vec![
        "/dev/ttyACM0".into(),
        "/dev/ttyACM1".into(),
        "/dev/ttyUSB0".into(),
        "/dev/ttyUSB1".into(),
        "/dev/serial0".into(),
        "/dev/ttyAMA0".into(),
    ]
}

pub fn default_candidate_bauds() -> Vec<u32> {
    vec![57600, 115200, 921600]
}

/// Configured candidates first, then any port the OS reports that is not
/// already listed.
pub fn candidate_devs(configured: &[String]) -> Vec<String> {
    let mut devs: Vec<String> = configured.to_vec();
    match tokio_serial::available_ports() {
        Ok(ports) => {
            for p in ports {
                if !devs.contains(&p.port_name) {
                    devs.push(p.port_name);
                }
            }
        }
        Err(e) => debug!("fc autodetect: port enumeration failed: {}", e),
    }
    devs
}

/// Probes each dev/baud pair until one yields an autopilot HEARTBEAT.
/// Blocking; call from `spawn_blocking` in async code.
pub fn autodetect_fc(devs: &[String], bauds: &[u32], heartbeat_timeout: Duration) -> AutodetectResult {
    let mut probes = Vec::new();

    for dev in devs {
        if !std::path::Path::new(dev).exists() {
            continue;
        }
        for &baud in bauds {
            let start = Instant::now();
            let (hb_seen, note) = probe(&serial_address(dev, baud), heartbeat_timeout);
            probes.push(ProbeResult {
                dev: dev.clone(),
                baud,
                hb_seen,
                elapsed_ms: start.elapsed().as_millis() as u64,
                note,
            });
            if hb_seen {
                info!("fc autodetect: OK {} @ {}", dev, baud);
                return AutodetectResult { chosen: Some((dev.clone(), baud)), probes };
            }
        }
    }

    AutodetectResult { chosen: None, probes }
}

fn probe(address: &str, timeout: Duration) -> (bool, String) {
    let conn = match mavlink::connect::<MavMessage>(address) {
        Ok(c) => c,
        Err(e) => {
            warn!("fc autodetect probe failed {}: {}", address, e);
            return (false, format!("open/connect failed: {}", e));
        }
    };

    // Serial recv has no deadline of its own; the probe thread is abandoned
    // if nothing arrives in time.
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            match conn.recv() {
                Ok((_, MavMessage::HEARTBEAT(_))) => {
                    let _ = tx.send(());
                    return;
                }
                Ok(_) => {}
                Err(_) => std::thread::sleep(Duration::from_millis(25)),
            }
        }
    });

    match rx.recv_timeout(timeout) {
        Ok(()) => (true, "heartbeat".into()),
        Err(_) => (false, "no heartbeat".into()),
    }
}
