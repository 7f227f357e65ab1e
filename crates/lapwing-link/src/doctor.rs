use anyhow::Result;
use std::net::SocketAddr;

use crate::LinkConfig;

pub fn check_link(cfg: &LinkConfig) -> Result<()> {
    let addr: SocketAddr = cfg
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("link.bind {:?} is not host:port: {}", cfg.bind, e))?;
    anyhow::ensure!(addr.ip().is_loopback(), "link.bind must be a loopback address, got {}", addr.ip());
    anyhow::ensure!(cfg.connect_attempts >= 1, "link.connect_attempts must be >= 1");
    Ok(())
}
