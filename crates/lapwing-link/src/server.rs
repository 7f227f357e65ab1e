use lapwing_proto::wire::{Request, Response};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::LinkResult;
use crate::record::CommState;
use crate::{lock, CommHandle};

/// Hosts the shared record for child processes. Every connection is served
/// by its own task; requests are applied under the record lock one at a
/// time.
pub struct CommServer {
    listener: TcpListener,
    record: Arc<Mutex<CommState>>,
}

impl CommServer {
    pub async fn bind(addr: &str, record: CommState) -> LinkResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("link: serving shared record on {}", listener.local_addr()?);
        Ok(Self { listener, record: Arc::new(Mutex::new(record)) })
    }

    pub fn local_addr(&self) -> LinkResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// In-process handle onto the same record the server exposes.
    pub fn handle(&self) -> CommHandle {
        CommHandle::Local(self.record.clone())
    }

    pub async fn serve(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("link: client {} connected", peer);
                    let record = self.record.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_conn(stream, record).await {
                            warn!("link: client {} dropped: {}", peer, e);
                        }
                    });
                }
                Err(e) => warn!("link: accept failed: {}", e),
            }
        }
    }
}

async fn serve_conn(stream: TcpStream, record: Arc<Mutex<CommState>>) -> LinkResult<()> {
    let (rd, mut wr) = stream.into_split();
    let mut lines = BufReader::new(rd).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let resp = match serde_json::from_str::<Request>(&line) {
            Ok(req) => lock(&record).apply(req),
            Err(e) => Response::Error { message: format!("bad request: {}", e) },
        };
        let mut out = serde_json::to_vec(&resp)?;
        out.push(b'\n');
        wr.write_all(&out).await?;
    }
    Ok(())
}
