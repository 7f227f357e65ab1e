use lapwing_proto::wire::{Request, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{LinkError, LinkResult};

struct Conn {
    lines: Lines<BufReader<OwnedReadHalf>>,
    wr: OwnedWriteHalf,
}

/// Remote proxy for the shared record. Calls are serialized: one request in
/// flight per client.
#[derive(Clone)]
pub struct CommClient {
    conn: Arc<Mutex<Conn>>,
}

impl CommClient {
    pub async fn connect(addr: &str) -> LinkResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (rd, wr) = stream.into_split();
        debug!("link: connected to {}", addr);
        Ok(Self { conn: Arc::new(Mutex::new(Conn { lines: BufReader::new(rd).lines(), wr })) })
    }

    /// Retries while the supervisor is still coming up.
    pub async fn connect_with_retry(addr: &str, attempts: u32, backoff: Duration) -> LinkResult<Self> {
        let mut last = None;
        for attempt in 1..=attempts.max(1) {
            match Self::connect(addr).await {
                Ok(c) => return Ok(c),
                Err(e) => {
                    warn!("link: connect {} attempt {}/{} failed: {}", addr, attempt, attempts, e);
                    last = Some(e);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
        Err(last.unwrap_or(LinkError::Closed))
    }

    pub async fn call(&self, req: &Request) -> LinkResult<Response> {
        let mut conn = self.conn.lock().await;
        let mut out = serde_json::to_vec(req)?;
        out.push(b'\n');
        conn.wr.write_all(&out).await?;

        let line = conn.lines.next_line().await?.ok_or(LinkError::Closed)?;
        match serde_json::from_str::<Response>(&line)? {
            Response::Error { message } => Err(LinkError::Remote(message)),
            resp => Ok(resp),
        }
    }
}
