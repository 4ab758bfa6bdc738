//! mpv playback backend over JSON IPC.
//!
//! Architecture:
//!
//! ```text
//!   MpvBackend (blocking, PlaybackBackend)
//!         │  block_on
//!         ▼
//!   MpvDriver::spawn_and_connect()
//!         │
//!         ├── writer_task   ← receives PendingRequest via mpsc, serialises → socket
//!         └── reader_task   ← reads JSON lines from socket
//!                                ├── response (has request_id) → matched oneshot::Sender
//!                                └── event / property-change   → logged
//! ```
//!
//! Backend resources map onto mpv as: instance = the mpv process and its IPC
//! connection, media = the stream URL plus its cache settings, player = the
//! loaded and playing file.

use radia_core::playback::{BackendError, PlaybackBackend};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const IPC_TIMEOUT: Duration = Duration::from_secs(5);
const QUIT_GRACE: Duration = Duration::from_secs(2);

/// Transport conditions the backend tells apart from mpv's own error replies.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("mpv writer task gone")]
    WriterGone,
    #[error("mpv IPC connection closed")]
    Closed,
    #[error("mpv IPC read error: {0}")]
    Read(String),
    #[error("mpv IPC timeout for req={0}")]
    Timeout(u64),
    #[error("mpv reply channel dropped req={0}")]
    ReplyDropped(u64),
}

impl IpcError {
    /// True when mpv went away rather than rejecting a command.
    pub fn is_hang_up(&self) -> bool {
        matches!(
            self,
            IpcError::WriterGone | IpcError::Closed | IpcError::ReplyDropped(_)
        )
    }
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

// ── internal channel types ────────────────────────────────────────────────────

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| IpcError::WriterGone)?;

        tokio::time::timeout(IPC_TIMEOUT, reply_rx)
            .await
            .map_err(|_| IpcError::Timeout(req_id))?
            .map_err(|_| IpcError::ReplyDropped(req_id))?
    }

    pub async fn set_cache(&self, network_caching: Duration) -> anyhow::Result<()> {
        self.send(json!(["set_property", "cache", "yes"])).await?;
        self.send(json!(["set_property", "cache-secs", network_caching.as_secs_f64()]))
            .await?;
        Ok(())
    }

    pub async fn load_stream(&self, url: &str, volume: f32) -> anyhow::Result<()> {
        self.send(json!(["loadfile", url])).await?;
        let vol_pct = (volume * 100.0).clamp(0.0, 100.0);
        if let Err(e) = self.send(json!(["set_property", "volume", vol_pct])).await {
            warn!("mpv: setting volume failed: {}", e);
        }
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.send(json!(["stop"])).await?;
        Ok(())
    }

    pub async fn clear_playlist(&self) -> anyhow::Result<()> {
        self.send(json!(["playlist-clear"])).await?;
        Ok(())
    }

    /// Ask mpv to exit. The connection may close before a reply arrives, so
    /// a hang-up counts as success.
    pub async fn quit(&self) -> anyhow::Result<()> {
        match self.send(json!(["quit"])).await {
            Ok(_) => Ok(()),
            Err(e) if e.downcast_ref::<IpcError>().is_some_and(IpcError::is_hang_up) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns one mpv child process.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
}

impl MpvDriver {
    pub fn new() -> Self {
        Self {
            socket_name: radia_core::platform::mpv_socket_name(),
            process: None,
        }
    }

    /// Wait for the process to exit on its own, killing it after `grace`.
    pub async fn shutdown(&mut self, grace: Duration) {
        let Some(mut p) = self.process.take() else {
            return;
        };
        match tokio::time::timeout(grace, p.wait()).await {
            Ok(Ok(status)) => debug!("mpv: exited with {}", status),
            Ok(Err(e)) => warn!("mpv: wait failed: {}", e),
            Err(_) => {
                warn!("mpv: did not quit, killing");
                let _ = p.kill().await;
            }
        }
    }

    pub async fn spawn_and_connect(&mut self) -> anyhow::Result<MpvHandle> {
        // Kill stale process
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        info!("mpv: spawning new process");
        let mpv_binary = radia_core::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(radia_core::platform::mpv_socket_arg())
            .arg("--quiet")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);

        // Wait for socket to appear
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        Ok(Self::start_io_tasks(stream))
    }

    fn start_io_tasks(stream: UnixStream) -> MpvHandle {
        let (read_half, write_half) = stream.into_split();
        let reader = BufReader::new(read_half);

        // req_id → reply channel, shared between writer (inserts) and reader (resolves).
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

        tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
        tokio::spawn(reader_task(reader, pending));

        MpvHandle { tx: cmd_tx }
    }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn fail_all(pending: &PendingMap, reason: impl Fn() -> IpcError) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(reason().into()));
    }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_all(&pending, || IpcError::Closed).await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) else {
                    debug!("mpv reader: event {}", trimmed);
                    continue;
                };
                let mut map = pending.lock().await;
                let Some(tx) = map.remove(&req_id) else {
                    debug!("mpv reader: response for unknown req={}", req_id);
                    continue;
                };
                let result = if val["error"].as_str() == Some("success") {
                    debug!("mpv reader: response req={} ok", req_id);
                    Ok(val)
                } else {
                    let err = val["error"]
                        .as_str()
                        .unwrap_or("unknown error")
                        .to_string();
                    debug!("mpv reader: response req={} err={}", req_id, err);
                    Err(anyhow::anyhow!("mpv error: {}", err))
                };
                let _ = tx.send(result);
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_all(&pending, || IpcError::Read(e.to_string())).await;
                break;
            }
        }
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── blocking backend ──────────────────────────────────────────────────────────

pub struct MpvInstance {
    driver: MpvDriver,
    handle: MpvHandle,
}

pub struct MpvMedia {
    url: String,
    handle: MpvHandle,
}

pub struct MpvPlayer {
    url: String,
    handle: MpvHandle,
}

/// Drives mpv from the synchronous controller loop. IPC runs on the given
/// runtime; every call blocks until mpv has answered.
pub struct MpvBackend {
    runtime: Handle,
    volume: f32,
}

impl MpvBackend {
    pub fn new(runtime: Handle, volume: f32) -> Self {
        Self { runtime, volume }
    }
}

fn backend_err(e: anyhow::Error) -> BackendError {
    BackendError::new(format!("mpv: {:#}", e))
}

impl PlaybackBackend for MpvBackend {
    type Instance = MpvInstance;
    type Media = MpvMedia;
    type Player = MpvPlayer;

    fn new_instance(&mut self) -> Result<MpvInstance, BackendError> {
        let mut driver = MpvDriver::new();
        let handle = self
            .runtime
            .block_on(driver.spawn_and_connect())
            .map_err(backend_err)?;
        Ok(MpvInstance { driver, handle })
    }

    fn new_media(
        &mut self,
        instance: &mut MpvInstance,
        url: &str,
        network_caching: Duration,
    ) -> Result<MpvMedia, BackendError> {
        self.runtime
            .block_on(instance.handle.set_cache(network_caching))
            .map_err(backend_err)?;
        Ok(MpvMedia {
            url: url.to_string(),
            handle: instance.handle.clone(),
        })
    }

    fn start_player(
        &mut self,
        instance: &mut MpvInstance,
        media: &MpvMedia,
    ) -> Result<MpvPlayer, BackendError> {
        self.runtime
            .block_on(instance.handle.load_stream(&media.url, self.volume))
            .map_err(backend_err)?;
        info!("mpv: streaming {}", media.url);
        Ok(MpvPlayer {
            url: media.url.clone(),
            handle: instance.handle.clone(),
        })
    }

    fn release_player(&mut self, player: MpvPlayer) -> Result<(), BackendError> {
        debug!("mpv: stopping {}", player.url);
        self.runtime
            .block_on(player.handle.stop())
            .map_err(backend_err)
    }

    fn release_media(&mut self, media: MpvMedia) -> Result<(), BackendError> {
        debug!("mpv: releasing {}", media.url);
        self.runtime
            .block_on(media.handle.clear_playlist())
            .map_err(backend_err)
    }

    fn release_instance(&mut self, mut instance: MpvInstance) -> Result<(), BackendError> {
        self.runtime.block_on(async {
            let quit = instance.handle.quit().await;
            instance.driver.shutdown(QUIT_GRACE).await;
            quit.map_err(backend_err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fake mpv end of the socket: answers each request with `error`.
    async fn answer_one(peer: &mut BufReader<UnixStream>, error: &str) -> Value {
        let mut line = String::new();
        peer.read_line(&mut line).await.unwrap();
        let req: Value = serde_json::from_str(&line).unwrap();
        // an unsolicited event first; the reader must skip it
        let event = "{\"event\":\"idle\"}\n";
        peer.get_mut().write_all(event.as_bytes()).await.unwrap();
        let reply = json!({ "request_id": req["request_id"], "error": error, "data": null });
        let mut raw = serde_json::to_string(&reply).unwrap();
        raw.push('\n');
        peer.get_mut().write_all(raw.as_bytes()).await.unwrap();
        req
    }

    #[tokio::test]
    async fn test_responses_are_matched_by_request_id() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let handle = MpvDriver::start_io_tasks(ours);
        let mut peer = BufReader::new(theirs);

        let (res, req) = tokio::join!(
            handle.send(json!(["loadfile", "http://stream.example/1"])),
            answer_one(&mut peer, "success"),
        );
        assert!(res.is_ok());
        assert_eq!(req["command"][0], "loadfile");

        let (res, _) = tokio::join!(handle.stop(), answer_one(&mut peer, "invalid parameter"));
        let err = res.unwrap_err().to_string();
        assert!(err.contains("invalid parameter"));
    }

    #[tokio::test]
    async fn test_quit_succeeds_when_mpv_hangs_up() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let handle = MpvDriver::start_io_tasks(ours);
        let mut peer = BufReader::new(theirs);

        let hang_up = async move {
            let mut line = String::new();
            peer.read_line(&mut line).await.unwrap();
            drop(peer);
        };
        let (res, _) = tokio::join!(handle.quit(), hang_up);
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn test_quit_reports_a_rejected_command() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let handle = MpvDriver::start_io_tasks(ours);
        let mut peer = BufReader::new(theirs);

        // a rejection that happens to mention a closed file is still a rejection
        let (res, _) = tokio::join!(handle.quit(), answer_one(&mut peer, "file closed early"));
        let err = res.unwrap_err();
        assert!(err.downcast_ref::<IpcError>().is_none());
    }

    #[test]
    fn test_hang_up_classification() {
        assert!(IpcError::Closed.is_hang_up());
        assert!(IpcError::WriterGone.is_hang_up());
        assert!(IpcError::ReplyDropped(3).is_hang_up());
        assert!(!IpcError::Timeout(3).is_hang_up());
        assert!(!IpcError::Read("reset".to_string()).is_hang_up());
    }

    #[tokio::test]
    async fn test_cache_hint_becomes_cache_secs() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let handle = MpvDriver::start_io_tasks(ours);
        let mut peer = BufReader::new(theirs);

        let answers = async {
            let first = answer_one(&mut peer, "success").await;
            let second = answer_one(&mut peer, "success").await;
            (first, second)
        };
        let (res, (first, second)) =
            tokio::join!(handle.set_cache(Duration::from_millis(7000)), answers);
        assert!(res.is_ok());
        assert_eq!(first["command"], json!(["set_property", "cache", "yes"]));
        assert_eq!(second["command"], json!(["set_property", "cache-secs", 7.0]));
    }
}
