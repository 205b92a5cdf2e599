//! Network edge: accepts client connections, decodes wire frames into raw
//! packets, and enqueues them. No game logic runs here.
//!
//! Wire format: a `0xAA` marker byte, a big-endian u16 length covering the
//! opcode and payload, then the opcode byte and payload. Outbound messages
//! use the same framing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::session::OutboundMessage;
use crate::world::command::{ClientCommand, ControlCommand, RawPacket};
use crate::world::WorldRuntime;

const FRAME_MARKER: u8 = 0xAA;

/// Longest accepted frame body; anything larger is a protocol violation.
const MAX_FRAME_LEN: usize = 8192;

const OP_OUT_SYSTEM_MESSAGE: u8 = 0x0A;
const OP_OUT_REFRESH: u8 = 0x22;
const OP_OUT_CLOSE_DIALOG: u8 = 0x30;

/// How often the writer half polls its outbound channel, and the accept
/// loop re-checks the shutdown token.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn encode_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len() + 1;
    let mut frame = Vec::with_capacity(3 + len);
    frame.push(FRAME_MARKER);
    frame.extend_from_slice(&(len as u16).to_be_bytes());
    frame.push(opcode);
    frame.extend_from_slice(payload);
    frame
}

/// Validate a frame header, returning the body length (opcode + payload).
fn parse_header(header: [u8; 3]) -> Result<usize> {
    if header[0] != FRAME_MARKER {
        bail!("bad frame marker 0x{:02X}", header[0]);
    }
    let len = u16::from_be_bytes([header[1], header[2]]) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        bail!("bad frame length {len}");
    }
    Ok(len)
}

fn encode_outbound(message: &OutboundMessage) -> Vec<u8> {
    match message {
        OutboundMessage::SystemMessage(text) => {
            encode_frame(OP_OUT_SYSTEM_MESSAGE, text.as_bytes())
        }
        OutboundMessage::Refresh => encode_frame(OP_OUT_REFRESH, &[]),
        OutboundMessage::CloseDialog => encode_frame(OP_OUT_CLOSE_DIALOG, &[]),
    }
}

/// Accept loop. Returns once the shutdown token trips.
pub async fn serve(runtime: Arc<WorldRuntime>) -> Result<()> {
    let addr = format!("{}:{}", runtime.config.bind_ip, runtime.config.world_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    tracing::info!("[net] listening on {}", addr);

    let token = runtime.shutdown_token();
    loop {
        if token.is_triggered() {
            break;
        }
        let accepted = tokio::time::timeout(POLL_INTERVAL, listener.accept()).await;
        match accepted {
            Ok(Ok((stream, peer))) => {
                tracing::info!("[net] connection from {}", peer);
                let runtime = Arc::clone(&runtime);
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(runtime, stream).await {
                        tracing::debug!("[net] connection ended: {:#}", err);
                    }
                });
            }
            Ok(Err(err)) => {
                tracing::warn!("[net] accept failed: {}", err);
            }
            // Timeout: loop back around to re-check the token.
            Err(_) => {}
        }
    }
    tracing::info!("[net] listener stopped");
    Ok(())
}

async fn handle_connection(runtime: Arc<WorldRuntime>, stream: TcpStream) -> Result<()> {
    stream.set_nodelay(true).ok();
    let (mut reader, mut writer) = stream.into_split();

    let start_map = runtime.store.map_ids().first().copied().unwrap_or(0);
    let (actor, outbound) = runtime.sessions.register(
        format!("player{}", runtime.sessions.count() + 1),
        start_map,
    );
    let connection_id = actor.connection_id;

    let token = runtime.shutdown_token();
    let writer_token = token.clone();
    let writer_task = tokio::spawn(async move {
        loop {
            let mut wrote = false;
            while let Ok(message) = outbound.try_recv() {
                if writer.write_all(&encode_outbound(&message)).await.is_err() {
                    return;
                }
                wrote = true;
            }
            if wrote && writer.flush().await.is_err() {
                return;
            }
            if writer_token.is_triggered() {
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    });

    let result = async {
        loop {
            if token.is_triggered() {
                return Ok(());
            }
            let mut header = [0u8; 3];
            reader.read_exact(&mut header).await.context("read header")?;
            let len = parse_header(header)?;
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).await.context("read body")?;

            let packet = RawPacket::new(body[0], body.split_off(1));
            runtime.enqueue_client(ClientCommand {
                connection_id,
                packet,
            });
        }
    }
    .await;

    runtime.enqueue_control(ControlCommand::CleanupSession { connection_id });
    writer_task.abort();
    result
}
