// WebSocket server exposing the allocation engine to draft-room clients.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use draftpool_core::watch::PoolSnapshot;

use crate::handler::{dispatch, Outcome, Services};
use crate::protocol::{PoolSnapshotPayload, ServerMessage};

/// Outbound frames buffered per connection before backpressure applies.
const OUTBOUND_BUFFER: usize = 256;

/// Accept connections forever, serving each on its own task.
pub async fn run(listener: TcpListener, services: Arc<Services>) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");

    loop {
        let (stream, addr) = listener.accept().await?;
        let addr_str = addr.to_string();
        info!("Accepted TCP connection from {addr_str}");
        tokio::spawn(serve_connection(stream, addr_str, Arc::clone(&services)));
    }
}

async fn serve_connection(stream: TcpStream, addr: String, services: Arc<Services>) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };

    let (mut write, read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    let writer_addr = addr.clone();
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(e) = write.send(Message::Text(text.into())).await {
                warn!("Failed to write to {writer_addr}: {e}");
                break;
            }
        }
        let _ = write.close().await;
    });

    let _ = process_message_stream(read, &services, &out_tx, &addr).await;
    drop(out_tx);
    let _ = writer.await;
    info!("Client {addr} disconnected");
}

/// Handle raw WebSocket [`Message`] items from any [`Stream`], writing reply
/// frames to `out`. Pool subscriptions opened on this stream push snapshots
/// to `out` until the stream ends.
///
/// Returns `Err(())` if `out` is closed. Generic over the stream so it can
/// be driven by in-memory streams in tests.
pub async fn process_message_stream<St>(
    mut stream: St,
    services: &Arc<Services>,
    out: &mpsc::Sender<String>,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut subscriptions: HashMap<String, JoinHandle<()>> = HashMap::new();

    let result: Result<(), ()> = async {
        while let Some(msg_result) = stream.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    let shared = Arc::clone(services);
                    let text = text.to_string();
                    let outcome =
                        match tokio::task::spawn_blocking(move || dispatch(&shared, &text)).await {
                            Ok(outcome) => outcome,
                            Err(e) => Outcome::Reply(ServerMessage::error(
                                "INTERNAL",
                                format!("request handler failed: {e}"),
                            )),
                        };

                    match outcome {
                        Outcome::Reply(reply) => {
                            if out.send(reply.to_json()).await.is_err() {
                                return Err(());
                            }
                        }
                        Outcome::Subscribed { team_id, mut receiver } => {
                            let first = snapshot_frame(&team_id, &mut receiver);
                            if out.send(first).await.is_err() {
                                return Err(());
                            }
                            debug!("Client {addr} subscribed to pool of team {team_id}");
                            let task = forward_snapshots(team_id.clone(), receiver, out.clone());
                            if let Some(previous) = subscriptions.insert(team_id, task) {
                                previous.abort();
                            }
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Client {addr} sent close frame");
                    break;
                }
                Err(e) => {
                    warn!("WebSocket error from {addr}: {e}");
                    break;
                }
                _ => {
                    // Binary, Ping, Pong and raw frames carry no requests.
                }
            }
        }
        Ok(())
    }
    .await;

    for (_, task) in subscriptions {
        task.abort();
    }
    result
}

/// Render the receiver's current snapshot and mark it seen.
fn snapshot_frame(team_id: &str, receiver: &mut watch::Receiver<PoolSnapshot>) -> String {
    let entries = receiver.borrow_and_update().to_vec();
    ServerMessage::PoolSnapshot(PoolSnapshotPayload {
        team_id: team_id.to_string(),
        entries,
    })
    .to_json()
}

fn forward_snapshots(
    team_id: String,
    mut receiver: watch::Receiver<PoolSnapshot>,
    out: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while receiver.changed().await.is_ok() {
            let frame = snapshot_frame(&team_id, &mut receiver);
            if out.send(frame).await.is_err() {
                break;
            }
        }
    })
}
