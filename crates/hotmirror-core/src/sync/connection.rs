//! WebSocket connection to a host.
//!
//! One task owns the socket, the controller and the import handle, and
//! multiplexes them with `tokio::select!`: inbound frames, the running
//! import's completion and a shutdown signal. Imports run on the blocking
//! pool, so reading never stalls behind an extraction.

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use super::SyncController;
use crate::error::{Error, Result};

/// `ws://` URL for a host address. Full URLs are passed through.
pub fn websocket_url(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("ws://{address}")
    }
}

/// Connect to `address` and mirror until the host disconnects or
/// `shutdown_rx` fires.
///
/// # Errors
///
/// Returns [`Error::Connection`] if the connection cannot be opened or
/// fails while open.
pub async fn connect(
    controller: &mut SyncController,
    address: &str,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let url = websocket_url(address);
    controller.publish_status(format!("Connecting to {url}"));
    tracing::info!(%url, "connecting to host");

    let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| {
            let err = Error::Connection(format!("{url}: {e}"));
            controller.publish_status(err.to_string());
            err
        })?;

    controller.publish_status(format!("Connected to {url}"));
    let result = drive(controller, stream, shutdown_rx).await;
    controller.publish_status(format!("Disconnected from {url}"));
    result
}

/// Run the mirror loop over an established WebSocket.
///
/// An import still running when the loop ends is awaited and applied before
/// returning, so the sandbox is never left mid-import.
pub async fn drive<S>(
    controller: &mut SyncController,
    mut stream: WebSocketStream<S>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = loop {
        tokio::select! {
            finished = controller.wait_import(), if controller.is_importing() => {
                if let Some(result) = finished {
                    controller.finish_import(result);
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => controller.handle_text(text.as_str()),
                Some(Ok(Message::Binary(data))) => controller.handle_binary(data.to_vec()),
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "host closed the connection");
                    break Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "connection error");
                    break Err(Error::Connection(e.to_string()));
                }
                None => break Ok(()),
            },
            _ = shutdown_rx.recv() => {
                tracing::debug!("connection received shutdown signal");
                if let Err(e) = stream.close(None).await {
                    tracing::debug!(error = %e, "failed to close connection cleanly");
                }
                break Ok(());
            }
        }
    };

    if let Some(finished) = controller.wait_import().await {
        controller.finish_import(finished);
    }

    if let Err(e) = &result {
        controller.publish_status(e.to_string());
    }
    result
}
