//! WebSocket session driver shared by both adapters.
//!
//! A session is one background task that owns the socket.  It connects,
//! reports the outcome, then loops over two inputs with `tokio::select!`:
//! control messages from the owning adapter and frames from the remote end.
//! Protocol specifics are supplied by a [`SessionHandler`].

use futures_util::{Sink, SinkExt, StreamExt};
use iris_types::{IrisError, TransportEvent};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tracing::{debug, warn};

use crate::adapter::AdapterListener;

/// Protocol hooks a session calls into.
pub(crate) trait SessionHandler: Send + 'static {
    type Command: Send + 'static;

    /// Translate one inbound text frame into zero or more events.
    fn on_text(&mut self, text: &str) -> Vec<TransportEvent>;

    /// Apply an adapter command, returning text frames to send.
    fn on_command(&mut self, command: Self::Command) -> Vec<String>;

    /// Text frames to send before the close frame.
    fn on_shutdown(&mut self) -> Vec<String> {
        Vec::new()
    }
}

enum Control<C> {
    Command(C),
    Close,
}

/// Handle the owning adapter keeps to steer its session task.
pub(crate) struct Session<C> {
    control: mpsc::UnboundedSender<Control<C>>,
}

impl<C: Send + 'static> Session<C> {
    /// Validate `endpoint` and spawn the session task on the current runtime.
    pub(crate) fn start<H>(endpoint: &str, listener: AdapterListener, handler: H) -> Result<Self, IrisError>
    where
        H: SessionHandler<Command = C>,
    {
        let request = client_request(endpoint)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| IrisError::Connect(format!("no async runtime to drive the connection: {e}")))?;

        let (control, rx) = mpsc::unbounded_channel();
        runtime.spawn(drive(request, listener, handler, rx));
        Ok(Self { control })
    }

    /// Queue a protocol command.  Returns `false` once the task has ended.
    pub(crate) fn command(&self, command: C) -> bool {
        self.control.send(Control::Command(command)).is_ok()
    }

    /// Ask the task to send its farewell frames and close the socket.
    pub(crate) fn close(&self) {
        let _ = self.control.send(Control::Close);
    }
}

/// Parse `endpoint` into a WebSocket client request.
pub(crate) fn client_request(endpoint: &str) -> Result<Request, IrisError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(IrisError::Connect("endpoint is empty".to_string()));
    }
    let request = endpoint
        .into_client_request()
        .map_err(|e| IrisError::Connect(format!("invalid endpoint '{endpoint}': {e}")))?;
    match request.uri().scheme_str() {
        Some("ws") | Some("wss") => Ok(request),
        other => Err(IrisError::Connect(format!(
            "endpoint '{endpoint}' must use ws:// or wss:// (got {})",
            other.unwrap_or("no scheme")
        ))),
    }
}

async fn drive<H: SessionHandler>(
    request: Request,
    listener: AdapterListener,
    mut handler: H,
    mut control: mpsc::UnboundedReceiver<Control<H::Command>>,
) {
    let session = listener.session();
    let uri = request.uri().to_string();

    // Commands issued while the handshake is in flight are replayed after it.
    let mut pending = Vec::new();
    let connect = connect_async(request);
    tokio::pin!(connect);

    let ws = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((ws, _response)) => break ws,
                Err(e) => {
                    warn!(session = %session, uri = %uri, error = %e, "connection failed");
                    listener.emit(TransportEvent::Error(format!("connection to {uri} failed: {e}")));
                    return;
                }
            },
            ctl = control.recv() => match ctl {
                Some(Control::Command(c)) => pending.push(c),
                Some(Control::Close) | None => {
                    debug!(session = %session, "closed before handshake completed");
                    return;
                }
            },
        }
    };

    debug!(session = %session, uri = %uri, "connection established");
    listener.emit(TransportEvent::Opened);

    let (mut ws_tx, mut ws_rx) = ws.split();

    for command in pending {
        let frames = handler.on_command(command);
        if let Err(e) = send_all(&mut ws_tx, frames).await {
            listener.emit(TransportEvent::Error(format!("send failed: {e}")));
            return;
        }
    }

    loop {
        tokio::select! {
            ctl = control.recv() => match ctl {
                Some(Control::Command(command)) => {
                    let frames = handler.on_command(command);
                    if let Err(e) = send_all(&mut ws_tx, frames).await {
                        warn!(session = %session, error = %e, "send failed");
                        listener.emit(TransportEvent::Error(format!("send failed: {e}")));
                        return;
                    }
                }
                Some(Control::Close) | None => {
                    let farewell = handler.on_shutdown();
                    let _ = send_all(&mut ws_tx, farewell).await;
                    let _ = ws_tx.send(Message::Close(None)).await;
                    debug!(session = %session, "connection closed locally");
                    return;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    for event in handler.on_text(text.as_str()) {
                        listener.emit(event);
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        for event in handler.on_text(text) {
                            listener.emit(event);
                        }
                    }
                    Err(_) => {
                        listener.emit(TransportEvent::DecodeError(
                            "binary frame is not UTF-8 text".to_string(),
                        ));
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    debug!(session = %session, "remote closed the connection");
                    listener.emit(TransportEvent::Closed);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(session = %session, error = %e, "connection lost");
                    listener.emit(TransportEvent::Error(format!("connection lost: {e}")));
                    return;
                }
            },
        }
    }
}

async fn send_all<S>(sink: &mut S, frames: Vec<String>) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    for frame in frames {
        sink.send(Message::Text(frame.into())).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ws_and_wss() {
        assert!(client_request("ws://localhost:8080").is_ok());
        assert!(client_request("wss://robot.local:9090/bridge").is_ok());
    }

    #[test]
    fn rejects_empty_endpoint() {
        let err = client_request("   ").unwrap_err();
        assert!(matches!(err, IrisError::Connect(_)));
    }

    #[test]
    fn rejects_non_websocket_scheme() {
        let err = client_request("http://localhost:8080").unwrap_err();
        assert!(matches!(err, IrisError::Connect(_)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(client_request("not a url").is_err());
    }
}
