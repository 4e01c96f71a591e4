//! Unix socket server implementation

use std::{fs::Permissions, os::unix::fs::PermissionsExt, path::Path, sync::Arc};
use tokio::{
    fs,
    net::{UnixListener, UnixStream},
    sync::watch,
};
use tracing::{debug, error, info, warn};

use crate::{
    backend::BluetoothStack,
    core::{server::PeripheralServer, types::ConnectionState},
    protocol::{
        ConnectionStateChangedParams, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
        JsonRpcResponse, Notification, RequestId,
    },
    transport::unix_socket::{
        handler::RequestHandler,
        session::{SessionReader, UnixSocketSession},
    },
};

/// Unix socket server
pub struct UnixSocketServer<S: BluetoothStack> {
    socket_path: String,
    socket_mode: u32,
    server: Arc<PeripheralServer<S>>,
    handler: Arc<RequestHandler<S>>,
}

impl<S: BluetoothStack> UnixSocketServer<S> {
    /// Create a new Unix socket server
    pub fn new(socket_path: String, socket_mode: u32, server: Arc<PeripheralServer<S>>) -> Self {
        let handler = Arc::new(RequestHandler::new(server.clone()));

        Self {
            socket_path,
            socket_mode,
            server,
            handler,
        }
    }

    /// Take a socket-activated listener or bind `socket_path`
    pub async fn bind(&self) -> std::io::Result<UnixListener> {
        let mut listenfd = listenfd::ListenFd::from_env();
        if let Some(listener) = listenfd.take_unix_listener(0)? {
            listener.set_nonblocking(true)?;
            info!("Unix socket server using socket-activated listener");
            return UnixListener::from_std(listener);
        }

        // Remove stale socket file left by a previous run
        if Path::new(&self.socket_path).exists() {
            fs::remove_file(&self.socket_path).await?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        fs::set_permissions(&self.socket_path, Permissions::from_mode(self.socket_mode)).await?;
        info!(
            "Unix socket server listening on {} (mode {:o})",
            self.socket_path, self.socket_mode
        );
        Ok(listener)
    }

    /// Start the server
    pub async fn start(&self) -> std::io::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept clients on `listener` until an I/O error
    pub async fn serve(&self, listener: UnixListener) -> std::io::Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let server = self.server.clone();
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, server, handler).await {
                            error!("Error handling client: {}", e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Error accepting connection: {}", e);
                }
            }
        }
    }

    async fn handle_client(
        stream: UnixStream,
        server: Arc<PeripheralServer<S>>,
        handler: Arc<RequestHandler<S>>,
    ) -> std::io::Result<()> {
        let (read_half, write_half) = stream.into_split();
        let session = UnixSocketSession::new(write_half);
        let mut reader = SessionReader::new(read_half);

        info!("New client connected: {}", session.id());

        // Subscribe before serving requests so no change is missed
        let states = server.subscribe();
        let forwarder = tokio::spawn(Self::forward_state_changes(
            server,
            states,
            session.clone(),
        ));

        while let Some(line) = reader.read_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => handler.handle_request(request).await,
                Err(e) => match Self::request_id(&line) {
                    Some(id) => {
                        warn!("Invalid JSON-RPC request: {}", e);
                        JsonRpcResponse::error(JsonRpcError::invalid_request(e.to_string()), id)
                    }
                    None => {
                        warn!("Unparseable message from {}: {}", session.id(), e);
                        continue;
                    }
                },
            };

            if let Err(e) = session.send_response(&response).await {
                error!("Error sending response: {}", e);
                break;
            }
        }

        info!("Client disconnected: {}", session.id());
        forwarder.abort();
        Ok(())
    }

    /// Id of a request that parsed as JSON but not as a known request
    fn request_id(line: &str) -> Option<RequestId> {
        let value: serde_json::Value = serde_json::from_str(line).ok()?;
        serde_json::from_value(value.get("id")?.clone()).ok()
    }

    /// Push every connection state change to the client
    async fn forward_state_changes(
        server: Arc<PeripheralServer<S>>,
        mut states: watch::Receiver<ConnectionState>,
        session: UnixSocketSession,
    ) {
        while states.changed().await.is_ok() {
            let snapshot = server.connection().await;
            let notification = JsonRpcNotification::new(Notification::ConnectionStateChanged(
                ConnectionStateChangedParams::from(snapshot),
            ));

            if let Err(e) = session.send_notification(&notification).await {
                debug!("Stopped forwarding state to {}: {}", session.id(), e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::MockStack,
        protocol::{Request, Response, StartServerParams},
    };
    use tempfile::tempdir;
    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::unix::OwnedReadHalf,
    };

    fn create_server(path: &Path, mode: u32) -> UnixSocketServer<MockStack> {
        let stack = Arc::new(MockStack::new());
        let server = Arc::new(PeripheralServer::new(stack));
        UnixSocketServer::new(path.to_str().unwrap().to_string(), mode, server)
    }

    async fn read_json(reader: &mut BufReader<OwnedReadHalf>) -> serde_json::Value {
        let mut line = String::new();
        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            reader.read_line(&mut line),
        )
        .await
        .expect("timed out waiting for line")
        .unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_bind_applies_socket_mode() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        // Stale file from an earlier run
        std::fs::write(&socket_path, b"").unwrap();

        let server = create_server(&socket_path, 0o600);
        let _listener = server.bind().await.unwrap();

        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_client_request_and_state_notification() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let server = create_server(&socket_path, 0o660);
        let listener = server.bind().await.unwrap();
        tokio::spawn(async move {
            server.serve(listener).await.ok();
        });

        let client = UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, mut write_half) = client.into_split();
        let mut reader = BufReader::new(read_half);

        let request = JsonRpcRequest::new(
            Request::StartServer(StartServerParams::default()),
            RequestId::Number(1),
        );
        let json = serde_json::to_string(&request).unwrap();
        write_half.write_all(json.as_bytes()).await.unwrap();
        write_half.write_all(b"\n").await.unwrap();
        write_half.flush().await.unwrap();

        // Response and state notification may arrive in either order
        let first = read_json(&mut reader).await;
        let second = read_json(&mut reader).await;
        let (response, notification) = if first.get("id").is_some() {
            (first, second)
        } else {
            (second, first)
        };

        let response: JsonRpcResponse = serde_json::from_value(response).unwrap();
        assert_eq!(response.id, RequestId::Number(1));
        assert!(matches!(response.result, Some(Response::Ok(_))));

        assert_eq!(notification["method"], "connection_state_changed");
        assert_eq!(notification["params"]["state"], "advertising");
    }

    #[tokio::test]
    async fn test_unknown_method_reports_invalid_request() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let server = create_server(&socket_path, 0o660);
        let listener = server.bind().await.unwrap();
        tokio::spawn(async move {
            server.serve(listener).await.ok();
        });

        let client = UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, mut write_half) = client.into_split();
        let mut reader = BufReader::new(read_half);

        write_half
            .write_all(b"not json\n{\"jsonrpc\":\"2.0\",\"method\":\"scan\",\"id\":\"x\"}\n")
            .await
            .unwrap();

        let response: JsonRpcResponse =
            serde_json::from_value(read_json(&mut reader).await).unwrap();
        assert_eq!(response.id, RequestId::String("x".to_string()));
        assert_eq!(response.error.unwrap().code, JsonRpcError::INVALID_REQUEST);
    }
}
