//! JSON-RPC request handler for Unix socket transport

use std::sync::Arc;
use tracing::debug;

use crate::{
    backend::BluetoothStack,
    core::{error::ServerError, server::PeripheralServer},
    protocol::{
        DataParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse, OkResponse, Request, RequestId,
        Response, SentResponse, StartServerParams, StatusResponse,
    },
};

/// JSON-RPC request handler
pub struct RequestHandler<S: BluetoothStack> {
    server: Arc<PeripheralServer<S>>,
}

impl<S: BluetoothStack> RequestHandler<S> {
    /// Create a new request handler
    pub fn new(server: Arc<PeripheralServer<S>>) -> Self {
        Self { server }
    }

    /// Handle a JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!("Handling request {:?}", request.request);

        match request.request {
            Request::StartServer(params) => self.handle_start_server(params, request.id).await,
            Request::StopServer => self.handle_stop_server(request.id).await,
            Request::Notify(params) => self.handle_notify(params, request.id).await,
            Request::SendData(params) => self.handle_send_data(params, request.id).await,
            Request::RestartAdvertising => self.handle_restart_advertising(request.id).await,
            Request::GetStatus => self.handle_get_status(request.id).await,
        }
    }

    async fn handle_start_server(&self, params: StartServerParams, id: RequestId) -> JsonRpcResponse {
        let result = self
            .server
            .start(&params.service_uuid, &params.characteristic_uuid)
            .await;
        Self::acknowledge(result, id)
    }

    async fn handle_stop_server(&self, id: RequestId) -> JsonRpcResponse {
        self.server.stop().await;
        JsonRpcResponse::success(Response::Ok(OkResponse::ok()), id)
    }

    async fn handle_notify(&self, params: DataParams, id: RequestId) -> JsonRpcResponse {
        let payload = match params.decode() {
            Ok(payload) => payload,
            Err(e) => return JsonRpcResponse::error(JsonRpcError::invalid_params(e), id),
        };

        Self::sent(self.server.notify(&payload).await, id)
    }

    async fn handle_send_data(&self, params: DataParams, id: RequestId) -> JsonRpcResponse {
        let data = match params.decode() {
            Ok(data) => data,
            Err(e) => return JsonRpcResponse::error(JsonRpcError::invalid_params(e), id),
        };

        Self::sent(self.server.send_data(&data).await, id)
    }

    async fn handle_restart_advertising(&self, id: RequestId) -> JsonRpcResponse {
        Self::acknowledge(self.server.restart_advertising().await, id)
    }

    async fn handle_get_status(&self, id: RequestId) -> JsonRpcResponse {
        let status = self.server.status().await;
        JsonRpcResponse::success(Response::Status(StatusResponse::ok(status)), id)
    }

    fn acknowledge(result: Result<(), ServerError>, id: RequestId) -> JsonRpcResponse {
        match result {
            Ok(()) => JsonRpcResponse::success(Response::Ok(OkResponse::ok()), id),
            Err(e) => JsonRpcResponse::error(JsonRpcError::from(&e), id),
        }
    }

    fn sent(result: Result<usize, ServerError>, id: RequestId) -> JsonRpcResponse {
        match result {
            Ok(bytes) => JsonRpcResponse::success(Response::Sent(SentResponse::ok(bytes)), id),
            Err(e) => JsonRpcResponse::error(JsonRpcError::from(&e), id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::MockStack, core::types::DeviceAddress};
    use pretty_assertions::assert_eq;

    fn create_handler() -> (Arc<MockStack>, Arc<PeripheralServer<MockStack>>, RequestHandler<MockStack>) {
        let stack = Arc::new(MockStack::new());
        let server = Arc::new(PeripheralServer::new(stack.clone()));
        let handler = RequestHandler::new(server.clone());
        (stack, server, handler)
    }

    async fn call(handler: &RequestHandler<MockStack>, request: Request) -> JsonRpcResponse {
        handler
            .handle_request(JsonRpcRequest::new(request, RequestId::Number(1)))
            .await
    }

    #[tokio::test]
    async fn test_handle_start_and_stop() {
        let (stack, server, handler) = create_handler();

        let response = call(&handler, Request::StartServer(StartServerParams::default())).await;
        assert_eq!(response.result, Some(Response::Ok(OkResponse::ok())));
        assert!(response.error.is_none());
        assert!(server.is_running().await);
        assert!(stack.is_advertising());

        let response = call(&handler, Request::StopServer).await;
        assert!(response.error.is_none());
        assert!(!server.is_running().await);
    }

    #[tokio::test]
    async fn test_handle_start_invalid_uuid() {
        let (_stack, _server, handler) = create_handler();

        let request = Request::StartServer(StartServerParams {
            service_uuid: "INVALID-UUID".to_string(),
            characteristic_uuid: "00002a37-0000-1000-8000-00805f9b34fb".to_string(),
        });
        let response = call(&handler, request).await;

        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, JsonRpcError::REGISTRATION_ERROR);
        assert_eq!(error.status(), Some(-2));
    }

    #[tokio::test]
    async fn test_handle_start_twice() {
        let (_stack, _server, handler) = create_handler();

        call(&handler, Request::StartServer(StartServerParams::default())).await;
        let response = call(&handler, Request::StartServer(StartServerParams::default())).await;

        let error = response.error.unwrap();
        assert_eq!(error.code, JsonRpcError::ALREADY_RUNNING);
        assert_eq!(error.status(), Some(-4));
    }

    #[tokio::test]
    async fn test_handle_notify_not_connected() {
        let (_stack, _server, handler) = create_handler();

        let response = call(&handler, Request::Notify(DataParams::new(&[0x06, 0x50]))).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, JsonRpcError::NOT_CONNECTED);
        assert_eq!(error.status(), Some(-5));
    }

    #[tokio::test]
    async fn test_handle_notify_invalid_hex() {
        let (stack, _server, handler) = create_handler();

        let request = Request::Notify(DataParams {
            data: "not hex".to_string(),
        });
        let response = call(&handler, request).await;

        let error = response.error.unwrap();
        assert_eq!(error.code, JsonRpcError::INVALID_PARAMS);
        assert!(stack.calls().is_empty());
    }

    #[tokio::test]
    async fn test_handle_notify_and_send_data() {
        let (stack, server, handler) = create_handler();
        call(&handler, Request::StartServer(StartServerParams::default())).await;

        stack
            .simulate_connect(DeviceAddress([1, 2, 3, 4, 5, 6]), 23)
            .unwrap();
        let mut rx = server.subscribe();
        rx.wait_for(|s| *s == crate::core::types::ConnectionState::Connected)
            .await
            .unwrap();

        let response = call(&handler, Request::Notify(DataParams::new(&[0x06, 0x50]))).await;
        assert_eq!(response.result, Some(Response::Sent(SentResponse::ok(2))));

        let response = call(&handler, Request::SendData(DataParams::new(&[0xee; 30]))).await;
        assert_eq!(response.result, Some(Response::Sent(SentResponse::ok(30))));
        assert_eq!(stack.notifications().len(), 3);

        let response = call(&handler, Request::Notify(DataParams::new(&[0xff; 21]))).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, JsonRpcError::PAYLOAD_TOO_LARGE);
        assert_eq!(error.status(), Some(-6));
    }

    #[tokio::test]
    async fn test_handle_get_status() {
        let (_stack, _server, handler) = create_handler();

        let response = call(&handler, Request::GetStatus).await;
        let Some(Response::Status(status)) = response.result else {
            panic!("expected status response");
        };
        assert!(!status.server.running);

        call(&handler, Request::StartServer(StartServerParams::default())).await;
        let response = call(&handler, Request::GetStatus).await;
        let Some(Response::Status(status)) = response.result else {
            panic!("expected status response");
        };
        assert!(status.server.running);
        assert_eq!(
            status.server.connection.state,
            crate::core::types::ConnectionState::Advertising
        );
    }

    #[tokio::test]
    async fn test_handle_restart_advertising_when_stopped() {
        let (_stack, _server, handler) = create_handler();

        let response = call(&handler, Request::RestartAdvertising).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, JsonRpcError::ADVERTISING_FAILURE);
    }
}
