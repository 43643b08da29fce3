//! Framed JSON transport shared by both ends of a connection.
//!
//! The initiator drives [`Transport::invoke`]; the responder uses
//! [`Transport::read_request`], [`Transport::send_response`] and
//! [`Transport::send_error`]. Only one request is ever outstanding, so the
//! correlation id is a constant and cannot tell a stale response from a
//! fresh one. An exchange that did not finish therefore leaves the transport
//! unusable for further invocations.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::REQUEST_ID;
use crate::error::{ProtocolError, ProtocolResult};
use crate::framing::{read_frame, write_frame};
use crate::types::{ErrorResponse, Request, Response};

/// A byte stream wrapped with the frame codec and message envelopes.
#[derive(Debug)]
pub struct Transport<S> {
    stream: S,
    io_timeout: Option<Duration>,
    in_flight: bool,
    broken: bool,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            io_timeout: None,
            in_flight: false,
            broken: false,
        }
    }

    /// Bounds each request/response round trip made by [`Transport::invoke`].
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Returns a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Returns true once an invocation failed in a way that may have left
    /// an unread response on the stream.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Serializes a message and writes it as one frame.
    pub async fn send<T: Serialize>(&mut self, message: &T) -> ProtocolResult<()> {
        let payload = serde_json::to_vec(message)?;
        write_frame(&mut self.stream, &payload).await
    }

    /// Reads one frame. `None` means the peer closed the stream cleanly.
    pub async fn recv(&mut self) -> ProtocolResult<Option<Vec<u8>>> {
        read_frame(&mut self.stream).await
    }

    /// Sends a request and waits for its response.
    ///
    /// `"flags": 0` is added to `params` unless the caller set it. A
    /// structured error from the peer is returned as
    /// [`ProtocolError::Remote`] with its code, message and data untouched.
    ///
    /// A response without a `result` key is a [`ProtocolError::PeerBug`];
    /// an explicit `"result": null` decodes into `T` like any other value.
    ///
    /// After a fatal error, or when an earlier call was dropped between
    /// sending and receiving, every further call fails with
    /// [`ProtocolError::Desynchronized`] without touching the stream.
    pub async fn invoke<T>(&mut self, method: &str, mut params: Map<String, Value>) -> ProtocolResult<T>
    where
        T: DeserializeOwned,
    {
        if self.broken || self.in_flight {
            self.broken = true;
            return Err(ProtocolError::Desynchronized);
        }

        params.entry("flags").or_insert_with(|| Value::from(0));
        let request = serde_json::to_vec(&Request::new(method, params))?;

        debug!(method, "invoking");

        self.in_flight = true;
        let limit = self.io_timeout;
        let exchange = async {
            write_frame(&mut self.stream, &request).await?;
            self.recv().await?.ok_or(ProtocolError::ConnectionClosed)
        };
        let outcome = match limit {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .unwrap_or_else(|_| Err(ProtocolError::timeout(format!("invoking {}", method)))),
            None => exchange.await,
        };

        match outcome {
            Ok(payload) => {
                self.in_flight = false;
                decode_response(method, &payload)
            }
            Err(e) if e.is_fatal() => {
                warn!(method, error = %e, "transport unusable");
                self.broken = true;
                Err(e)
            }
            Err(e) => {
                self.in_flight = false;
                Err(e)
            }
        }
    }

    /// Reads the next request.
    ///
    /// Returns `Ok(None)` on a clean close at a frame boundary. A frame that
    /// is not a valid request envelope yields
    /// [`ProtocolError::InvalidArguments`]; the stream stays aligned and the
    /// next request can still be read.
    pub async fn read_request(&mut self) -> ProtocolResult<Option<Request>> {
        let Some(payload) = self.recv().await? else {
            return Ok(None);
        };

        serde_json::from_slice(&payload)
            .map(Some)
            .map_err(|e| ProtocolError::invalid_arguments(format!("unparsable request: {}", e)))
    }

    /// Sends a success response carrying `result`.
    pub async fn send_response<T: Serialize>(&mut self, result: &T) -> ProtocolResult<()> {
        let response = Response::result(serde_json::to_value(result)?);
        self.send(&response).await
    }

    /// Sends an error response.
    pub async fn send_error(&mut self, error: &ErrorResponse) -> ProtocolResult<()> {
        self.send(&Response::error(error.clone())).await
    }

    /// Shuts down the write half of the stream.
    pub async fn shutdown(&mut self) -> ProtocolResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

fn decode_response<T: DeserializeOwned>(method: &str, payload: &[u8]) -> ProtocolResult<T> {
    let response: Response = serde_json::from_slice(payload).map_err(|e| {
        ProtocolError::peer_bug(format!("unparsable response to {}: {}", method, e))
    })?;

    if response.id != REQUEST_ID {
        warn!(
            method,
            expected = REQUEST_ID,
            received = response.id,
            "response id mismatch"
        );
    }

    if let Some(error) = response.error {
        debug!(method, code = %error.code, "remote error");
        return Err(ProtocolError::Remote(error));
    }

    match response.result {
        Some(result) => serde_json::from_value(result).map_err(|e| {
            ProtocolError::peer_bug(format!("unexpected result for {}: {}", method, e))
        }),
        None => Err(ProtocolError::peer_bug(format!(
            "response to {} carried neither error nor result",
            method
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCode;
    use serde_json::json;
    use tokio::io::{DuplexStream, duplex};

    fn pair() -> (Transport<DuplexStream>, Transport<DuplexStream>) {
        let (a, b) = duplex(4096);
        (Transport::new(a), Transport::new(b))
    }

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Answers exactly one request with the given raw JSON payload.
    fn respond_raw(mut peer: Transport<DuplexStream>, payload: &'static str) {
        tokio::spawn(async move {
            let _ = peer.read_request().await;
            write_frame(peer.get_mut(), payload.as_bytes()).await.unwrap();
        });
    }

    #[tokio::test]
    async fn invoke_adds_flags_and_decodes_result() {
        let (mut client, mut server) = pair();

        let responder = tokio::spawn(async move {
            let request = server.read_request().await.unwrap().unwrap();
            server.send_response(&json!(["desc", "1.0"])).await.unwrap();
            request
        });

        let info: (String, String) = client
            .invoke("plugin_info", params(json!({"x": 1})))
            .await
            .unwrap();
        assert_eq!(info, ("desc".to_string(), "1.0".to_string()));

        let request = responder.await.unwrap();
        assert_eq!(request.method, "plugin_info");
        assert_eq!(request.id, REQUEST_ID);
        assert_eq!(request.params_value(), json!({"x": 1, "flags": 0}));
    }

    #[tokio::test]
    async fn invoke_keeps_caller_flags() {
        let (mut client, mut server) = pair();

        let responder = tokio::spawn(async move {
            let request = server.read_request().await.unwrap().unwrap();
            server.send_response(&Value::Null).await.unwrap();
            request
        });

        client
            .invoke::<()>("job_free", params(json!({"job_id": "J1", "flags": 4})))
            .await
            .unwrap();

        let request = responder.await.unwrap();
        assert_eq!(request.params["flags"], json!(4));
    }

    #[tokio::test]
    async fn remote_error_is_returned_verbatim() {
        let (mut client, server) = pair();
        respond_raw(
            server,
            r#"{"id":100,"error":{"code":205,"message":"volume not found","data":"V7"}}"#,
        );

        let error = client
            .invoke::<Value>("volume_delete", Map::new())
            .await
            .unwrap_err();
        let remote = error.as_remote().unwrap();
        assert_eq!(remote.code, ErrorCode::NotFoundVolume);
        assert_eq!(remote.message, "volume not found");
        assert_eq!(remote.data, "V7");
    }

    #[tokio::test]
    async fn error_wins_over_result() {
        let (mut client, server) = pair();
        respond_raw(
            server,
            r#"{"id":100,"result":[1,2],"error":{"code":153,"message":"no"}}"#,
        );

        let error = client.invoke::<Value>("fs", Map::new()).await.unwrap_err();
        assert_eq!(error.code(), ErrorCode::NoSupport);
    }

    #[tokio::test]
    async fn null_result_decodes_only_into_nullable_type() {
        let (mut client, server) = pair();
        respond_raw(server, r#"{"id":100,"error":null,"result":null}"#);
        let error = client.invoke::<String>("systems", Map::new()).await.unwrap_err();
        assert!(matches!(error, ProtocolError::PeerBug { .. }));

        let (mut client, server) = pair();
        respond_raw(server, r#"{"id":100,"error":null,"result":null}"#);
        client.invoke::<()>("job_free", Map::new()).await.unwrap();
    }

    #[tokio::test]
    async fn missing_result_is_peer_bug() {
        for payload in [r#"{"id":100}"#, r#"{"id":100,"error":null}"#] {
            let (mut client, server) = pair();
            respond_raw(server, payload);
            let error = client.invoke::<()>("job_free", Map::new()).await.unwrap_err();
            assert!(matches!(error, ProtocolError::PeerBug { .. }), "accepted {}", payload);
            assert!(!client.is_broken());
        }
    }

    #[tokio::test]
    async fn unparsable_or_mismatched_response_is_peer_bug() {
        let (mut client, server) = pair();
        respond_raw(server, "not json at all");
        let error = client.invoke::<Value>("pools", Map::new()).await.unwrap_err();
        assert!(matches!(error, ProtocolError::PeerBug { .. }));
        assert_eq!(error.code(), ErrorCode::PluginBug);

        let (mut client, server) = pair();
        respond_raw(server, r#"{"id":100,"result":"not a list"}"#);
        let error = client.invoke::<Vec<Value>>("pools", Map::new()).await.unwrap_err();
        assert!(matches!(error, ProtocolError::PeerBug { .. }));
    }

    #[tokio::test]
    async fn peer_closing_is_connection_closed() {
        let (mut client, mut server) = pair();
        tokio::spawn(async move {
            let _ = server.read_request().await;
            drop(server);
        });

        let error = client.invoke::<Value>("systems", Map::new()).await.unwrap_err();
        assert!(matches!(error, ProtocolError::ConnectionClosed));
        assert!(error.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn invoke_times_out() {
        let (client, mut server) = pair();
        let mut client = client.with_timeout(Some(Duration::from_secs(5)));

        let _silent = tokio::spawn(async move {
            let _ = server.read_request().await;
            std::future::pending::<()>().await;
        });

        let error = client.invoke::<Value>("systems", Map::new()).await.unwrap_err();
        assert!(matches!(error, ProtocolError::Timeout { .. }));
        assert_eq!(error.code(), ErrorCode::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_is_never_handed_to_the_next_call() {
        let (client, mut server) = pair();
        let mut client = client.with_timeout(Some(Duration::from_secs(5)));

        let responder = tokio::spawn(async move {
            let mut seen = 0;
            let _ = server.read_request().await;
            seen += 1;
            tokio::time::sleep(Duration::from_secs(10)).await;
            let _ = server.send_response(&json!(111)).await;
            if let Ok(Some(_)) = server.read_request().await {
                seen += 1;
                let _ = server.send_response(&json!(222)).await;
            }
            seen
        });

        let error = client.invoke::<u32>("time_out_get", Map::new()).await.unwrap_err();
        assert!(matches!(error, ProtocolError::Timeout { .. }));
        assert!(client.is_broken());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let error = client.invoke::<u32>("time_out_get", Map::new()).await.unwrap_err();
        assert!(matches!(error, ProtocolError::Desynchronized));
        assert!(error.is_fatal());

        drop(client);
        assert_eq!(responder.await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_call_poisons_transport() {
        let (mut client, mut server) = pair();

        let _silent = tokio::spawn(async move {
            let _ = server.read_request().await;
            std::future::pending::<()>().await;
        });

        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            client.invoke::<Value>("systems", Map::new()),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(!client.is_broken());

        let error = client.invoke::<Value>("systems", Map::new()).await.unwrap_err();
        assert!(matches!(error, ProtocolError::Desynchronized));
        assert!(client.is_broken());
    }

    #[tokio::test]
    async fn unparsable_request_keeps_stream_aligned() {
        let (mut client, mut server) = pair();

        write_frame(client.get_mut(), b"{\"method\": 12").await.unwrap();
        client
            .send(&Request::new("systems", Map::new()))
            .await
            .unwrap();

        let error = server.read_request().await.unwrap_err();
        assert!(matches!(error, ProtocolError::InvalidArguments { .. }));
        assert!(!error.is_fatal());

        let request = server.read_request().await.unwrap().unwrap();
        assert_eq!(request.method, "systems");
    }

    #[tokio::test]
    async fn read_request_clean_eof() {
        let (client, mut server) = pair();
        drop(client);
        assert!(server.read_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn send_error_wire_shape() {
        let (mut client, mut server) = pair();
        server
            .send_error(&ErrorResponse::no_support("volume_mask"))
            .await
            .unwrap();

        let payload = client.recv().await.unwrap().unwrap();
        let value: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 100,
                "error": {"code": 153, "message": "method volume_mask not supported", "data": ""},
                "result": null
            })
        );
    }
}
