//! Client-side upgrade handshake
//!
//! The [`ClientHandshakeCoordinator`] sends the upgrade request once the
//! transport is active, then checks the server's answer. A verified `101`
//! swaps the HTTP codec for the frame codec in the same dispatch step, after
//! which the coordinator is gone from the chain.

use crate::config::ClientProtocolConfig;
use http::header::{self, HeaderValue};
use http::{Method, StatusCode};
use std::sync::Arc;
use wspipe_core::accept::{compute_accept_key, generate_key};
use wspipe_core::config::HandshakeConfig;
use wspipe_core::error::{Error, HandshakeError, Result, TimeoutError};
use wspipe_core::event::{HandshakeComplete, PipelineEvent};
use wspipe_core::handshake::{
    header_contains_token, header_value, HandshakeRequest, HandshakeResponse,
};
use wspipe_core::handshaker::{Handshaker, HandshakerRegistry};
use wspipe_core::message::Message;
use wspipe_core::protocol::constants::WEBSOCKET_VERSION;
use wspipe_core::protocol::{http_value, Role, WebSocketVersion};
use wspipe_core::stage::{Stage, StageContext};
use wspipe_core::timer::TimerId;
use wspipe_core::{log_debug, log_error, log_info, log_warn};

/// Progress of the client handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientHandshakeState {
    /// Waiting for the transport to become active
    #[default]
    Idle,
    /// Request sent, waiting for the server's answer
    AwaitingResponse,
    /// The response is being verified
    Completing,
    /// The upgrade succeeded
    Complete,
    /// The response did not verify, or the handshake timed out
    Failed,
}

/// Build the upgrade request for `config` offering `key`
pub fn build_request(config: &ClientProtocolConfig, key: &str) -> Result<HandshakeRequest> {
    let uri = &config.uri;
    let target = if config.absolute_upgrade_url {
        uri.to_string()
    } else {
        uri.path_and_query()
            .map(|path| path.as_str())
            .filter(|path| !path.is_empty())
            .unwrap_or("/")
            .to_string()
    };

    let host = uri.host().unwrap_or_default();
    let default_port = if config.is_secure() { 443 } else { 80 };
    let authority = match uri.port_u16() {
        Some(port) if port != default_port => format!("{}:{}", host, port),
        _ => host.to_string(),
    };

    let mut request = HandshakeRequest::new(Method::GET, target);
    for (name, value) in &config.custom_headers {
        request.headers.append(name.clone(), value.clone());
    }

    request.headers.insert(
        header::UPGRADE,
        HeaderValue::from_static(http_value::WEBSOCKET),
    );
    request.headers.insert(
        header::CONNECTION,
        HeaderValue::from_static(http_value::UPGRADE),
    );
    request.headers.insert(
        header::SEC_WEBSOCKET_KEY,
        header_value(&header::SEC_WEBSOCKET_KEY, key)?,
    );
    request.headers.insert(header::HOST, header_value(&header::HOST, &authority)?);

    if config.generate_origin_header && !request.headers.contains_key(header::ORIGIN) {
        let scheme = if config.is_secure() { "https" } else { "http" };
        let origin = format!("{}://{}", scheme, authority);
        request.headers.insert(header::ORIGIN, header_value(&header::ORIGIN, &origin)?);
    }

    if !config.handshake.subprotocols.is_empty() {
        let offered = config.handshake.subprotocols.join(", ");
        request.headers.insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            header_value(&header::SEC_WEBSOCKET_PROTOCOL, &offered)?,
        );
    }

    request.headers.insert(
        header::SEC_WEBSOCKET_VERSION,
        HeaderValue::from_static(WEBSOCKET_VERSION),
    );
    Ok(request)
}

/// Check the server's answer to an upgrade request carrying `key`.
///
/// Returns the subprotocol the server selected.
pub fn verify_response(
    response: &HandshakeResponse,
    key: &str,
    offered: &[String],
) -> std::result::Result<Option<String>, HandshakeError> {
    if response.status != StatusCode::SWITCHING_PROTOCOLS {
        return Err(HandshakeError::UnexpectedStatus(response.status.as_u16()));
    }

    let upgrade = response.header_str(header::UPGRADE).unwrap_or_default();
    if !upgrade.trim().eq_ignore_ascii_case(http_value::WEBSOCKET) {
        return Err(HandshakeError::InvalidUpgrade(upgrade.to_string()));
    }

    if !header_contains_token(&response.headers, header::CONNECTION, http_value::UPGRADE) {
        let connection = response.header_str(header::CONNECTION).unwrap_or_default();
        return Err(HandshakeError::InvalidConnection(connection.to_string()));
    }

    let expected = compute_accept_key(key);
    let received = response
        .header_str(header::SEC_WEBSOCKET_ACCEPT)
        .unwrap_or_default()
        .trim();
    if received != expected {
        return Err(HandshakeError::InvalidAcceptKey {
            expected,
            received: received.to_string(),
        });
    }

    let selected = response
        .header_str(header::SEC_WEBSOCKET_PROTOCOL)
        .map(str::trim)
        .filter(|protocol| !protocol.is_empty());
    match selected {
        None => Ok(None),
        Some(protocol) if offered.iter().any(|p| p == protocol || p == http_value::SUBPROTOCOL_WILDCARD) => {
            Ok(Some(protocol.to_string()))
        }
        Some(protocol) => Err(HandshakeError::UnexpectedSubprotocol {
            actual: protocol.to_string(),
            offered: offered.join(", "),
        }),
    }
}

/// Stage issuing the upgrade request and verifying the response
#[derive(Debug)]
pub struct ClientHandshakeCoordinator {
    config: Arc<ClientProtocolConfig>,
    handshake: Arc<HandshakeConfig>,
    registry: HandshakerRegistry,
    state: ClientHandshakeState,
    key: Option<String>,
    request: Option<HandshakeRequest>,
    timeout: Option<TimerId>,
}

impl ClientHandshakeCoordinator {
    /// Coordinator registering completed handshakes in `registry`.
    /// `handshake` is shared with the rest of the connection's stages.
    pub fn new(
        config: Arc<ClientProtocolConfig>,
        handshake: Arc<HandshakeConfig>,
        registry: HandshakerRegistry,
    ) -> Self {
        Self {
            config,
            handshake,
            registry,
            state: ClientHandshakeState::Idle,
            key: None,
            request: None,
            timeout: None,
        }
    }

    /// Use `key` instead of a random one
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Current state
    pub fn state(&self) -> ClientHandshakeState {
        self.state
    }

    fn cancel_timeout(&mut self, ctx: &mut StageContext<'_>) {
        if let Some(timer) = self.timeout.take() {
            ctx.cancel(timer);
        }
    }

    fn start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.state != ClientHandshakeState::Idle {
            return Ok(());
        }
        let key = self.key.get_or_insert_with(generate_key).clone();
        let request = match build_request(&self.config, &key) {
            Ok(request) => request,
            Err(error) => {
                self.state = ClientHandshakeState::Failed;
                ctx.close();
                return Err(error);
            }
        };

        log_debug!("{} sending upgrade request to {}", ctx.connection_id(), self.config.uri);
        self.state = ClientHandshakeState::AwaitingResponse;
        self.request = Some(request.clone());
        ctx.write(request);
        if let Some(timeout) = self.handshake.handshake_timeout {
            self.timeout = Some(ctx.schedule(timeout));
        }
        Ok(())
    }

    fn handle_response(&mut self, ctx: &mut StageContext<'_>, response: HandshakeResponse) -> Result<()> {
        self.state = ClientHandshakeState::Completing;
        self.cancel_timeout(ctx);

        let key = self.key.clone().unwrap_or_default();
        let subprotocol = match verify_response(&response, &key, &self.handshake.subprotocols) {
            Ok(subprotocol) => subprotocol,
            Err(error) => {
                log_warn!("{} upgrade response rejected: {}", ctx.connection_id(), error);
                self.state = ClientHandshakeState::Failed;
                ctx.fire_event(PipelineEvent::HandshakeFailed(error.clone()));
                ctx.close();
                record_outcome("mismatch");
                return Err(Error::Handshake(error));
            }
        };

        let request = self.request.take();
        let (uri, request_headers) = request
            .map(|request| (request.uri, request.headers))
            .unwrap_or_default();
        let handshaker = Handshaker::new(
            ctx.connection_id(),
            Role::Client,
            WebSocketVersion::V13,
            uri.clone(),
            self.handshake.clone(),
        )
        .with_subprotocol(subprotocol.clone())
        .with_headers(request_headers.clone(), response.headers.clone());

        let batch = handshaker.upgrade_batch();
        if let Err(error) = ctx.check_mutation(&batch) {
            log_error!(
                "{} cannot install the frame codec, closing: {}",
                ctx.connection_id(),
                error
            );
            self.state = ClientHandshakeState::Failed;
            ctx.close();
            record_outcome("misconfigured");
            return Err(error);
        }

        log_info!("{} upgraded {}", ctx.connection_id(), self.config.uri);
        ctx.mutate(batch);
        self.registry.register(Arc::new(handshaker));
        ctx.fire_event(PipelineEvent::HandshakeComplete(HandshakeComplete {
            version: WebSocketVersion::V13,
            request_uri: uri,
            request_headers,
            response_headers: response.headers,
            subprotocol,
        }));
        self.state = ClientHandshakeState::Complete;
        record_outcome("accepted");
        Ok(())
    }
}

impl Stage for ClientHandshakeCoordinator {
    fn handler_added(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if ctx.is_active() {
            self.start(ctx)?;
        }
        Ok(())
    }

    fn channel_active(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.fire_active();
        self.start(ctx)
    }

    fn read(&mut self, ctx: &mut StageContext<'_>, msg: Message) -> Result<()> {
        match msg {
            Message::Response(response) if self.state == ClientHandshakeState::AwaitingResponse => {
                self.handle_response(ctx, response)
            }
            other => {
                ctx.fire_read(other);
                Ok(())
            }
        }
    }

    fn timer(&mut self, ctx: &mut StageContext<'_>, timer: TimerId) -> Result<()> {
        if self.timeout != Some(timer) {
            return Ok(());
        }
        self.timeout = None;
        if self.state != ClientHandshakeState::AwaitingResponse {
            return Ok(());
        }

        let timeout = self.handshake.handshake_timeout.unwrap_or_default();
        log_warn!("{} handshake timed out after {:?}", ctx.connection_id(), timeout);
        self.state = ClientHandshakeState::Failed;
        ctx.fire_event(PipelineEvent::HandshakeTimeout);
        ctx.close();
        record_outcome("timeout");
        Err(Error::Timeout(TimeoutError::Handshake { timeout }))
    }

    fn channel_inactive(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.cancel_timeout(ctx);
        if matches!(
            self.state,
            ClientHandshakeState::Idle | ClientHandshakeState::AwaitingResponse
        ) {
            self.state = ClientHandshakeState::Failed;
            ctx.fire_event(PipelineEvent::HandshakeFailed(HandshakeError::ConnectionClosed));
        }
        ctx.fire_inactive();
        Ok(())
    }
}

#[cfg(feature = "metrics")]
fn record_outcome(outcome: &'static str) {
    metrics::counter!("wspipe_handshakes_total", "role" => "client", "outcome" => outcome)
        .increment(1);
}

#[cfg(not(feature = "metrics"))]
fn record_outcome(_outcome: &'static str) {}
