//! Server-side upgrade handshake
//!
//! The [`ServerHandshakeCoordinator`] waits for the first upgrade request. A
//! valid request is answered with `101 Switching Protocols`, the HTTP codec is
//! swapped for the frame codec and the coordinator leaves the chain, all in
//! the dispatch step that handled the request. An invalid one is answered
//! with the rejection response and the chain stays as it is.

use std::sync::Arc;
use wspipe_core::config::HandshakeConfig;
use wspipe_core::error::{Error, HandshakeError, Result, TimeoutError};
use wspipe_core::event::{HandshakeComplete, PipelineEvent};
use wspipe_core::handshake::{HandshakeRequest, HandshakeResponse};
use wspipe_core::handshaker::{Handshaker, HandshakerRegistry};
use wspipe_core::message::Message;
use wspipe_core::path::path_matches;
use wspipe_core::protocol::Role;
use wspipe_core::stage::{Stage, StageContext};
use wspipe_core::timer::TimerId;
use wspipe_core::validator::validate_request;
use wspipe_core::{log_debug, log_error, log_info, log_warn};

/// Progress of the server handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerHandshakeState {
    /// No upgrade request seen yet
    #[default]
    AwaitingRequest,
    /// A request is being validated
    Completing,
    /// The upgrade succeeded
    Complete,
    /// The upgrade was rejected or timed out
    Failed,
}

/// Stage answering the upgrade request
#[derive(Debug)]
pub struct ServerHandshakeCoordinator {
    config: Arc<HandshakeConfig>,
    registry: HandshakerRegistry,
    forward_unmatched: bool,
    state: ServerHandshakeState,
    timeout: Option<TimerId>,
}

impl ServerHandshakeCoordinator {
    /// Coordinator registering completed handshakes in `registry`
    pub fn new(config: Arc<HandshakeConfig>, registry: HandshakerRegistry) -> Self {
        Self {
            config,
            registry,
            forward_unmatched: false,
            state: ServerHandshakeState::AwaitingRequest,
            timeout: None,
        }
    }

    /// Pass requests for other paths downstream instead of rejecting them
    pub fn forward_unmatched_requests(mut self, forward: bool) -> Self {
        self.forward_unmatched = forward;
        self
    }

    /// Current state
    pub fn state(&self) -> ServerHandshakeState {
        self.state
    }

    fn cancel_timeout(&mut self, ctx: &mut StageContext<'_>) {
        if let Some(timer) = self.timeout.take() {
            ctx.cancel(timer);
        }
    }

    fn handle_request(&mut self, ctx: &mut StageContext<'_>, request: HandshakeRequest) -> Result<()> {
        self.state = ServerHandshakeState::Completing;

        let accepted = match validate_request(&request, &self.config) {
            Ok(accepted) => accepted,
            Err(error) => {
                self.reject(ctx, error);
                return Ok(());
            }
        };

        let handshaker = Handshaker::new(
            ctx.connection_id(),
            Role::Server,
            accepted.version,
            request.uri.clone(),
            self.config.clone(),
        )
        .with_subprotocol(accepted.subprotocol.clone())
        .with_headers(request.headers.clone(), accepted.response.headers.clone());

        let batch = handshaker.upgrade_batch();
        // a chain without the HTTP codec stages cannot take the frame codec
        if let Err(error) = ctx.check_mutation(&batch) {
            log_error!(
                "{} cannot install the frame codec, closing: {}",
                ctx.connection_id(),
                error
            );
            self.cancel_timeout(ctx);
            self.state = ServerHandshakeState::Failed;
            ctx.close();
            record_outcome("misconfigured");
            return Err(error);
        }

        let complete = HandshakeComplete {
            version: accepted.version,
            request_uri: request.uri,
            request_headers: request.headers,
            response_headers: accepted.response.headers.clone(),
            subprotocol: accepted.subprotocol,
        };

        log_info!(
            "{} upgraded {} to {:?}",
            ctx.connection_id(),
            complete.request_uri,
            complete.version
        );
        ctx.write(accepted.response);
        ctx.mutate(batch);
        self.registry.register(Arc::new(handshaker));
        ctx.fire_event(PipelineEvent::HandshakeComplete(complete));
        self.cancel_timeout(ctx);
        self.state = ServerHandshakeState::Complete;
        record_outcome("accepted");
        Ok(())
    }

    fn reject(&mut self, ctx: &mut StageContext<'_>, error: HandshakeError) {
        log_debug!("{} rejected upgrade: {}", ctx.connection_id(), error);
        ctx.write(HandshakeResponse::rejection(&error));
        ctx.fire_event(PipelineEvent::HandshakeFailed(error));
        self.cancel_timeout(ctx);
        self.state = ServerHandshakeState::Failed;
        record_outcome("rejected");
    }
}

impl Stage for ServerHandshakeCoordinator {
    fn handler_added(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if let Some(timeout) = self.config.handshake_timeout {
            self.timeout = Some(ctx.schedule(timeout));
        }
        Ok(())
    }

    fn read(&mut self, ctx: &mut StageContext<'_>, msg: Message) -> Result<()> {
        match msg {
            Message::Request(request) if self.state == ServerHandshakeState::AwaitingRequest => {
                let matched = path_matches(
                    &request.uri,
                    &self.config.websocket_path,
                    self.config.path_match,
                );
                if !matched && self.forward_unmatched {
                    ctx.fire_read(request);
                    Ok(())
                } else {
                    self.handle_request(ctx, request)
                }
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
        if self.state != ServerHandshakeState::AwaitingRequest {
            return Ok(());
        }

        let timeout = self.config.handshake_timeout.unwrap_or_default();
        log_warn!("{} handshake timed out after {:?}", ctx.connection_id(), timeout);
        self.state = ServerHandshakeState::Failed;
        ctx.fire_event(PipelineEvent::HandshakeTimeout);
        ctx.close();
        record_outcome("timeout");
        Err(Error::Timeout(TimeoutError::Handshake { timeout }))
    }

    fn channel_inactive(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.cancel_timeout(ctx);
        if self.state == ServerHandshakeState::AwaitingRequest {
            self.state = ServerHandshakeState::Failed;
        }
        ctx.fire_inactive();
        Ok(())
    }
}

#[cfg(feature = "metrics")]
fn record_outcome(outcome: &'static str) {
    metrics::counter!("wspipe_handshakes_total", "role" => "server", "outcome" => outcome)
        .increment(1);
}

#[cfg(not(feature = "metrics"))]
fn record_outcome(_outcome: &'static str) {}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{self, HeaderValue};
    use http::{Method, StatusCode};
    use wspipe_core::error::PipelineError;
    use wspipe_core::pipeline::Pipeline;
    use wspipe_core::protocol::stage_names::{HTTP_DECODER, HTTP_ENCODER, SERVER_HANDSHAKER};

    struct Pass;

    impl Stage for Pass {}

    fn upgrade_request(uri: &str) -> HandshakeRequest {
        HandshakeRequest::new(Method::GET, uri)
            .header(header::HOST, HeaderValue::from_static("localhost"))
            .header(header::UPGRADE, HeaderValue::from_static("websocket"))
            .header(header::CONNECTION, HeaderValue::from_static("Upgrade"))
            .header(
                header::SEC_WEBSOCKET_KEY,
                HeaderValue::from_static("dGhlIHNhbXBsZSBub25jZQ=="),
            )
            .header(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"))
    }

    fn pipeline(config: HandshakeConfig, forward: bool) -> (Pipeline, HandshakerRegistry) {
        let registry = HandshakerRegistry::new();
        let coordinator = ServerHandshakeCoordinator::new(
            Arc::new(config.handshake_timeout(None)),
            registry.clone(),
        )
        .forward_unmatched_requests(forward);
        let mut pipeline = Pipeline::new();
        pipeline.add_last(HTTP_ENCODER, Pass).unwrap();
        pipeline.add_last(HTTP_DECODER, Pass).unwrap();
        pipeline.add_last(SERVER_HANDSHAKER, coordinator).unwrap();
        (pipeline, registry)
    }

    #[test]
    fn test_rejection_keeps_chain() {
        let (mut pipeline, registry) = pipeline(HandshakeConfig::default(), false);
        let request = HandshakeRequest::new(Method::GET, "/")
            .header(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        pipeline.fire_read(request).unwrap();

        let response = pipeline.read_outbound().unwrap().into_response().unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.body_text(),
            "not a WebSocket handshake request: missing upgrade"
        );
        assert!(matches!(
            pipeline.read_event(),
            Some(PipelineEvent::HandshakeFailed(HandshakeError::MissingUpgrade))
        ));
        assert!(pipeline.contains(SERVER_HANDSHAKER));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_requests_after_failure_are_forwarded() {
        let (mut pipeline, _) = pipeline(HandshakeConfig::default(), false);
        pipeline.fire_read(HandshakeRequest::new(Method::POST, "/")).unwrap();
        assert!(pipeline.read_outbound().is_some());

        pipeline.fire_read(HandshakeRequest::new(Method::GET, "/status")).unwrap();
        assert!(pipeline.read_outbound().is_none());
        assert!(pipeline.read_inbound().and_then(Message::into_request).is_some());
    }

    #[test]
    fn test_unmatched_request_forwarded_when_enabled() {
        let config = HandshakeConfig::default().websocket_path("/ws");
        let (mut pipeline, _) = pipeline(config, true);
        pipeline.fire_read(upgrade_request("/other")).unwrap();
        assert!(pipeline.read_outbound().is_none());
        assert!(pipeline.read_inbound().is_some());

        pipeline.fire_read(upgrade_request("/ws")).unwrap();
        let response = pipeline.read_outbound().unwrap().into_response().unwrap();
        assert_eq!(response.status, StatusCode::SWITCHING_PROTOCOLS);
        assert!(!pipeline.contains(SERVER_HANDSHAKER));
    }

    #[test]
    fn test_unmatched_request_rejected_by_default() {
        let config = HandshakeConfig::default().websocket_path("/ws");
        let (mut pipeline, _) = pipeline(config, false);
        pipeline.fire_read(upgrade_request("/other")).unwrap();
        let response = pipeline.read_outbound().unwrap().into_response().unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(matches!(
            pipeline.read_event(),
            Some(PipelineEvent::HandshakeFailed(HandshakeError::PathMismatch { .. }))
        ));
    }

    #[test]
    fn test_missing_http_codec_fails_without_completing() {
        let registry = HandshakerRegistry::new();
        let coordinator = ServerHandshakeCoordinator::new(
            Arc::new(HandshakeConfig::default().handshake_timeout(None)),
            registry.clone(),
        );
        let mut pipeline = Pipeline::new();
        pipeline.add_last(HTTP_DECODER, Pass).unwrap();
        pipeline.add_last(SERVER_HANDSHAKER, coordinator).unwrap();

        let result = pipeline.fire_read(upgrade_request("/"));
        assert!(matches!(
            result,
            Err(Error::Pipeline(PipelineError::StageNotFound(name))) if name == HTTP_ENCODER
        ));
        assert!(pipeline.read_outbound().is_none());
        assert!(pipeline.read_event().is_none());
        assert!(pipeline.contains(SERVER_HANDSHAKER));
        assert!(registry.is_empty());
        assert!(pipeline.is_closed());
    }

    #[test]
    fn test_state_defaults_to_awaiting() {
        let coordinator = ServerHandshakeCoordinator::new(
            Arc::new(HandshakeConfig::default()),
            HandshakerRegistry::new(),
        );
        assert_eq!(coordinator.state(), ServerHandshakeState::AwaitingRequest);
    }
}
