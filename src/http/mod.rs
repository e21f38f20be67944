//! Signalling and static page server
//!
//! - `POST /createPeerConnection` - JSON offer in, JSON answer out
//! - everything else is served from the static directory

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::peer::{NegotiationError, Negotiator};

#[derive(Clone)]
pub struct AppState {
    pub negotiator: Arc<Negotiator>,
}

#[derive(Debug)]
pub struct ApiError(NegotiationError);

impl From<NegotiationError> for ApiError {
    fn from(err: NegotiationError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "Negotiation failed");
        let status = match self.0 {
            NegotiationError::InvalidOffer(_) => StatusCode::BAD_REQUEST,
            NegotiationError::Rtc(_)
            | NegotiationError::NoLocalDescription
            | NegotiationError::PeerFailed => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

pub fn build_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/createPeerConnection", post(create_peer_connection))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn create_peer_connection(
    State(state): State<AppState>,
    Json(offer): Json<RTCSessionDescription>,
) -> Result<Json<RTCSessionDescription>, ApiError> {
    tracing::info!("Incoming peer connection offer");
    let answer = state.negotiator.negotiate(offer).await?;
    Ok(Json(answer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status() {
        let response = ApiError::from(NegotiationError::NoLocalDescription).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // Internal peer connection failures are not the client's fault
        let response = ApiError::from(NegotiationError::Rtc(webrtc::Error::ErrConnectionClosed))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = ApiError::from(NegotiationError::InvalidOffer(
            webrtc::Error::ErrSessionDescriptionNoFingerprint,
        ))
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
