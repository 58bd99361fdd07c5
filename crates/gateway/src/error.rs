use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde_json::json,
    tracing::{error, warn},
    wagate_sessions::SessionStatus,
};

/// Every failure an HTTP handler can return. Rendered as `{"error": msg}`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("session \"{0}\" not found")]
    SessionNotFound(String),
    #[error("{0}")]
    NotFound(String),
    #[error("session \"{name}\" is not ready (status: {status})")]
    NotReady { name: String, status: SessionStatus },
    #[error("{0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("engine error: {0:#}")]
    Engine(#[from] anyhow::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotReady { .. } | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Engine(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Engine(e) => {
                warn!(error = %format!("{e:#}"), "engine call failed");
                self.to_string()
            },
            Self::Internal(detail) => {
                error!(%detail, "internal error");
                "internal server error".to_string()
            },
            _ => self.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use {super::*, axum::body::to_bytes};

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let resp = GatewayError::SessionNotFound("alice".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "session \"alice\" not found");
    }

    #[tokio::test]
    async fn not_ready_names_the_status() {
        let resp = GatewayError::NotReady {
            name: "alice".into(),
            status: SessionStatus::ScanQrCode,
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(
            json["error"],
            "session \"alice\" is not ready (status: SCAN_QR_CODE)"
        );
    }

    #[tokio::test]
    async fn engine_errors_are_bad_gateway() {
        let err = GatewayError::from(anyhow::anyhow!("bridge returned 500"));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "engine error: bridge returned 500");
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let resp = GatewayError::Internal("png encoder exploded".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"], "internal server error");
    }

    #[tokio::test]
    async fn unauthorized_is_401() {
        let resp = GatewayError::Unauthorized.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
