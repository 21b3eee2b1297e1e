//! HTTP control plane

use std::future::Future;

use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use super::control::{ControlApi, ControlReply};
use crate::core::{SupervisorError, WorkloadInfo};

/// Form body of `POST /process/control`
#[derive(Debug, Default, Deserialize)]
pub struct ControlParams {
    #[serde(rename = "fn")]
    pub function: Option<String>,
    pub id: Option<String>,
}

/// JSON body of an error reply
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Error reply with its status code
#[derive(Debug)]
pub struct HttpError(SupervisorError);

impl From<SupervisorError> for HttpError {
    fn from(err: SupervisorError) -> Self {
        Self(err)
    }
}

impl HttpError {
    pub fn status_code(&self) -> StatusCode {
        match self.0 {
            SupervisorError::Validation(_) => StatusCode::BAD_REQUEST,
            SupervisorError::NotFound(_) => StatusCode::NOT_FOUND,
            SupervisorError::NotRunning(_) => StatusCode::CONFLICT,
            SupervisorError::Spawn { .. }
            | SupervisorError::Kill { .. }
            | SupervisorError::LockPoisoned(_)
            | SupervisorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Control request failed: {}", self.0);
        } else {
            warn!("Control request rejected: {}", self.0);
        }

        let body = ErrorBody {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Run a blocking supervisor call off the async workers
async fn blocking<T, F>(f: F) -> Result<T, HttpError>
where
    F: FnOnce() -> Result<T, SupervisorError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SupervisorError::Internal(format!("control task failed: {}", e)))?
        .map_err(HttpError::from)
}

async fn health() -> &'static str {
    "OK"
}

async fn list(State(api): State<ControlApi>) -> Result<Json<Vec<WorkloadInfo>>, HttpError> {
    let workloads = blocking(move || api.list()).await?;
    Ok(Json(workloads))
}

async fn control(
    State(api): State<ControlApi>,
    params: Result<Form<ControlParams>, FormRejection>,
) -> Result<Json<ControlReply>, HttpError> {
    let Form(params) = params
        .map_err(|e| SupervisorError::Validation(format!("malformed control request: {}", e)))?;

    let (Some(function), Some(id)) = (params.function, params.id) else {
        return Err(SupervisorError::Validation("missing fn or id parameter".to_string()).into());
    };

    let reply = blocking(move || api.control(&function, &id)).await?;
    Ok(Json(reply))
}

/// Build the control-plane router
pub fn router(api: ControlApi) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/process/list", get(list))
        .route("/process/control", post(control))
        .with_state(api)
}

/// Serve the control plane on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, api: ControlApi, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Control plane listening on http://{}", addr);
    }
    axum::serve(listener, router(api))
        .with_graceful_shutdown(shutdown)
        .await
}
