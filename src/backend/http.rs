//! `reqwest` implementation of [`WorkflowBackend`] for the clinic REST API.
//!
//! Responses use the API's `{ success, data, message }` envelope. A
//! non-2xx status or `success: false` becomes `AppError::Network`;
//! `401`/`403` become `AppError::AuthRequired`.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BackendFuture, WorkflowBackend};
use crate::models::checkup::{
    CheckupId, CheckupPatch, CheckupSession, CheckupSource, CheckupStatus, PatientSnapshot,
    Priority, SessionData,
};
use crate::models::queue::QueueEntry;
use crate::session::Credential;
use crate::{AppError, Result};

/// Standard response envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default = "default_success")]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Body of `POST /checkups`.
#[derive(Debug, Serialize)]
struct CreateCheckupRequest<'a> {
    patient_id: &'a str,
    patient: &'a PatientSnapshot,
    service_type: &'a str,
    priority: Priority,
    status: CheckupStatus,
    source: CheckupSource,
}

/// Body of `PUT /checkups/{id}/status`.
#[derive(Debug, Serialize)]
struct StatusUpdateRequest<'a> {
    status: CheckupStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_data: Option<&'a SessionData>,
}

/// Body of `PATCH /queue/{id}/status`.
#[derive(Debug, Serialize)]
struct QueueStatusRequest<'a> {
    status: CheckupStatus,
    #[serde(flatten)]
    patch: &'a CheckupPatch,
}

/// HTTP client bound to one API base URL.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Build a client for `base_url` (trailing slashes are ignored).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Network` if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<B, T>(
        &self,
        method: Method,
        path: &str,
        credential: &Credential,
        body: Option<&B>,
    ) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&credential.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| AppError::Network(format!("{method} {path} failed: {err}")))?;

        let status = response.status();
        debug!(%method, path, %status, "backend responded");

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(AppError::AuthRequired(format!(
                "{method} {path} rejected the credential ({status})"
            )));
        }
        if !status.is_success() {
            return Err(AppError::Network(format!("{method} {path} returned {status}")));
        }

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|err| AppError::Network(format!("{method} {path} sent malformed body: {err}")))?;

        if !envelope.success {
            let message = envelope.message.unwrap_or_else(|| "request failed".into());
            return Err(AppError::Network(format!("{method} {path}: {message}")));
        }

        Ok(envelope.data)
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str, credential: &Credential) -> Result<T> {
        self.call::<(), T>(Method::GET, path, credential, None)
            .await?
            .ok_or_else(|| AppError::Network(format!("GET {path} returned no data")))
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        credential: &Credential,
        body: &B,
    ) -> Result<()> {
        self.call::<B, serde_json::Value>(method, path, credential, Some(body))
            .await
            .map(|_| ())
    }
}

impl WorkflowBackend for HttpBackend {
    fn fetch_queue<'a>(&'a self, credential: &'a Credential) -> BackendFuture<'a, Vec<QueueEntry>> {
        Box::pin(self.fetch::<Vec<QueueEntry>>("/checkups/queue", credential))
    }

    fn fetch_todays_checkups<'a>(
        &'a self,
        credential: &'a Credential,
    ) -> BackendFuture<'a, Vec<CheckupSession>> {
        Box::pin(self.fetch::<Vec<CheckupSession>>("/checkups/today", credential))
    }

    fn create_checkup<'a>(
        &'a self,
        credential: &'a Credential,
        session: &'a CheckupSession,
    ) -> BackendFuture<'a, CheckupSession> {
        Box::pin(async move {
            let body = CreateCheckupRequest {
                patient_id: &session.patient_id,
                patient: &session.patient,
                service_type: &session.service_type,
                priority: session.priority,
                status: session.status,
                source: session.source,
            };
            self.call::<_, CheckupSession>(Method::POST, "/checkups", credential, Some(&body))
                .await?
                .ok_or_else(|| AppError::Network("POST /checkups returned no record".into()))
        })
    }

    fn update_checkup_status<'a>(
        &'a self,
        credential: &'a Credential,
        id: &'a CheckupId,
        status: CheckupStatus,
        session_data: Option<&'a SessionData>,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let body = StatusUpdateRequest {
                status,
                session_data,
            };
            self.send(Method::PUT, &format!("/checkups/{id}/status"), credential, &body)
                .await
        })
    }

    fn update_checkup_notes<'a>(
        &'a self,
        credential: &'a Credential,
        id: &'a CheckupId,
        patch: &'a CheckupPatch,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.send(Method::PUT, &format!("/checkups/{id}/notes"), credential, patch)
                .await
        })
    }

    fn fetch_checkup_history<'a>(
        &'a self,
        credential: &'a Credential,
        patient_id: &'a str,
    ) -> BackendFuture<'a, Vec<CheckupSession>> {
        Box::pin(async move {
            self.fetch::<Vec<CheckupSession>>(&format!("/checkups/history/{patient_id}"), credential)
                .await
        })
    }

    fn notify_doctor<'a>(
        &'a self,
        credential: &'a Credential,
        entry: &'a QueueEntry,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.send(
                Method::POST,
                &format!("/checkups/{}/notify-doctor", entry.id),
                credential,
                entry,
            )
            .await
        })
    }

    fn patch_queue_status<'a>(
        &'a self,
        credential: &'a Credential,
        id: &'a CheckupId,
        status: CheckupStatus,
        patch: &'a CheckupPatch,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let body = QueueStatusRequest { status, patch };
            self.send(Method::PATCH, &format!("/queue/{id}/status"), credential, &body)
                .await
        })
    }

    fn health<'a>(&'a self, credential: &'a Credential) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.call::<(), serde_json::Value>(Method::GET, "/health", credential, None)
                .await
                .map(|_| ())
        })
    }
}
