// HTTP draft collaborator.
//
// Plain JSON request/response against the league server:
//   GET  {base}/leagues/{league}/races/{race}/draft/status
//   GET  {base}/leagues/{league}/races/{race}/draft/picks?since=N
//   GET  {base}/leagues/{league}/races/{race}/draft/available-drivers
//   GET  {base}/leagues/{league}/races/{race}/draft/drivers
//   GET  {base}/leagues/{league}/races/{race}/draft/order
//   POST {base}/leagues/{league}/races/{race}/draft/picks
//   POST {base}/leagues/{league}/races/{race}/draft/order

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use paddock_core::draft::order::DraftOrderEntry;
use paddock_core::draft::pick::{DraftPick, Driver};
use paddock_core::error::ServiceError;
use paddock_core::protocol::{DraftKey, DraftStatus, OrderRequest, PickRequest};
use paddock_core::service::DraftService;

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Which request a failed response belongs to. Conflict statuses mean
/// different things per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    SubmitPick(PickRequest),
    CreateOrder,
}

/// Error body returned by the server on 4xx responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Map a non-success response to a [`ServiceError`].
///
/// A machine-readable `code` in the body wins; otherwise the status code is
/// interpreted for the request kind.
pub fn map_error_response(status: u16, body: &str, kind: RequestKind) -> ServiceError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .clone()
        .unwrap_or_else(|| body.trim().to_string());

    let (team_id, driver_id) = match kind {
        RequestKind::SubmitPick(req) => (req.team_id, req.driver_id),
        _ => (0, 0),
    };

    match parsed.code.as_deref() {
        Some("slot_taken") => return ServiceError::SlotTaken,
        Some("driver_unavailable") => return ServiceError::DriverUnavailable { driver_id },
        Some("not_your_turn") => return ServiceError::NotYourTurn { team_id },
        Some("order_exists") => return ServiceError::OrderExists,
        Some("order_locked") => return ServiceError::OrderLocked,
        _ => {}
    }

    match (status, kind) {
        (404, _) => ServiceError::NotFound(message),
        (409, RequestKind::SubmitPick(_)) => ServiceError::SlotTaken,
        (409, RequestKind::CreateOrder) => ServiceError::OrderExists,
        (422, RequestKind::SubmitPick(_)) => ServiceError::DriverUnavailable { driver_id },
        (403, RequestKind::SubmitPick(_)) => ServiceError::NotYourTurn { team_id },
        (423, _) => ServiceError::OrderLocked,
        (502..=504, _) => ServiceError::Transport(format!("server unavailable ({status})")),
        _ => ServiceError::Unexpected { status, message },
    }
}

fn map_transport(err: reqwest::Error, timeout: Duration) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout {
            secs: timeout.as_secs(),
        }
    } else {
        ServiceError::Transport(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// HttpDraftService
// ---------------------------------------------------------------------------

pub struct HttpDraftService {
    http: reqwest::Client,
    base_url: String,
    key: DraftKey,
    api_token: Option<String>,
    timeout: Duration,
}

impl HttpDraftService {
    pub fn new(
        base_url: &str,
        key: DraftKey,
        api_token: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            key,
            api_token: api_token.filter(|t| !t.is_empty()),
            timeout,
        })
    }

    /// Full URL for a draft-scoped endpoint.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/leagues/{}/races/{}/draft/{}",
            self.base_url, self.key.league_id, self.key.race_id, path
        )
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        kind: RequestKind,
    ) -> Result<T, ServiceError> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| map_transport(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = map_error_response(status.as_u16(), &body, kind);
            debug!("{} request failed: {}", self.key, err);
            return Err(err);
        }

        response.json::<T>().await.map_err(|e| {
            warn!("{}: malformed response body: {}", self.key, e);
            ServiceError::Unexpected {
                status: status.as_u16(),
                message: format!("malformed response: {e}"),
            }
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        self.send(self.http.get(self.url(path)), RequestKind::Read)
            .await
    }
}

#[async_trait]
impl DraftService for HttpDraftService {
    async fn fetch_status(&self) -> Result<DraftStatus, ServiceError> {
        self.get("status").await
    }

    async fn fetch_picks(&self, since: Option<u32>) -> Result<Vec<DraftPick>, ServiceError> {
        let mut builder = self.http.get(self.url("picks"));
        if let Some(since) = since {
            builder = builder.query(&[("since", since)]);
        }
        self.send(builder, RequestKind::Read).await
    }

    async fn fetch_available_drivers(&self) -> Result<Vec<Driver>, ServiceError> {
        self.get("available-drivers").await
    }

    async fn fetch_drivers(&self) -> Result<Vec<Driver>, ServiceError> {
        self.get("drivers").await
    }

    async fn fetch_draft_order(&self) -> Result<Vec<DraftOrderEntry>, ServiceError> {
        self.get("order").await
    }

    async fn submit_pick(&self, request: PickRequest) -> Result<DraftPick, ServiceError> {
        let builder = self.http.post(self.url("picks")).json(&request);
        self.send(builder, RequestKind::SubmitPick(request)).await
    }

    async fn create_draft_order(
        &self,
        request: OrderRequest,
    ) -> Result<Vec<DraftOrderEntry>, ServiceError> {
        let builder = self.http.post(self.url("order")).json(&request);
        self.send(builder, RequestKind::CreateOrder).await
    }
}
