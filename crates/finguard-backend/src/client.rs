//! Typed client over an [`ApiTransport`]

use finguard_api::TokenPair;
use finguard_util::SessionError;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::{
    Anomaly, ApiRequest, ApiResponse, ApiTransport, Bill, BudgetCategory, GoalAchievement,
    MonthlySummary, TransportError,
};

pub const REFRESH_PATH: &str = "/api/auth/refresh-token";
pub const BUDGET_SUMMARY_PATH: &str = "/api/budgets/summary";
pub const UPCOMING_BILLS_PATH: &str = "/api/bills/upcoming";
pub const GOAL_ACHIEVEMENTS_PATH: &str = "/api/goals/achievements";
pub const ANOMALIES_PATH: &str = "/api/anomalies";
pub const SUMMARY_PATH: &str = "/api/summary";

/// Errors from typed backend calls
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected response shape: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Timeouts, network failures, 5xx, 408, 429 and unreadable success bodies
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Transport(_) | BackendError::Malformed(_) => true,
            BackendError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
        }
    }

    fn from_response(response: &ApiResponse) -> Self {
        BackendError::Status {
            status: response.status,
            message: response
                .error_message()
                .unwrap_or_else(|| "no details".to_string()),
        }
    }
}

impl From<BackendError> for SessionError {
    fn from(e: BackendError) -> Self {
        if e.is_retryable() {
            SessionError::transient(e.to_string())
        } else {
            SessionError::fatal_auth(e.to_string())
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Finance backend endpoints used by the session components
#[derive(Clone)]
pub struct FinanceApi {
    transport: Arc<dyn ApiTransport>,
}

impl FinanceApi {
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        Self { transport }
    }

    /// Exchange a refresh token for a new pair. A reply without a new
    /// refresh token keeps the old one.
    pub async fn renew(&self, refresh_token: &str) -> BackendResult<TokenPair> {
        let request = ApiRequest::post(REFRESH_PATH, json!({ "refreshToken": refresh_token }));
        let response = self.transport.call(request).await?;

        if !response.is_success() {
            return Err(BackendError::from_response(&response));
        }

        let body = response
            .body
            .ok_or_else(|| BackendError::Malformed("empty renewal response".into()))?;
        let access_token = body
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BackendError::Malformed("renewal response has no token".into()))?;
        let rotated = body
            .get("refreshToken")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or(refresh_token);

        Ok(TokenPair::new(access_token, Some(rotated.to_string())))
    }

    pub async fn budget_summary(
        &self,
        token: &str,
        month: u32,
        year: i32,
    ) -> BackendResult<Vec<BudgetCategory>> {
        let request = ApiRequest::get(BUDGET_SUMMARY_PATH)
            .with_query("month", month)
            .with_query("year", year)
            .with_bearer(token);
        self.get_list(request).await
    }

    pub async fn upcoming_bills(&self, token: &str) -> BackendResult<Vec<Bill>> {
        self.get_list(ApiRequest::get(UPCOMING_BILLS_PATH).with_bearer(token))
            .await
    }

    pub async fn goal_achievements(&self, token: &str) -> BackendResult<Vec<GoalAchievement>> {
        self.get_list(ApiRequest::get(GOAL_ACHIEVEMENTS_PATH).with_bearer(token))
            .await
    }

    pub async fn anomalies(&self, token: &str) -> BackendResult<Vec<Anomaly>> {
        self.get_list(ApiRequest::get(ANOMALIES_PATH).with_bearer(token))
            .await
    }

    pub async fn monthly_summary(
        &self,
        token: &str,
        month: u32,
        year: i32,
    ) -> BackendResult<MonthlySummary> {
        let request = ApiRequest::get(SUMMARY_PATH)
            .with_query("month", month)
            .with_query("year", year)
            .with_bearer(token);

        match self.get_value(request).await? {
            Some(value) => {
                serde_json::from_value(value).map_err(|e| BackendError::Malformed(e.to_string()))
            }
            None => Ok(MonthlySummary::default()),
        }
    }

    /// Body of a read-only endpoint. 404 and empty bodies are absence, not errors.
    async fn get_value(&self, request: ApiRequest) -> BackendResult<Option<Value>> {
        let path = request.path.clone();
        let response = self.transport.call(request).await?;

        if response.status == 404 {
            debug!(path = %path, "Endpoint absent, treating as empty");
            return Ok(None);
        }
        if !response.is_success() {
            return Err(BackendError::from_response(&response));
        }

        Ok(response.body.filter(|v| !v.is_null()))
    }

    async fn get_list<T: DeserializeOwned>(&self, request: ApiRequest) -> BackendResult<Vec<T>> {
        match self.get_value(request).await? {
            Some(value) => {
                serde_json::from_value(value).map_err(|e| BackendError::Malformed(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, MockTransport};

    fn api() -> (Arc<MockTransport>, FinanceApi) {
        let mock = Arc::new(MockTransport::new());
        let api = FinanceApi::new(mock.clone());
        (mock, api)
    }

    #[tokio::test]
    async fn renew_sends_refresh_token() {
        let (mock, api) = api();
        mock.push_ok(
            REFRESH_PATH,
            json!({"token": "new.access.token", "refreshToken": "refresh-2"}),
        );

        let pair = api.renew("refresh-1").await.unwrap();
        assert_eq!(pair.access_token, "new.access.token");
        assert_eq!(pair.refresh_token.as_deref(), Some("refresh-2"));

        let calls = mock.calls();
        assert_eq!(calls[0].method, Method::Post);
        assert_eq!(calls[0].body, Some(json!({"refreshToken": "refresh-1"})));
    }

    #[tokio::test]
    async fn renew_keeps_refresh_token_when_not_rotated() {
        let (mock, api) = api();
        mock.push_ok(REFRESH_PATH, json!({"token": "new.access.token"}));

        let pair = api.renew("refresh-1").await.unwrap();
        assert_eq!(pair.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn renew_error_classification() {
        let (mock, api) = api();
        mock.push_status(REFRESH_PATH, 503);
        mock.push_status(REFRESH_PATH, 429);
        mock.push(
            REFRESH_PATH,
            Ok(ApiResponse::with_body(401, json!({"message": "Invalid refresh token"}))),
        );
        mock.push_ok(REFRESH_PATH, json!({"refreshToken": "only"}));

        assert!(api.renew("r").await.unwrap_err().is_retryable());
        assert!(api.renew("r").await.unwrap_err().is_retryable());

        let rejected = api.renew("r").await.unwrap_err();
        assert!(!rejected.is_retryable());
        assert_eq!(
            rejected,
            BackendError::Status {
                status: 401,
                message: "Invalid refresh token".into()
            }
        );
        assert!(SessionError::from(rejected).ends_session());

        let malformed = api.renew("r").await.unwrap_err();
        assert!(matches!(malformed, BackendError::Malformed(_)));
        assert!(malformed.is_retryable());
    }

    #[tokio::test]
    async fn absent_endpoints_are_empty() {
        let (mock, api) = api();
        mock.push(UPCOMING_BILLS_PATH, Ok(ApiResponse::status(200)));

        assert!(api.upcoming_bills("t").await.unwrap().is_empty());
        // Unrouted: 404
        assert!(api.anomalies("t").await.unwrap().is_empty());
        assert_eq!(
            api.monthly_summary("t", 3, 2025).await.unwrap(),
            MonthlySummary::default()
        );
    }

    #[tokio::test]
    async fn list_endpoints_carry_bearer_and_query() {
        let (mock, api) = api();
        mock.push_ok(
            BUDGET_SUMMARY_PATH,
            json!([{"category": "Food", "spent": 1500, "budget_limit": 2000}]),
        );

        let rows = api.budget_summary("a.b.c", 3, 2025).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category, "Food");

        let call = &mock.calls()[0];
        assert_eq!(call.bearer.as_deref(), Some("a.b.c"));
        assert!(call.query.contains(&("month".to_string(), "3".to_string())));
    }

    #[tokio::test]
    async fn server_errors_surface() {
        let (mock, api) = api();
        mock.push_status(GOAL_ACHIEVEMENTS_PATH, 500);
        mock.push_ok(GOAL_ACHIEVEMENTS_PATH, json!({"unexpected": true}));

        assert!(matches!(
            api.goal_achievements("t").await,
            Err(BackendError::Status { status: 500, .. })
        ));
        assert!(matches!(
            api.goal_achievements("t").await,
            Err(BackendError::Malformed(_))
        ));
    }
}
