use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::credentials::{CredentialError, CredentialStore, Session};
use crate::models::{
    CohortPoint, CourseRateRecord, CurrentUser, PrerequisiteEntry, RiskRecord,
    StudentEnrollments, StudentSummaryRecord, TokenResponse,
};

pub const STUDENT_SUMMARY_PATH: &str = "/api/metrics/student-summary";
pub const AT_RISK_PATH: &str = "/api/risk/at-risk";
pub const COHORT_GPA_PATH: &str = "/api/metrics/cohort-gpa";
pub const PASS_RATES_PATH: &str = "/api/metrics/pass-rates";
pub const DFW_RATES_PATH: &str = "/api/metrics/dfw-rates";
pub const PREREQUISITES_PATH: &str = "/api/graph/prerequisites/full";
pub const TOKEN_PATH: &str = "/api/auth/token";
pub const CURRENT_USER_PATH: &str = "/api/auth/me";

pub const UNREADABLE_BODY: &str = "(unable to read response body)";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed: {url} ({status}) {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("response from {url} is not valid JSON: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("credential store unavailable: {0}")]
    Credentials(#[from] CredentialError),
    #[error("stored access token cannot be sent as a header: {0}")]
    InvalidToken(#[from] InvalidHeaderValue),
}

impl FetchError {
    pub fn url(&self) -> Option<&str> {
        match self {
            FetchError::Transport { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Parse { url, .. } => Some(url),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(status.as_u16()),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            FetchError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// `department` / `term` filters for the course-rate endpoints. Blank values
/// are left off the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseQuery {
    pub department: Option<String>,
    pub term: Option<String>,
}

impl CourseQuery {
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [("department", &self.department), ("term", &self.term)]
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| (key, v))
            })
            .collect()
    }
}

/// Thin JSON client over the dashboard's REST API. Never retries; every
/// failure is returned to the caller.
#[derive(Clone)]
pub struct MetricsClient {
    http: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialStore>,
}

impl MetricsClient {
    pub fn new(
        base_url: Url,
        timeout: Duration,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    #[cfg(test)]
    pub fn credentials(&self) -> &dyn CredentialStore {
        self.credentials.as_ref()
    }

    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!("{}{}", self.base_url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url.set_query(None);
        url
    }

    fn endpoint_with_query(&self, path: &str, pairs: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint(path);
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        url
    }

    /// GET `path` and decode the JSON body.
    pub async fn fetch_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        self.get(self.endpoint(path), false).await
    }

    /// Like [`fetch_json`](Self::fetch_json), with the stored bearer token attached.
    pub async fn fetch_json_auth<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        self.get(self.endpoint(path), true).await
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, authenticated: bool) -> Result<T, FetchError> {
        let mut request = self.http.get(url.clone());
        if authenticated {
            if let Some(header) = self.auth_header()? {
                request = request.header(AUTHORIZATION, header);
            }
        }
        self.send(request, &url).await
    }

    fn auth_header(&self) -> Result<Option<HeaderValue>, FetchError> {
        match self.credentials.get()? {
            Some(session) if !session.access_token.is_empty() => Ok(Some(HeaderValue::from_str(
                &format!("Bearer {}", session.access_token),
            )?)),
            _ => Ok(None),
        }
    }

    #[instrument(name = "metrics_fetch", skip(self, request, url), fields(url = %url))]
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, url: &Url) -> Result<T, FetchError> {
        let url_text = url.to_string();
        let response = request.send().await.map_err(|source| FetchError::Transport {
            url: url_text.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| UNREADABLE_BODY.to_string());
            return Err(FetchError::Status {
                url: url_text,
                status,
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|source| FetchError::Transport {
            url: url_text.clone(),
            source,
        })?;
        debug!(status = status.as_u16(), bytes = bytes.len(), "response received");
        serde_json::from_slice(&bytes).map_err(|source| FetchError::Parse {
            url: url_text,
            source,
        })
    }

    pub async fn student_summary(&self) -> Result<Vec<StudentSummaryRecord>, FetchError> {
        self.fetch_json(STUDENT_SUMMARY_PATH).await
    }

    pub async fn at_risk(&self) -> Result<Vec<RiskRecord>, FetchError> {
        self.fetch_json(AT_RISK_PATH).await
    }

    pub async fn cohort_gpa(&self) -> Result<Vec<CohortPoint>, FetchError> {
        self.fetch_json(COHORT_GPA_PATH).await
    }

    pub async fn pass_rates(&self, query: &CourseQuery) -> Result<Vec<CourseRateRecord>, FetchError> {
        self.get(self.endpoint_with_query(PASS_RATES_PATH, &query.pairs()), false)
            .await
    }

    pub async fn dfw_rates(&self, query: &CourseQuery) -> Result<Vec<CourseRateRecord>, FetchError> {
        self.get(self.endpoint_with_query(DFW_RATES_PATH, &query.pairs()), false)
            .await
    }

    pub async fn prerequisites_full(&self) -> Result<Vec<PrerequisiteEntry>, FetchError> {
        self.fetch_json(PREREQUISITES_PATH).await
    }

    pub async fn student_enrollments(&self, student_id: &str) -> Result<StudentEnrollments, FetchError> {
        let mut url = self.endpoint("/api/students");
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(student_id).push("enrollments");
        }
        self.get(url, true).await
    }

    pub async fn current_user(&self) -> Result<CurrentUser, FetchError> {
        self.fetch_json_auth(CURRENT_USER_PATH).await
    }

    /// Exchanges credentials for a token and stores the resulting session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, FetchError> {
        let url = self.endpoint(TOKEN_PATH);
        let request = self
            .http
            .post(url.clone())
            .form(&[("username", username), ("password", password)]);
        let token: TokenResponse = self.send(request, &url).await?;

        let session = Session {
            access_token: token.access_token,
            role: token.role.filter(|r| !r.is_empty()),
            username: Some(username.to_string()),
        };
        self.credentials.set(session.clone())?;
        Ok(session)
    }

    pub fn logout(&self) -> Result<(), FetchError> {
        self.credentials.clear()?;
        Ok(())
    }
}
