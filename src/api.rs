/// REST backend client: envelope decoding and status classification
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::config::ApiConfig;
use crate::error::ClientError;
use crate::types::{Envelope, FailureEnvelope, LoginRequest, RefreshRequest, TokenPair};

pub const LOGIN_PATH: &str = "/user/login";
pub const REFRESH_PATH: &str = "/user/refresh-token";
pub const LOGOUT_PATH: &str = "/user/logout";
pub const DASHBOARD_PATH: &str = "/user/dashboard";

/// Successful reply: a decoded `response` payload, or 204 with no body
#[derive(Debug)]
pub enum Reply<T> {
    Data(T),
    NoContent,
}

impl<T> Reply<T> {
    /// Payload of an endpoint that always answers with a body.
    pub fn into_data(self, endpoint: &str) -> Result<T, ClientError> {
        match self {
            Reply::Data(data) => Ok(data),
            Reply::NoContent => Err(ClientError::malformed(endpoint, "unexpected empty body")),
        }
    }
}

/// Session endpoints the session manager depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// 401/404 map to `CredentialsInvalid`; 400/5xx to `Transient`.
    async fn login(&self, email: &str, password: &str) -> Result<TokenPair, ClientError>;

    /// Exchange the refresh token for a new pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError>;

    /// Revoke both tokens server side.
    async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<(), ClientError>;

    /// Resolve the landing path for the authenticated user.
    async fn dashboard(&self, access_token: &str) -> Result<String, ClientError>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    root: String,
}

impl ApiClient {
    /// `base_url` is the backend origin, `prefix` the API mount point (e.g. `/v1`).
    pub fn new(base_url: &str, prefix: &str) -> anyhow::Result<Self> {
        let base = Url::parse(base_url)?;
        if !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("API base URL must be http or https: {}", base_url);
        }

        let root = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            prefix.trim_matches('/')
        );

        let client = reqwest::Client::builder()
            .user_agent(format!("wayfarer/{}", crate::VERSION))
            .build()?;

        Ok(Self {
            client,
            root: root.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ApiConfig) -> anyhow::Result<Self> {
        Self::new(&config.base_url, &config.prefix)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.root, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let builder = self
            .client
            .request(method, self.url(path))
            .header("Accept", "application/json");
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<Reply<T>, ClientError> {
        self.dispatch(path, self.request(Method::GET, path, token)).await
    }

    pub async fn post<B, T>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<Reply<T>, ClientError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.dispatch(path, self.request(Method::POST, path, token).json(body))
            .await
    }

    /// 204 → `NoContent`, 2xx → decoded envelope, 401 → `AuthorizationExpired`,
    /// anything else → `Transient` carrying the server's message.
    async fn dispatch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<Reply<T>, ClientError> {
        let res = request.send().await?;
        let status = res.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(Reply::NoContent);
        }

        let body = res.bytes().await?;

        if status.is_success() {
            let envelope: Envelope<T> = serde_json::from_slice(&body)
                .map_err(|e| ClientError::malformed(endpoint, e))?;
            return Ok(Reply::Data(envelope.response));
        }

        if status == StatusCode::UNAUTHORIZED {
            tracing::debug!(endpoint, "request unauthorized");
            return Err(ClientError::AuthorizationExpired);
        }

        let message = serde_json::from_slice::<FailureEnvelope>(&body)
            .ok()
            .and_then(|failure| failure.message())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            });

        tracing::debug!(endpoint, status = status.as_u16(), %message, "request failed");
        Err(ClientError::Transient {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<TokenPair, ClientError> {
        let reply = self
            .post(LOGIN_PATH, None, &LoginRequest { email, password })
            .await;

        match reply {
            Ok(reply) => reply.into_data(LOGIN_PATH),
            // Wrong password is 401; an unknown e-mail is 404
            Err(ClientError::AuthorizationExpired) => Err(ClientError::CredentialsInvalid),
            Err(ClientError::Transient { status: 404, .. }) => Err(ClientError::CredentialsInvalid),
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError> {
        self.post(REFRESH_PATH, None, &RefreshRequest { refresh_token })
            .await?
            .into_data(REFRESH_PATH)
    }

    async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<(), ClientError> {
        self.post::<_, serde_json::Value>(
            LOGOUT_PATH,
            Some(access_token),
            &RefreshRequest { refresh_token },
        )
        .await?;
        Ok(())
    }

    async fn dashboard(&self, access_token: &str) -> Result<String, ClientError> {
        self.get(DASHBOARD_PATH, Some(access_token))
            .await?
            .into_data(DASHBOARD_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_prefix() {
        let api = ApiClient::new("http://localhost:5000/", "/v1/").unwrap();
        assert_eq!(api.url("/user/login"), "http://localhost:5000/v1/user/login");
        assert_eq!(api.url("itinerary/request/42"), "http://localhost:5000/v1/itinerary/request/42");
    }

    #[test]
    fn test_empty_prefix() {
        let api = ApiClient::new("https://travel.example", "").unwrap();
        assert_eq!(api.url("/user/dashboard"), "https://travel.example/user/dashboard");
    }

    #[test]
    fn test_rejects_non_http_base() {
        assert!(ApiClient::new("ftp://travel.example", "/v1").is_err());
        assert!(ApiClient::new("not a url", "/v1").is_err());
    }

    #[test]
    fn test_no_content_is_malformed_where_body_required() {
        let reply: Reply<TokenPair> = Reply::NoContent;
        assert!(matches!(
            reply.into_data(LOGIN_PATH),
            Err(ClientError::MalformedResponse { .. })
        ));
    }
}
