//! Bank aggregator client (Plaid)
//!
//! Thin HTTP client for the two calls the link flow needs: creating a link
//! token and exchanging a public token after the user completes linking.
//! Sandbox mode works without real credentials on Plaid's side.

use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};

/// Plaid client configuration
#[derive(Debug, Clone)]
pub struct PlaidConfig {
    pub client_id: String,
    pub secret: String,
    pub base_url: String,
    pub redirect_uri: Option<String>,
}

fn base_url_for(env: &str) -> &'static str {
    match env {
        "production" => "https://production.plaid.com",
        "development" => "https://development.plaid.com",
        _ => "https://sandbox.plaid.com",
    }
}

impl PlaidConfig {
    pub fn from_config(config: &Config) -> Self {
        let base_url = base_url_for(&config.plaid_env).to_string();

        Self {
            client_id: config.plaid_client_id.clone(),
            secret: config.plaid_secret.clone(),
            base_url,
            redirect_uri: config.plaid_redirect_uri.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.secret.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct LinkTokenResponse {
    link_token: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: String,
    item_id: String,
}

/// Exchanged credentials for a newly linked bank item
#[derive(Debug)]
pub struct LinkedItem {
    pub access_token: String,
    pub item_id: String,
}

/// Bank aggregator API client
#[derive(Clone)]
pub struct PlaidClient {
    config: PlaidConfig,
    client: reqwest::Client,
}

impl PlaidClient {
    pub fn new(config: PlaidConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Create a link token scoped to one user.
    pub async fn create_link_token(&self, user_id: &str) -> ApiResult<String> {
        if !self.config.is_configured() {
            return Err(ApiError::ServiceUnavailable);
        }

        let mut body = json!({
            "client_id": self.config.client_id,
            "secret": self.config.secret,
            "client_name": "Locksum Finance",
            "user": { "client_user_id": user_id },
            "products": ["transactions"],
            "country_codes": ["US"],
            "language": "en",
        });
        if let Some(uri) = &self.config.redirect_uri {
            body["redirect_uri"] = json!(uri);
        }

        let resp: LinkTokenResponse = self
            .post("/link/token/create", &body)
            .await?;

        Ok(resp.link_token)
    }

    /// Exchange a public token for a durable access token + item id.
    pub async fn exchange_public_token(&self, public_token: &str) -> ApiResult<LinkedItem> {
        if !self.config.is_configured() {
            return Err(ApiError::ServiceUnavailable);
        }

        let body = json!({
            "client_id": self.config.client_id,
            "secret": self.config.secret,
            "public_token": public_token,
        });

        let resp: ExchangeResponse = self.post("/item/public_token/exchange", &body).await?;

        Ok(LinkedItem {
            access_token: resp.access_token,
            item_id: resp.item_id,
        })
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> ApiResult<T> {
        let url = format!("{}{path}", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, path = %path, "Bank aggregator request failed");
                ApiError::Upstream("Bank aggregator unreachable".to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %text, path = %path, "Bank aggregator error");
            return Err(ApiError::Upstream(format!(
                "Bank aggregator returned {status}"
            )));
        }

        response.json::<T>().await.map_err(|e| {
            tracing::error!(error = %e, path = %path, "Bank aggregator response malformed");
            ApiError::Upstream("Bank aggregator response malformed".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_selects_base_url() {
        assert!(base_url_for("sandbox").contains("sandbox"));
        assert!(base_url_for("production").contains("production"));
        // Unknown environments fall back to sandbox, never production
        assert!(base_url_for("anything-else").contains("sandbox"));
    }

    #[test]
    fn test_unconfigured_detection() {
        let config = PlaidConfig {
            client_id: String::new(),
            secret: String::new(),
            base_url: "https://sandbox.plaid.com".to_string(),
            redirect_uri: None,
        };
        assert!(!config.is_configured());
    }
}
