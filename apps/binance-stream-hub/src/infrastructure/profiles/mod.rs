//! Profile Store Client
//!
//! Read-only HTTP client for the profile service, which owns user
//! records and tracked-coin persistence. The hub only needs one lookup
//! at session upgrade time: the user's display name and holdings.

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::ports::{ProfileError, ProfileProvider};
use crate::domain::ticks::{Holding, UserId, UserProfile};
use crate::infrastructure::config::ProfileSettings;

/// Wire shape of the profile service's lookup response.
#[derive(Debug, Deserialize)]
struct ProfileDocument {
    id: UserId,
    name: String,
    #[serde(default)]
    coins: Vec<CoinDocument>,
}

#[derive(Debug, Deserialize)]
struct CoinDocument {
    symbol: String,
    quantity: rust_decimal::Decimal,
}

/// HTTP-backed [`ProfileProvider`].
#[derive(Debug, Clone)]
pub struct HttpProfileProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProfileProvider {
    /// Create a provider against the configured profile service.
    #[must_use]
    pub fn new(settings: &ProfileSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.base_url.clone(),
        }
    }
}

#[async_trait]
impl ProfileProvider for HttpProfileProvider {
    async fn profile(&self, user_id: UserId) -> Result<Option<UserProfile>, ProfileError> {
        let url = format!("{}/internal/profile/{user_id}", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProfileError {
                reason: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let document: ProfileDocument =
            response
                .error_for_status()
                .map_err(|e| ProfileError {
                    reason: e.to_string(),
                })?
                .json()
                .await
                .map_err(|e| ProfileError {
                    reason: e.to_string(),
                })?;

        Ok(Some(UserProfile {
            id: document.id,
            name: document.name,
            coins: document
                .coins
                .into_iter()
                .map(|coin| Holding {
                    symbol: coin.symbol.to_lowercase(),
                    quantity: coin.quantity,
                })
                .collect(),
        }))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::routing::get;

    use super::*;

    async fn spawn_profile_service() -> String {
        async fn lookup(
            axum::extract::Path(id): axum::extract::Path<u64>,
        ) -> axum::response::Response {
            use axum::response::IntoResponse;
            if id == 404 {
                return axum::http::StatusCode::NOT_FOUND.into_response();
            }
            axum::Json(serde_json::json!({
                "id": id,
                "name": "alice",
                "coins": [{"symbol": "BTCUSDT", "quantity": "2"}],
            }))
            .into_response()
        }

        let app = Router::new().route("/internal/profile/{id}", get(lookup));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn fetches_profile_and_lowercases_symbols() {
        let base_url = spawn_profile_service().await;
        let provider = HttpProfileProvider::new(&ProfileSettings { base_url });

        let profile = provider.profile(7).await.unwrap().unwrap();

        assert_eq!(profile.id, 7);
        assert_eq!(profile.name, "alice");
        assert_eq!(profile.coins[0].symbol, "btcusdt");
    }

    #[tokio::test]
    async fn unknown_user_is_none() {
        let base_url = spawn_profile_service().await;
        let provider = HttpProfileProvider::new(&ProfileSettings { base_url });

        assert!(provider.profile(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreachable_store_is_an_error() {
        let provider = HttpProfileProvider::new(&ProfileSettings {
            base_url: "http://127.0.0.1:1".to_string(),
        });

        assert!(provider.profile(1).await.is_err());
    }
}
