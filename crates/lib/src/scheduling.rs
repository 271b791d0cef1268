//! Scheduling call-to-action: replace the marker token in model replies with a booking link.
//!
//! The static link is `{base_url}/{event_type}` ("15min" when no event type is configured).
//! With single-use links enabled and an API token set, a one-off booking link is created per
//! reply through the scheduling API; any failure there falls back to the static link.

use crate::config::{self, Config};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

/// Literal the model is instructed to emit when the user agrees to book a meeting.
pub const SCHEDULING_MARKER: &str = "[LINK_CALENDLY]";

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("scheduling request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("scheduling api error: {0}")]
    Api(String),
}

/// Replace every occurrence of the marker with `link`.
pub fn substitute_marker(text: &str, link: &str) -> String {
    text.replace(SCHEDULING_MARKER, link)
}

/// Builds booking links and applies them to replies.
pub struct SchedulingLinks {
    base_url: String,
    event_type: String,
    single_use: Option<SingleUseLinks>,
}

struct SingleUseLinks {
    api_base: String,
    token: Secret<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SchedulingLinkResponse {
    resource: SchedulingLinkResource,
}

#[derive(Debug, Deserialize)]
struct SchedulingLinkResource {
    booking_url: String,
}

impl SchedulingLinks {
    /// Static links only.
    pub fn new(base_url: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            event_type: event_type.into(),
            single_use: None,
        }
    }

    /// Enable single-use links created through the scheduling API at `api_base`.
    pub fn with_single_use(mut self, api_base: impl Into<String>, token: String) -> Self {
        self.single_use = Some(SingleUseLinks {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: Secret::new(token),
            client: reqwest::Client::new(),
        });
        self
    }

    pub fn from_config(config: &Config) -> Self {
        let links = Self::new(
            config::resolve_scheduling_base_url(config),
            config::resolve_event_type(config),
        );
        if !config.scheduling.single_use_links {
            return links;
        }
        let token = config
            .scheduling
            .api_token
            .as_ref()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        match token {
            Some(token) => {
                log::info!("scheduling: single-use booking links enabled");
                links.with_single_use(config::resolve_scheduling_api_base(config), token)
            }
            None => {
                log::warn!("scheduling: singleUseLinks set but no api token (CALENDLY_API_TOKEN); using static links");
                links
            }
        }
    }

    /// `{base_url}/{event_type}`
    pub fn static_link(&self) -> String {
        format!("{}/{}", self.base_url, self.event_type)
    }

    /// POST /scheduling_links owned by the configured event type, limited to one booking.
    async fn create_single_use(&self, api: &SingleUseLinks) -> Result<String, SchedulingError> {
        let url = format!("{}/scheduling_links", api.api_base);
        let body = serde_json::json!({
            "max_event_count": 1,
            "owner": format!("{}/event_types/{}", api.api_base, self.event_type),
            "owner_type": "EventType",
        });
        let res = api
            .client
            .post(&url)
            .bearer_auth(api.token.expose_secret())
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SchedulingError::Api(format!("{} {}", status, body)));
        }
        let data: SchedulingLinkResponse = res.json().await?;
        Ok(data.resource.booking_url)
    }

    /// Link to substitute for the marker.
    pub async fn link(&self) -> String {
        if let Some(ref api) = self.single_use {
            match self.create_single_use(api).await {
                Ok(url) => return url,
                Err(e) => log::warn!("scheduling: single-use link failed, using static link: {}", e),
            }
        }
        self.static_link()
    }

    /// Replace every marker in `text`. Text without the marker is returned unchanged
    /// and no link is created.
    pub async fn apply(&self, text: &str) -> String {
        if !text.contains(SCHEDULING_MARKER) {
            return text.to_string();
        }
        let link = self.link().await;
        substitute_marker(text, &link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_link_uses_event_type() {
        let links = SchedulingLinks::new("https://calendly.com/cognoxai/", "abc-123");
        assert_eq!(links.static_link(), "https://calendly.com/cognoxai/abc-123");
    }

    #[test]
    fn static_link_falls_back_to_default_segment() {
        let unset = SchedulingLinks::from_config(&Config::default());
        assert_eq!(unset.static_link(), "https://calendly.com/cognoxai/15min");
        let mut config = Config::default();
        config.scheduling.event_type = Some("  ".into());
        let blank = SchedulingLinks::from_config(&config);
        assert_eq!(blank.static_link(), "https://calendly.com/cognoxai/15min");
        config.scheduling.event_type = Some("abc-123".into());
        let set = SchedulingLinks::from_config(&config);
        assert_eq!(set.static_link(), "https://calendly.com/cognoxai/abc-123");
    }

    #[test]
    fn substitute_replaces_every_marker() {
        let out = substitute_marker(
            "Agende aqui: [LINK_CALENDLY]. Ou depois: [LINK_CALENDLY]",
            "https://calendly.com/cognoxai/15min",
        );
        assert_eq!(
            out,
            "Agende aqui: https://calendly.com/cognoxai/15min. Ou depois: https://calendly.com/cognoxai/15min"
        );
        assert!(!out.contains(SCHEDULING_MARKER));
    }

    #[tokio::test]
    async fn apply_leaves_text_without_marker() {
        let links = SchedulingLinks::new("https://calendly.com/cognoxai", "15min");
        assert_eq!(links.apply("Como posso ajudar?").await, "Como posso ajudar?");
    }

    #[tokio::test]
    async fn single_use_failure_falls_back_to_static() {
        let links = SchedulingLinks::new("https://calendly.com/cognoxai", "evt")
            .with_single_use("http://127.0.0.1:1", "token".to_string());
        assert_eq!(
            links.apply("[LINK_CALENDLY]").await,
            "https://calendly.com/cognoxai/evt"
        );
    }

    #[tokio::test]
    async fn single_use_link_is_created_and_substituted() {
        use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
        use serde_json::{json, Value};
        use std::sync::{Arc, Mutex};

        type Seen = Arc<Mutex<Vec<(Option<String>, Value)>>>;

        async fn create_link(
            State(seen): State<Seen>,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> Json<Value> {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            seen.lock().unwrap().push((auth, body));
            Json(json!({
                "resource": {
                    "booking_url": "https://calendly.com/d/abcd-efgh/15min",
                    "owner": "https://api.calendly.com/event_types/evt",
                    "owner_type": "EventType"
                }
            }))
        }

        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/scheduling_links", post(create_link))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api_base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let links = SchedulingLinks::new("https://calendly.com/cognoxai", "evt")
            .with_single_use(api_base.clone(), "cal-token".to_string());
        assert_eq!(
            links.apply("Agende: [LINK_CALENDLY]").await,
            "Agende: https://calendly.com/d/abcd-efgh/15min"
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("Bearer cal-token"));
        assert_eq!(seen[0].1["max_event_count"], 1);
        assert_eq!(seen[0].1["owner_type"], "EventType");
        assert_eq!(
            seen[0].1["owner"],
            format!("{}/event_types/evt", api_base)
        );
    }

    #[test]
    fn from_config_without_token_stays_static() {
        let mut config = Config::default();
        config.scheduling.single_use_links = true;
        let links = SchedulingLinks::from_config(&config);
        assert!(links.single_use.is_none());
        assert_eq!(links.static_link(), "https://calendly.com/cognoxai/15min");
    }
}
