//! Trello API Client
//!
//! Rate-limited HTTP client for reading board labels/checklists and creating
//! cards with copied checklists.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::{BoardLabel, BoardSink, ChecklistTemplate};
use crate::config::Credentials;

const RATE_LIMIT_DELAY_MS: u64 = 100; // Trello allows 100 req / 10 s per token

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

pub struct TrelloClient {
    http: Client,
    api_base: String,
    credentials: Credentials,
    last_request: Mutex<Option<Instant>>,
}

impl TrelloClient {
    pub fn new(api_base: impl Into<String>, credentials: Credentials) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials,
            last_request: Mutex::new(None),
        })
    }

    /// Enforce rate limiting between requests
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < Duration::from_millis(RATE_LIMIT_DELAY_MS) {
                sleep(Duration::from_millis(RATE_LIMIT_DELAY_MS) - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn auth(&self) -> [(&'static str, &str); 2] {
        [
            ("key", self.credentials.api_key.as_str()),
            ("token", self.credentials.api_token.as_str()),
        ]
    }

    async fn check(path: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Trello API error {} on {}: {}",
                status,
                path,
                body.chars().take(200).collect::<String>()
            ));
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.rate_limit().await;

        let response = self
            .http
            .get(self.url(path))
            .query(&self.auth())
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", path))?;

        Self::check(path, response)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T> {
        self.rate_limit().await;

        let response = self
            .http
            .post(self.url(path))
            .query(&self.auth())
            .query(params)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to post {}", path))?;

        Self::check(path, response)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }

    /// All labels defined on the board
    pub async fn fetch_labels(&self, board_id: &str) -> Result<Vec<BoardLabel>> {
        self.get(&format!("/boards/{}/labels", board_id)).await
    }

    /// All checklists on the board; template selection happens in derivation
    pub async fn fetch_checklist_templates(&self, board_id: &str) -> Result<Vec<ChecklistTemplate>> {
        self.get(&format!("/boards/{}/checklists", board_id)).await
    }
}

#[async_trait]
impl BoardSink for TrelloClient {
    async fn create_card(
        &self,
        list_id: &str,
        label_ids: &[String],
        name: &str,
        description: &str,
    ) -> Result<String> {
        let labels = label_ids.join(",");
        let created: Created = self
            .post(
                "/cards",
                &[
                    ("idList", list_id),
                    ("name", name),
                    ("desc", description),
                    ("idLabels", labels.as_str()),
                ],
            )
            .await
            .with_context(|| format!("Failed to create card {}", name))?;

        debug!(card_id = %created.id, name, "Created card");
        Ok(created.id)
    }

    async fn create_checklist(
        &self,
        card_id: &str,
        source_template_id: &str,
        name: &str,
    ) -> Result<()> {
        let _: Created = self
            .post(
                "/checklists",
                &[
                    ("idCard", card_id),
                    ("idChecklistSource", source_template_id),
                    ("name", name),
                ],
            )
            .await
            .with_context(|| format!("Failed to copy checklist {} onto card {}", name, card_id))?;
        Ok(())
    }
}
