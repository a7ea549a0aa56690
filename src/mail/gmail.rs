use std::time::Duration;

use serde::Deserialize;

use crate::config;
use crate::error::{PipelineError, Result};
use crate::mail::message::ProviderMessage;

/// Mail provider contract consumed by the extraction driver.
pub trait MailProvider {
    /// One list call; implementations must not paginate beyond the first page.
    fn list_message_ids(&self, max_results: u32) -> Result<Vec<String>>;
    fn get_message(&self, id: &str) -> Result<ProviderMessage>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

/// Blocking Gmail REST client authenticated with a bearer token.
pub struct GmailClient {
    api_base: String,
    access_token: String,
    timeout: Duration,
}

impl GmailClient {
    pub fn new(access_token: String) -> Self {
        Self::with_api_base(access_token, config::gmail::API_BASE)
    }

    /// Point the client at another `users/me` base URL.
    pub fn with_api_base(access_token: String, api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token,
            timeout: Duration::from_secs(config::http::REQUEST_TIMEOUT_SECS),
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let mut req = ureq::get(url)
            .timeout(self.timeout)
            .set("Authorization", &format!("Bearer {}", self.access_token));
        for (k, v) in query {
            req = req.query(k, v);
        }

        let body = match req.call() {
            Ok(resp) => resp.into_string().map_err(|e| {
                PipelineError::Provider(format!("failed reading response from {url}: {e}"))
            })?,
            Err(ureq::Error::Status(code @ (401 | 403), resp)) => {
                let detail = resp.into_string().unwrap_or_default();
                return Err(PipelineError::Authentication(format!(
                    "Gmail rejected credentials (HTTP {code}): {detail}"
                )));
            }
            Err(ureq::Error::Status(code, resp)) => {
                let detail = resp.into_string().unwrap_or_default();
                return Err(PipelineError::Provider(format!("HTTP {code} from {url}: {detail}")));
            }
            Err(e) => return Err(PipelineError::Provider(format!("request to {url} failed: {e}"))),
        };

        serde_json::from_str(&body)
            .map_err(|e| PipelineError::Provider(format!("malformed payload from {url}: {e}")))
    }
}

impl MailProvider for GmailClient {
    fn list_message_ids(&self, max_results: u32) -> Result<Vec<String>> {
        let url = format!("{}/messages", self.api_base);
        let max = max_results.to_string();
        let list: ListResponse = self.get_json(&url, &[("maxResults", max.as_str())])?;
        if list.next_page_token.is_some() {
            log::info!(
                "More messages available beyond the first page; only the first page is fetched"
            );
        }
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    fn get_message(&self, id: &str) -> Result<ProviderMessage> {
        let url = format!("{}/messages/{}", self.api_base, id);
        self.get_json(&url, &[("format", "full")])
    }
}
