use std::{sync::Mutex, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// attempts after the first one
    pub retries: u32,
    /// first backoff step, doubled on every retry
    pub backoff: Duration,
    /// minimum gap between consecutive requests
    pub delay: Duration,
    pub timeout: Duration,
}

impl FetchConfig {
    /// Total requests made for one URL before giving up.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Pause before retry number `attempt + 1`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            retries: 3,
            backoff: Duration::from_secs(2),
            delay: Duration::from_millis(1500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Sequential HTTP GETs with a politeness gap and retry with exponential
/// backoff. Requests are never issued concurrently.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    last_request: Mutex<Option<Instant>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Fetcher {
            client,
            config,
            last_request: Mutex::new(None),
        })
    }

    async fn pace(&self) {
        let wait = {
            let mut last = self
                .last_request
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let now = Instant::now();
            let wait = last
                .map(|at| (at + self.config.delay).saturating_duration_since(now))
                .unwrap_or_default();
            *last = Some(now + wait);
            wait
        };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    /// Body of `url`, or `None` on 404. Transport errors, 429 and 5xx are
    /// retried; other statuses fail immediately.
    pub async fn get_text(&self, url: &Url) -> Result<Option<String>> {
        let mut attempt = 0;
        loop {
            self.pace().await;
            debug!(%url, attempt, "GET");
            let outcome = match self.client.get(url.clone()).send().await {
                Ok(res) if res.status() == StatusCode::NOT_FOUND => return Ok(None),
                Ok(res) if res.status().is_success() => match res.text().await {
                    Ok(text) => return Ok(Some(text)),
                    Err(e) => anyhow!(e).context("failed to read body"),
                },
                Ok(res)
                    if res.status() == StatusCode::TOO_MANY_REQUESTS
                        || res.status().is_server_error() =>
                {
                    anyhow!("server answered {}", res.status())
                }
                Ok(res) => bail!("GET {} answered {}", url, res.status()),
                Err(e) => anyhow!(e),
            };

            if attempt + 1 >= self.config.attempts() {
                return Err(outcome.context(format!("GET {} failed after {} attempts", url, attempt + 1)));
            }
            let backoff = self.config.backoff_for(attempt);
            warn!(%url, attempt, error = %outcome, ?backoff, "request failed, retrying");
            sleep(backoff).await;
            attempt += 1;
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<Option<T>> {
        let Some(text) = self.get_text(url).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<T>(&text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                let line = text
                    .lines()
                    .nth(e.line().saturating_sub(1))
                    .with_context(|| anyhow!("can't find line for error: {}", e))?;
                bail!("bad json from {}\nline: {}\nerr: {}", url, line, e);
            }
        }
    }
}
