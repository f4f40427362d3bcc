use crucible_domain::repositories::generation::{CandidateStrategy, GenerationClient};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::{Duration, Instant};

#[derive(Debug, Deserialize)]
struct CandidateBatch {
    candidates: Vec<CandidateStrategy>,
}

/// Blocking HTTP client for the generation collaborator. Calls carry their
/// own timeout budget so a hung generation service can never block a worker
/// past the claim lease.
pub struct HttpGenerationClient {
    pub url: String,
    pub retries: u32,
    client: Client,
}

impl HttpGenerationClient {
    pub fn new(url: String, timeout_ms: u64, retries: u32) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|err| format!("failed to build http client: {err}"))?;
        Ok(Self {
            url,
            retries,
            client,
        })
    }
}

impl GenerationClient for HttpGenerationClient {
    fn next_batch(&self, limit: usize) -> Result<Vec<CandidateStrategy>, String> {
        let endpoint = format!(
            "{}/v1/candidates?limit={}",
            self.url.trim_end_matches('/'),
            limit
        );
        let start = Instant::now();
        let mut attempts = 0u32;
        let mut last_error = String::new();

        while attempts <= self.retries {
            attempts += 1;
            match self.client.get(&endpoint).send() {
                Ok(resp) => {
                    if resp.status() == StatusCode::OK {
                        let batch = resp
                            .json::<CandidateBatch>()
                            .map_err(|err| format!("failed to parse candidate batch: {err}"))?;
                        metrics::histogram!("crucible.infra.generation.fetch_ms")
                            .record(start.elapsed().as_millis() as f64);
                        metrics::counter!("crucible.infra.generation.candidates_total")
                            .increment(batch.candidates.len() as u64);
                        return Ok(batch.candidates);
                    }
                    last_error = format!("generation http error: status {}", resp.status().as_u16());
                    if !resp.status().is_server_error() {
                        break;
                    }
                }
                Err(err) => {
                    last_error = format!("generation request failed: {err}");
                }
            }
        }

        metrics::counter!("crucible.infra.generation.errors_total").increment(1);
        tracing::warn!(attempts, error = %last_error, "generation batch fetch failed");
        Err(last_error)
    }
}
