use crucible_domain::repositories::execution::ExecutionReporter;
use crucible_domain::services::risk::RiskSnapshot;
use crucible_domain::value_objects::trade_outcome::TradeOutcome;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct OutcomesResponse {
    outcomes: Vec<TradeOutcome>,
}

/// Blocking HTTP adapter for the execution collaborator's reporting API.
pub struct HttpExecutionReporter {
    pub url: String,
    pub retries: u32,
    client: Client,
}

impl HttpExecutionReporter {
    pub fn new(url: String, timeout_ms: u64, retries: u32) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| format!("failed to build http client: {err}"))?;
        Ok(Self {
            url,
            retries,
            client,
        })
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, String> {
        let endpoint = format!("{}{}", self.url.trim_end_matches('/'), path);
        let mut attempts = 0u32;
        let mut last_error = String::new();
        while attempts <= self.retries {
            attempts += 1;
            match self.client.get(&endpoint).send() {
                Ok(resp) => {
                    if resp.status() == StatusCode::OK {
                        return resp
                            .json::<T>()
                            .map_err(|err| format!("failed to parse execution response: {err}"));
                    }
                    last_error =
                        format!("execution http error: status {}", resp.status().as_u16());
                    if !resp.status().is_server_error() {
                        break;
                    }
                }
                Err(err) => {
                    last_error = format!("execution request failed: {err}");
                }
            }
        }
        metrics::counter!("crucible.infra.execution.errors_total").increment(1);
        Err(last_error)
    }
}

impl ExecutionReporter for HttpExecutionReporter {
    fn live_outcomes(&self, strategy_id: &str) -> Result<Vec<TradeOutcome>, String> {
        let response: OutcomesResponse =
            self.get_json(&format!("/v1/outcomes/{strategy_id}"))?;
        Ok(response.outcomes)
    }

    fn risk_snapshot(&self) -> Result<RiskSnapshot, String> {
        self.get_json("/v1/risk")
    }
}

/// Stand-in used when no execution collaborator is connected: nothing is
/// live, so there is nothing for the risk gate to trip on.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullExecutionReporter;

impl ExecutionReporter for NullExecutionReporter {
    fn live_outcomes(&self, _strategy_id: &str) -> Result<Vec<TradeOutcome>, String> {
        Ok(Vec::new())
    }

    fn risk_snapshot(&self) -> Result<RiskSnapshot, String> {
        Ok(RiskSnapshot {
            drawdown_pct: 0.0,
            consecutive_losses: 0,
        })
    }
}
