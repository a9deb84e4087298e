use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use crate::source::traits::ValueSource;
use crate::source::types::ValueSnapshot;

pub const TREASURY_RATE_URL: &str = "https://api.treasury.id/api/v1/antigrvty/gold/rate";

#[derive(Debug, Deserialize)]
struct RateEnvelopeWire {
    data: Option<RateWire>,
}

#[derive(Debug, Deserialize)]
struct RateWire {
    buying_rate: Decimal,
    selling_rate: Decimal,
    #[serde(default)]
    updated_at: Option<String>,
}

impl TryFrom<RateEnvelopeWire> for ValueSnapshot {
    type Error = anyhow::Error;

    fn try_from(wire: RateEnvelopeWire) -> anyhow::Result<Self> {
        let rate = wire.data.context("rate payload has no `data` object")?;
        let snapshot = ValueSnapshot::new(rate.buying_rate, rate.selling_rate);
        Ok(match rate.updated_at {
            Some(updated) if !updated.is_empty() => snapshot.with_source_time(updated),
            _ => snapshot,
        })
    }
}

/// Gold buy/sell rate per gram from the Treasury public API.
pub struct TreasurySource {
    client: Client,
    url: String,
}

impl TreasurySource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        // Pooled keep-alive client; warm_up() opens the first connection.
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(60))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Fire one request so the first real poll reuses a warm connection.
    /// Never fails; the outcome is only logged.
    pub async fn warm_up(&self) {
        match self.post().await {
            Ok(response) => info!(status = %response.status(), "value source warm-up"),
            Err(err) => warn!(error = %err, "value source warm-up failed"),
        }
    }

    async fn post(&self) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
    }
}

#[async_trait]
impl ValueSource for TreasurySource {
    fn name(&self) -> &'static str {
        "treasury"
    }

    async fn fetch(&self) -> anyhow::Result<ValueSnapshot> {
        let response = self.post().await?.error_for_status()?;
        let payload = response.json::<RateEnvelopeWire>().await?;
        payload.try_into()
    }
}
