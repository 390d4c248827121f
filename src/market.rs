//! Simulated market data service.
//!
//! Stands in for the external premium price API: a seeded asset table with
//! random per-read price fluctuation and simulated processing delay. This is
//! the downstream handler collaborator the pipeline composes around; it does
//! no caching of its own.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;

/// A tracked cryptocurrency.
#[derive(Debug, Clone, Serialize)]
pub struct Asset {
    /// Ticker symbol, uppercase
    pub symbol: String,
    /// Display name
    pub name: String,
    /// Latest simulated price
    pub current_price: f64,
    /// 24-hour change in percent
    pub price_change_24h: f64,
    /// When the price last moved
    pub last_updated: DateTime<Utc>,
}

/// One point of a historical price series.
#[derive(Debug, Clone, Serialize)]
pub struct PricePoint {
    /// Point-in-time timestamp
    pub timestamp: DateTime<Utc>,
    /// Simulated price at that time
    pub price: f64,
    /// Simulated 24h volume at that time
    pub volume: f64,
}

/// Market overview row.
#[derive(Debug, Clone, Serialize)]
pub struct MarketEntry {
    /// Ticker symbol
    pub symbol: String,
    /// Display name
    pub name: String,
    /// Latest price
    pub current_price: f64,
    /// 24-hour change in percent
    pub price_change_24h: f64,
    /// Simulated market capitalization
    pub market_cap: f64,
    /// Simulated 24h volume
    pub volume_24h: f64,
    /// Simulated circulating supply
    pub circulating_supply: f64,
    /// When the price last moved
    pub last_updated: DateTime<Utc>,
}

/// In-memory asset table with simulated live behavior.
pub struct MarketDataService {
    assets: RwLock<Vec<Asset>>,
    clock: Arc<dyn Clock>,
    simulate_latency: bool,
}

impl MarketDataService {
    /// Create a service seeded with the default asset table.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let seed = [
            ("BTC", "Bitcoin", 43856.21, 2.4),
            ("ETH", "Ethereum", 3287.45, 1.7),
            ("SOL", "Solana", 106.92, -0.8),
            ("DOGE", "Dogecoin", 0.078, -1.3),
            ("ADA", "Cardano", 0.396, 0.5),
        ];
        let assets = seed
            .iter()
            .map(|(symbol, name, price, change)| Asset {
                symbol: symbol.to_string(),
                name: name.to_string(),
                current_price: *price,
                price_change_24h: *change,
                last_updated: now,
            })
            .collect();

        Self {
            assets: RwLock::new(assets),
            clock,
            simulate_latency: true,
        }
    }

    /// Disable the simulated processing delay.
    ///
    /// This is primarily useful for testing.
    pub fn without_latency(mut self) -> Self {
        self.simulate_latency = false;
        self
    }

    /// Current prices for every tracked asset.
    pub async fn all_prices(&self) -> Vec<Asset> {
        self.processing_delay(10, 50).await;

        let now = self.clock.now();
        let mut assets = self.assets.write();
        for asset in assets.iter_mut() {
            asset.current_price = fluctuate(asset.current_price);
            asset.last_updated = now;
        }
        assets.clone()
    }

    /// Current price for one symbol, `None` for untracked symbols.
    pub async fn price(&self, symbol: &str) -> Option<Asset> {
        self.processing_delay(5, 20).await;

        let symbol = symbol.to_uppercase();
        let now = self.clock.now();
        let mut assets = self.assets.write();
        let asset = assets.iter_mut().find(|a| a.symbol == symbol)?;
        asset.current_price = fluctuate(asset.current_price);
        asset.last_updated = now;
        Some(asset.clone())
    }

    /// Simulated historical series for a symbol, `None` for untracked
    /// symbols. Points are chronological, oldest first.
    pub async fn history(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Option<Vec<PricePoint>> {
        // Historical data takes longer to produce
        self.processing_delay(50, 150).await;

        let symbol = symbol.to_uppercase();
        let current_price = {
            let assets = self.assets.read();
            assets.iter().find(|a| a.symbol == symbol)?.current_price
        };

        let step = interval_step(interval);
        let mut rng = rand::thread_rng();
        let mut price = current_price;
        let mut timestamp = self.clock.now();
        let mut points = Vec::with_capacity(limit);

        for _ in 0..limit {
            timestamp -= step;

            // 1-3% volatility per step, direction at random
            let volatility = 0.01 + rng.gen::<f64>() * 0.02;
            let direction = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            price = round_price(price * (1.0 + direction * volatility));

            points.push(PricePoint {
                timestamp,
                price,
                volume: simulated_volume(price, &mut rng),
            });
        }

        points.reverse();
        debug!(symbol = %symbol, points = points.len(), "Generated historical series");
        Some(points)
    }

    /// Market overview rows, at most `limit` of them.
    pub async fn markets(&self, limit: usize) -> Vec<MarketEntry> {
        self.processing_delay(30, 100).await;

        let mut rng = rand::thread_rng();
        let assets = self.assets.read();
        assets
            .iter()
            .take(limit)
            .map(|asset| MarketEntry {
                symbol: asset.symbol.clone(),
                name: asset.name.clone(),
                current_price: asset.current_price,
                price_change_24h: asset.price_change_24h,
                market_cap: simulated_market_cap(asset.current_price, &mut rng),
                volume_24h: simulated_volume(asset.current_price, &mut rng),
                circulating_supply: circulating_supply(&asset.symbol, &mut rng),
                last_updated: asset.last_updated,
            })
            .collect()
    }

    /// The most volatile assets by absolute 24h change.
    pub async fn trending(&self, limit: usize) -> Vec<Asset> {
        self.processing_delay(20, 80).await;

        let mut assets = self.assets.read().clone();
        assets.sort_by(|a, b| {
            b.price_change_24h
                .abs()
                .partial_cmp(&a.price_change_24h.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        assets.truncate(limit);
        assets
    }

    /// Symbols currently tracked.
    pub fn symbols(&self) -> Vec<String> {
        self.assets.read().iter().map(|a| a.symbol.clone()).collect()
    }

    async fn processing_delay(&self, min_ms: u64, max_ms: u64) {
        if !self.simulate_latency {
            return;
        }
        let delay = {
            let mut rng = rand::thread_rng();
            rng.gen_range(min_ms..=max_ms)
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

/// Apply a random fluctuation of up to ±10% and round.
fn fluctuate(price: f64) -> f64 {
    let mut rng = rand::thread_rng();
    let change = (rng.gen::<f64>() - 0.5) * 0.2;
    round_price(price * (1.0 + change))
}

/// Sub-dollar prices keep six decimals, everything else two.
fn round_price(price: f64) -> f64 {
    let factor = if price < 1.0 { 1e6 } else { 1e2 };
    (price * factor).round() / factor
}

fn interval_step(interval: &str) -> chrono::Duration {
    match interval {
        "1h" => chrono::Duration::hours(1),
        "7d" => chrono::Duration::days(7),
        "30d" => chrono::Duration::days(30),
        // 1d and anything unrecognized
        _ => chrono::Duration::days(1),
    }
}

fn simulated_volume(price: f64, rng: &mut impl Rng) -> f64 {
    let multiplier = 10f64.powi(4 + rng.gen_range(0..4));
    (price * multiplier).round()
}

fn simulated_market_cap(price: f64, rng: &mut impl Rng) -> f64 {
    let multiplier = 10f64.powi(6 + rng.gen_range(0..6));
    (price * multiplier).round()
}

fn circulating_supply(symbol: &str, rng: &mut impl Rng) -> f64 {
    match symbol {
        "BTC" => 19_000_000.0 + rng.gen_range(0.0..500_000.0),
        "ETH" => 120_000_000.0 + rng.gen_range(0.0..1_000_000.0),
        "SOL" => 350_000_000.0 + rng.gen_range(0.0..10_000_000.0),
        "DOGE" => 130_000_000_000.0 + rng.gen_range(0.0..1_000_000_000.0),
        "ADA" => 35_000_000_000.0 + rng.gen_range(0.0..1_000_000_000.0),
        _ => 1_000_000_000.0 + rng.gen_range(0.0..1_000_000_000.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn service() -> MarketDataService {
        MarketDataService::new(Arc::new(SystemClock)).without_latency()
    }

    #[tokio::test]
    async fn test_all_prices_returns_seeded_assets() {
        let market = service();
        let prices = market.all_prices().await;

        assert_eq!(prices.len(), 5);
        assert!(prices.iter().any(|a| a.symbol == "BTC"));
    }

    #[tokio::test]
    async fn test_price_lookup_is_case_insensitive() {
        let market = service();
        let asset = market.price("btc").await.unwrap();
        assert_eq!(asset.symbol, "BTC");
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_none() {
        let market = service();
        assert!(market.price("XXX").await.is_none());
        assert!(market.history("XXX", "1d", 10).await.is_none());
    }

    #[tokio::test]
    async fn test_price_stays_positive_and_moves_within_bounds() {
        let market = service();
        let mut last = market.price("BTC").await.unwrap().current_price;

        for _ in 0..50 {
            let next = market.price("BTC").await.unwrap().current_price;
            assert!(next > 0.0);
            // Single-step fluctuation is bounded at ±10%
            assert!((next - last).abs() <= last * 0.101);
            last = next;
        }
    }

    #[tokio::test]
    async fn test_history_shape() {
        let market = service();
        let points = market.history("BTC", "1d", 30).await.unwrap();

        assert_eq!(points.len(), 30);
        // Chronological, oldest first
        for pair in points.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
        assert!(points.iter().all(|p| p.price > 0.0 && p.volume > 0.0));
    }

    #[tokio::test]
    async fn test_markets_respects_limit() {
        let market = service();
        let rows = market.markets(2).await;

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.market_cap > 0.0));
        assert!(rows.iter().all(|r| r.circulating_supply > 0.0));
    }

    #[tokio::test]
    async fn test_trending_sorts_by_absolute_change() {
        let market = service();
        let trending = market.trending(3).await;

        assert_eq!(trending.len(), 3);
        // Seed data: BTC +2.4 is the most volatile
        assert_eq!(trending[0].symbol, "BTC");
        for pair in trending.windows(2) {
            assert!(pair[0].price_change_24h.abs() >= pair[1].price_change_24h.abs());
        }
    }

    #[test]
    fn test_round_price() {
        assert_eq!(round_price(43856.214999), 43856.21);
        assert_eq!(round_price(0.0781234567), 0.078123);
    }
}
