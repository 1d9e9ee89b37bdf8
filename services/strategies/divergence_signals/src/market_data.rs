//! Market data sources
//!
//! The engine only needs a window of recent *closed* candles. Sources are
//! responsible for dropping the candle that is still forming.

use crate::candle::{Candle, CandleSeries};
use crate::clock::Clock;
use crate::config::MarketDataSettings;
use crate::error::DataSourceError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Up to `limit` most recent closed candles, oldest first
    async fn fetch_recent_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<CandleSeries, DataSourceError>;
}

/// Spot klines from the Binance REST API
pub struct BinanceKlineSource {
    client: reqwest::Client,
    base_url: String,
    clock: Arc<dyn Clock>,
}

impl BinanceKlineSource {
    pub fn new(
        settings: &MarketDataSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DataSourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .pool_max_idle_per_host(2)
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            clock,
        })
    }
}

/// "BTC/USDT" and "btc-usdt" become "BTCUSDT"
pub fn exchange_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| *c != '/' && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

fn number(row: &[Value], index: usize) -> Result<f64, DataSourceError> {
    let malformed = || DataSourceError::Malformed {
        message: format!("kline field {} is not numeric", index),
    };

    let value = match row.get(index) {
        Some(Value::String(s)) => s.parse::<f64>().map_err(|_| malformed())?,
        Some(Value::Number(n)) => n.as_f64().ok_or_else(malformed)?,
        _ => return Err(malformed()),
    };

    // "NaN" and "inf" parse as f64 but would poison every indicator
    if !value.is_finite() {
        return Err(malformed());
    }
    Ok(value)
}

fn timestamp(row: &[Value], index: usize) -> Result<i64, DataSourceError> {
    row.get(index)
        .and_then(Value::as_i64)
        .ok_or_else(|| DataSourceError::Malformed {
            message: format!("kline field {} is not a timestamp", index),
        })
}

/// Parse kline rows `[open_time, open, high, low, close, volume, close_time, ...]`.
///
/// Rows whose close_time is not yet in the past are still forming and are
/// dropped. At most the `limit` newest candles are kept.
pub fn parse_klines(
    rows: &[Value],
    now_ms: i64,
    limit: usize,
) -> Result<CandleSeries, DataSourceError> {
    let mut candles = Vec::with_capacity(rows.len());

    for row in rows {
        let row = row.as_array().ok_or_else(|| DataSourceError::Malformed {
            message: "kline row is not an array".to_string(),
        })?;

        if timestamp(row, 6)? >= now_ms {
            continue;
        }

        candles.push(Candle::new(
            timestamp(row, 0)?,
            number(row, 1)?,
            number(row, 2)?,
            number(row, 3)?,
            number(row, 4)?,
            number(row, 5)?,
        ));
    }

    let mut series = CandleSeries::new(candles)?;
    series.truncate_front(limit);
    Ok(series)
}

#[async_trait]
impl MarketDataSource for BinanceKlineSource {
    async fn fetch_recent_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<CandleSeries, DataSourceError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        // one extra row covers the candle that is still forming
        let request_limit = (limit + 1).to_string();
        let pair = exchange_symbol(symbol);

        debug!("GET {} symbol={} interval={} limit={}", url, pair, timeframe, request_limit);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", pair.as_str()),
                ("interval", timeframe),
                ("limit", request_limit.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataSourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<Value> = response.json().await?;
        parse_klines(&rows, self.clock.now_ms(), limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SeriesError;
    use serde_json::json;

    fn row(open_time: i64, close: &str, close_time: i64) -> Value {
        json!([
            open_time, "100.0", "101.5", "99.5", close, "12.5", close_time,
            "1250.0", 42, "6.0", "600.0", "0"
        ])
    }

    #[test]
    fn test_exchange_symbol() {
        assert_eq!(exchange_symbol("BTC/USDT"), "BTCUSDT");
        assert_eq!(exchange_symbol("eth-usdt"), "ETHUSDT");
        assert_eq!(exchange_symbol("SOLUSDT"), "SOLUSDT");
    }

    #[test]
    fn test_parse_drops_forming_candle() {
        let rows = vec![
            row(0, "100.5", 299_999),
            row(300_000, "101.0", 599_999),
            row(600_000, "101.2", 899_999),
        ];

        let series = parse_klines(&rows, 700_000, 10).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.latest_open_time(), Some(300_000));
        assert_eq!(series.last().map(|c| c.close), Some(101.0));
        assert_eq!(series.candles()[0].high, 101.5);
    }

    #[test]
    fn test_parse_truncates_to_limit() {
        let rows: Vec<Value> = (0..5)
            .map(|i| row(i * 300_000, "100.0", i * 300_000 + 299_999))
            .collect();

        let series = parse_klines(&rows, i64::MAX, 3).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.candles()[0].open_time, 600_000);
    }

    #[test]
    fn test_parse_rejects_malformed_rows() {
        let rows = vec![json!({"open_time": 0})];
        assert!(matches!(
            parse_klines(&rows, i64::MAX, 10),
            Err(DataSourceError::Malformed { .. })
        ));

        let rows = vec![row(0, "not-a-number", 299_999)];
        assert!(matches!(
            parse_klines(&rows, i64::MAX, 10),
            Err(DataSourceError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_non_finite_prices() {
        for bad in ["NaN", "inf", "-inf"] {
            let rows = vec![row(0, bad, 299_999)];
            assert!(
                matches!(
                    parse_klines(&rows, i64::MAX, 10),
                    Err(DataSourceError::Malformed { .. })
                ),
                "{bad} was accepted"
            );
        }
    }

    #[test]
    fn test_parse_rejects_out_of_order_rows() {
        let rows = vec![row(300_000, "1.0", 599_999), row(0, "1.0", 299_999)];
        assert!(matches!(
            parse_klines(&rows, i64::MAX, 10),
            Err(DataSourceError::Series(SeriesError::OutOfOrder { .. }))
        ));
    }
}
