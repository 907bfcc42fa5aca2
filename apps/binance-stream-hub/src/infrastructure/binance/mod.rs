//! Binance WebSocket Feed
//!
//! Maintains long-lived connections to Binance's combined stream
//! endpoints and forwards raw frames downstream. Frames are never
//! decoded here; the aggregator service owns that.
//!
//! # Stream URLs
//!
//! - Per-symbol trades: `wss://stream.binance.com:9443/ws/<symbol>@aggTrade`
//! - All-symbol ticker: `wss://stream.binance.com:9443/ws/!miniTicker@arr`

pub mod producer;

pub use producer::{FeedError, FeedEvent, FeedProducer};

/// Stream URL for one symbol's aggregated trades.
#[must_use]
pub fn agg_trade_url(base: &str, symbol: &str) -> String {
    format!("{base}/ws/{symbol}@aggTrade")
}

/// Stream URL for the unfiltered mini-ticker firehose.
#[must_use]
pub fn mini_ticker_url(base: &str) -> String {
    format!("{base}/ws/!miniTicker@arr")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agg_trade_url_embeds_symbol() {
        assert_eq!(
            agg_trade_url("wss://stream.binance.com:9443", "btcusdt"),
            "wss://stream.binance.com:9443/ws/btcusdt@aggTrade"
        );
    }

    #[test]
    fn mini_ticker_url_is_firehose() {
        assert_eq!(
            mini_ticker_url("wss://stream.binance.com:9443"),
            "wss://stream.binance.com:9443/ws/!miniTicker@arr"
        );
    }
}
