//! Price Tick and Valuation Types
//!
//! Core domain types for the tick fan-out path: the decoded tick as it
//! arrives from the bus, a user's profile with held coins, and the
//! valuation document pushed to a session whenever a followed symbol
//! updates.
//!
//! # Wire shapes
//!
//! Bus payload: `{"s": "btcusdt", "p": "50000.0"}`, optionally carrying
//! a `"user_id"` for direct per-user delivery.
//!
//! Push document: `{"ID": .., "Name": .., "Coins": {"Quantities": {..},
//! "Prices": {..}, "Totals": {..}}}` — only symbols with a cached price
//! appear in the maps.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Types
// =============================================================================

/// A topic string identifying one price stream (lowercase trading pair).
pub type Symbol = String;

/// Unique identifier for a user.
pub type UserId = u64;

/// One price update for a symbol, decoded from the bus payload.
///
/// Immutable once created. `user_id` is present only in the direct-push
/// variant where the publisher targets a single session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tick {
    /// Symbol the price belongs to.
    #[serde(rename = "s")]
    pub symbol: Symbol,
    /// Last traded price.
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Target user for direct delivery, if any.
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// One coin position held by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    /// Lowercase trading pair.
    pub symbol: Symbol,
    /// Held quantity.
    pub quantity: Decimal,
}

/// A user's profile as supplied by the profile store at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Tracked coin positions.
    pub coins: Vec<Holding>,
}

// =============================================================================
// Push Document
// =============================================================================

/// Per-symbol quantity/price/total maps of a valuation push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinsSnapshot {
    /// Held quantity per symbol.
    #[serde(rename = "Quantities")]
    pub quantities: HashMap<Symbol, Decimal>,
    /// Last known price per symbol.
    #[serde(rename = "Prices")]
    pub prices: HashMap<Symbol, Decimal>,
    /// Price × quantity per symbol.
    #[serde(rename = "Totals")]
    pub totals: HashMap<Symbol, Decimal>,
}

/// The document pushed to a session whenever a followed symbol updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationUpdate {
    /// User id.
    #[serde(rename = "ID")]
    pub id: UserId,
    /// Display name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Valuations for every symbol with a cached price.
    #[serde(rename = "Coins")]
    pub coins: CoinsSnapshot,
}

impl ValuationUpdate {
    /// Build a valuation from a profile and the session's price cache.
    ///
    /// Symbols without a cached price are omitted; a price arrives for
    /// them once their first tick is dispatched.
    #[must_use]
    pub fn compute(profile: &UserProfile, prices: &HashMap<Symbol, Decimal>) -> Self {
        let mut coins = CoinsSnapshot::default();

        for holding in &profile.coins {
            if let Some(price) = prices.get(&holding.symbol) {
                coins
                    .quantities
                    .insert(holding.symbol.clone(), holding.quantity);
                coins.prices.insert(holding.symbol.clone(), *price);
                coins
                    .totals
                    .insert(holding.symbol.clone(), *price * holding.quantity);
            }
        }

        Self {
            id: profile.id,
            name: profile.name.clone(),
            coins,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
