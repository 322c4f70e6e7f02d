//! # Currency Domain & Settlement Conversion
//!
//! The platform accepts donations in three currencies and settles
//! internally in Rwandan francs (RWF). This module owns:
//!
//! - the [`Currency`] set and its wire codes,
//! - the gateway-family routing rule ([`gateway_for`]): card-network
//!   currencies vs. the mobile-money rail,
//! - the injected [`RateTable`] used to compute the settlement-currency
//!   amount recorded on every donation.
//!
//! The rate table is explicit dependency-injected state: constructed once
//! at process start (with static defaults) and passed into the components
//! that need it. There are no module-level globals. Conversion is pure —
//! no I/O, no clock.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from currency parsing and conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CurrencyError {
    /// The currency code is not one the platform accepts.
    #[error("unsupported currency: {code}")]
    UnsupportedCurrency {
        /// The offending code as received.
        code: String,
    },

    /// No conversion rate is configured for this currency pair.
    #[error("no conversion rate from {from} to {to}")]
    UnsupportedPair {
        /// Source currency.
        from: Currency,
        /// Target currency.
        to: Currency,
    },
}

/// A currency the platform accepts donations in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Rwandan franc — the settlement currency.
    #[serde(rename = "RWF")]
    Rwf,
    /// US dollar.
    #[serde(rename = "USD")]
    Usd,
    /// Euro.
    #[serde(rename = "EUR")]
    Eur,
}

impl Currency {
    /// The internal settlement currency.
    pub const SETTLEMENT: Currency = Currency::Rwf;

    /// ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rwf => "RWF",
            Self::Usd => "USD",
            Self::Eur => "EUR",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RWF" => Ok(Self::Rwf),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            other => Err(CurrencyError::UnsupportedCurrency {
                code: other.to_string(),
            }),
        }
    }
}

/// Which gateway family a charge must route through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    /// Card-network gateway (USD / EUR).
    Card,
    /// Mobile-money gateway (RWF).
    MobileMoney,
}

impl std::fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Card => f.write_str("card"),
            Self::MobileMoney => f.write_str("mobile_money"),
        }
    }
}

/// Select the gateway family for a currency.
///
/// USD and EUR donations go through the card network; RWF donations go
/// through the mobile-money rail. Total over [`Currency`] — unknown codes
/// are rejected earlier, at the parse boundary.
pub fn gateway_for(currency: Currency) -> GatewayKind {
    match currency {
        Currency::Usd | Currency::Eur => GatewayKind::Card,
        Currency::Rwf => GatewayKind::MobileMoney,
    }
}

/// Result of a settlement-currency conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    /// Converted amount in minor units of the target currency,
    /// rounded to 2 decimal places.
    pub local_amount_minor: i64,
    /// The applied rate, rounded to 4 decimal places for reporting.
    pub exchange_rate: f64,
}

/// Static exchange-rate table keyed by currency pair.
///
/// Same-currency pairs always convert at 1.0 and need no entry.
#[derive(Debug, Clone)]
pub struct RateTable {
    rates: HashMap<(Currency, Currency), f64>,
}

impl RateTable {
    /// An empty table with no pairs configured.
    pub fn empty() -> Self {
        Self {
            rates: HashMap::new(),
        }
    }

    /// The platform's static default rates: USD→RWF 1300, EUR→RWF 1400,
    /// and their reciprocals.
    pub fn with_defaults() -> Self {
        let mut table = Self::empty();
        table.insert(Currency::Usd, Currency::Rwf, 1300.0);
        table.insert(Currency::Eur, Currency::Rwf, 1400.0);
        table
    }

    /// Register a rate and its reciprocal.
    pub fn insert(&mut self, from: Currency, to: Currency, rate: f64) {
        self.rates.insert((from, to), rate);
        self.rates.insert((to, from), 1.0 / rate);
    }

    /// Look up the unrounded rate for a pair.
    pub fn rate(&self, from: Currency, to: Currency) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        self.rates.get(&(from, to)).copied()
    }

    /// Convert an amount between two currencies.
    ///
    /// `amount_minor` is in minor units (2 decimals) of `from`; the result
    /// is in minor units of `to`, rounded. The reported `exchange_rate` is
    /// rounded to 4 decimal places, but the conversion itself uses the
    /// unrounded table rate so reciprocal conversions round-trip.
    ///
    /// # Errors
    ///
    /// [`CurrencyError::UnsupportedPair`] if no rate entry exists.
    pub fn convert_between(
        &self,
        amount_minor: i64,
        from: Currency,
        to: Currency,
    ) -> Result<Conversion, CurrencyError> {
        let rate = self
            .rate(from, to)
            .ok_or(CurrencyError::UnsupportedPair { from, to })?;
        Ok(Conversion {
            local_amount_minor: ((amount_minor as f64) * rate).round() as i64,
            exchange_rate: (rate * 10_000.0).round() / 10_000.0,
        })
    }

    /// Convert an amount into the RWF settlement currency.
    ///
    /// This is the conversion recorded on every donation
    /// (`local_amount` / `exchange_rate`).
    pub fn convert(&self, amount_minor: i64, from: Currency) -> Result<Conversion, CurrencyError> {
        self.convert_between(amount_minor, from, Currency::SETTLEMENT)
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn usd_to_settlement_at_default_rate() {
        let rates = RateTable::with_defaults();
        // 50.00 USD → 65,000.00 RWF at 1300.
        let conv = rates.convert(5_000, Currency::Usd).expect("rate exists");
        assert_eq!(conv.local_amount_minor, 6_500_000);
        assert_eq!(conv.exchange_rate, 1300.0);
    }

    #[test]
    fn settlement_currency_converts_at_identity() {
        let rates = RateTable::with_defaults();
        let conv = rates.convert(12_345, Currency::Rwf).expect("identity");
        assert_eq!(conv.local_amount_minor, 12_345);
        assert_eq!(conv.exchange_rate, 1.0);
    }

    #[test]
    fn reciprocal_rate_is_reported_at_four_decimals() {
        let rates = RateTable::with_defaults();
        let conv = rates
            .convert_between(6_500_000, Currency::Rwf, Currency::Usd)
            .expect("reciprocal exists");
        assert_eq!(conv.local_amount_minor, 5_000);
        assert_eq!(conv.exchange_rate, 0.0008); // 1/1300 ≈ 0.000769 → 0.0008
    }

    #[test]
    fn missing_pair_is_unsupported() {
        let rates = RateTable::with_defaults();
        let err = rates
            .convert_between(1_000, Currency::Usd, Currency::Eur)
            .unwrap_err();
        assert!(matches!(err, CurrencyError::UnsupportedPair { .. }));
    }

    #[test]
    fn empty_table_rejects_everything_but_identity() {
        let rates = RateTable::empty();
        assert!(rates.convert(1_000, Currency::Usd).is_err());
        assert!(rates.convert(1_000, Currency::Rwf).is_ok());
    }

    #[test]
    fn gateway_routing_matches_currency_family() {
        assert_eq!(gateway_for(Currency::Usd), GatewayKind::Card);
        assert_eq!(gateway_for(Currency::Eur), GatewayKind::Card);
        assert_eq!(gateway_for(Currency::Rwf), GatewayKind::MobileMoney);
    }

    #[test]
    fn currency_parses_case_insensitively() {
        assert_eq!("usd".parse::<Currency>().expect("parses"), Currency::Usd);
        assert!(matches!(
            "GBP".parse::<Currency>(),
            Err(CurrencyError::UnsupportedCurrency { .. })
        ));
    }

    proptest! {
        // Round-trip: converting A→B→A lands within one minor unit per leg.
        #[test]
        fn conversion_round_trips_within_rounding_tolerance(
            amount_minor in 1i64..=10_000_000,
            from in prop_oneof![Just(Currency::Usd), Just(Currency::Eur)],
        ) {
            let rates = RateTable::with_defaults();
            let there = rates.convert(amount_minor, from).expect("rate");
            let back = rates
                .convert_between(there.local_amount_minor, Currency::Rwf, from)
                .expect("reciprocal");
            // Each leg rounds to a minor unit; the forward rate is >= 1300,
            // so the round trip can be off by at most one minor unit.
            prop_assert!((back.local_amount_minor - amount_minor).abs() <= 1);
        }
    }
}
