//! Amount comparison between the ledger and provider reports.
//!
//! The ledger stores whole VND. Providers report either VND scaled by 100
//! (VNPay), plain VND (ZaloPay) or USD converted at a fixed rate (PayPal).
//! Every comparison happens in the reported currency's major unit.

use serde::{Deserialize, Serialize};

/// Maximum absolute difference, in major units, still treated as equal.
pub const AMOUNT_EPSILON: f64 = 0.01;

/// Fixed approximate conversion rate used for USD checkouts.
pub const DEFAULT_VND_PER_USD: f64 = 25_000.0;

/// Currency a provider reports amounts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Vnd,
    Usd,
}

/// An amount claimed by an inbound signal, in major units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportedAmount {
    pub currency: Currency,
    pub value: f64,
}

impl ReportedAmount {
    pub fn vnd(value: f64) -> Self {
        Self {
            currency: Currency::Vnd,
            value,
        }
    }

    pub fn usd(value: f64) -> Self {
        Self {
            currency: Currency::Usd,
            value,
        }
    }

    /// Builds an amount from a value scaled by 100 (VNPay `vnp_Amount`).
    pub fn from_hundredths(currency: Currency, hundredths: i64) -> Self {
        Self {
            currency,
            value: hundredths as f64 / 100.0,
        }
    }
}

/// VND/USD conversion used both when creating USD checkouts and when
/// checking the amounts those checkouts report back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeRate {
    vnd_per_usd: f64,
}

impl ExchangeRate {
    pub fn new(vnd_per_usd: f64) -> Self {
        Self { vnd_per_usd }
    }

    pub fn vnd_per_usd(&self) -> f64 {
        self.vnd_per_usd
    }

    /// Converts whole VND to USD rounded to cents.
    pub fn vnd_to_usd(&self, amount_vnd: i64) -> f64 {
        round_cents(amount_vnd as f64 / self.vnd_per_usd)
    }

    /// The ledger amount expressed in `currency`.
    pub fn expected_in(&self, amount_vnd: i64, currency: Currency) -> f64 {
        match currency {
            Currency::Vnd => amount_vnd as f64,
            Currency::Usd => self.vnd_to_usd(amount_vnd),
        }
    }
}

impl Default for ExchangeRate {
    fn default() -> Self {
        Self::new(DEFAULT_VND_PER_USD)
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// True when two major-unit amounts differ by less than [`AMOUNT_EPSILON`].
pub fn amounts_match(expected: f64, reported: f64) -> bool {
    (expected - reported).abs() < AMOUNT_EPSILON
}

/// Checks a reported amount against the ledger amount of the payment.
pub fn reported_amount_matches(
    ledger_amount_vnd: i64,
    reported: &ReportedAmount,
    rate: &ExchangeRate,
) -> bool {
    amounts_match(rate.expected_in(ledger_amount_vnd, reported.currency), reported.value)
}
