//! Domain Entities for Dustsweep
//!
//! The per-request records that flow through a sweep: dust tokens going in,
//! quotes and transaction descriptors coming out, and the ledger that
//! accumulates them.

use crate::value_objects::{decode_hex_amount, scale_amount, u128_string, Address, DomainError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Dust Token
// =============================================================================

/// A low-value token balance targeted for liquidation.
///
/// # Invariants
/// - `price > 0`
/// - decoded amount > 0
///
/// Checked by [`DustToken::validate`]; the token is immutable for the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DustToken {
    /// Token contract address
    pub address: Address,
    /// Ticker symbol (display only)
    pub symbol: String,
    /// ERC-20 decimals
    pub decimals: u8,
    /// Balance in smallest units, hex encoded
    pub raw_amount_hex: String,
    /// USD price per whole token
    pub price: Decimal,
}

impl DustToken {
    /// Decode the raw balance in smallest units.
    pub fn raw_amount(&self) -> Result<u128, DomainError> {
        decode_hex_amount(&self.raw_amount_hex)
    }

    /// Balance in whole tokens.
    pub fn amount(&self) -> Result<Decimal, DomainError> {
        scale_amount(self.raw_amount()?, self.decimals)
    }

    /// USD value of the balance (`amount * price`).
    pub fn value_usd(&self) -> Result<Decimal, DomainError> {
        let amount = self.amount()?;
        amount
            .checked_mul(self.price)
            .ok_or_else(|| DomainError::InvalidAmount(format!("{} value overflows", self.symbol)))
    }

    /// Check the token invariants.
    ///
    /// # Errors
    /// - `InvalidPrice` if price <= 0
    /// - `InvalidAmount` if the balance does not decode or is zero
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.price <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice(format!(
                "{} ({}) has non-positive price {}",
                self.symbol, self.address, self.price
            )));
        }

        if self.raw_amount()? == 0 {
            return Err(DomainError::InvalidAmount(format!(
                "{} ({}) has zero balance",
                self.symbol, self.address
            )));
        }

        Ok(())
    }
}

// =============================================================================
// Quote
// =============================================================================

/// A swap route offered by one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Provider that produced the route
    pub provider: String,
    /// Expected output in target-token smallest units (decimal string)
    pub to_amount_raw: String,
    /// Expected output in USD
    pub to_usd: Decimal,
    /// Estimated gas cost in USD
    pub gas_cost_usd: Decimal,
    /// Spender that must be approved for the input token
    pub approve_target: Address,
    /// Contract the swap call is sent to
    pub call_target: Address,
    /// Swap calldata (0x-hex)
    pub call_data: String,
    /// Native value attached to the swap call (smallest units)
    #[serde(default, with = "u128_string")]
    pub value: u128,
    /// Gas limit suggested by the provider
    pub gas_limit: u64,
}

impl Quote {
    /// Net value used for ranking: `to_usd - gas_cost_usd`.
    pub fn net_value(&self) -> Decimal {
        self.to_usd - self.gas_cost_usd
    }
}

// =============================================================================
// Transaction Descriptor
// =============================================================================

/// An unsigned on-chain transaction, ready for an external signer.
///
/// The serialized shape is consumed by downstream signing tools:
///
/// ```text
/// { "to": "0x..", "value": "123", "data": "0x..", "description": "..", "gasLimit": "65000" }
/// ```
///
/// # Invariants
/// - `to` is a well-formed address
/// - `value` and `gasLimit` parse as non-negative integers
/// - `data`, when present, is 0x-prefixed hex
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDescriptor {
    /// Recipient contract or account
    pub to: Address,
    /// Native value in smallest units (decimal string)
    pub value: String,
    /// Calldata (0x-hex)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Human-readable description
    pub description: String,
    /// Gas limit (decimal string)
    pub gas_limit: String,
}

impl TransactionDescriptor {
    /// Create a descriptor from typed parts.
    pub fn new(
        to: Address,
        value: u128,
        data: Option<String>,
        description: impl Into<String>,
        gas_limit: u64,
    ) -> Self {
        Self {
            to,
            value: value.to_string(),
            data,
            description: description.into(),
            gas_limit: gas_limit.to_string(),
        }
    }

    /// Check the descriptor shape invariants.
    pub fn validate(&self) -> Result<(), DomainError> {
        self.value.parse::<u128>().map_err(|_| {
            DomainError::InvalidTransaction(format!("value is not a non-negative integer: {}", self.value))
        })?;

        self.gas_limit.parse::<u64>().map_err(|_| {
            DomainError::InvalidTransaction(format!("gasLimit is not an integer: {}", self.gas_limit))
        })?;

        if let Some(data) = &self.data {
            let body = data.strip_prefix("0x").ok_or_else(|| {
                DomainError::InvalidTransaction("data must be 0x-prefixed".to_string())
            })?;
            if body.len() % 2 != 0 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(DomainError::InvalidTransaction(format!("data is not hex: {}", data)));
            }
        }

        Ok(())
    }
}

impl fmt::Display for TransactionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} (value {})", self.description, self.to, self.value)
    }
}

// =============================================================================
// Fee Breakdown
// =============================================================================

/// Protocol and referrer fee legs, in USD and in native smallest units.
///
/// # Invariants
/// - `referrer_fee_wei + treasury_fee_wei == total_fee_wei` exactly
/// - without a referral, `referrer_fee_wei == 0`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    /// Total fee in USD
    pub total_fee_usd: Decimal,
    /// Referrer share in USD
    pub referrer_fee_usd: Decimal,
    /// Treasury share in USD
    pub treasury_fee_usd: Decimal,
    /// Total fee in whole native units
    pub total_fee_native: Decimal,
    /// Total fee in native smallest units
    #[serde(with = "u128_string")]
    pub total_fee_wei: u128,
    /// Referrer share in native smallest units
    #[serde(with = "u128_string")]
    pub referrer_fee_wei: u128,
    /// Treasury share in native smallest units
    #[serde(with = "u128_string")]
    pub treasury_fee_wei: u128,
    /// Referrer receiving the referrer leg
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_address: Option<Address>,
    /// Whether a referrer leg exists
    pub has_referral: bool,
}

impl FeeBreakdown {
    /// Check that the integer legs sum exactly to the total.
    pub fn legs_balance(&self) -> bool {
        self.referrer_fee_wei.checked_add(self.treasury_fee_wei) == Some(self.total_fee_wei)
    }
}

// =============================================================================
// Insertion Strategy
// =============================================================================

/// How fee insertion points were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertionMode {
    /// Points drawn from a secure random source inside the safe window
    Random,
    /// No usable random window; points placed without the threshold guarantee
    Fallback,
}

impl fmt::Display for InsertionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertionMode::Random => write!(f, "random"),
            InsertionMode::Fallback => write!(f, "fallback"),
        }
    }
}

/// Concrete placement technique behind an [`InsertionMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Distinct uniform draws from `[threshold, total)`
    Uniform,
    /// Window too small: consecutive points with small random gaps
    SequentialJitter,
    /// Threshold at or past the sequence end: fixed tail placement
    Deterministic,
}

/// Planning inputs and diagnostics recorded alongside the points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertionMetadata {
    /// Placement technique
    pub placement: Placement,
    /// Number of dust tokens planned over
    pub token_count: usize,
    /// Swap transactions planned over (excluding fees)
    pub total_tx_count: usize,
    /// Fee transactions to place
    pub fee_tx_count: usize,
    /// Total fee in whole native units
    pub total_fee_native: Decimal,
    /// Size of `[threshold, total)`
    pub window_size: usize,
}

/// Where fee transactions are spliced into the final sequence.
///
/// # Invariants
/// - `insertion_points` strictly increasing
/// - `Random` mode: every point in `[minimum_threshold, total_tx_count)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertionStrategy {
    /// Lowest index a random-mode point may take
    pub minimum_threshold: usize,
    /// Target index for each fee transaction, in fee order
    pub insertion_points: Vec<usize>,
    /// Placement mode
    pub mode: InsertionMode,
    /// Planning diagnostics
    pub metadata: InsertionMetadata,
}

// =============================================================================
// Batch Result
// =============================================================================

/// Value lost between a token's input value and its swap output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingLoss {
    /// `amount * price`
    pub input_value_usd: Decimal,
    /// `to_usd - gas_cost_usd`
    pub output_value_usd: Decimal,
    /// `input - output`
    pub loss_usd: Decimal,
    /// Loss as a percentage of input (0 when input is 0)
    pub loss_percent: Decimal,
}

impl TradingLoss {
    /// Compute loss figures; a zero input yields a zero percentage.
    pub fn compute(input_value_usd: Decimal, output_value_usd: Decimal) -> Self {
        let loss_usd = input_value_usd - output_value_usd;
        let loss_percent = if input_value_usd.is_zero() {
            Decimal::ZERO
        } else {
            (loss_usd / input_value_usd * Decimal::ONE_HUNDRED).round_dp(4)
        };

        Self {
            input_value_usd,
            output_value_usd,
            loss_usd,
            loss_percent,
        }
    }
}

/// A token that swapped successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapOutcome {
    /// Position of the token in input order
    pub token_index: usize,
    /// The token
    pub token: DustToken,
    /// Selected route
    pub quote: Quote,
    /// Approve + swap transactions for this token
    pub transactions: Vec<TransactionDescriptor>,
    /// Loss figures
    pub trading_loss: TradingLoss,
}

/// A token whose pipeline failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedToken {
    /// Position of the token in input order
    pub token_index: usize,
    /// The token
    pub token: DustToken,
    /// Failure description
    pub error: String,
}

/// The accumulating ledger of a sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// Tokens that produced transactions
    pub successful: Vec<SwapOutcome>,
    /// Tokens that failed
    pub failed: Vec<FailedToken>,
    /// Full ordered transaction sequence, fees included
    pub transactions: Vec<TransactionDescriptor>,
    /// Sum of successful output values in USD
    pub total_value_usd: Decimal,
}

impl BatchResult {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful token and append its transactions.
    pub fn record_success(&mut self, outcome: SwapOutcome) {
        self.total_value_usd += outcome.trading_loss.output_value_usd;
        self.transactions.extend(outcome.transactions.iter().cloned());
        self.successful.push(outcome);
    }

    /// Record a failed token.
    pub fn record_failure(&mut self, failure: FailedToken) {
        self.failed.push(failure);
    }

    /// Number of tokens processed so far.
    pub fn processed(&self) -> usize {
        self.successful.len() + self.failed.len()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn token(raw_amount_hex: &str, price: Decimal) -> DustToken {
        DustToken {
            address: Address::parse("0x1f9840a85d5aF5bf1D1762F925BDADdC4201F984").unwrap(),
            symbol: "UNI".to_string(),
            decimals: 18,
            raw_amount_hex: raw_amount_hex.to_string(),
            price,
        }
    }

    #[test]
    fn test_dust_token_value() {
        // 0.5 UNI at $8
        let t = token("0x06f05b59d3b20000", dec!(8));
        assert_eq!(t.amount().unwrap(), dec!(0.5));
        assert_eq!(t.value_usd().unwrap(), dec!(4));
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_dust_token_rejects_zero_price_and_amount() {
        assert!(matches!(
            token("0x01", Decimal::ZERO).validate(),
            Err(DomainError::InvalidPrice(_))
        ));
        assert!(matches!(
            token("0x0", dec!(1)).validate(),
            Err(DomainError::InvalidAmount(_))
        ));
        assert!(token("garbage", dec!(1)).validate().is_err());
    }

    #[test]
    fn test_dust_token_deserializes_camel_case() {
        let json = r#"{
            "address": "0x1f9840a85d5aF5bf1D1762F925BDADdC4201F984",
            "symbol": "UNI",
            "decimals": 18,
            "rawAmountHex": "0x0de0b6b3a7640000",
            "price": 7.25
        }"#;
        let t: DustToken = serde_json::from_str(json).unwrap();
        assert_eq!(t.amount().unwrap(), dec!(1));
        assert_eq!(t.price, dec!(7.25));
    }

    #[test]
    fn test_quote_net_value() {
        let quote = Quote {
            provider: "lifi".to_string(),
            to_amount_raw: "1000".to_string(),
            to_usd: dec!(10.5),
            gas_cost_usd: dec!(0.5),
            approve_target: Address::parse("0x1231DEB6f5749EF6cE6943a275A1D3E7486F4EaE").unwrap(),
            call_target: Address::parse("0x1231DEB6f5749EF6cE6943a275A1D3E7486F4EaE").unwrap(),
            call_data: "0x".to_string(),
            value: 0,
            gas_limit: 300_000,
        };
        assert_eq!(quote.net_value(), dec!(10));
    }

    #[test]
    fn test_transaction_descriptor_shape() {
        let tx = TransactionDescriptor::new(
            Address::parse("0x4200000000000000000000000000000000000006").unwrap(),
            1_000,
            Some("0xd0e30db0".to_string()),
            "Wrap fee",
            50_000,
        );
        assert!(tx.validate().is_ok());

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["value"], "1000");
        assert_eq!(json["gasLimit"], "50000");
        assert_eq!(json["data"], "0xd0e30db0");
        assert_eq!(json["to"], "0x4200000000000000000000000000000000000006");
    }

    #[test]
    fn test_transaction_descriptor_omits_empty_data() {
        let tx = TransactionDescriptor::new(
            Address::parse("0x4200000000000000000000000000000000000006").unwrap(),
            0,
            None,
            "Plain transfer",
            21_000,
        );
        let json = serde_json::to_value(&tx).unwrap();
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_transaction_descriptor_rejects_bad_value() {
        let mut tx = TransactionDescriptor::new(
            Address::parse("0x4200000000000000000000000000000000000006").unwrap(),
            0,
            Some("0xabc".to_string()),
            "Odd calldata",
            21_000,
        );
        assert!(tx.validate().is_err());

        tx.data = None;
        tx.value = "-5".to_string();
        assert!(tx.validate().is_err());
    }

    #[test]
    fn test_trading_loss_zero_input() {
        let loss = TradingLoss::compute(Decimal::ZERO, dec!(1));
        assert_eq!(loss.loss_percent, Decimal::ZERO);
        assert_eq!(loss.loss_usd, dec!(-1));
    }

    #[test]
    fn test_trading_loss_percent() {
        let loss = TradingLoss::compute(dec!(10), dec!(9.5));
        assert_eq!(loss.loss_usd, dec!(0.5));
        assert_eq!(loss.loss_percent, dec!(5));
    }

    #[test]
    fn test_fee_breakdown_serializes_wei_as_strings() {
        let fees = FeeBreakdown {
            total_fee_usd: dec!(0.1),
            referrer_fee_usd: dec!(0.07),
            treasury_fee_usd: dec!(0.03),
            total_fee_native: dec!(0.0000333),
            total_fee_wei: 33_333_333_333_333,
            referrer_fee_wei: 23_333_333_333_333,
            treasury_fee_wei: 10_000_000_000_000,
            referral_address: None,
            has_referral: true,
        };
        assert!(fees.legs_balance());

        let json = serde_json::to_value(&fees).unwrap();
        assert_eq!(json["totalFeeWei"], "33333333333333");
    }
}
