//! Fee calculation.
//!
//! Converts a USD notional into a protocol fee, splits it between an optional
//! referrer and the treasury, and expresses each leg in native smallest
//! units.
//!
//! # Exact split
//!
//! ```text
//! total_wei    = floor(total_fee_usd / native_price * 10^18)
//! referrer_wei = floor(total_wei * 70 / 100)
//! treasury_wei = total_wei - referrer_wei
//! ```
//!
//! The treasury leg is the remainder, so the legs always sum to the total.

use dustsweep_domain::{Address, FeeBreakdown, TransactionDescriptor};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::sequence::TransactionSequenceBuilder;

/// Protocol fee as a fraction of the notional (1 basis point).
pub const FEE_RATE: Decimal = dec!(0.0001);

/// Referrer share numerator.
pub const REFERRER_SHARE_NUMERATOR: u128 = 70;

/// Referrer share denominator.
pub const REFERRER_SHARE_DENOMINATOR: u128 = 100;

/// Decimals of the native asset (and its wrapped form).
pub const NATIVE_DECIMALS: u32 = 18;

/// Computes fee legs and the transactions that pay them.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeeCalculator;

impl FeeCalculator {
    /// Create a calculator using the fixed fee policy.
    pub fn new() -> Self {
        Self
    }

    /// Compute the fee breakdown for a sweep.
    ///
    /// # Arguments
    ///
    /// * `total_value_usd` - Pre-swap notional of the whole dust set
    /// * `native_price_usd` - USD price of the chain's native asset
    /// * `referral` - Referrer receiving the referrer share, if any
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `total_value_usd < 0`, `native_price_usd <= 0`, or
    /// the fee does not fit in the integer range.
    pub fn compute_fees(
        &self,
        total_value_usd: Decimal,
        native_price_usd: Decimal,
        referral: Option<&Address>,
    ) -> EngineResult<FeeBreakdown> {
        if total_value_usd < Decimal::ZERO {
            return Err(EngineError::InvalidInput(format!(
                "total value must be non-negative, got {}",
                total_value_usd
            )));
        }
        if native_price_usd <= Decimal::ZERO {
            return Err(EngineError::InvalidInput(format!(
                "native asset price must be positive, got {}",
                native_price_usd
            )));
        }

        let total_fee_usd = total_value_usd * FEE_RATE;
        let total_fee_native = total_fee_usd
            .checked_div(native_price_usd)
            .ok_or_else(|| EngineError::InvalidInput("fee conversion overflowed".to_string()))?;
        let total_fee_wei = to_smallest_unit(total_fee_native)?;

        let (referrer_fee_wei, referrer_fee_usd) = match referral {
            Some(_) => {
                let wei = total_fee_wei
                    .checked_mul(REFERRER_SHARE_NUMERATOR)
                    .ok_or_else(|| EngineError::InvalidInput("referrer share overflowed".to_string()))?
                    / REFERRER_SHARE_DENOMINATOR;
                let usd = total_fee_usd * Decimal::from(REFERRER_SHARE_NUMERATOR as u64)
                    / Decimal::from(REFERRER_SHARE_DENOMINATOR as u64);
                (wei, usd)
            }
            None => (0, Decimal::ZERO),
        };

        let breakdown = FeeBreakdown {
            total_fee_usd,
            referrer_fee_usd,
            treasury_fee_usd: total_fee_usd - referrer_fee_usd,
            total_fee_native,
            total_fee_wei,
            referrer_fee_wei,
            treasury_fee_wei: total_fee_wei - referrer_fee_wei,
            referral_address: referral.cloned(),
            has_referral: referral.is_some(),
        };

        debug!(
            total_fee_usd = %breakdown.total_fee_usd,
            total_fee_wei = breakdown.total_fee_wei,
            has_referral = breakdown.has_referral,
            "Computed fee breakdown"
        );

        Ok(breakdown)
    }

    /// Build the fee transactions, in order: wrap, referrer transfer (if
    /// any), treasury transfer.
    ///
    /// A zero total fee yields no transactions.
    ///
    /// # Errors
    ///
    /// `UnsupportedChain` if `wrapped_native` is `None`.
    pub fn build_fee_transactions(
        &self,
        fees: &FeeBreakdown,
        chain_id: u64,
        treasury: &Address,
        wrapped_native: Option<&Address>,
    ) -> EngineResult<Vec<TransactionDescriptor>> {
        let wrapped = wrapped_native.ok_or(EngineError::UnsupportedChain(chain_id))?;

        if fees.total_fee_wei == 0 {
            return Ok(Vec::new());
        }

        let mut builder = TransactionSequenceBuilder::new();
        builder.add_wrap_deposit(wrapped, fees.total_fee_wei)?;

        match &fees.referral_address {
            Some(referrer) if fees.has_referral => {
                builder.add_transfer(wrapped, referrer, fees.referrer_fee_wei, "Referrer fee")?;
                builder.add_transfer(wrapped, treasury, fees.treasury_fee_wei, "Protocol fee")?;
            }
            _ => {
                builder.add_transfer(wrapped, treasury, fees.total_fee_wei, "Protocol fee")?;
            }
        }

        Ok(builder.build())
    }
}

/// Truncate a whole-unit native amount to smallest units.
fn to_smallest_unit(amount: Decimal) -> EngineResult<u128> {
    let scale = Decimal::from(10u64.pow(NATIVE_DECIMALS));
    amount
        .checked_mul(scale)
        .and_then(|wei| wei.trunc().to_u128())
        .ok_or_else(|| EngineError::InvalidInput(format!("fee amount {} out of range", amount)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi;

    fn referrer() -> Address {
        Address::parse("0x00000000000000000000000000000000000000aA").unwrap()
    }

    fn treasury() -> Address {
        Address::parse("0x000000000000000000000000000000000000dEaD").unwrap()
    }

    fn weth() -> Address {
        Address::parse("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2").unwrap()
    }

    #[test]
    fn test_fees_with_referral() {
        let fees = FeeCalculator::new()
            .compute_fees(dec!(1000), dec!(3000), Some(&referrer()))
            .unwrap();

        assert_eq!(fees.total_fee_usd, dec!(0.1));
        assert_eq!(fees.referrer_fee_usd, dec!(0.07));
        assert_eq!(fees.treasury_fee_usd, dec!(0.03));
        assert_eq!(fees.total_fee_wei, 33_333_333_333_333);
        assert_eq!(fees.referrer_fee_wei, 23_333_333_333_333);
        assert_eq!(fees.treasury_fee_wei, 10_000_000_000_000);
        assert!(fees.has_referral);
        assert!(fees.legs_balance());
    }

    #[test]
    fn test_fees_without_referral() {
        let fees = FeeCalculator::new().compute_fees(dec!(1000), dec!(3000), None).unwrap();

        assert_eq!(fees.referrer_fee_wei, 0);
        assert_eq!(fees.referrer_fee_usd, Decimal::ZERO);
        assert_eq!(fees.treasury_fee_wei, fees.total_fee_wei);
        assert!(!fees.has_referral);
    }

    #[test]
    fn test_legs_always_sum_to_total() {
        let calculator = FeeCalculator::new();
        let values = [dec!(0), dec!(0.01), dec!(1), dec!(7.77), dec!(123.456789), dec!(99999.99)];
        let prices = [dec!(0.5), dec!(1), dec!(1873.21), dec!(3000), dec!(64123.9)];

        for value in values {
            for price in prices {
                let fees = calculator.compute_fees(value, price, Some(&referrer())).unwrap();
                assert_eq!(
                    fees.referrer_fee_wei + fees.treasury_fee_wei,
                    fees.total_fee_wei,
                    "value={} price={}",
                    value,
                    price
                );
            }
        }
    }

    #[test]
    fn test_zero_notional_yields_zero_fee() {
        let fees = FeeCalculator::new().compute_fees(Decimal::ZERO, dec!(3000), None).unwrap();
        assert_eq!(fees.total_fee_wei, 0);

        let txs = FeeCalculator::new()
            .build_fee_transactions(&fees, 1, &treasury(), Some(&weth()))
            .unwrap();
        assert!(txs.is_empty());
    }

    #[test]
    fn test_rejects_invalid_input() {
        let calculator = FeeCalculator::new();
        assert!(matches!(
            calculator.compute_fees(dec!(-1), dec!(3000), None),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            calculator.compute_fees(dec!(10), Decimal::ZERO, None),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_fee_transactions_with_referral() {
        let calculator = FeeCalculator::new();
        let fees = calculator.compute_fees(dec!(1000), dec!(3000), Some(&referrer())).unwrap();
        let txs = calculator
            .build_fee_transactions(&fees, 1, &treasury(), Some(&weth()))
            .unwrap();

        assert_eq!(txs.len(), 3);

        assert_eq!(txs[0].to, weth());
        assert_eq!(txs[0].value, fees.total_fee_wei.to_string());
        assert_eq!(txs[0].data.as_deref(), Some("0xd0e30db0"));

        let referrer_data = txs[1].data.as_deref().unwrap();
        assert_eq!(abi::selector_of(referrer_data), Some(abi::TRANSFER_SELECTOR));
        assert!(referrer_data.contains(&referrer().hex_body().to_lowercase()));
        assert_eq!(txs[1].description, "Referrer fee");

        let treasury_data = txs[2].data.as_deref().unwrap();
        assert!(treasury_data.contains(&treasury().hex_body().to_lowercase()));
        assert_eq!(txs[2].description, "Protocol fee");
    }

    #[test]
    fn test_fee_transactions_without_referral() {
        let calculator = FeeCalculator::new();
        let fees = calculator.compute_fees(dec!(1000), dec!(3000), None).unwrap();
        let txs = calculator
            .build_fee_transactions(&fees, 1, &treasury(), Some(&weth()))
            .unwrap();

        assert_eq!(txs.len(), 2);
        assert_eq!(txs[1].description, "Protocol fee");
    }

    #[test]
    fn test_fee_transactions_unsupported_chain() {
        let calculator = FeeCalculator::new();
        let fees = calculator.compute_fees(dec!(1000), dec!(3000), None).unwrap();
        let err = calculator
            .build_fee_transactions(&fees, 999_999, &treasury(), None)
            .unwrap_err();

        assert_eq!(err, EngineError::UnsupportedChain(999_999));
    }
}
