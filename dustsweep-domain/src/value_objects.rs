//! Value Objects for the Dustsweep Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Address is not a 0x-prefixed 20-byte hex string
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Price must be positive
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Amount could not be decoded or is not positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Token metadata is malformed
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Transaction descriptor violates its shape invariants
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Execution context input is malformed
    #[error("Invalid context: {0}")]
    InvalidContext(String),
}

// =============================================================================
// Address
// =============================================================================

/// Address is a 0x-prefixed, 20-byte hex account or contract address
///
/// # Invariants
/// - Starts with `0x`
/// - Exactly 40 hex characters follow the prefix
///
/// The original casing is preserved so checksummed addresses round-trip
/// unchanged into transaction descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and validate an address
    ///
    /// # Examples
    /// ```
    /// # use dustsweep_domain::value_objects::Address;
    /// let weth = Address::parse("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2").unwrap();
    /// assert_eq!(weth.hex_body().len(), 40);
    /// assert!(Address::parse("0x1234").is_err());
    /// ```
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAddress` if the format is wrong
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let body = value
            .strip_prefix("0x")
            .ok_or_else(|| DomainError::InvalidAddress(format!("missing 0x prefix: {}", value)))?;

        if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidAddress(format!(
                "expected 40 hex characters: {}",
                value
            )));
        }

        Ok(Self(value.to_string()))
    }

    /// Build an address from its 20 raw bytes (lowercase hex)
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        let body: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        Self(format!("0x{}", body))
    }

    /// Get the address as a string (with 0x prefix)
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the 40 hex characters without the 0x prefix
    pub fn hex_body(&self) -> &str {
        &self.0[2..]
    }

    /// Case-insensitive comparison (checksummed vs lowercase forms)
    pub fn same_as(&self, other: &Address) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl TryFrom<String> for Address {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl FromStr for Address {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Price
// =============================================================================

/// Price represents a positive USD price
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    /// Create a new Price with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice(format!("Price must be positive, got {}", value)));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Raw token amounts
// =============================================================================

/// Decode a hex-encoded smallest-unit amount (`0x`-prefix optional).
///
/// # Errors
/// Returns `DomainError::InvalidAmount` if the string is empty, not hex,
/// or does not fit in 128 bits.
pub fn decode_hex_amount(raw: &str) -> Result<u128, DomainError> {
    let body = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")).unwrap_or(raw);
    if body.is_empty() {
        return Err(DomainError::InvalidAmount(format!("empty hex amount: {:?}", raw)));
    }
    // from_str_radix would accept a leading sign
    if !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DomainError::InvalidAmount(format!("not a hex amount: {:?}", raw)));
    }

    u128::from_str_radix(body, 16)
        .map_err(|e| DomainError::InvalidAmount(format!("cannot decode {}: {}", raw, e)))
}

/// Convert a smallest-unit integer amount into a decimal token amount.
///
/// Any `u128` whole part up to the decimal range is exact; fractional digits
/// beyond 96 bits of mantissa (or scale 28) are truncated.
///
/// # Examples
/// ```
/// # use dustsweep_domain::value_objects::scale_amount;
/// # use rust_decimal_macros::dec;
/// assert_eq!(scale_amount(1_500_000, 6).unwrap(), dec!(1.5));
/// ```
///
/// # Errors
/// Returns `DomainError::InvalidAmount` if the whole part exceeds decimal range.
pub fn scale_amount(raw: u128, decimals: u8) -> Result<Decimal, DomainError> {
    const MAX_SCALE: u32 = 28;
    const MAX_MANTISSA: u128 = (1u128 << 96) - 1;

    let out_of_range = || DomainError::InvalidAmount(format!("amount {} with {} decimals out of range", raw, decimals));

    let mut scale = u32::from(decimals);
    let (whole, mut fraction) = match 10u128.checked_pow(scale) {
        Some(unit) => (raw / unit, raw % unit),
        None => (0, raw),
    };

    // Drop low-order digits the mantissa cannot hold
    while scale > MAX_SCALE || fraction > MAX_MANTISSA {
        fraction /= 10;
        scale -= 1;
    }

    let whole = i128::try_from(whole)
        .ok()
        .and_then(|w| Decimal::try_from_i128_with_scale(w, 0).ok())
        .ok_or_else(out_of_range)?;
    let fraction = i128::try_from(fraction)
        .ok()
        .and_then(|f| Decimal::try_from_i128_with_scale(f, scale).ok())
        .ok_or_else(out_of_range)?
        .normalize();

    whole.checked_add(fraction).ok_or_else(out_of_range)
}

/// Serde adapter for `u128` amounts carried as decimal strings.
///
/// JSON numbers lose precision above 2^53, so smallest-unit amounts travel
/// as strings.
pub mod u128_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serialize a `u128` as its decimal string.
    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    /// Deserialize a `u128` from a decimal string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u128>().map_err(de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
