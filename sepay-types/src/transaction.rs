//! Start-transaction request payload

use std::fmt;

use crate::error::{Error, Result};
use crate::fields::DELIMITER;

/// Payment request sent with the start-transaction command
///
/// Serialises to `AMOUNT|REFERENCE|MERCHANT_REFERENCE|FLAGS`, with the amount
/// in minor units left-padded to 12 digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Amount in minor units (cents)
    pub amount_minor: u64,

    /// Transaction reference, used later to query status
    pub reference: String,

    /// Merchant-side reference (may be empty)
    pub merchant_reference: String,

    /// Trailing flags field, `0` in every request the terminal documents
    pub flags: u8,
}

impl TransactionRequest {
    /// Widest amount the 12-digit field can hold
    pub const MAX_AMOUNT: u64 = 999_999_999_999;

    pub fn new(amount_minor: u64, reference: impl Into<String>) -> Self {
        Self {
            amount_minor,
            reference: reference.into(),
            merchant_reference: String::new(),
            flags: 0,
        }
    }

    /// Set merchant reference
    pub fn with_merchant_reference(mut self, merchant_reference: impl Into<String>) -> Self {
        self.merchant_reference = merchant_reference.into();
        self
    }

    /// Set flags field
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// Build the wire payload
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the amount overflows 12 digits, the
    /// reference is empty, or a text field contains the `|` delimiter.
    ///
    /// # Examples
    ///
    /// ```
    /// use sepay_types::TransactionRequest;
    ///
    /// let request = TransactionRequest::new(1234, "AAA-123").with_merchant_reference("MRCHT45");
    /// assert_eq!(request.to_payload().unwrap(), "000000001234|AAA-123|MRCHT45|0");
    /// ```
    pub fn to_payload(&self) -> Result<String> {
        if self.amount_minor > Self::MAX_AMOUNT {
            return Err(Error::Validation(format!(
                "amount {} exceeds {}",
                self.amount_minor,
                Self::MAX_AMOUNT
            )));
        }

        if self.reference.is_empty() {
            return Err(Error::Validation("reference must not be empty".into()));
        }

        for (name, value) in [
            ("reference", &self.reference),
            ("merchant_reference", &self.merchant_reference),
        ] {
            if value.contains(DELIMITER) {
                return Err(Error::Validation(format!(
                    "{} must not contain '{}'",
                    name, DELIMITER
                )));
            }
        }

        Ok(self.to_string())
    }
}

impl fmt::Display for TransactionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:012}{d}{}{d}{}{d}{}",
            self.amount_minor,
            self.reference,
            self.merchant_reference,
            self.flags,
            d = DELIMITER
        )
    }
}
