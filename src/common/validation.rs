//! Input Validation
//!
//! Shape checks applied before anything touches the ledger or the network.

use super::error::RelayError;

/// Validation result
#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            errors: vec![],
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            errors: vec![msg.into()],
        }
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.is_valid = self.is_valid && other.is_valid;
        self.errors.extend(other.errors);
        self
    }

    /// Collapse into a `RelayError::Validation` listing every failure
    pub fn into_result(self) -> Result<(), RelayError> {
        if self.is_valid {
            Ok(())
        } else {
            Err(RelayError::Validation(self.errors.join("; ")))
        }
    }
}

/// Validate a 20-byte EVM address (0x-prefixed hex)
pub fn validate_evm_address(address: &str, field_name: &str) -> ValidationResult {
    let address = address.trim();
    if address.is_empty() {
        return ValidationResult::error(format!("{} is required", field_name));
    }
    if !address.starts_with("0x") && !address.starts_with("0X") {
        return ValidationResult::error(format!("{} must start with 0x", field_name));
    }

    validate_hex(address, Some(20), field_name)
}

/// Validate a 32-byte transaction hash
pub fn validate_tx_hash(hash: &str, field_name: &str) -> ValidationResult {
    validate_hex(hash.trim(), Some(32), field_name)
}

/// Validate an amount in smallest units
pub fn validate_amount(amount: u128, min: u128, max: Option<u128>) -> ValidationResult {
    if amount == 0 {
        return ValidationResult::error("Amount must be greater than 0");
    }

    if amount < min {
        return ValidationResult::error(format!("Amount must be at least {}", min));
    }

    if let Some(max) = max {
        if amount > max {
            return ValidationResult::error(format!("Amount must not exceed {}", max));
        }
    }

    ValidationResult::ok()
}

/// Validate a receipt nonce (positive decimal, at most u128)
pub fn validate_nonce(nonce: &str) -> ValidationResult {
    let nonce = nonce.trim();
    if nonce.is_empty() {
        return ValidationResult::error("nonce is required");
    }
    if !nonce.chars().all(|c| c.is_ascii_digit()) {
        return ValidationResult::error("nonce must be a decimal integer");
    }
    match nonce.parse::<u128>() {
        Ok(0) => ValidationResult::error("nonce must be greater than 0"),
        Ok(_) => ValidationResult::ok(),
        Err(_) => ValidationResult::error("nonce is out of range"),
    }
}

/// Validate hex string
pub fn validate_hex(input: &str, expected_len: Option<usize>, field_name: &str) -> ValidationResult {
    if input.is_empty() {
        return ValidationResult::error(format!("{} is required", field_name));
    }

    let hex_str = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);

    if hex_str.is_empty() {
        return ValidationResult::error(format!("{} is empty", field_name));
    }

    if !hex_str.chars().all(|c| c.is_ascii_hexdigit()) {
        return ValidationResult::error(format!("{} must be valid hex", field_name));
    }

    if let Some(len) = expected_len {
        if hex_str.len() != len * 2 {
            return ValidationResult::error(format!(
                "{} must be {} bytes ({} hex characters)",
                field_name,
                len,
                len * 2
            ));
        }
    } else if hex_str.len() % 2 != 0 {
        return ValidationResult::error(format!("{} has an odd number of hex digits", field_name));
    }

    ValidationResult::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evm_address() {
        assert!(validate_evm_address("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266", "user").is_valid);
        assert!(!validate_evm_address("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266", "user").is_valid);
        assert!(!validate_evm_address("0x1234", "user").is_valid);
        assert!(!validate_evm_address("", "user").is_valid);
        assert!(!validate_evm_address("0xZZ9Fd6e51aad88F6F4ce6aB8827279cffFb92266", "user").is_valid);
    }

    #[test]
    fn test_tx_hash() {
        let hash = format!("0x{}", "ab".repeat(32));
        assert!(validate_tx_hash(&hash, "tx").is_valid);
        assert!(!validate_tx_hash("tx123", "tx").is_valid);
    }

    #[test]
    fn test_amount() {
        assert!(validate_amount(1_000_000, 1, None).is_valid);
        assert!(!validate_amount(0, 0, None).is_valid);
        assert!(!validate_amount(5, 10, None).is_valid);
        assert!(!validate_amount(11, 1, Some(10)).is_valid);
    }

    #[test]
    fn test_nonce() {
        assert!(validate_nonce("42").is_valid);
        assert!(!validate_nonce("0").is_valid);
        assert!(!validate_nonce("-1").is_valid);
        assert!(!validate_nonce("0x2a").is_valid);
        assert!(!validate_nonce("").is_valid);
    }

    #[test]
    fn test_merge_collects_errors() {
        let result = validate_amount(0, 0, None).merge(validate_nonce("x"));
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 2);

        let err = result.into_result().unwrap_err();
        assert!(matches!(err, RelayError::Validation(msg) if msg.contains("nonce")));
    }

    #[test]
    fn test_hex() {
        assert!(validate_hex("0xdeadbeef", None, "data").is_valid);
        assert!(!validate_hex("0xabc", None, "data").is_valid);
        assert!(!validate_hex("0x", None, "data").is_valid);
        assert!(!validate_hex("0xgg", None, "data").is_valid);
    }
}
