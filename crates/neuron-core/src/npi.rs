//! National Provider Identifier validation (CMS Luhn check digit rule).

use crate::constants::{NPI_LENGTH, NPI_LUHN_ADDEND};
use crate::error::NeuronError;

/// Validates a 10-digit NPI string against the CMS Luhn algorithm: treat the
/// first 9 digits as a Luhn payload prefixed conceptually by "80840", add the
/// fixed addend of 24, and check the result against the 10th digit.
pub fn validate_npi(npi: &str) -> Result<(), NeuronError> {
    if npi.len() != NPI_LENGTH || !npi.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NeuronError::InvalidNpi(format!(
            "NPI must be exactly {NPI_LENGTH} digits: {npi}"
        )));
    }

    let digits: Vec<u32> = npi.chars().map(|c| c.to_digit(10).unwrap()).collect();
    let check_digit = digits[9];
    let payload = &digits[..9];

    let mut sum = NPI_LUHN_ADDEND;
    for (i, &d) in payload.iter().rev().enumerate() {
        if i % 2 == 0 {
            let doubled = d * 2;
            sum += if doubled > 9 { doubled - 9 } else { doubled };
        } else {
            sum += d;
        }
    }

    let computed_check = (10 - (sum % 10)) % 10;
    if computed_check != check_digit {
        return Err(NeuronError::InvalidNpi(format!(
            "NPI check digit mismatch for {npi}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_valid_npi() {
        // 1234567893 is a commonly cited Luhn-valid test NPI.
        assert!(validate_npi("1234567893").is_ok());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(validate_npi("123").is_err());
    }

    #[test]
    fn rejects_non_digits() {
        assert!(validate_npi("12345abc93").is_err());
    }

    #[test]
    fn rejects_bad_check_digit() {
        assert!(validate_npi("1234567890").is_err());
    }
}
