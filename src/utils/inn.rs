//! INN Validation
//!
//! Russian tax identifier (ИНН) validation with check-digit verification.
//! Legal entities carry 10 digits with one check digit; individual
//! entrepreneurs carry 12 digits with two.

const W10: [u32; 9] = [2, 4, 10, 3, 5, 9, 4, 6, 8];
const W11: [u32; 10] = [7, 2, 4, 10, 3, 5, 9, 4, 6, 8];
const W12: [u32; 11] = [3, 7, 2, 4, 10, 3, 5, 9, 4, 6, 8];

/// Validation outcome with a human-readable reason on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InnCheck {
    Valid,
    Invalid(String),
}

impl InnCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, InnCheck::Valid)
    }
}

fn digits_of(inn: &str) -> Option<Vec<u32>> {
    inn.chars().map(|c| c.to_digit(10)).collect()
}

fn checksum(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    sum % 11 % 10
}

/// Validate an INN string: 10 or 12 digits, all check digits correct.
pub fn validate_inn(inn: &str) -> InnCheck {
    let inn = inn.trim();

    let Some(digits) = digits_of(inn) else {
        return InnCheck::Invalid("INN must contain only digits".into());
    };

    match digits.len() {
        10 => {
            if checksum(&digits[..9], &W10) == digits[9] {
                InnCheck::Valid
            } else {
                InnCheck::Invalid("INN check digit mismatch".into())
            }
        }
        12 => {
            let first = checksum(&digits[..10], &W11) == digits[10];
            let second = checksum(&digits[..11], &W12) == digits[11];
            if first && second {
                InnCheck::Valid
            } else {
                InnCheck::Invalid("INN check digit mismatch".into())
            }
        }
        n => InnCheck::Invalid(format!("INN must be 10 or 12 digits, got {}", n)),
    }
}

/// Convenience predicate used at provider boundaries.
pub fn is_valid_inn(inn: &str) -> bool {
    validate_inn(inn).is_valid()
}

/// Normalize an optional caller-supplied INN: empty strings become `None`,
/// surrounding whitespace is stripped.
pub fn normalize_inn(inn: Option<&str>) -> Option<String> {
    match inn {
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_valid_10() {
        assert!(is_valid_inn("7736050003"));
        assert!(is_valid_inn("7707083893"));
    }

    #[test]
    fn test_known_invalid_10() {
        assert!(!is_valid_inn("7736050004"));
        assert!(!is_valid_inn("0000000001"));
    }

    #[test]
    fn test_valid_12() {
        // 500100732259 is the FNS documentation example for individuals
        assert!(is_valid_inn("500100732259"));
        assert!(!is_valid_inn("500100732258"));
    }

    #[test]
    fn test_wrong_length() {
        assert!(!is_valid_inn(""));
        assert!(!is_valid_inn("123"));
        assert!(!is_valid_inn("77360500031"));
        match validate_inn("123") {
            InnCheck::Invalid(msg) => assert!(msg.contains("10 or 12")),
            InnCheck::Valid => panic!("expected invalid"),
        }
    }

    #[test]
    fn test_non_digit() {
        assert!(!is_valid_inn("77360А0003"));
        assert!(!is_valid_inn("7736-50003"));
    }

    #[test]
    fn test_single_digit_perturbations_flip_validity() {
        // Perturbing any non-check digit changes the weighted sum by w*delta;
        // for this reference INN every perturbation must flip validity.
        let reference = "7736050003";
        assert!(is_valid_inn(reference));

        for pos in 0..9 {
            let original = reference.as_bytes()[pos] - b'0';
            for replacement in 0..10u8 {
                if replacement == original {
                    continue;
                }
                let mut perturbed = reference.as_bytes().to_vec();
                perturbed[pos] = b'0' + replacement;
                let perturbed = String::from_utf8(perturbed).unwrap();
                // The check digit must no longer match unless the weighted
                // delta is a multiple of 11 (w*|d1-d2| ≡ 0 mod 11 never holds
                // for w<11, 0<|d1-d2|<10 since 11 is prime).
                assert!(
                    !is_valid_inn(&perturbed),
                    "perturbation {} unexpectedly valid",
                    perturbed
                );
            }
        }

        // Perturbing the check digit itself always invalidates.
        for replacement in b'0'..=b'9' {
            if replacement == b'3' {
                continue;
            }
            let mut perturbed = reference.as_bytes().to_vec();
            perturbed[9] = replacement;
            assert!(!is_valid_inn(&String::from_utf8(perturbed).unwrap()));
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_inn(None), None);
        assert_eq!(normalize_inn(Some("")), None);
        assert_eq!(normalize_inn(Some("  ")), None);
        assert_eq!(
            normalize_inn(Some(" 7736050003 ")),
            Some("7736050003".to_string())
        );
    }
}
