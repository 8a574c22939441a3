use crate::error::{Error, Result};

/// Length of a v4 fingerprint in hex characters.
pub const FINGERPRINT_HEX_LEN: usize = 40;

/// Normalizes a fingerprint as written in a declaration file.
///
/// Removes all whitespace, any leading `0x`/`0X` prefix and folds the hex
/// digits to upper case. The result is not validated; see
/// [`validate_fingerprint`]. Applying it twice yields the same string.
pub fn normalize_fingerprint(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    let mut rest = compact.as_str();
    while let Some(stripped) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        rest = stripped;
    }

    rest.to_ascii_uppercase()
}

/// Validates a fingerprint before it is sent to any keyserver.
///
/// Accepted formats:
/// - 40 hex characters, any case
/// - optional "0x" prefix
/// - whitespace anywhere (e.g. `ABCD 1234 ...` as printed by gpg)
///
/// Returns the normalized fingerprint (uppercase, no prefix) on success.
pub fn validate_fingerprint(raw: &str) -> Result<String> {
    let normalized = normalize_fingerprint(raw);

    if normalized.is_empty() {
        return Err(Error::InvalidFingerprint {
            fingerprint: raw.to_string(),
            reason: "fingerprint cannot be empty".to_string(),
        });
    }

    if !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidFingerprint {
            fingerprint: raw.to_string(),
            reason: "fingerprint must contain only hexadecimal characters".to_string(),
        });
    }

    match normalized.len() {
        FINGERPRINT_HEX_LEN => Ok(normalized),
        len => Err(Error::InvalidFingerprint {
            fingerprint: raw.to_string(),
            reason: format!(
                "fingerprint must be {} hex characters (got {})",
                FINGERPRINT_HEX_LEN, len
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FPR: &str = "ABAF11C65A2970B130ABE3C479BE3E4300411886";

    #[test]
    fn test_valid_fingerprint() {
        assert_eq!(validate_fingerprint(FPR).unwrap(), FPR);
    }

    #[test]
    fn test_valid_lowercase_fingerprint() {
        assert_eq!(
            validate_fingerprint("abaf11c65a2970b130abe3c479be3e4300411886").unwrap(),
            FPR
        );
    }

    #[test]
    fn test_valid_with_0x_prefix() {
        assert_eq!(validate_fingerprint(&format!("0x{FPR}")).unwrap(), FPR);
        assert_eq!(validate_fingerprint(&format!("0X{FPR}")).unwrap(), FPR);
    }

    #[test]
    fn test_valid_with_gpg_spacing() {
        let spaced = "ABAF 11C6 5A29 70B1 30AB  E3C4 79BE 3E43 0041 1886";
        assert_eq!(validate_fingerprint(spaced).unwrap(), FPR);
        assert_eq!(validate_fingerprint(&format!(" 0x{FPR}\n")).unwrap(), FPR);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            FPR,
            "0xabaf 11c6",
            "0x0Xdead",
            "  0X  beef ",
            "xyz",
            "",
            "0x",
        ];
        for input in inputs {
            let once = normalize_fingerprint(input);
            assert_eq!(normalize_fingerprint(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn test_invalid_empty() {
        let err = validate_fingerprint("").unwrap_err();
        assert!(matches!(err, Error::InvalidFingerprint { .. }));

        let err = validate_fingerprint("0x").unwrap_err();
        assert!(matches!(err, Error::InvalidFingerprint { .. }));
    }

    #[test]
    fn test_invalid_non_hex() {
        let err = validate_fingerprint("xyz").unwrap_err();
        assert!(matches!(err, Error::InvalidFingerprint { .. }));

        let err = validate_fingerprint("GBAF11C65A2970B130ABE3C479BE3E4300411886").unwrap_err();
        assert!(matches!(err, Error::InvalidFingerprint { .. }));
    }

    #[test]
    fn test_invalid_wrong_length() {
        // short and long key IDs are not accepted in place of a fingerprint
        let err = validate_fingerprint("786C63F330D7CB92").unwrap_err();
        assert!(matches!(err, Error::InvalidFingerprint { .. }));

        let err = validate_fingerprint(&format!("{FPR}00")).unwrap_err();
        assert!(matches!(err, Error::InvalidFingerprint { .. }));
    }

    #[test]
    fn test_error_keeps_raw_input() {
        match validate_fingerprint("0x1234").unwrap_err() {
            Error::InvalidFingerprint { fingerprint, reason } => {
                assert_eq!(fingerprint, "0x1234");
                assert!(reason.contains("got 4"));
            }
            other => panic!("expected InvalidFingerprint, got {other:?}"),
        }
    }
}
