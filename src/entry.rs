use data_encoding::BASE32;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown OTP type '{0}', expected 'totp' or 'hotp'")]
    InvalidKind(String),
    #[error("secret must be a non-empty base32 string")]
    MalformedSecret,
    #[error("counter must be a non-negative integer")]
    InvalidCounter,
    #[error("counter-based entries require an initial counter")]
    MissingCounter,
}

/// Строгая проверка base32 (RFC 4648): decode → encode должен вернуть
/// ровно исходную строку, включая padding. Отсекает строки из base32-алфавита
/// с неправильной длиной или padding'ом, на которых OTP-алгоритм молча
/// выдал бы мусор.
pub fn is_valid_base32(input: &str) -> bool {
    match BASE32.decode(input.as_bytes()) {
        Ok(raw) => BASE32.encode(&raw) == input,
        Err(_) => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpKind {
    Totp,
    Hotp,
}

impl fmt::Display for OtpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Totp => write!(f, "totp"),
            Self::Hotp => write!(f, "hotp"),
        }
    }
}

impl FromStr for OtpKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "totp" => Ok(Self::Totp),
            "hotp" => Ok(Self::Hotp),
            other => Err(ValidationError::InvalidKind(other.to_string())),
        }
    }
}

/// Одна OTP-запись: секрет + тип + счётчик (только для hotp).
///
/// Конструируется только через [`OtpEntry::new`]; поля приватные, так что
/// инварианты проверяются в одном месте, а не на каждом call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpEntry {
    secret: String,
    kind: OtpKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    counter: Option<u64>,
}

impl OtpEntry {
    /// Validates and builds an entry.
    ///
    /// A hotp entry requires a counter (zero is a legitimate value —
    /// presence is the test, not truthiness). A totp entry ignores any
    /// supplied counter and stores `None`.
    pub fn new(
        secret: impl Into<String>,
        kind: OtpKind,
        counter: Option<u64>,
    ) -> Result<Self, ValidationError> {
        let secret = secret.into();
        if secret.is_empty() || !is_valid_base32(&secret) {
            return Err(ValidationError::MalformedSecret);
        }
        let counter = match kind {
            OtpKind::Hotp => Some(counter.ok_or(ValidationError::MissingCounter)?),
            OtpKind::Totp => None,
        };
        Ok(Self {
            secret,
            kind,
            counter,
        })
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn kind(&self) -> OtpKind {
        self.kind
    }

    pub fn counter(&self) -> Option<u64> {
        self.counter
    }

    /// Единственная мутация записи: инкремент счётчика после выдачи
    /// hotp-кода. Возвращает новое значение, для totp — `None`.
    pub fn bump_counter(&mut self) -> Option<u64> {
        match self.kind {
            OtpKind::Hotp => {
                let next = self.counter.unwrap_or(0).saturating_add(1);
                self.counter = Some(next);
                Some(next)
            }
            OtpKind::Totp => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("JBSWY3DPEHPK3PXP", true)]
    #[case("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ", true)]
    #[case("MZXW6===", true)]
    #[case("", true)] // empty decodes to empty; rejected separately by OtpEntry::new
    #[case("jbswy3dpehpk3pxp", false)] // lowercase is not canonical
    #[case("JBSWY3D", false)] // length not a multiple of 8
    #[case("MZXW6", false)] // missing padding
    #[case("1BSWY3DPEHPK3PXP", false)] // '1' is outside the alphabet
    #[case("MZXW6===X", false)]
    fn base32_round_trip(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(is_valid_base32(input), valid, "input: {input:?}");
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("totp".parse::<OtpKind>().unwrap(), OtpKind::Totp);
        assert_eq!("HOTP".parse::<OtpKind>().unwrap(), OtpKind::Hotp);
        assert_eq!(
            "motp".parse::<OtpKind>().unwrap_err(),
            ValidationError::InvalidKind("motp".to_string())
        );
    }

    #[rstest]
    #[case("not base32!", OtpKind::Totp)]
    #[case("not base32!", OtpKind::Hotp)]
    #[case("jbswy3dpehpk3pxp", OtpKind::Totp)]
    #[case("", OtpKind::Totp)]
    fn rejects_malformed_secret(#[case] secret: &str, #[case] kind: OtpKind) {
        assert_eq!(
            OtpEntry::new(secret, kind, Some(0)).unwrap_err(),
            ValidationError::MalformedSecret
        );
    }

    #[test]
    fn hotp_requires_counter() {
        assert_eq!(
            OtpEntry::new("JBSWY3DPEHPK3PXP", OtpKind::Hotp, None).unwrap_err(),
            ValidationError::MissingCounter
        );
    }

    #[test]
    fn hotp_accepts_counter_zero() {
        let entry = OtpEntry::new("JBSWY3DPEHPK3PXP", OtpKind::Hotp, Some(0)).unwrap();
        assert_eq!(entry.counter(), Some(0));
    }

    #[test]
    fn totp_drops_supplied_counter() {
        let entry = OtpEntry::new("JBSWY3DPEHPK3PXP", OtpKind::Totp, Some(7)).unwrap();
        assert_eq!(entry.counter(), None);
    }

    #[test]
    fn bump_counter_increments_hotp_only() {
        let mut hotp = OtpEntry::new("JBSWY3DPEHPK3PXP", OtpKind::Hotp, Some(0)).unwrap();
        assert_eq!(hotp.bump_counter(), Some(1));
        assert_eq!(hotp.bump_counter(), Some(2));
        assert_eq!(hotp.counter(), Some(2));

        let mut totp = OtpEntry::new("JBSWY3DPEHPK3PXP", OtpKind::Totp, None).unwrap();
        assert_eq!(totp.bump_counter(), None);
        assert_eq!(totp.counter(), None);
    }
}
