use crate::entry::{OtpEntry, OtpKind, is_valid_base32};
use data_encoding::BASE32;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use thiserror::Error;
use totp_rs::{Algorithm, TOTP};
use url::Url;

/// Стандартные параметры аутентификаторов: 6 цифр, шаг 30 секунд, SHA-1.
pub const DIGITS: usize = 6;
pub const STEP_SECONDS: u64 = 30;

/// Длина генерируемого секрета в байтах (160 бит → 32 символа base32).
const SECRET_BYTES: usize = 20;

#[derive(Debug, Error)]
pub enum OtpError {
    /// Секрет записи не прошёл base32-проверку. После валидации в
    /// `OtpEntry::new` такое возможно только для записей, прочитанных с
    /// диска в обход конструктора — это integrity-сбой, а не ошибка ввода.
    #[error("stored secret is not valid base32 (entry bypassed validation)")]
    InvalidSecret,
    #[error("counter-based entry has no counter (entry bypassed validation)")]
    MissingCounter,
    #[error("system clock error: {0}")]
    Clock(#[from] std::time::SystemTimeError),
    #[error("could not build provisioning URI: {0}")]
    Uri(#[from] url::ParseError),
}

/// Декодирует секрет записи, перепроверяя его перед использованием:
/// код из мусорного секрета хуже, чем ошибка.
fn decode_secret(secret: &str) -> Result<Vec<u8>, OtpError> {
    if !is_valid_base32(secret) {
        return Err(OtpError::InvalidSecret);
    }
    let raw = BASE32
        .decode(secret.as_bytes())
        .map_err(|_| OtpError::InvalidSecret)?;
    if raw.is_empty() {
        return Err(OtpError::InvalidSecret);
    }
    Ok(raw)
}

fn totp(secret: Vec<u8>) -> TOTP {
    // new_unchecked: не отбрасываем "короткие" (80-битные) секреты вроде
    // тех, что выдаёт GitHub.
    TOTP::new_unchecked(Algorithm::SHA1, DIGITS, 1, STEP_SECONDS, secret)
}

/// RFC 4226: HMAC-SHA1 + dynamic truncation.
fn hotp_code(secret: &[u8], counter: u64) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0xf) as usize;
    let binary = ((digest[offset] as u32 & 0x7f) << 24)
        | ((digest[offset + 1] as u32) << 16)
        | ((digest[offset + 2] as u32) << 8)
        | (digest[offset + 3] as u32);

    format!("{:0width$}", binary % 10u32.pow(DIGITS as u32), width = DIGITS)
}

/// Текущий код записи. Запись не мутируется; продвижение hotp-счётчика —
/// отдельная операция хранилища.
pub fn current_code(entry: &OtpEntry) -> Result<String, OtpError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs();
    code_at(entry, now)
}

/// Код в заданный момент времени (unix-секунды). Для hotp время не играет
/// роли — возвращается код текущего счётчика.
pub fn code_at(entry: &OtpEntry, unix_seconds: u64) -> Result<String, OtpError> {
    let raw = decode_secret(entry.secret())?;
    match entry.kind() {
        OtpKind::Totp => Ok(totp(raw).generate(unix_seconds)),
        OtpKind::Hotp => {
            let counter = entry.counter().ok_or(OtpError::MissingCounter)?;
            Ok(hotp_code(&raw, counter))
        }
    }
}

/// Provisioning URI в формате, который понимают аутентификаторы:
///   otpauth://totp/{label}?secret={secret}&issuer={issuer}
///   otpauth://hotp/{label}?secret={secret}&issuer={issuer}&counter={counter}
pub fn provisioning_uri(entry: &OtpEntry, label: &str, issuer: &str) -> Result<String, OtpError> {
    decode_secret(entry.secret())?;
    let counter = match entry.kind() {
        OtpKind::Hotp => Some(entry.counter().ok_or(OtpError::MissingCounter)?),
        OtpKind::Totp => None,
    };

    let mut uri = Url::parse(&format!("otpauth://{}/", entry.kind()))?;
    uri.set_path(label);
    {
        let mut query = uri.query_pairs_mut();
        query.append_pair("secret", entry.secret());
        query.append_pair("issuer", issuer);
        if let Some(counter) = counter {
            query.append_pair("counter", &counter.to_string());
        }
    }
    Ok(uri.to_string())
}

/// Свежий случайный секрет: 160 бит из CSPRNG, 32 символа base32.
pub fn generate_secret() -> String {
    let mut raw = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut raw);
    BASE32.encode(&raw)
}
