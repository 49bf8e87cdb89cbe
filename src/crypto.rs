use crate::config::{Config, EncConfig, KdfParams};
use anyhow::anyhow;
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{Engine as _, engine::general_purpose};
use chacha20poly1305::{
    KeyInit, XChaCha20Poly1305, XNonce,
    aead::{Aead, AeadCore, OsRng},
};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

/// Ключ, которым запечатаны записи каталога.
pub type MasterKey = [u8; 32];

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid master password")]
    InvalidMasterPassword,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Новый вольт: случайный master key, запечатанный KEK'ом из мастер-пароля.
/// Возвращает готовый Config (kdf + enc) для записи на диск.
pub fn generate_new_config(master_password: &str) -> anyhow::Result<Config> {
    let mut master_key: MasterKey = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut master_key);

    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);

    let kdf = KdfParams {
        algo: "argon2id".to_string(),
        memory_mib: 32,
        iterations: 3,
        parallelism: 1,
        salt: general_purpose::STANDARD.encode(salt),
    };

    let mut kek = derive_kek(master_password, &kdf)?;
    let sealed = seal(&kek, &master_key);
    kek.zeroize();
    master_key.zeroize();
    let (master_key_nonce, encrypted_master_key) = sealed?;

    Ok(Config {
        version: 1,
        kdf,
        enc: EncConfig {
            algo: "xchacha20-poly1305".to_string(),
            master_key_nonce,
            encrypted_master_key,
        },
    })
}

/// Распечатывает master key из config по мастер-паролю.
pub fn unlock_master_key(master_password: &str, cfg: &Config) -> Result<MasterKey, CryptoError> {
    let mut kek = derive_kek(master_password, &cfg.kdf)?;
    let opened = open(
        &kek,
        &cfg.enc.master_key_nonce,
        &cfg.enc.encrypted_master_key,
    );
    kek.zeroize();

    let mut plaintext = opened.map_err(|_| CryptoError::InvalidMasterPassword)?;
    if plaintext.len() != 32 {
        plaintext.zeroize();
        return Err(CryptoError::Other(anyhow!("invalid master key length")));
    }

    let mut master_key: MasterKey = [0u8; 32];
    master_key.copy_from_slice(&plaintext);
    plaintext.zeroize();
    Ok(master_key)
}

/// KEK из мастер-пароля и KDF-параметров (Argon2id).
fn derive_kek(master_password: &str, kdf: &KdfParams) -> anyhow::Result<[u8; 32]> {
    let salt = general_purpose::STANDARD.decode(&kdf.salt)?;

    let params = Params::new(
        kdf.memory_mib * 1024, // m_cost в KiB
        kdf.iterations,
        kdf.parallelism,
        Some(32),
    )
    .map_err(|e| anyhow!("argon2 params error: {e}"))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut kek = [0u8; 32];
    argon2
        .hash_password_into(master_password.as_bytes(), &salt, &mut kek)
        .map_err(|e| anyhow!("argon2 error: {e}"))?;

    Ok(kek)
}

/// Запечатывает данные XChaCha20-Poly1305; возвращает (nonce_b64, ct_b64).
fn seal(key: &[u8; 32], plaintext: &[u8]) -> anyhow::Result<(String, String)> {
    let cipher = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| anyhow!("encrypt error: {e}"))?;

    Ok((
        general_purpose::STANDARD.encode(nonce),
        general_purpose::STANDARD.encode(ciphertext),
    ))
}

/// Обратная операция к [`seal`].
fn open(key: &[u8; 32], nonce_b64: &str, ct_b64: &str) -> anyhow::Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));

    let nonce = general_purpose::STANDARD.decode(nonce_b64)?;
    let ciphertext = general_purpose::STANDARD.decode(ct_b64)?;

    cipher
        .decrypt(XNonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|e| anyhow!("decrypt error: {e}"))
}

/// Запечатать JSON-запись каталога мастер-ключом.
pub fn encrypt_record(master_key: &MasterKey, data: &[u8]) -> anyhow::Result<(String, String)> {
    seal(master_key, data)
}

/// Распечатать JSON-запись каталога мастер-ключом.
pub fn decrypt_record(
    master_key: &MasterKey,
    nonce_b64: &str,
    ct_b64: &str,
) -> anyhow::Result<Vec<u8>> {
    open(master_key, nonce_b64, ct_b64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_seal_open_round_trip() {
        let key: MasterKey = [7u8; 32];
        let (nonce, ct) = encrypt_record(&key, b"{\"secret\":\"JBSWY3DPEHPK3PXP\"}").unwrap();
        let plain = decrypt_record(&key, &nonce, &ct).unwrap();
        assert_eq!(plain, b"{\"secret\":\"JBSWY3DPEHPK3PXP\"}");
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let key: MasterKey = [7u8; 32];
        let other: MasterKey = [8u8; 32];
        let (nonce, ct) = encrypt_record(&key, b"payload").unwrap();
        assert!(decrypt_record(&other, &nonce, &ct).is_err());
    }

    #[test]
    fn unlock_round_trip_and_wrong_password() {
        let cfg = generate_new_config("correct horse").unwrap();
        unlock_master_key("correct horse", &cfg).unwrap();

        let err = unlock_master_key("battery staple", &cfg).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidMasterPassword));
    }
}
