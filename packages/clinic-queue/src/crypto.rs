//! Módulo de criptografia para dados do paciente
//!
//! Nome, telefone, observações e diagnóstico são selados com AES-256-GCM antes
//! de chegar ao disco. A chave é derivada de uma frase secreta com Argon2id.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use argon2::Argon2;
use rand::{rngs::OsRng as RandOsRng, RngCore};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::models::PatientDetails;

/// Erros específicos para operações de criptografia
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Falha na criptografia: {0}")]
    EncryptionFailed(String),

    #[error("Falha na descriptografia: {0}")]
    DecryptionFailed(String),

    #[error("Dados inválidos: {0}")]
    InvalidData(String),

    #[error("Configuração de criptografia inválida: {0}")]
    InvalidConfiguration(String),
}

/// Tamanho do nonce em bytes para AES-GCM
const AES_GCM_NONCE_SIZE: usize = 12;

/// Tamanho mínimo do salt aceito pelo Argon2
const MIN_SALT_LEN: usize = 8;

/// Chave AES-256 (zerada ao sair de escopo)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Cria uma nova chave aleatória
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        RandOsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Deriva a chave a partir da frase secreta usando Argon2id
    pub fn derive(key_phrase: &str, salt: &[u8]) -> Result<Self, CryptoError> {
        if key_phrase.is_empty() {
            return Err(CryptoError::InvalidConfiguration(
                "A frase secreta não pode ser vazia".to_string(),
            ));
        }
        if salt.len() < MIN_SALT_LEN {
            return Err(CryptoError::InvalidConfiguration(format!(
                "O salt deve ter ao menos {} bytes, recebeu {}",
                MIN_SALT_LEN,
                salt.len()
            )));
        }

        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(key_phrase.as_bytes(), salt, &mut key)
            .map_err(|e| CryptoError::InvalidConfiguration(e.to_string()))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Dados criptografados e seu nonce
#[derive(Debug, Clone)]
pub struct EncryptedData {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Criptografa dados usando AES-256-GCM
pub fn encrypt(data: &[u8], key: &EncryptionKey) -> Result<EncryptedData, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, data)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(EncryptedData {
        ciphertext,
        nonce: nonce.to_vec(),
    })
}

/// Descriptografa dados usando AES-256-GCM
pub fn decrypt(encrypted: &EncryptedData, key: &EncryptionKey) -> Result<Vec<u8>, CryptoError> {
    if encrypted.nonce.len() != AES_GCM_NONCE_SIZE {
        return Err(CryptoError::InvalidData(format!(
            "Nonce inválido: esperado {} bytes, recebido {}",
            AES_GCM_NONCE_SIZE,
            encrypted.nonce.len()
        )));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(&encrypted.nonce), encrypted.ciphertext.as_ref())
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Sela os dados descritivos do paciente
pub fn seal_details(
    details: &PatientDetails,
    key: &EncryptionKey,
) -> Result<EncryptedData, CryptoError> {
    let plaintext =
        serde_json::to_vec(details).map_err(|e| CryptoError::InvalidData(e.to_string()))?;
    encrypt(&plaintext, key)
}

/// Abre os dados descritivos do paciente
pub fn open_details(
    encrypted: &EncryptedData,
    key: &EncryptionKey,
) -> Result<PatientDetails, CryptoError> {
    let plaintext = decrypt(encrypted, key)?;
    serde_json::from_slice(&plaintext).map_err(|e| CryptoError::InvalidData(e.to_string()))
}
