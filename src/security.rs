//! AES-256 standard security handler key derivation (revisions 5 and 6).
//!
//! [`generate`] creates a random 32-byte file key and the encryption
//! dictionary values (`O`, `U`, `OE`, `UE`, `Perms`) that let a reader
//! recover it from either password. [`recover`] does the reverse.
//!
//! Revision 5 hashes with a single SHA-256; revision 6 uses the iterative
//! hash of ISO 32000-2 (algorithm 2.B). Passwords are UTF-8 bytes and are
//! truncated to 127 bytes.
//!
//! ```
//! use pdf_trust::security::{generate, recover, EncryptionParams, PasswordKind, Permissions};
//!
//! let params = EncryptionParams::new("alice")
//!     .owner_password("bob")
//!     .permissions(Permissions::PRINTING | Permissions::COPY);
//! let material = generate(&params).unwrap();
//!
//! let opened = recover(&material.dictionary, b"alice").unwrap();
//! assert_eq!(opened.authenticated_as, PasswordKind::User);
//! assert_eq!(opened.file_key(), material.file_key());
//! ```

use std::ops::{BitOr, BitOrAssign};

use aes::{Aes128, Aes256};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{Result, TrustError};

/// File key length in bytes.
pub const KEY_LEN: usize = 32;
/// Length of each validation and key salt.
pub const SALT_LEN: usize = 8;
/// Length of the `O` and `U` strings.
pub const HASH_STRING_LEN: usize = 48;
/// Length of the `Perms` string.
pub const PERMS_LEN: usize = 16;
/// Passwords longer than this are truncated.
pub const MAX_PASSWORD_LEN: usize = 127;

const VALIDATION_SALT: std::ops::Range<usize> = 32..40;
const KEY_SALT: std::ops::Range<usize> = 40..48;
const PERMS_MAGIC: &[u8; 3] = b"adb";
const ZERO_IV: [u8; 16] = [0u8; 16];

/// Name of the standard crypt filter.
pub const STD_CF: &str = "StdCF";
/// Name of the identity (no-op) crypt filter.
pub const IDENTITY: &str = "Identity";

/// Document access permissions (`P` entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permissions(u32);

impl Permissions {
    /// No permissions.
    pub const NONE: Self = Self(0);
    /// Print at full quality.
    pub const PRINTING: Self = Self(4 | 2048);
    /// Modify contents.
    pub const MODIFY_CONTENTS: Self = Self(8);
    /// Copy or extract text and graphics.
    pub const COPY: Self = Self(16);
    /// Add or modify annotations.
    pub const MODIFY_ANNOTATIONS: Self = Self(32);
    /// Fill in form fields.
    pub const FILL_IN: Self = Self(256);
    /// Extract for accessibility.
    pub const SCREENREADERS: Self = Self(512);
    /// Assemble the document.
    pub const ASSEMBLY: Self = Self(1024);
    /// Print at degraded quality only.
    pub const DEGRADED_PRINTING: Self = Self(4);
    /// Everything.
    pub const ALL: Self = Self(4 | 8 | 16 | 32 | 256 | 512 | 1024 | 2048);

    /// Create from raw bits.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Check that every bit of `other` is set.
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Value as stored in the `P` entry: reserved bits 7-8 and 13-32 set,
    /// bits 1-2 clear.
    pub fn normalized(&self) -> Self {
        Self((self.0 | 0xffff_f0c0) & 0xffff_fffc)
    }

    /// Signed `P` value.
    pub fn as_p_value(&self) -> i32 {
        self.0 as i32
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Security handler revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Revision {
    /// Adobe extension level 3, single SHA-256.
    #[default]
    R5,
    /// ISO 32000-2, iterative hash.
    R6,
}

impl Revision {
    /// `R` entry value.
    pub fn number(&self) -> u8 {
        match self {
            Self::R5 => 5,
            Self::R6 => 6,
        }
    }

    /// Parse an `R` entry value.
    pub fn from_number(r: u8) -> Option<Self> {
        match r {
            5 => Some(Self::R5),
            6 => Some(Self::R6),
            _ => None,
        }
    }
}

/// Which password unlocked the file key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordKind {
    /// The owner password.
    Owner,
    /// The user password.
    User,
}

/// Values of a standard security handler encryption dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionDictionary {
    /// `V`, always 5.
    pub version: u8,
    /// `R`.
    pub revision: Revision,
    /// `Length` in bits, always 256.
    pub length: u16,
    /// `O`: owner hash, validation salt and key salt.
    pub owner_hash: Vec<u8>,
    /// `U`: user hash, validation salt and key salt.
    pub user_hash: Vec<u8>,
    /// `OE`: file key encrypted under the owner key.
    pub owner_encrypted_key: Vec<u8>,
    /// `UE`: file key encrypted under the user key.
    pub user_encrypted_key: Vec<u8>,
    /// `Perms`: encrypted permissions block.
    pub perms: Vec<u8>,
    /// `P`.
    pub permissions: i32,
    /// `EncryptMetadata`.
    pub encrypt_metadata: bool,
    /// `CF/StdCF/CFM`.
    pub crypt_filter_method: String,
    /// `StmF`.
    pub stream_filter: String,
    /// `StrF`.
    pub string_filter: String,
    /// `EFF`, set when only embedded files are encrypted.
    pub embedded_file_filter: Option<String>,
}

impl EncryptionDictionary {
    /// Check string lengths before any hashing.
    pub fn validate(&self) -> Result<()> {
        check_len("O", &self.owner_hash, HASH_STRING_LEN)?;
        check_len("U", &self.user_hash, HASH_STRING_LEN)?;
        check_len("OE", &self.owner_encrypted_key, KEY_LEN)?;
        check_len("UE", &self.user_encrypted_key, KEY_LEN)?;
        check_len("Perms", &self.perms, PERMS_LEN)?;
        Ok(())
    }
}

fn check_len(name: &str, value: &[u8], expected: usize) -> Result<()> {
    if value.len() != expected {
        return Err(TrustError::malformed_dictionary(format!(
            "{name} is {} bytes, expected {expected}",
            value.len()
        )));
    }
    Ok(())
}

/// Inputs to [`generate`].
#[derive(Clone)]
pub struct EncryptionParams {
    user_password: Zeroizing<Vec<u8>>,
    owner_password: Option<Zeroizing<Vec<u8>>>,
    permissions: Permissions,
    encrypt_metadata: bool,
    embedded_files_only: bool,
    revision: Revision,
}

impl std::fmt::Debug for EncryptionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionParams")
            .field("permissions", &self.permissions)
            .field("encrypt_metadata", &self.encrypt_metadata)
            .field("embedded_files_only", &self.embedded_files_only)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

impl EncryptionParams {
    /// Start from a user password (may be empty).
    pub fn new(user_password: impl AsRef<[u8]>) -> Self {
        Self {
            user_password: Zeroizing::new(user_password.as_ref().to_vec()),
            owner_password: None,
            permissions: Permissions::default(),
            encrypt_metadata: true,
            embedded_files_only: false,
            revision: Revision::default(),
        }
    }

    /// Set the owner password. A random one is used when not set.
    pub fn owner_password(mut self, password: impl AsRef<[u8]>) -> Self {
        self.owner_password = Some(Zeroizing::new(password.as_ref().to_vec()));
        self
    }

    /// Set the permissions granted to user-password readers.
    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Leave document metadata in clear text.
    pub fn without_metadata_encryption(mut self) -> Self {
        self.encrypt_metadata = false;
        self
    }

    /// Encrypt embedded files only; streams and strings stay clear.
    pub fn embedded_files_only(mut self) -> Self {
        self.embedded_files_only = true;
        self
    }

    /// Choose the handler revision.
    pub fn revision(mut self, revision: Revision) -> Self {
        self.revision = revision;
        self
    }
}

/// A freshly generated file key and its dictionary.
pub struct EncryptionKeyMaterial {
    key: Zeroizing<Vec<u8>>,
    /// Dictionary values to persist.
    pub dictionary: EncryptionDictionary,
}

impl EncryptionKeyMaterial {
    /// The 32-byte file key.
    pub fn file_key(&self) -> &[u8] {
        &self.key
    }
}

impl std::fmt::Debug for EncryptionKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKeyMaterial")
            .field("key", &"[REDACTED]")
            .field("dictionary", &self.dictionary)
            .finish()
    }
}

/// Result of a successful [`recover`].
pub struct RecoveredKey {
    key: Zeroizing<Vec<u8>>,
    /// Permissions from the decrypted `Perms` block.
    pub permissions: Permissions,
    /// Metadata flag from the decrypted `Perms` block.
    pub encrypt_metadata: bool,
    /// Which password matched.
    pub authenticated_as: PasswordKind,
}

impl RecoveredKey {
    /// The 32-byte file key.
    pub fn file_key(&self) -> &[u8] {
        &self.key
    }
}

impl std::fmt::Debug for RecoveredKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveredKey")
            .field("key", &"[REDACTED]")
            .field("permissions", &self.permissions)
            .field("encrypt_metadata", &self.encrypt_metadata)
            .field("authenticated_as", &self.authenticated_as)
            .finish()
    }
}

/// Generate a random file key and the dictionary protecting it.
pub fn generate(params: &EncryptionParams) -> Result<EncryptionKeyMaterial> {
    let revision = params.revision;
    let user = truncate(&params.user_password);
    let generated_owner;
    let owner = match &params.owner_password {
        Some(password) => truncate(password),
        None => {
            generated_owner = Zeroizing::new(random_bytes::<32>().to_vec());
            debug!("No owner password given, using a random one");
            &generated_owner[..]
        }
    };

    let key = Zeroizing::new(random_bytes::<KEY_LEN>().to_vec());

    let mut user_hash = Vec::with_capacity(HASH_STRING_LEN);
    let uvs = random_bytes::<SALT_LEN>();
    let uks = random_bytes::<SALT_LEN>();
    user_hash.extend_from_slice(&hash(revision, user, &uvs, &[])?);
    user_hash.extend_from_slice(&uvs);
    user_hash.extend_from_slice(&uks);
    let user_key = hash(revision, user, &uks, &[])?;
    let user_encrypted_key = aes256_encrypt(&user_key, &key)?;

    let mut owner_hash = Vec::with_capacity(HASH_STRING_LEN);
    let ovs = random_bytes::<SALT_LEN>();
    let oks = random_bytes::<SALT_LEN>();
    owner_hash.extend_from_slice(&hash(revision, owner, &ovs, &user_hash)?);
    owner_hash.extend_from_slice(&ovs);
    owner_hash.extend_from_slice(&oks);
    let owner_key = hash(revision, owner, &oks, &user_hash)?;
    let owner_encrypted_key = aes256_encrypt(&owner_key, &key)?;

    let permissions = params.permissions.normalized();
    let mut block = [0u8; PERMS_LEN];
    block[..4].copy_from_slice(&permissions.bits().to_le_bytes());
    block[4..8].copy_from_slice(&[0xff; 4]);
    block[8] = if params.encrypt_metadata { b'T' } else { b'F' };
    block[9..12].copy_from_slice(PERMS_MAGIC);
    block[12..].copy_from_slice(&random_bytes::<4>());
    let perms = aes256_encrypt(&key, &block)?;

    let (stream_filter, string_filter, embedded_file_filter) = if params.embedded_files_only {
        (IDENTITY, IDENTITY, Some(STD_CF.to_string()))
    } else {
        (STD_CF, STD_CF, None)
    };

    let dictionary = EncryptionDictionary {
        version: 5,
        revision,
        length: 256,
        owner_hash,
        user_hash,
        owner_encrypted_key,
        user_encrypted_key,
        perms,
        permissions: permissions.as_p_value(),
        encrypt_metadata: params.encrypt_metadata,
        crypt_filter_method: "AESV3".to_string(),
        stream_filter: stream_filter.to_string(),
        string_filter: string_filter.to_string(),
        embedded_file_filter,
    };
    debug!(
        "Generated R{} encryption dictionary, P={}",
        revision.number(),
        dictionary.permissions
    );

    Ok(EncryptionKeyMaterial { key, dictionary })
}

/// Recover the file key from `password`.
///
/// The owner password is tried first, then the user password. The
/// decrypted `Perms` block must carry its magic bytes even when a hash
/// matched.
pub fn recover(dictionary: &EncryptionDictionary, password: &[u8]) -> Result<RecoveredKey> {
    dictionary.validate()?;
    let revision = dictionary.revision;
    let password = truncate(password);
    let o = &dictionary.owner_hash;
    let u = &dictionary.user_hash;

    let owner_check = hash(revision, password, &o[VALIDATION_SALT], u)?;
    let (key, authenticated_as) = if bool::from(owner_check[..].ct_eq(&o[..32])) {
        let owner_key = hash(revision, password, &o[KEY_SALT], u)?;
        (
            aes256_decrypt(&owner_key, &dictionary.owner_encrypted_key)?,
            PasswordKind::Owner,
        )
    } else {
        let user_check = hash(revision, password, &u[VALIDATION_SALT], &[])?;
        if !bool::from(user_check[..].ct_eq(&u[..32])) {
            return Err(TrustError::BadUserPassword);
        }
        let user_key = hash(revision, password, &u[KEY_SALT], &[])?;
        (
            aes256_decrypt(&user_key, &dictionary.user_encrypted_key)?,
            PasswordKind::User,
        )
    };

    let block = aes256_decrypt(&key, &dictionary.perms)?;
    if &block[9..12] != PERMS_MAGIC {
        return Err(TrustError::BadPassword(
            "permissions block failed its integrity check".to_string(),
        ));
    }

    let mut p = [0u8; 4];
    p.copy_from_slice(&block[..4]);
    let permissions = Permissions::from_bits(u32::from_le_bytes(p));
    if permissions.as_p_value() != dictionary.permissions {
        debug!(
            "P entry {} differs from the encrypted permissions {}",
            dictionary.permissions,
            permissions.as_p_value()
        );
    }

    Ok(RecoveredKey {
        key,
        permissions,
        encrypt_metadata: block[8] == b'T',
        authenticated_as,
    })
}

fn truncate(password: &[u8]) -> &[u8] {
    &password[..password.len().min(MAX_PASSWORD_LEN)]
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Password hash for the given revision, 32 bytes.
fn hash(
    revision: Revision,
    password: &[u8],
    salt: &[u8],
    user_data: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    hasher.update(user_data);
    let initial = Zeroizing::new(hasher.finalize().to_vec());

    match revision {
        Revision::R5 => Ok(initial),
        Revision::R6 => iterated_hash(initial, password, user_data),
    }
}

/// ISO 32000-2 algorithm 2.B.
fn iterated_hash(
    mut k: Zeroizing<Vec<u8>>,
    password: &[u8],
    user_data: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let mut round = 0usize;
    loop {
        let mut k1 = Zeroizing::new(Vec::with_capacity(
            64 * (password.len() + k.len() + user_data.len()),
        ));
        for _ in 0..64 {
            k1.extend_from_slice(password);
            k1.extend_from_slice(&k);
            k1.extend_from_slice(user_data);
        }

        let len = k1.len();
        cbc::Encryptor::<Aes128>::new_from_slices(&k[..16], &k[16..32])
            .map_err(|e| TrustError::crypto(e.to_string()))?
            .encrypt_padded_mut::<NoPadding>(&mut k1, len)
            .map_err(|_| TrustError::crypto("hash round input is not block aligned"))?;
        let e = k1;

        let selector = e[..16].iter().map(|&b| u32::from(b)).sum::<u32>() % 3;
        k = Zeroizing::new(match selector {
            0 => Sha256::digest(&e[..]).to_vec(),
            1 => Sha384::digest(&e[..]).to_vec(),
            _ => Sha512::digest(&e[..]).to_vec(),
        });

        round += 1;
        let last = usize::from(e[e.len() - 1]);
        if round >= 64 && last <= round - 32 {
            break;
        }
    }
    k.truncate(32);
    Ok(k)
}

fn aes256_encrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut buf = data.to_vec();
    let len = buf.len();
    cbc::Encryptor::<Aes256>::new_from_slices(key, &ZERO_IV)
        .map_err(|e| TrustError::crypto(e.to_string()))?
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|_| TrustError::crypto("plaintext is not block aligned"))?;
    Ok(buf)
}

fn aes256_decrypt(key: &[u8], data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let mut buf = Zeroizing::new(data.to_vec());
    cbc::Decryptor::<Aes256>::new_from_slices(key, &ZERO_IV)
        .map_err(|e| TrustError::crypto(e.to_string()))?
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| TrustError::crypto("ciphertext is not block aligned"))?;
    Ok(buf)
}
