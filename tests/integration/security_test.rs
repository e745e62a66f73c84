//! Integration tests for AES-256 standard security handler key derivation

use pdf_trust::security::{
    generate, recover, EncryptionParams, PasswordKind, Permissions, Revision, HASH_STRING_LEN,
    KEY_LEN, PERMS_LEN,
};
use pdf_trust::TrustError;

#[test]
fn test_round_trip_both_revisions() {
    for revision in [Revision::R5, Revision::R6] {
        let params = EncryptionParams::new("alice")
            .owner_password("bob")
            .permissions(Permissions::PRINTING | Permissions::FILL_IN)
            .revision(revision);
        let material = generate(&params).unwrap();
        let dictionary = &material.dictionary;

        assert_eq!(dictionary.revision, revision);
        assert_eq!(dictionary.owner_hash.len(), HASH_STRING_LEN);
        assert_eq!(dictionary.user_hash.len(), HASH_STRING_LEN);
        assert_eq!(dictionary.perms.len(), PERMS_LEN);
        assert_eq!(material.file_key().len(), KEY_LEN);

        let user = recover(dictionary, b"alice").unwrap();
        assert_eq!(user.authenticated_as, PasswordKind::User);
        assert_eq!(user.file_key(), material.file_key());
        assert!(user.permissions.contains(Permissions::PRINTING));
        assert!(!user.permissions.contains(Permissions::COPY));
        assert!(user.encrypt_metadata);

        let owner = recover(dictionary, b"bob").unwrap();
        assert_eq!(owner.authenticated_as, PasswordKind::Owner);
        assert_eq!(owner.file_key(), material.file_key());

        let err = recover(dictionary, b"eve").unwrap_err();
        assert!(matches!(err, TrustError::BadUserPassword));
        assert!(err.is_password());
    }
}

#[test]
fn test_each_generation_uses_fresh_key() {
    let params = EncryptionParams::new("same").owner_password("same-owner");
    let a = generate(&params).unwrap();
    let b = generate(&params).unwrap();
    assert_ne!(a.file_key(), b.file_key());
    assert_ne!(a.dictionary.user_hash, b.dictionary.user_hash);
}

#[test]
fn test_empty_user_password_opens_document() {
    let material = generate(&EncryptionParams::new("").owner_password("secret")).unwrap();
    let opened = recover(&material.dictionary, b"").unwrap();
    assert_eq!(opened.authenticated_as, PasswordKind::User);
    assert_eq!(opened.file_key(), material.file_key());
}

#[test]
fn test_long_passwords_truncated() {
    let long = "x".repeat(200);
    let material = generate(&EncryptionParams::new(&long).revision(Revision::R6)).unwrap();
    let opened = recover(&material.dictionary, "x".repeat(127).as_bytes()).unwrap();
    assert_eq!(opened.file_key(), material.file_key());
}

#[test]
fn test_tampered_perms_detected() {
    let mut material = generate(&EncryptionParams::new("alice").owner_password("bob")).unwrap();
    material.dictionary.perms[0] ^= 0x01;
    let err = recover(&material.dictionary, b"alice").unwrap_err();
    assert!(matches!(err, TrustError::BadPassword(_)));
}

#[test]
fn test_metadata_flag_survives() {
    let material =
        generate(&EncryptionParams::new("alice").without_metadata_encryption()).unwrap();
    assert!(!material.dictionary.encrypt_metadata);
    let opened = recover(&material.dictionary, b"alice").unwrap();
    assert!(!opened.encrypt_metadata);
}
