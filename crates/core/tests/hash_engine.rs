use drift_core::canon::canonicalize;
use drift_core::hash::{hash_bytes, ContentHash, HashEngine, HashError, VerifyFailure, HASH_HEX_LEN};
use drift_core::model::{CanonicalForm, Format, FormatFamily};

const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[test]
fn hash_is_lowercase_hex_sha256() {
    let form = CanonicalForm::from_stored(FormatFamily::Source, "");
    let hash = HashEngine::new().hash(&form);
    assert_eq!(hash.as_str(), EMPTY_SHA256);
    assert_eq!(hash.as_str().len(), HASH_HEX_LEN);
}

#[test]
fn equal_content_hashes_equal() {
    let engine = HashEngine::new();
    let a = canonicalize(b"let x = 1;", Format::SourceText).expect("a");
    let b = canonicalize(b"let   x=1 ;  // same", Format::SourceText).expect("b");
    assert_eq!(engine.hash(&a), engine.hash(&b));
    assert_eq!(engine.hash(&a), engine.hash(&a));
}

#[test]
fn verify_accepts_matching_and_rejects_other_hashes() {
    let engine = HashEngine::new();
    let form = canonicalize(b"let x = 1;", Format::SourceText).expect("form");
    let hash = engine.hash(&form);

    assert!(engine.verify(&form, hash.as_str()));
    assert!(!engine.verify(&form, EMPTY_SHA256));
    assert!(!engine.verify(&form, "not-a-hash"));

    match engine.check(&form, EMPTY_SHA256) {
        Err(VerifyFailure::Mismatch { actual, .. }) => assert_eq!(actual, hash),
        other => panic!("expected mismatch, got {other:?}"),
    }
    assert!(matches!(
        engine.check(&form, "XYZ"),
        Err(VerifyFailure::MalformedExpected(HashError::Malformed(_)))
    ));
}

#[test]
fn content_hash_parsing_is_strict() {
    assert!(ContentHash::parse(EMPTY_SHA256).is_ok());
    assert!(ContentHash::parse(&EMPTY_SHA256.to_uppercase()).is_err());
    assert!(ContentHash::parse(&EMPTY_SHA256[1..]).is_err());
    assert!("".parse::<ContentHash>().is_err());
}

#[test]
fn content_hash_serializes_as_plain_string() {
    let hash = ContentHash::parse(EMPTY_SHA256).expect("hash");
    let json = serde_json::to_string(&hash).expect("serialize");
    assert_eq!(json, format!("\"{EMPTY_SHA256}\""));

    let bad: Result<ContentHash, _> = serde_json::from_str("\"abc\"");
    assert!(bad.is_err());
}

#[test]
fn digest_hex_keeps_leading_zero_nibbles() {
    let hash = hash_bytes(b"abc");
    assert_eq!(hash.as_str(), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    assert!(ContentHash::parse(hash.as_str()).is_ok());
}
