use base64::{engine::general_purpose, Engine as _};
use chrono::{TimeZone, Utc};
use session_core::{
    CipherSuite, KdfParams, SessionCodec, SessionError, SessionRecord, SharedSecret,
};

fn codec(secret: &str) -> SessionCodec {
    SessionCodec::new(SharedSecret::new(secret).unwrap(), KdfParams::default())
}

fn sample_records() -> Vec<SessionRecord> {
    vec![
        SessionRecord::new("token-only", "learner"),
        SessionRecord::new("eyJhbGciOiJIUzI1NiJ9.e30.sig", "admin")
            .with_user_id("42")
            .with_email("ops@example.com")
            .with_display_name("Ops Team")
            .with_expiry(Utc.with_ymd_and_hms(2031, 1, 2, 3, 4, 5).unwrap()),
        SessionRecord::new("", "instructor").with_display_name("Zoë ünïcødé 🚀"),
        SessionRecord::new("x".repeat(2048), "unknown-role"),
    ]
}

fn is_rejected(result: Result<SessionRecord, SessionError>) -> bool {
    matches!(result, Err(SessionError::InvalidSession))
}

#[test]
fn round_trip_for_varied_records() {
    let codec = codec("round-trip-secret");
    for record in sample_records() {
        let blob = codec.seal(&record).unwrap();
        assert_eq!(codec.unseal(&blob).unwrap(), record);
    }
}

#[test]
fn sealing_twice_gives_different_blobs() {
    let codec = codec("nondeterminism");
    let record = SessionRecord::new("same-token", "learner");
    let a = codec.seal(&record).unwrap();
    let b = codec.seal(&record).unwrap();
    assert_ne!(a, b);

    let raw_a = general_purpose::STANDARD.decode(&a).unwrap();
    let raw_b = general_purpose::STANDARD.decode(&b).unwrap();
    // salt and nonce both fresh
    assert_ne!(raw_a[1..17], raw_b[1..17]);
    assert_ne!(raw_a[17..29], raw_b[17..29]);

    assert_eq!(codec.unseal(&a).unwrap(), record);
    assert_eq!(codec.unseal(&b).unwrap(), record);
}

#[test]
fn single_byte_flips_are_detected() {
    let codec = codec("tamper-secret");
    let record = SessionRecord::new("bearer", "admin").with_user_id("7");
    let raw = general_purpose::STANDARD
        .decode(codec.seal(&record).unwrap())
        .unwrap();

    let header_len = 1 + 16 + 12;
    let tag_start = raw.len() - 16;
    let mut positions: Vec<usize> = (tag_start..raw.len()).collect();
    positions.extend((header_len..tag_start).step_by(5));
    positions.extend([0, 1, 16, 17, 28, tag_start - 1]);

    for pos in positions {
        let mut tampered = raw.clone();
        tampered[pos] ^= 0x80;
        let blob = general_purpose::STANDARD.encode(&tampered);
        assert!(
            is_rejected(codec.unseal(&blob)),
            "flip at byte {pos} was not detected"
        );
    }
}

#[test]
fn truncation_and_extension_are_rejected() {
    let codec = codec("length-secret");
    let raw = general_purpose::STANDARD
        .decode(codec.seal(&SessionRecord::new("t", "learner")).unwrap())
        .unwrap();

    let truncated = general_purpose::STANDARD.encode(&raw[..raw.len() - 1]);
    assert!(is_rejected(codec.unseal(&truncated)));

    let mut extended = raw.clone();
    extended.push(0);
    assert!(is_rejected(
        codec.unseal(&general_purpose::STANDARD.encode(&extended))
    ));

    let header_only = general_purpose::STANDARD.encode(&raw[..29]);
    assert!(is_rejected(codec.unseal(&header_only)));
}

#[test]
fn wrong_secret_is_rejected() {
    let record = SessionRecord::new("token", "learner");
    let blob = codec("secret-a").seal(&record).unwrap();
    assert!(is_rejected(codec("secret-b").unseal(&blob)));

    let legacy_blob = codec("secret-a")
        .with_suite(CipherSuite::Aes256CbcLegacy)
        .seal(&record)
        .unwrap();
    let legacy_reader = codec("secret-b").accept_legacy(true);
    assert!(is_rejected(legacy_reader.unseal(&legacy_blob)));
}

#[test]
fn arbitrary_strings_are_rejected() {
    let codec = codec("malformed");
    let inputs = [
        "",
        " ",
        "not base64 at all!",
        "AAAA",
        "AQ==",
        "////////////////////////////////////////////////////////////",
        "eyJhY2Nlc3NfdG9rZW4iOiJ0Iiwicm9sZSI6ImFkbWluIn0=",
    ];
    for input in inputs {
        assert!(is_rejected(codec.unseal(input)), "accepted {input:?}");
    }
}

#[test]
fn failures_are_indistinguishable() {
    let codec = codec("oracle");
    let good = codec.seal(&SessionRecord::new("t", "learner")).unwrap();
    let mut raw = general_purpose::STANDARD.decode(&good).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 1;
    let forged = general_purpose::STANDARD.encode(&raw);

    let bad_encoding = codec.unseal("%%%").unwrap_err().to_string();
    let bad_framing = codec.unseal("AQID").unwrap_err().to_string();
    let bad_tag = codec.unseal(&forged).unwrap_err().to_string();
    assert_eq!(bad_encoding, bad_framing);
    assert_eq!(bad_framing, bad_tag);
}

#[tokio::test]
async fn async_seal_and_unseal() {
    let codec = codec("async-secret");
    let record = SessionRecord::new("async-token", "instructor");
    let (a, b) = tokio::join!(
        codec.seal_async(record.clone()),
        codec.seal_async(record.clone())
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a, b);
    assert_eq!(codec.unseal_async(a).await.unwrap(), record);
    assert!(matches!(
        codec.unseal_async("garbage".into()).await,
        Err(SessionError::InvalidSession)
    ));
}
