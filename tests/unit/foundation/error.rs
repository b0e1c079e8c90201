use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        StratumError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        StratumError::surface("x")
            .to_string()
            .contains("surface error:")
    );
    assert!(StratumError::scene("x").to_string().contains("scene error:"));
    assert!(
        StratumError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = StratumError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn serde_json_errors_convert() {
    let bad = serde_json::from_str::<u32>("not a number").unwrap_err();
    let err: StratumError = bad.into();
    assert!(matches!(err, StratumError::Serde(_)));
}
