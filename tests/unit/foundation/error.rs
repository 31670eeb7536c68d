use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        FramepipeError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(FramepipeError::scope("x").to_string().contains("scope error:"));
    assert!(FramepipeError::raster("x").to_string().contains("raster error:"));
    assert!(
        FramepipeError::connection("x")
            .to_string()
            .contains("connection error:")
    );
    assert!(FramepipeError::config("x").to_string().contains("config error:"));
    assert!(
        FramepipeError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = FramepipeError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
