//! Unit tests for error display and classification.

use super::*;

#[test]
fn display_names_the_kind() {
    let cases: Vec<(EngineError, &str)> = vec![
        (
            EngineError::CapacityExhausted { what: "textures", capacity: 5000 },
            "capacity exhausted: textures (limit 5000)",
        ),
        (EngineError::AssetParse("bad obj".into()), "asset parse error: bad obj"),
        (
            EngineError::UnsupportedFormat("cubemap".into()),
            "unsupported format: cubemap",
        ),
        (EngineError::ShaderLoad("missing".into()), "shader load error: missing"),
        (EngineError::DrawBufferOverflow, "indirect draw buffer overflow"),
        (EngineError::DeviceLost, "device lost"),
    ];
    for (error, expected) in cases {
        assert_eq!(error.to_string(), expected);
    }
}

#[test]
fn errors_are_comparable() {
    assert_eq!(EngineError::DeviceLost, EngineError::DeviceLost);
    assert_ne!(
        EngineError::DeviceLost,
        EngineError::DrawBufferOverflow
    );
}

#[test]
fn error_trait_is_implemented() {
    let error: Box<dyn std::error::Error> = Box::new(EngineError::DeviceLost);
    assert_eq!(error.to_string(), "device lost");
}
