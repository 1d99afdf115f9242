#[cfg(all(feature = "sqlite", feature = "test_utils"))]
pub mod prepare_env;
pub mod stub_ocr;
