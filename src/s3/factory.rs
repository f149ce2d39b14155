//! Scheme-to-constructor registry for object-storage backends.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use super::ObjectBackend;
use super::aws::AwsS3;
use super::local::LocalS3;
use super::url::ParsedS3Url;
use crate::error::GatewayError;

type S3Constructor = fn(&ParsedS3Url) -> Result<Arc<dyn ObjectBackend>, GatewayError>;

static FACTORIES: LazyLock<HashMap<&'static str, S3Constructor>> = LazyLock::new(|| {
    HashMap::from([
        ("local", LocalS3::from_parsed as S3Constructor),
        ("minio", AwsS3::from_parsed as S3Constructor),
        ("s3", AwsS3::from_parsed as S3Constructor),
    ])
});

/// Constructs an unstarted backend for the parsed URL.
pub fn create_backend(parsed: &ParsedS3Url) -> Result<Arc<dyn ObjectBackend>, GatewayError> {
    let constructor =
        FACTORIES
            .get(parsed.scheme())
            .ok_or_else(|| GatewayError::UnsupportedScheme {
                family: "S3",
                scheme: parsed.scheme().to_string(),
            })?;
    constructor(parsed)
}
