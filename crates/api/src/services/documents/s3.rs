//! Documents as objects in an S3 bucket.
//!
//! The storage key is the object key. `S3_ENDPOINT` points the client at an
//! S3-compatible service (`MinIO` in local stacks) with path-style URLs.

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;

use super::{DocumentError, check_key};

/// Documents stored in one bucket.
#[derive(Debug, Clone)]
pub struct S3Documents {
    client: aws_sdk_s3::Client,
    bucket: String,
}

fn object_store_error(err: &(dyn std::error::Error + 'static)) -> DocumentError {
    DocumentError::ObjectStore(DisplayErrorContext(err).to_string())
}

impl S3Documents {
    #[must_use]
    pub const fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Build a client from the AWS environment (credentials chain, region).
    pub async fn connect(bucket: String, region: Option<&str>, endpoint: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_owned()));
        }
        let shared = loader.load().await;

        let mut config = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            config = config.endpoint_url(endpoint).force_path_style(true);
        }

        tracing::info!(bucket = %bucket, "Client documents stored in S3");
        Self::new(aws_sdk_s3::Client::from_conf(config.build()), bucket)
    }

    #[tracing::instrument(skip(self, bytes), fields(bucket = %self.bucket, size = bytes.len()))]
    pub(super) async fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<(), DocumentError> {
        check_key(key)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| object_store_error(&e))?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.bucket))]
    pub(super) async fn get(&self, key: &str) -> Result<Vec<u8>, DocumentError> {
        check_key(key)?;
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(GetObjectError::is_no_such_key) => {
                return Err(DocumentError::Missing);
            }
            Err(e) => return Err(object_store_error(&e)),
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| object_store_error(&e))?;
        Ok(body.into_bytes().to_vec())
    }

    /// S3 answers `204` for absent keys too.
    #[tracing::instrument(skip(self), fields(bucket = %self.bucket))]
    pub(super) async fn delete(&self, key: &str) -> Result<(), DocumentError> {
        check_key(key)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| object_store_error(&e))?;
        Ok(())
    }
}
