//! S3-backed [`ObjectStore`].

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier};
use skyrun_core::provider::ObjectStore;
use skyrun_types::{Error, Result};

use crate::error::{is_already_exists, map_sdk_err};

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    region: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, region: impl Into<String>) -> Self {
        Self { client, region: region.into() }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        // us-east-1 rejects an explicit location constraint.
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        match request.send().await {
            Ok(_) => Ok(()),
            Err(err) if is_already_exists(&err) => Ok(()),
            Err(err) => Err(map_sdk_err(err, "creating bucket")),
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type("application/zip")
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "uploading object"))?;
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(map_sdk_err(err, "checking object")),
        }
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation)
                .send()
                .await
                .map_err(|err| map_sdk_err(err, "listing objects"))?;
            keys.extend(page.contents().iter().filter_map(|o| o.key().map(str::to_string)));
            match page.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => return Ok(keys),
            }
        }
    }

    async fn purge_bucket(&self, bucket: &str) -> Result<()> {
        loop {
            let keys = self.list_keys(bucket, "").await?;
            if keys.is_empty() {
                return Ok(());
            }
            let identifiers = keys
                .into_iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::provider(format!("building delete request: {e}")))?;
            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .build()
                .map_err(|e| Error::provider(format!("building delete request: {e}")))?;
            self.client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|err| map_sdk_err(err, "purging bucket"))?;
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| map_sdk_err(err, "deleting bucket"))?;
        Ok(())
    }
}
