//! Kinesis-backed event stream
//!
//! Publishes with `PutRecord` partitioned by username and reads back through a
//! LATEST shard iterator, matching the downstream consumers that already
//! expect the `{username, message, channel}` payload on this stream.

use crate::stream::{ConsumeError, EventStream, PublishError, StreamCursor};
use crate::types::{ChatEvent, PublishRecord};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::types::ShardIteratorType;
use aws_sdk_kinesis::Client;
use tracing::debug;

pub struct KinesisStream {
    client: Client,
    stream_name: String,
}

impl KinesisStream {
    pub fn new(client: Client, stream_name: impl Into<String>) -> Self {
        Self {
            client,
            stream_name: stream_name.into(),
        }
    }

    /// Build a client from the ambient AWS environment (credentials chain,
    /// `AWS_REGION`, falling back to us-east-1).
    pub async fn from_env(stream_name: impl Into<String>) -> Self {
        let region_provider =
            RegionProviderChain::default_provider().or_else(Region::new("us-east-1"));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;
        Self::new(Client::new(&shared_config), stream_name)
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }
}

#[async_trait]
impl EventStream for KinesisStream {
    async fn publish(&self, event: &ChatEvent) -> Result<(), PublishError> {
        let record = PublishRecord::for_event(&self.stream_name, event)
            .map_err(|e| PublishError::Serialization(e.to_string()))?;

        self.client
            .put_record()
            .stream_name(&record.stream_name)
            .partition_key(&record.partition_key)
            .data(Blob::new(record.payload))
            .send()
            .await
            .map(|_| ())
            // throttling and networking failures look alike here; both are
            // retryable at the publish_with_retry layer
            .map_err(|e| PublishError::Transient(e.to_string()))
    }

    async fn open_cursor(&self) -> Result<StreamCursor, ConsumeError> {
        let shards = self
            .client
            .list_shards()
            .stream_name(&self.stream_name)
            .send()
            .await
            .map_err(|e| ConsumeError::Cursor(e.to_string()))?;

        // single-shard streams only; multi-shard fan-in would carry one
        // iterator per shard in the cursor
        let shard = shards
            .shards()
            .first()
            .ok_or_else(|| ConsumeError::Cursor("stream has no shards".to_string()))?;

        let iterator = self
            .client
            .get_shard_iterator()
            .stream_name(&self.stream_name)
            .shard_id(shard.shard_id())
            .shard_iterator_type(ShardIteratorType::Latest)
            .send()
            .await
            .map_err(|e| ConsumeError::Cursor(e.to_string()))?;

        match iterator.shard_iterator() {
            Some(token) => Ok(StreamCursor::new(token)),
            None => Err(ConsumeError::Cursor(
                "service returned no shard iterator".to_string(),
            )),
        }
    }

    async fn next_batch(
        &self,
        cursor: &mut StreamCursor,
        limit: usize,
    ) -> Result<Vec<ChatEvent>, ConsumeError> {
        let Some(token) = cursor.token.take() else {
            return Err(ConsumeError::Cursor("cursor exhausted".to_string()));
        };

        let resp = self
            .client
            .get_records()
            .shard_iterator(token)
            .limit(limit as i32)
            .send()
            .await
            .map_err(|e| ConsumeError::Read(e.to_string()))?;

        cursor.token = resp.next_shard_iterator().map(str::to_string);

        let mut events = Vec::with_capacity(resp.records().len());
        for record in resp.records() {
            match serde_json::from_slice::<ChatEvent>(record.data().as_ref()) {
                Ok(event) => events.push(event),
                // a foreign record on the stream is not our failure to surface
                Err(e) => debug!(error = %e, "skipping undecodable stream record"),
            }
        }
        Ok(events)
    }
}
