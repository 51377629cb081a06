//! Snowflake message ids. Time-ordered, so ordering history by id matches
//! insertion order and per-scope timestamps are monotonic non-decreasing.

use ferroid::futures::SnowflakeGeneratorAsyncTokioExt;
use ferroid::generator::{Error, LockSnowflakeGenerator};
use ferroid::id::SnowflakeTwitterId;
use ferroid::time::{MonotonicClock, TWITTER_EPOCH};

pub type MessageIdGenerator = LockSnowflakeGenerator<SnowflakeTwitterId, MonotonicClock>;

pub fn generator(machine_id: u64) -> MessageIdGenerator {
    LockSnowflakeGenerator::new(machine_id, MonotonicClock::with_epoch(TWITTER_EPOCH))
}

pub async fn next_message_id(gen: &MessageIdGenerator) -> Result<i64, Error> {
    let id = gen.try_next_id_async().await?;
    Ok(id.to_raw() as i64)
}
