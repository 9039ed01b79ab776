use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use serde_json::Value;

stored_object!(CacheEntry, "cache", {
    request_hash: String,
    question: String,
    context: Value,
    response: String,
    hit_count: u64,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    last_hit_at: Option<DateTime<Utc>>
});

/// Content-addressed response cache. The request hash doubles as the record
/// id so lookups are single-key reads.
impl CacheEntry {
    pub async fn find_by_hash(
        db: &SurrealDbClient,
        hash: &str,
    ) -> Result<Option<CacheEntry>, AppError> {
        Ok(db.get_item(hash).await?)
    }

    /// Upsert keyed on the hash. On conflict the question, context and
    /// response are overwritten and `updated_at` is bumped to server time;
    /// `created_at` and `hit_count` survive.
    pub async fn save(
        db: &SurrealDbClient,
        hash: &str,
        question: &str,
        context: Value,
        response: &str,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPSERT type::thing('cache', $hash) SET \
                    request_hash = $hash, \
                    question = $question, \
                    context = $context, \
                    response = $response, \
                    hit_count = IF hit_count != NONE THEN hit_count ELSE 0 END, \
                    created_at = IF created_at != NONE THEN created_at ELSE time::now() END, \
                    updated_at = time::now()",
            )
            .bind(("hash", hash.to_owned()))
            .bind(("question", question.to_owned()))
            .bind(("context", context))
            .bind(("response", response.to_owned()))
            .await?
            .check()?;

        Ok(())
    }

    /// Atomic hit accounting.
    pub async fn increment_hit_count(db: &SurrealDbClient, hash: &str) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('cache', $hash) SET \
                    hit_count += 1, \
                    last_hit_at = time::now(), \
                    updated_at = time::now()",
            )
            .bind(("hash", hash.to_owned()))
            .await?
            .check()?;

        Ok(())
    }
}
