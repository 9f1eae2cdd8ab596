// src/store/mongo.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{self, doc, DateTime as BsonDateTime, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};

use crate::config::WorkerConfig;
use crate::errors::{WorkerError, WorkerResult};
use crate::ingest::extract::ExtractionDebug;
use crate::ingest::types::MetricPoint;
use crate::store::mirror::{MirrorConnector, MirrorStore};

/// BSON datetimes are millisecond UTC.
fn bson_dt(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

fn index(keys: Document, name: &str, unique: bool) -> IndexModel {
    let options = IndexOptions::builder()
        .name(name.to_string())
        .unique(unique)
        .build();
    IndexModel::builder().keys(keys).options(options).build()
}

/// Non-unique index on the observation key from earlier deployments. Same keys
/// as `uniq_metric_scraped` with different options, so it must go first.
const LEGACY_OBS_INDEXES: &[&str] = &["idx_metric_scraped"];

fn stale_obs_indexes(existing: &[String]) -> Vec<&'static str> {
    LEGACY_OBS_INDEXES
        .iter()
        .copied()
        .filter(|legacy| existing.iter().any(|name| name == legacy))
        .collect()
}

/// Connection settings; a new client is created for every run.
#[derive(Debug, Clone)]
pub struct MongoConnector {
    uri: String,
    db: String,
    raw_collection: String,
    obs_collection: String,
    latest_collection: String,
}

impl MongoConnector {
    pub fn from_config(cfg: &WorkerConfig) -> Self {
        Self {
            uri: cfg.mongo_uri.clone(),
            db: cfg.mongo_db.clone(),
            raw_collection: cfg.mongo_raw_collection.clone(),
            obs_collection: cfg.mongo_obs_collection.clone(),
            latest_collection: cfg.mongo_latest_collection.clone(),
        }
    }
}

#[async_trait]
impl MirrorConnector for MongoConnector {
    async fn open(&self) -> WorkerResult<Box<dyn MirrorStore>> {
        let client = Client::with_uri_str(&self.uri).await?;
        let db = client.database(&self.db);
        Ok(Box::new(MongoMirror {
            raw: db.collection(&self.raw_collection),
            obs: db.collection(&self.obs_collection),
            latest: db.collection(&self.latest_collection),
            _client: client,
        }))
    }
}

pub struct MongoMirror {
    raw: Collection<Document>,
    obs: Collection<Document>,
    latest: Collection<Document>,
    // Dropped with the session at the end of the run.
    _client: Client,
}

fn point_fields(p: &MetricPoint) -> Document {
    doc! {
        "metric_uid": p.metric_uid.as_str(),
        "metric_name": p.metric_name.as_str(),
        "geo": p.geo.as_str(),
        "unit": p.unit.as_str(),
        "period": p.period.as_str(),
        "value": p.value,
        "source": p.source.as_str(),
        "source_url": p.source_url.as_str(),
        "scraped_at": bson_dt(p.scraped_at),
    }
}

#[async_trait]
impl MirrorStore for MongoMirror {
    async fn ensure_indexes(&self) -> WorkerResult<()> {
        self.raw
            .create_index(index(doc! { "run_id": 1 }, "uniq_run_id", true))
            .await?;
        self.raw
            .create_index(index(doc! { "scraped_at": 1 }, "idx_scraped_at", false))
            .await?;

        // Creates the collection, so its index list can be read below.
        self.obs
            .create_index(index(doc! { "scraped_at": 1 }, "idx_scraped_at", false))
            .await?;
        let existing = self.obs.list_index_names().await?;
        for name in stale_obs_indexes(&existing) {
            tracing::info!(index = name, "dropping legacy observations index");
            self.obs.drop_index(name).await?;
        }
        self.obs
            .create_index(index(
                doc! { "metric_uid": 1, "scraped_at": 1 },
                "uniq_metric_scraped",
                true,
            ))
            .await?;

        self.latest
            .create_index(index(doc! { "metric_uid": 1 }, "uniq_metric_uid", true))
            .await?;
        self.latest
            .create_index(index(doc! { "last_seen_at": 1 }, "idx_last_seen_at", false))
            .await?;
        Ok(())
    }

    async fn insert_raw_run(
        &self,
        run_id: &str,
        source_url: &str,
        scraped_at: DateTime<Utc>,
        raw_debug: &ExtractionDebug,
    ) -> WorkerResult<()> {
        let raw_debug = bson::to_bson(raw_debug)
            .map_err(|e| WorkerError::mirror(format!("encoding raw_debug: {e}")))?;
        self.raw
            .insert_one(doc! {
                "run_id": run_id,
                "source_url": source_url,
                "scraped_at": bson_dt(scraped_at),
                "raw_debug": raw_debug,
            })
            .await?;
        Ok(())
    }

    async fn upsert_observations(&self, points: &[MetricPoint]) -> WorkerResult<()> {
        for p in points {
            let filter = doc! {
                "metric_uid": p.metric_uid.as_str(),
                "scraped_at": bson_dt(p.scraped_at),
            };
            self.obs
                .update_one(filter, doc! { "$set": point_fields(p) })
                .upsert(true)
                .await?;
        }
        Ok(())
    }

    async fn upsert_latest(&self, points: &[MetricPoint]) -> WorkerResult<()> {
        for p in points {
            let ts = bson_dt(p.scraped_at);
            let mut set = point_fields(p);
            set.insert("last_seen_at", ts);
            self.latest
                .update_one(
                    doc! { "metric_uid": p.metric_uid.as_str() },
                    doc! {
                        "$setOnInsert": { "first_seen_at": ts },
                        "$set": set,
                    },
                )
                .upsert(true)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_observation_index_is_dropped_only_when_present() {
        let old_db = vec![
            "_id_".to_string(),
            "idx_metric_scraped".to_string(),
            "idx_scraped_at".to_string(),
        ];
        assert_eq!(stale_obs_indexes(&old_db), vec!["idx_metric_scraped"]);

        let migrated = vec![
            "_id_".to_string(),
            "idx_scraped_at".to_string(),
            "uniq_metric_scraped".to_string(),
        ];
        assert!(stale_obs_indexes(&migrated).is_empty());
        assert!(stale_obs_indexes(&[]).is_empty());
    }
}
