//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kvmodel_core::{Attribute, Clock, ManualClock};
use kvmodel_engine::{Engine, Model, Record, Schema};
use kvmodel_storage::{MemoryStore, Store};
use serde_json::json;

/// Fixed starting point for every test clock
pub const NOW: u64 = 1_700_000_000;

/// Three weeks: weekly shards, window of 3 + 2
pub const NOTICE_EXPIRE: i64 = 86_400 * 7 * 3;

/// Store, engine and clock wired together
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub clock: ManualClock,
    pub engine: Engine,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = ManualClock::at_secs(NOW);
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(MemoryStore::with_clock(Arc::clone(&shared)));
        let engine = Engine::new(Arc::clone(&store) as Arc<dyn Store>).with_clock(shared);
        Self {
            store,
            clock,
            engine,
        }
    }

    pub fn notices(&self) -> Model {
        self.engine.register(notice_schema()).unwrap()
    }
}

/// Receiver notification with every index family declared
pub fn notice_schema() -> Schema {
    Schema::builder("rcnotice")
        .expire_secs(NOTICE_EXPIRE)
        .created_at("date_created")
        .meta_field("receiver_id")
        .unique_index(&["category", "date_created"])
        .unique_index(&["receiver_id", "is_read", "notice_id"])
        .unique_index(&["receiver_id", "is_read", "date_created"])
        .unique_index(&["receiver_id", "category", "date_created"])
        .unique_index(&["receiver_id", "category", "is_read", "date_created"])
        .attribute(Attribute::integer("receiver_id").required().index_value())
        .attribute(Attribute::char("target_id").required())
        .attribute(Attribute::char("target_type").required())
        .attribute(Attribute::char("action").required())
        .attribute(Attribute::char("category").required().index_value())
        .attribute(Attribute::char("title").required())
        .attribute(Attribute::char("content"))
        .attribute(Attribute::list("sender_ids").default_value(Vec::<serde_json::Value>::new()))
        .attribute(Attribute::json("target_info").default_value(json!({})))
        .attribute(Attribute::boolean("is_read").index_value().default_value(false))
        .attribute(Attribute::integer("notice_id").required().indexed())
        .attribute(Attribute::datetime("date_created").required().indexed())
        .build()
        .unwrap()
}

pub fn at(secs: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs as i64, 0).unwrap()
}

/// A valid unread notice for receiver 2
pub fn notice(id: &str, notice_id: i64, created: DateTime<Utc>) -> Record {
    Record::with_id(id)
        .set("receiver_id", 2i64)
        .set("target_id", "1")
        .set("target_type", "question")
        .set("action", "answer")
        .set("title", "New answer")
        .set("category", "ask")
        .set("content", "Someone answered your question")
        .set("notice_id", notice_id)
        .set("date_created", created)
}

/// Ten notices "0".."9" created one second apart, oldest first
pub fn seed_ten(model: &Model) {
    for i in 0..10u64 {
        model
            .create(notice(&i.to_string(), i as i64, at(NOW - 100 + i)))
            .unwrap();
    }
}

pub fn ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.id().unwrap_or_default().to_string())
        .collect()
}
