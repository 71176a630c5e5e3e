//! Index maintenance, range reads and self-healing

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{at, notice, seed_ten, Fixture, NOTICE_EXPIRE, NOW};
use kvmodel_core::{Attribute, Error, Result};
use kvmodel_engine::{field, Engine, Model, Query, Schema};
use kvmodel_storage::{Command, Reply, ScoreBound, Store};

fn by_notice_id(model: &Model) -> Query {
    model
        .query()
        .filter_by("receiver_id", 2i64)
        .unwrap()
        .order_by(field("notice_id").asc())
        .unwrap()
}

fn by_notice_id_desc(model: &Model) -> Query {
    model
        .query()
        .filter_by("receiver_id", 2i64)
        .unwrap()
        .order_by(field("notice_id").desc())
        .unwrap()
}

fn strs(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

mod ranges {
    use super::*;

    #[test]
    fn test_comparison_bounds() {
        let fx = Fixture::new();
        let notices = fx.notices();
        seed_ten(&notices);
        let q = by_notice_id(&notices);

        let run = |c| q.filter(c).unwrap().ids().unwrap();
        assert_eq!(run(field("notice_id").lt(3i64)), strs(&["0", "1", "2"]));
        assert_eq!(run(field("notice_id").lte(3i64)), strs(&["0", "1", "2", "3"]));
        assert_eq!(run(field("notice_id").gt(7i64)), strs(&["8", "9"]));
        assert_eq!(run(field("notice_id").gte(7i64)), strs(&["7", "8", "9"]));
        assert_eq!(run(field("notice_id").between(3i64, 5i64)), strs(&["3", "4", "5"]));
        assert_eq!(run(field("notice_id").eq(4i64)), strs(&["4"]));
    }

    #[test]
    fn test_descending_range() {
        let fx = Fixture::new();
        let notices = fx.notices();
        seed_ten(&notices);

        let ids = by_notice_id_desc(&notices)
            .filter(field("notice_id").gte(6i64))
            .unwrap()
            .ids()
            .unwrap();
        assert_eq!(ids, strs(&["9", "8", "7", "6"]));
    }

    #[test]
    fn test_not_equal_spans_both_sides() {
        let fx = Fixture::new();
        let notices = fx.notices();
        seed_ten(&notices);

        let asc = by_notice_id(&notices).filter(field("notice_id").ne(4i64)).unwrap();
        assert_eq!(
            asc.ids().unwrap(),
            strs(&["0", "1", "2", "3", "5", "6", "7", "8", "9"])
        );
        // page straddling the excluded value
        assert_eq!(
            asc.offset(3).limit(3).unwrap().ids().unwrap(),
            strs(&["3", "5", "6"])
        );
        // page entirely past it
        assert_eq!(
            asc.offset(5).limit(2).unwrap().ids().unwrap(),
            strs(&["6", "7"])
        );

        let desc = by_notice_id_desc(&notices)
            .filter(field("notice_id").ne(4i64))
            .unwrap();
        assert_eq!(
            desc.offset(4).limit(3).unwrap().ids().unwrap(),
            strs(&["5", "3", "2"])
        );
    }

    #[test]
    fn test_offset_and_limit_paging() {
        let fx = Fixture::new();
        let notices = fx.notices();
        seed_ten(&notices);
        let q = by_notice_id_desc(&notices);

        assert_eq!(q.limit(3).unwrap().ids().unwrap(), strs(&["9", "8", "7"]));
        assert_eq!(
            q.offset(3).limit(3).unwrap().ids().unwrap(),
            strs(&["6", "5", "4"])
        );
        assert!(q.offset(20).ids().unwrap().is_empty());
        assert_eq!(q.first().unwrap().unwrap().id(), Some("9"));
    }

    #[test]
    fn test_counts() {
        let fx = Fixture::new();
        let notices = fx.notices();
        seed_ten(&notices);
        let q = by_notice_id(&notices);

        assert_eq!(q.count_all().unwrap(), 10);
        assert_eq!(
            q.count(ScoreBound::Inclusive(2.0), ScoreBound::Inclusive(5.0))
                .unwrap(),
            4
        );
        assert_eq!(
            q.count(ScoreBound::Exclusive(2.0), ScoreBound::PosInf).unwrap(),
            7
        );
    }

    #[test]
    fn test_base_index_without_filters() {
        let fx = Fixture::new();
        let notices = fx.notices();
        seed_ten(&notices);
        let q = notices.query().order_by(field("notice_id").desc()).unwrap();
        assert_eq!(q.resolve_keys().unwrap(), vec!["rcnotice:notice_id"]);
        assert_eq!(q.limit(2).unwrap().ids().unwrap(), strs(&["9", "8"]));
    }
}

mod resolution {
    use super::*;

    #[test]
    fn test_meta_index_for_single_meta_filter() {
        let fx = Fixture::new();
        let notices = fx.notices();
        let q = by_notice_id(&notices);
        assert_eq!(
            q.resolve_keys().unwrap(),
            vec!["rcnotice:receiver_id:2:notice_id"]
        );
    }

    #[test]
    fn test_composite_tuple_selected_by_field_set() {
        let fx = Fixture::new();
        let notices = fx.notices();
        let q = notices
            .query()
            .filter_by("is_read", true)
            .unwrap()
            .filter_by("category", "ask")
            .unwrap()
            .filter_by("receiver_id", 7i64)
            .unwrap()
            .order_by(field("date_created").desc())
            .unwrap();
        assert_eq!(
            q.resolve_keys().unwrap(),
            vec!["rcnotice:receiver_id:7:category:ask:is_read:1:date_created"]
        );
    }

    #[test]
    fn test_uncovered_field_set_is_query_error() {
        let fx = Fixture::new();
        let notices = fx.notices();
        let err = notices
            .query()
            .filter_by("category", "ask")
            .unwrap()
            .order_by(field("notice_id").asc())
            .unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn test_filter_errors() {
        let fx = Fixture::new();
        let notices = fx.notices();
        let q = notices.query();

        // not indexed at all
        assert!(matches!(q.filter_by("title", "x").unwrap_err(), Error::Query(_)));
        // unknown field
        assert!(matches!(q.filter_by("nope", 1i64).unwrap_err(), Error::Query(_)));
        // range on an index-value field
        assert!(matches!(
            q.filter(field("receiver_id").gt(1i64)).unwrap_err(),
            Error::Query(_)
        ));
        // in_ on an indexed field
        assert!(matches!(
            q.filter(field("notice_id").in_([1i64, 2])).unwrap_err(),
            Error::Query(_)
        ));
        // two indexed fields
        let ranged = q.filter(field("notice_id").gt(1i64)).unwrap();
        assert!(matches!(
            ranged.filter(field("date_created").gt(at(NOW))).unwrap_err(),
            Error::Query(_)
        ));
        assert!(matches!(
            ranged.order_by(field("date_created").asc()).unwrap_err(),
            Error::Query(_)
        ));
        // value fails the attribute
        assert!(matches!(
            q.filter_by("receiver_id", "two").unwrap_err(),
            Error::Validation(_)
        ));
        assert!(matches!(q.limit(0).unwrap_err(), Error::Parameter(_)));
    }

    #[test]
    fn test_order_by_errors() {
        let fx = Fixture::new();
        let notices = fx.notices();
        assert!(matches!(
            notices.query().order_by(field("title").asc()).unwrap_err(),
            Error::Query(_)
        ));
        assert!(matches!(
            notices.query().order_by(field("receiver_id").asc()).unwrap_err(),
            Error::Query(_)
        ));
        // reading without an ordering
        assert!(matches!(
            notices.query().filter_by("receiver_id", 2i64).unwrap().ids().unwrap_err(),
            Error::Query(_)
        ));
    }

    #[test]
    fn test_builder_is_immutable() {
        let fx = Fixture::new();
        let notices = fx.notices();
        seed_ten(&notices);
        let base = by_notice_id(&notices);
        let narrowed = base.filter(field("notice_id").lt(2i64)).unwrap();

        assert_eq!(base.ids().unwrap().len(), 10);
        assert_eq!(narrowed.ids().unwrap(), strs(&["0", "1"]));
    }
}

mod healing {
    use super::*;

    const META_KEY: &str = "rcnotice:receiver_id:2:notice_id";

    #[test]
    fn test_writes_go_to_shards_until_first_read() {
        let fx = Fixture::new();
        let notices = fx.notices();
        seed_ten(&notices);

        assert!(!fx.store.exists(META_KEY).unwrap());
        let shards = fx.store.keys_with_prefix(&format!("{}/", META_KEY));
        assert_eq!(shards.len(), 1);
        assert_eq!(fx.store.zcard(&shards[0]).unwrap(), 10);
        assert_eq!(fx.store.ttl(&shards[0]).unwrap(), 3 * NOTICE_EXPIRE);
        assert_eq!(fx.store.ttl("rcnotice:0").unwrap(), 3 * NOTICE_EXPIRE);

        assert_eq!(by_notice_id(&notices).ids().unwrap().len(), 10);
        assert!(fx.store.exists(META_KEY).unwrap());
        assert_eq!(fx.store.ttl(META_KEY).unwrap(), NOTICE_EXPIRE);
    }

    #[test]
    fn test_rolling_key_rebuilt_after_loss() {
        let fx = Fixture::new();
        let notices = fx.notices();
        seed_ten(&notices);
        let before = by_notice_id(&notices).ids().unwrap();

        assert!(fx.store.del(META_KEY).unwrap());
        let after = by_notice_id(&notices).ids().unwrap();

        assert_eq!(before, after);
        assert!(fx.store.exists(META_KEY).unwrap());
        assert_eq!(fx.store.ttl(META_KEY).unwrap(), NOTICE_EXPIRE);
    }

    #[test]
    fn test_rolling_key_rebuilt_after_expiry() {
        let fx = Fixture::new();
        let notices = fx.notices();
        seed_ten(&notices);
        by_notice_id(&notices).ids().unwrap();

        fx.clock
            .advance(Duration::from_secs(NOTICE_EXPIRE as u64 + 1));
        assert!(!fx.store.exists(META_KEY).unwrap());
        assert_eq!(by_notice_id(&notices).ids().unwrap().len(), 10);
        assert!(fx.store.exists(META_KEY).unwrap());
    }

    #[test]
    fn test_new_record_lands_in_live_rolling_key() {
        let fx = Fixture::new();
        let notices = fx.notices();
        seed_ten(&notices);
        by_notice_id(&notices).ids().unwrap();

        notices.create(notice("10", 10, at(NOW))).unwrap();
        assert_eq!(fx.store.zscore(META_KEY, "10").unwrap(), Some(10.0));
        assert_eq!(by_notice_id_desc(&notices).first().unwrap().unwrap().id(), Some("10"));
    }

    #[test]
    fn test_records_age_out_with_their_shards() {
        let fx = Fixture::new();
        let notices = fx.notices();
        seed_ten(&notices);

        fx.clock
            .advance(Duration::from_secs(4 * NOTICE_EXPIRE as u64));
        assert!(by_notice_id(&notices).ids().unwrap().is_empty());
        assert!(notices.get_by_id("0").unwrap().is_none());
    }
}

mod lifecycle {
    use super::*;

    fn materialize_all(model: &Model) {
        by_notice_id(model).ids().unwrap();
        model.query().order_by(field("notice_id").asc()).unwrap().ids().unwrap();
        model
            .query()
            .filter_by("category", "ask")
            .unwrap()
            .order_by(field("date_created").asc())
            .unwrap()
            .ids()
            .unwrap();
    }

    #[test]
    fn test_delete_leaves_no_trace() {
        let fx = Fixture::new();
        let notices = fx.notices();
        notices.create(notice("6", 100, at(NOW))).unwrap();
        materialize_all(&notices);
        assert!(fx.store.key_count() > 1);

        assert!(notices.delete_by_id("6").unwrap());
        assert_eq!(fx.store.keys_with_prefix("rcnotice"), Vec::<String>::new());

        // repeated delete is a no-op
        assert!(!notices.delete_by_id("6").unwrap());
        assert_eq!(fx.store.key_count(), 0);
    }

    #[test]
    fn test_delete_removes_only_that_record() {
        let fx = Fixture::new();
        let notices = fx.notices();
        seed_ten(&notices);
        materialize_all(&notices);

        notices.delete_by_id("4").unwrap();
        assert_eq!(
            by_notice_id(&notices).ids().unwrap(),
            strs(&["0", "1", "2", "3", "5", "6", "7", "8", "9"])
        );
        for key in fx.store.keys_with_prefix("rcnotice:") {
            if key.contains("_union") || key.contains(":_") || key.split(':').count() == 2 {
                continue;
            }
            assert_eq!(fx.store.zscore(&key, "4").unwrap(), None, "{} still holds 4", key);
        }
    }

    #[test]
    fn test_update_moves_index_membership() {
        let fx = Fixture::new();
        let notices = fx.notices();
        let created = notices.create(notice("6", 100, at(NOW))).unwrap();
        materialize_all(&notices);

        notices.update(&created, [("notice_id", 200i64)]).unwrap();

        let eq = |n: i64| {
            by_notice_id(&notices)
                .filter(field("notice_id").eq(n))
                .unwrap()
                .ids()
                .unwrap()
        };
        assert!(eq(100).is_empty());
        assert_eq!(eq(200), strs(&["6"]));

        // the emptied rolling key is rebuilt from the rewritten shard
        let base = notices.query().order_by(field("notice_id").asc()).unwrap();
        assert_eq!(base.ids().unwrap(), strs(&["6"]));
        assert_eq!(
            fx.store.zscore("rcnotice:notice_id", "6").unwrap(),
            Some(200.0)
        );
    }

    #[test]
    fn test_update_of_index_value_moves_composite_key() {
        let fx = Fixture::new();
        let notices = fx.notices();
        let created = notices.create(notice("6", 100, at(NOW))).unwrap();

        let unread = |read: bool| {
            notices
                .query()
                .filter_by("receiver_id", 2i64)
                .unwrap()
                .filter_by("is_read", read)
                .unwrap()
                .order_by(field("notice_id").asc())
                .unwrap()
                .ids()
                .unwrap()
        };
        assert_eq!(unread(false), strs(&["6"]));

        let read = notices.update(&created, [("is_read", true)]).unwrap();
        assert_eq!(read.get("is_read"), &kvmodel_core::Value::Bool(true));
        assert!(unread(false).is_empty());
        assert_eq!(unread(true), strs(&["6"]));
    }

    #[test]
    fn test_plain_update_keeps_scores() {
        let fx = Fixture::new();
        let notices = fx.notices();
        let created = notices.create(notice("6", 100, at(NOW))).unwrap();
        materialize_all(&notices);

        notices.update(&created, [("content", "edited")]).unwrap();
        assert_eq!(
            fx.store.zscore("rcnotice:notice_id", "6").unwrap(),
            Some(100.0)
        );
        assert_eq!(by_notice_id(&notices).ids().unwrap(), strs(&["6"]));
    }

    #[test]
    fn test_expired_hash_skipped_by_all() {
        let fx = Fixture::new();
        let notices = fx.notices();
        seed_ten(&notices);
        fx.store.del("rcnotice:3").unwrap();

        let records = by_notice_id(&notices).all().unwrap();
        assert_eq!(records.len(), 9);
        assert!(records.iter().all(|r| r.id() != Some("3")));
    }
}

mod never_expiring {
    use super::*;

    fn articles(engine: &Engine) -> Model {
        let schema = Schema::builder("article")
            .attribute(Attribute::char("author").required().index_value())
            .attribute(Attribute::integer("views").indexed())
            .unique_index(&["author", "views"])
            .build()
            .unwrap();
        engine.register(schema).unwrap()
    }

    #[test]
    fn test_rolling_keys_written_directly() {
        let fx = Fixture::new();
        let articles = articles(&fx.engine);
        for (id, author, views) in [("a", "kim", 5i64), ("b", "lee", 9), ("c", "kim", 1)] {
            articles
                .create(
                    kvmodel_engine::Record::with_id(id)
                        .set("author", author)
                        .set("views", views),
                )
                .unwrap();
        }

        assert!(fx.store.keys_with_prefix("article").iter().all(|k| !k.contains('/')));
        assert_eq!(fx.store.ttl("article:views").unwrap(), -1);
        assert_eq!(fx.store.ttl("article:a").unwrap(), -1);

        let kim = articles
            .query()
            .filter_by("author", "kim")
            .unwrap()
            .order_by(field("views").desc())
            .unwrap()
            .ids()
            .unwrap();
        assert_eq!(kim, strs(&["a", "c"]));

        let both = articles
            .query()
            .filter(field("author").in_(["kim", "lee"]))
            .unwrap()
            .order_by(field("views").desc())
            .unwrap()
            .ids()
            .unwrap();
        assert_eq!(both, strs(&["b", "a", "c"]));
    }

    #[test]
    fn test_null_sort_value_is_not_indexed() {
        let fx = Fixture::new();
        let articles = articles(&fx.engine);
        articles
            .create(kvmodel_engine::Record::with_id("a").set("author", "kim"))
            .unwrap();
        assert!(!fx.store.exists("article:views").unwrap());
        assert!(articles.exists("a").unwrap());
    }
}

mod store_failures {
    use super::*;

    #[derive(Debug)]
    struct Unreachable;

    impl Store for Unreachable {
        fn execute(&self, _commands: Vec<Command>) -> Result<Vec<Reply>> {
            Err(Error::store("connection refused"))
        }
    }

    #[test]
    fn test_store_errors_propagate() {
        let engine = Engine::new(Arc::new(Unreachable));
        let notices = engine.register(common::notice_schema()).unwrap();

        assert!(matches!(notices.get_by_id("1").unwrap_err(), Error::Store(_)));
        assert!(matches!(
            notices.create(notice("1", 1, at(NOW))).unwrap_err(),
            Error::Store(_)
        ));
        assert!(matches!(by_notice_id(&notices).ids().unwrap_err(), Error::Store(_)));
    }
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_query_order_matches_scores(
            notice_ids in prop::collection::hash_set(0i64..10_000, 1..25)
        ) {
            let fx = Fixture::new();
            let notices = fx.notices();
            for (i, n) in notice_ids.iter().enumerate() {
                notices
                    .create(notice(&format!("n{}", n), *n, at(NOW - i as u64)))
                    .unwrap();
            }

            let mut expected: Vec<i64> = notice_ids.iter().copied().collect();
            expected.sort_unstable();
            let expected: Vec<String> = expected.iter().map(|n| format!("n{}", n)).collect();

            prop_assert_eq!(by_notice_id(&notices).ids().unwrap(), expected.clone());

            let mut reversed = expected;
            reversed.reverse();
            prop_assert_eq!(by_notice_id_desc(&notices).ids().unwrap(), reversed);
        }
    }
}
