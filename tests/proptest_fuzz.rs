//! Property-based tests (fuzzing) for extraction, query execution and
//! pagination.
//!
//! Uses proptest to generate random inputs and verify the invariants hold and
//! nothing panics, only returns clean errors.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Value};

use search_sync::backend::{IndexDefinition, IndexFieldType};
use search_sync::search::{Query, RediSearchTranslator};
use search_sync::{
    Descriptor, DocumentTypeDef, EntityMeta, FieldKind, FieldMeta, MemoryRelationalStore, MemorySearchBackend,
    OnDelete, Paginator, Record, RegistryBuilder, SearchBackend, SearchQuery, SearchSyncConfig,
};

// =============================================================================
// Helpers
// =============================================================================

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

/// Generate arbitrary JSON scalars
fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ]
}

// =============================================================================
// Primary Key Tests
// =============================================================================

proptest! {
    /// Integer primary keys stringify to their decimal form
    #[test]
    fn prop_integer_pk_stringifies(pk in any::<i64>()) {
        let record = Record::new("shop.Tag", pk);
        prop_assert_eq!(record.pk_string(), pk.to_string());
    }

    /// String primary keys are kept verbatim
    #[test]
    fn prop_string_pk_verbatim(pk in "[a-zA-Z0-9_-]{1,40}") {
        let record = Record::new("shop.Tag", pk.as_str());
        prop_assert_eq!(record.pk_string(), pk);
    }

    /// Identity ignores attribute values
    #[test]
    fn prop_identity_ignores_values(pk in any::<u32>(), a in scalar_strategy(), b in scalar_strategy()) {
        let left = Record::new("shop.Tag", pk).with("name", a);
        let right = Record::new("shop.Tag", pk.to_string()).with("name", b);
        prop_assert!(left.is_same(&right));
    }
}

// =============================================================================
// Extraction Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Excluding one embedded record shrinks the list by exactly one
    #[test]
    fn prop_exclusion_removes_exactly_one(tags in 1usize..12, excluded in 0usize..12) {
        let excluded = excluded % tags;
        let store = Arc::new(MemoryRelationalStore::new());
        store.define(
            EntityMeta::new("blog.Tag")
                .with_field(FieldMeta::scalar("name", FieldKind::Char))
                .with_field(FieldMeta::relation("post_set", FieldKind::ReverseMany, "blog.Post", "tags", OnDelete::DoNothing)),
        );
        store.define(
            EntityMeta::new("blog.Post")
                .with_field(FieldMeta::scalar("title", FieldKind::Char))
                .with_field(FieldMeta::relation("tags", FieldKind::ManyToMany, "blog.Tag", "post_set", OnDelete::DoNothing).blank()),
        );

        let post = Record::new("blog.Post", 1).with("title", "hello");
        store.insert(post.clone());
        let mut records = Vec::new();
        for pk in 0..tags {
            let tag = Record::new("blog.Tag", pk as i64).with("name", format!("t{}", pk));
            store.insert(tag.clone());
            store.relate(&post.key(), "tags", &tag.key()).unwrap();
            records.push(tag);
        }

        let backend = Arc::new(MemorySearchBackend::new());
        let tag_descriptor = Descriptor::builder().source("blog.Tag").fields(["name"]).build().unwrap();
        let post_descriptor = Descriptor::builder().source("blog.Post").fields(["title"]).build().unwrap();
        let registry = RegistryBuilder::new(SearchSyncConfig::default(), backend, store)
            .register(DocumentTypeDef::embedded("TagEmbedded", tag_descriptor))
            .register(DocumentTypeDef::root("PostDocument", post_descriptor).embed_many("tags", "TagEmbedded"))
            .build()
            .unwrap();
        let handle = registry.document("PostDocument").unwrap();

        let (full, partial) = block_on(async {
            let full = handle.extract(&post, None).await.unwrap();
            let partial = handle.extract(&post, Some(&records[excluded])).await.unwrap();
            (full, partial)
        });

        let full = full["tags"].as_array().unwrap().len();
        let partial_tags = partial["tags"].as_array().unwrap();
        prop_assert_eq!(full, tags);
        prop_assert_eq!(partial_tags.len(), tags - 1);
        let excluded_pk = excluded.to_string();
        prop_assert!(partial_tags.iter().all(|t| t["pk"] != json!(excluded_pk)));
    }
}

// =============================================================================
// Query Execution Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Exhausting a query collects exactly the reported total
    #[test]
    fn prop_exhaust_collects_total(total in 0usize..60, page_size in 1usize..15) {
        let backend = Arc::new(MemorySearchBackend::new());
        let index = Arc::new(IndexDefinition::new("redis_search", "ItemDocument").field("n", "$.n", IndexFieldType::Numeric, true));

        let (collected, reported) = block_on(async {
            backend.migrate(&index).await.unwrap();
            for pk in 0..total {
                let doc = json!({"pk": pk.to_string(), "n": pk});
                backend.put(&index, &pk.to_string(), doc.as_object().unwrap()).await.unwrap();
            }
            let mut query = SearchQuery::new(backend.clone(), index, Query::all(), page_size);
            let result = query.execute(true).await.unwrap();
            (result.len(), result.count())
        });

        prop_assert_eq!(collected, total);
        prop_assert_eq!(reported, total);
        let expected_calls = total.div_ceil(page_size).max(1);
        prop_assert_eq!(backend.search_calls().len(), expected_calls);
    }

    /// Query rendering never panics on arbitrary text
    #[test]
    fn fuzz_translate_arbitrary_text(field in "[a-z_]{1,12}", text in ".*") {
        let query = Query::field_eq(field.clone(), text.clone())
            .and(Query::prefix(field.clone(), text.clone()))
            .or(Query::fuzzy(field, text));
        let rendered = RediSearchTranslator::translate(&query);
        prop_assert!(!rendered.is_empty());
    }
}

// =============================================================================
// Pagination Tests
// =============================================================================

proptest! {
    /// Page number parsing never panics
    #[test]
    fn fuzz_page_number(input in ".*") {
        let _ = Paginator::validate_number(&input);
    }

    /// Positive integers are accepted unchanged
    #[test]
    fn prop_positive_page_numbers(n in 1usize..1_000_000) {
        prop_assert_eq!(Paginator::validate_number(&n.to_string()).unwrap(), n);
    }

    /// Zero and negatives are rejected
    #[test]
    fn prop_non_positive_page_numbers(n in -1_000_000i64..=0) {
        prop_assert!(Paginator::validate_number(&n.to_string()).is_err());
    }
}
