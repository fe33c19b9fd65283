// Integration tests for hybrix
use hybrix::EngineConfig;
use hybrix_core::{
    Error, ExtractionError, FieldValue, Index, IndexConfig, MissingFieldPolicy, NumberMode,
    QueryInputs, QueryPlan, Record, RecordId, Schema, Space, StaticModel, Vector,
};
use hybrix_query::{Executor, NaturalQueryTranslator, Param, ParamValue, QueryTemplate, StaticLanguageModel};
use std::collections::BTreeMap;
use std::sync::Arc;

fn reviews_model() -> Arc<StaticModel> {
    Arc::new(
        StaticModel::new("stub", 2)
            .with("great acting", vec![0.9, 0.19f32.sqrt()])
            .with("boring", vec![0.1, 0.99f32.sqrt()])
            .with("amazing performance", vec![1.0, 0.0]),
    )
}

fn reviews_index() -> Index {
    Index::new(
        IndexConfig::new("reviews"),
        Schema::new("review").text("text"),
        vec![Space::text("text", "text", reviews_model())],
    )
    .unwrap()
}

#[tokio::test]
async fn test_text_space_ranking() {
    let index = reviews_index();
    index
        .put(vec![
            Record::new(1u64).with_field("text", "great acting"),
            Record::new(2u64).with_field("text", "boring"),
        ])
        .await
        .unwrap();

    let inputs = QueryInputs::new()
        .weight("text", 1.0)
        .similar("text", "amazing performance");
    let plan = QueryPlan::build(&index, inputs).await.unwrap();
    let hits = index.search(&plan).unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, RecordId::Integer(1));
    assert!((hits[0].score - 0.9).abs() < 1e-5);
    assert_eq!(hits[1].id, RecordId::Integer(2));
    assert!((hits[1].score - 0.1).abs() < 1e-5);

    // Single space at weight 1: composite is the raw similarity
    for hit in &hits {
        assert_eq!(hit.score, hit.space_scores[0].similarity);
    }
}

#[tokio::test]
async fn test_weighted_spaces_outrank_raw_text_similarity() {
    let model = Arc::new(
        StaticModel::new("stub", 2)
            .with("record a", vec![0.8, 0.6])
            .with("record b", vec![0.9, 0.19f32.sqrt()])
            .with("query", vec![1.0, 0.0]),
    );
    let index = Index::new(
        IndexConfig::new("items"),
        Schema::new("item").text("text").number("rating"),
        vec![
            Space::text("text", "text", model),
            Space::number("rating", "rating", 0.0, 5.0, NumberMode::Similar).unwrap(),
        ],
    )
    .unwrap();
    index
        .put(vec![
            Record::new("a").with_field("text", "record a").with_field("rating", 4.5),
            Record::new("b").with_field("text", "record b").with_field("rating", 1.0),
        ])
        .await
        .unwrap();

    let inputs = QueryInputs::new()
        .weight("text", 0.7)
        .similar("text", "query")
        .weight("rating", 0.3)
        .similar("rating", 4.5);
    let plan = QueryPlan::build(&index, inputs).await.unwrap();
    let hits = index.search(&plan).unwrap();

    assert_eq!(hits[0].id, RecordId::String("a".to_string()));
    assert!((hits[0].score - 0.86).abs() < 1e-4);
    assert_eq!(hits[1].id, RecordId::String("b".to_string()));
    assert!((hits[1].score - 0.72).abs() < 1e-4);
}

#[tokio::test]
async fn test_numeric_bounds_in_similar_mode() {
    let index = Index::new(
        IndexConfig::new("ratings"),
        Schema::new("rated").number("rating"),
        vec![Space::number("rating", "rating", 0.0, 5.0, NumberMode::Similar).unwrap()],
    )
    .unwrap();
    index
        .put(vec![
            Record::new("low").with_field("rating", 0.0),
            Record::new("high").with_field("rating", 5.0),
        ])
        .await
        .unwrap();

    let plan = QueryPlan::build(&index, QueryInputs::new().weight("rating", 1.0).similar("rating", 0.0))
        .await
        .unwrap();
    let hits = index.search(&plan).unwrap();
    assert_eq!(hits[0].id, RecordId::String("low".to_string()));
    assert_eq!(hits[0].score, 1.0);
    assert_eq!(hits[1].score, 0.0);

    let plan = QueryPlan::build(&index, QueryInputs::new().weight("rating", 1.0).similar("rating", 5.0))
        .await
        .unwrap();
    let hits = index.search(&plan).unwrap();
    assert_eq!(hits[0].id, RecordId::String("high".to_string()));
    assert_eq!(hits[0].score, 1.0);
}

#[test]
fn test_text_similarity_is_symmetric() {
    let space = Space::text("text", "text", reviews_model());
    let a = Vector::new(vec![0.3, 0.7]);
    let b = Vector::new(vec![-0.2, 0.5]);
    assert_eq!(space.similarity(&a, &b), space.similarity(&b, &a));
}

#[tokio::test]
async fn test_reinsert_and_deterministic_ranking() {
    let index = reviews_index();
    index
        .put(vec![
            Record::new(1u64).with_field("text", "boring"),
            Record::new(2u64).with_field("text", "boring"),
            Record::new(3u64).with_field("text", "great acting"),
        ])
        .await
        .unwrap();

    // Replacing record 1 swaps its vector entirely
    index
        .insert_or_replace(Record::new(1u64).with_field("text", "great acting"))
        .await
        .unwrap();
    assert_eq!(index.len(), 3);
    assert_eq!(
        index.get(&RecordId::Integer(1)).unwrap().get("text"),
        Some(&FieldValue::from("great acting"))
    );

    let inputs = QueryInputs::new()
        .weight("text", 1.0)
        .similar("text", "amazing performance")
        .limit(2);
    let plan = QueryPlan::build(&index, inputs).await.unwrap();

    let first: Vec<RecordId> = index.search(&plan).unwrap().into_iter().map(|h| h.id).collect();
    let second: Vec<RecordId> = index.search(&plan).unwrap().into_iter().map(|h| h.id).collect();

    // Equal scores keep the original insertion order of record 1
    assert_eq!(first, vec![RecordId::Integer(1), RecordId::Integer(3)]);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_missing_field_policies() {
    let spaces = || {
        vec![
            Space::text("text", "text", reviews_model()),
            Space::number("rating", "rating", 0.0, 5.0, NumberMode::Similar).unwrap(),
        ]
    };
    let schema = || Schema::new("review").text("text").number("rating");
    let records = || {
        vec![
            Record::new(1u64).with_field("text", "great acting"),
            Record::new(2u64).with_field("text", "boring").with_field("rating", 5.0),
        ]
    };

    let strict = Index::new(IndexConfig::new("strict"), schema(), spaces()).unwrap();
    match strict.put(records()).await {
        Err(Error::Ingestion(failures)) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].id, RecordId::Integer(1));
            assert!(matches!(failures[0].error, Error::MissingField { .. }));
        }
        other => panic!("expected ingestion failure, got {:?}", other),
    }
    assert!(strict.is_empty());

    let mut config = IndexConfig::new("lenient");
    config.missing_field = MissingFieldPolicy::Sentinel;
    let lenient = Index::new(config, schema(), spaces()).unwrap();
    assert_eq!(lenient.put(records()).await.unwrap(), 2);

    let inputs = QueryInputs::new().weight("rating", 1.0).similar("rating", 5.0);
    let plan = QueryPlan::build(&lenient, inputs).await.unwrap();
    let hits = lenient.search(&plan).unwrap();
    assert_eq!(hits[0].id, RecordId::Integer(2));
    assert_eq!(hits[1].score, 0.0);
}

#[tokio::test]
async fn test_invalid_plan_lists_every_violation() {
    let index = reviews_index();
    let inputs = QueryInputs::new()
        .weight("text", -1.0)
        .similar("text", "amazing performance")
        .weight("unknown", 1.0)
        .limit(0);

    match QueryPlan::build(&index, inputs).await {
        Err(Error::InvalidPlan(violations)) => assert_eq!(violations.len(), 3),
        other => panic!("expected invalid plan, got {:?}", other.map(|p| p.limit())),
    }
}

fn toothbrush_executor(output: &str) -> Executor {
    let translator = NaturalQueryTranslator::new(Arc::new(StaticLanguageModel::new("stub", output)));
    Executor::new().with_translator(translator)
}

fn toothbrush_template() -> QueryTemplate {
    QueryTemplate::new()
        .weight("description", Param::named("description_weight", "").or(1.0))
        .similar(
            "description",
            Param::named(
                "description_query",
                "The text in the user's query that refers to product descriptions.",
            ),
        )
        .weight("rating", Param::named("rating_weight", ""))
        .limit(Param::named("limit", "").or(3))
}

async fn register_toothbrushes(executor: &Executor) {
    let config = EngineConfig::from_json(
        r#"{
            "embedding": {"dimension": 128},
            "indices": [{
                "name": "products",
                "fields": [
                    {"name": "description", "type": "text"},
                    {"name": "rating", "type": "number"}
                ],
                "spaces": [
                    {"field": "description", "kind": "text"},
                    {"field": "rating", "kind": "number", "min": 1, "max": 5, "mode": "maximum"}
                ]
            }]
        }"#,
    )
    .unwrap();
    let provider = config.embedding_provider().unwrap();
    let index = config.build_index(&config.indices[0], &provider).unwrap();
    executor.register(index).unwrap();

    executor
        .put(
            "products",
            vec![
                Record::new(1u64)
                    .with_field("description", "Budget toothbrush in black color. Just what you need.")
                    .with_field("rating", 1.0),
                Record::new(2u64)
                    .with_field("description", "High-end toothbrush created with no compromises.")
                    .with_field("rating", 5.0),
                Record::new(3u64)
                    .with_field("description", "A toothbrush created for the smart 21st century man.")
                    .with_field("rating", 3.0),
            ],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_natural_query_best_toothbrush() {
    let executor = toothbrush_executor(
        r#"{"description_query": "toothbrush", "rating_weight": 1.0, "limit": 1}"#,
    );
    register_toothbrushes(&executor).await;

    let result = executor
        .query_natural("products", &toothbrush_template(), "best toothbrushes", &BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(result.ids(), vec![RecordId::Integer(2)]);
    assert_eq!(result.metadata.limit, 1);
    let trace = result.metadata.natural.unwrap();
    assert_eq!(trace.params.get("limit"), Some(&ParamValue::Integer(1)));
}

#[tokio::test]
async fn test_malformed_extraction_is_an_error() {
    let executor = toothbrush_executor(
        r#"{"description_query": "toothbrush", "rating_weight": "a lot"}"#,
    );
    register_toothbrushes(&executor).await;

    let err = executor
        .query_natural("products", &toothbrush_template(), "best toothbrushes", &BTreeMap::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Extraction(ExtractionError::InvalidParameters(_))));
    assert!(err.is_recoverable());
    // The index is untouched
    assert_eq!(executor.index("products").unwrap().len(), 3);
}
