//! End-to-end collection tests against the in-memory service.

use std::sync::Arc;

use futures_util::stream;
use termvault_client::{
    Client, ClientConfig, Collection, CollectionError, MemoryCollectionService, RetryConfig,
    ServiceError,
};
use termvault_core::testing::FakeOreCipher;
use termvault_core::{
    index, CollectionSchemaDefinition, CompileError, Condition, Direction, QueryOptions,
    SchemaExport, TermCipher, Value,
};

const BOOKS: &str = r#"{
    "type": { "title": "string", "year": "number", "blurb": "string" },
    "indexes": {
        "exactTitle": { "kind": "exact", "field": "title" },
        "year": { "kind": "range", "field": "year" },
        "title": {
            "kind": "match",
            "fields": ["title"],
            "tokenFilters": [{ "kind": "downcase" }],
            "tokenizer": { "kind": "ngram", "tokenLength": 3 }
        },
        "anywhere": {
            "kind": "field-dynamic-match",
            "tokenFilters": [{ "kind": "downcase" }],
            "tokenizer": { "kind": "standard" }
        }
    }
}"#;

fn setup(config: ClientConfig) -> (Arc<MemoryCollectionService>, Client) {
    let service = Arc::new(MemoryCollectionService::new(Arc::new(FakeOreCipher)));
    let client = Client::new(
        Arc::clone(&service) as _,
        TermCipher::new(Arc::new(FakeOreCipher)),
        config,
    );
    (service, client)
}

fn no_jitter() -> ClientConfig {
    ClientConfig {
        retry: RetryConfig {
            max_jitter_ms: 0,
            ..RetryConfig::default()
        },
        ..ClientConfig::default()
    }
}

fn book(id: &str, title: &str, year: i64, blurb: &str) -> Value {
    Value::from([
        ("id", Value::from(id)),
        ("title", Value::from(title)),
        ("year", Value::from(year)),
        ("blurb", Value::from(blurb)),
    ])
}

async fn books(client: &Client) -> Collection {
    let books = client
        .create_collection("books", CollectionSchemaDefinition::from_json(BOOKS).unwrap())
        .await
        .unwrap();
    for record in [
        book("dune", "Dune", 1965, "Desert planet, spice"),
        book("messiah", "Dune Messiah", 1969, "Sequel on the desert planet"),
        book("neuromancer", "Neuromancer", 1984, "Cyberspace heist"),
        book("foundation", "Foundation", 1951, "Psychohistory"),
    ] {
        books.put(record).await.unwrap();
    }
    books
}

async fn ids(collection: &Collection, condition: &Condition, options: &QueryOptions) -> Vec<String> {
    collection
        .query(Some(condition), options)
        .await
        .unwrap()
        .documents
        .into_iter()
        .map(|d| d.id)
        .collect()
}

// ---- documents ----

#[tokio::test]
async fn put_assigns_id_when_absent() {
    let (_, client) = setup(no_jitter());
    let books = books(&client).await;

    let id = books
        .put(Value::from([("title", Value::from("Hyperion")), ("year", Value::from(1989_i64))]))
        .await
        .unwrap();
    assert_eq!(id.len(), 36);

    let doc = books.get(&id).await.unwrap().unwrap();
    assert_eq!(doc.source.get_path("id").and_then(Value::as_str), Some(id.as_str()));
    assert_eq!(doc.source.get_path("title").and_then(Value::as_str), Some("Hyperion"));
}

#[tokio::test]
async fn invalid_records_are_rejected() {
    let (service, client) = setup(no_jitter());
    let books = books(&client).await;
    let before = service.calls();

    assert_eq!(
        books.put(Value::from("not a map")).await,
        Err(CollectionError::InvalidRecord)
    );
    assert_eq!(
        books.put(Value::from([("id", Value::from(7_i64))])).await,
        Err(CollectionError::InvalidRecord)
    );
    assert!(matches!(
        books
            .put(Value::from([("title", Value::from(1.5))]))
            .await,
        Err(CollectionError::Compile(CompileError::TypeMismatch { .. }))
    ));
    assert_eq!(service.calls(), before);
}

#[tokio::test]
async fn delete_removes_document() {
    let (_, client) = setup(no_jitter());
    let books = books(&client).await;
    books.delete("dune").await.unwrap();
    books.delete("dune").await.unwrap();
    assert_eq!(books.get("dune").await.unwrap(), None);
}

#[tokio::test]
async fn get_all_returns_found_documents_in_order() {
    let (service, client) = setup(no_jitter());
    let books = books(&client).await;

    let wanted = ["neuromancer", "hyperion", "dune"].map(String::from);
    let found: Vec<String> = books
        .get_all(&wanted)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(found, vec!["neuromancer", "dune"]);

    let before = service.calls();
    assert_eq!(books.get_all(&[]).await.unwrap(), Vec::new());
    assert_eq!(service.calls(), before);
}

// ---- queries ----

#[tokio::test]
async fn exact_query() {
    let (_, client) = setup(no_jitter());
    let books = books(&client).await;
    let found = ids(&books, &index("exactTitle").eq("Dune"), &QueryOptions::default()).await;
    assert_eq!(found, vec!["dune"]);
}

#[tokio::test]
async fn range_query_with_ordering() {
    let (_, client) = setup(no_jitter());
    let books = books(&client).await;
    let options = QueryOptions::default().order_by("year", Direction::Desc);

    let found = ids(&books, &index("year").between(1960_i64, 1970_i64), &options).await;
    assert_eq!(found, vec!["messiah", "dune"]);

    let found = ids(&books, &index("year").lt(1965_i64), &options).await;
    assert_eq!(found, vec!["foundation"]);

    let found = ids(&books, &index("year").gte(1965_i64), &options).await;
    assert_eq!(found, vec!["neuromancer", "messiah", "dune"]);
}

#[tokio::test]
async fn match_query_is_case_insensitive() {
    let (_, client) = setup(no_jitter());
    let books = books(&client).await;
    let options = QueryOptions::default().order_by("year", Direction::Asc);
    let found = ids(&books, &index("title").matching("DUNE"), &options).await;
    assert_eq!(found, vec!["dune", "messiah"]);
}

#[tokio::test]
async fn scoped_match_only_sees_its_field() {
    let (_, client) = setup(no_jitter());
    let books = books(&client).await;
    let options = QueryOptions::default();

    let found = ids(&books, &index("anywhere").matching_field("blurb", "desert"), &options).await;
    assert_eq!(found.len(), 2);
    let found = ids(&books, &index("anywhere").matching_field("title", "desert"), &options).await;
    assert!(found.is_empty());
}

#[tokio::test]
async fn conjunction_and_pagination() {
    let (_, client) = setup(no_jitter());
    let books = books(&client).await;
    let condition = Condition::all([
        index("year").gte(1950_i64),
        index("year").lte(1990_i64),
    ]);
    let options = QueryOptions::default()
        .order_by("year", Direction::Asc)
        .offset(1)
        .limit(2)
        .count("year");

    let result = books.query(Some(&condition), &options).await.unwrap();
    let found: Vec<_> = result.documents.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(found, vec!["dune", "messiah"]);
    assert_eq!(result.aggregates[0].value, 4);
}

#[tokio::test]
async fn unsatisfiable_query_never_reaches_service() {
    let (service, client) = setup(no_jitter());
    let books = books(&client).await;
    let before = service.calls();

    let result = books
        .query(Some(&index("title").matching("du")), &QueryOptions::default().count("year"))
        .await
        .unwrap();

    assert!(result.documents.is_empty());
    assert_eq!(result.aggregates[0].value, 0);
    assert_eq!(service.calls(), before);
}

#[tokio::test]
async fn compile_errors_pass_through() {
    let (_, client) = setup(no_jitter());
    let books = books(&client).await;

    let err = books
        .query(Some(&index("nope").eq("x")), &QueryOptions::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CollectionError::Compile(CompileError::UnknownIndex {
            index: "nope".into()
        })
    );

    let err = books
        .query(Some(&index("title").gt(3_i64)), &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CollectionError::Compile(CompileError::UnsupportedOperator { .. })
    ));
}

// ---- streaming ----

#[tokio::test]
async fn put_stream_writes_in_batches() {
    let (service, client) = setup(no_jitter());
    let books = books(&client).await;
    let before = service.calls();

    let records = (0..125).map(|n| book(&format!("b{n}"), "Filler", 2000 + n, "x"));
    let written = books.put_stream(stream::iter(records)).await.unwrap();

    assert_eq!(written, 125);
    assert_eq!(service.calls() - before, 3);
    assert_eq!(service.document_count("books"), 129);
}

#[tokio::test]
async fn put_stream_rejects_zero_batch_size() {
    let (_, client) = setup(ClientConfig {
        stream_batch_size: 0,
        ..no_jitter()
    });
    let books = books(&client).await;
    let err = books
        .put_stream(stream::iter(vec![book("x", "X", 1, "x")]))
        .await
        .unwrap_err();
    assert!(matches!(err, CollectionError::Buffer(_)));
}

// ---- retry ----

#[tokio::test(start_paused = true)]
async fn transient_errors_are_retried() {
    let (service, client) = setup(no_jitter());
    let books = books(&client).await;
    let before = service.calls();

    service.inject_failures([
        ServiceError::Throttled,
        ServiceError::Unavailable("restarting".into()),
    ]);
    books.put(book("h", "Hyperion", 1989, "Pilgrims")).await.unwrap();

    assert_eq!(service.calls() - before, 3);
    assert!(books.get("h").await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn permanent_errors_are_not_retried() {
    let (service, client) = setup(no_jitter());
    let books = books(&client).await;
    let before = service.calls();

    service.inject_failures([ServiceError::Rejected("too large".into())]);
    let err = books.put(book("h", "Hyperion", 1989, "Pilgrims")).await.unwrap_err();

    assert_eq!(err, CollectionError::Service(ServiceError::Rejected("too large".into())));
    assert_eq!(service.calls() - before, 1);
}

#[tokio::test(start_paused = true)]
async fn retries_give_up_after_max_count() {
    let (service, client) = setup(ClientConfig {
        retry: RetryConfig {
            max_retry_count: 2,
            max_jitter_ms: 0,
            ..RetryConfig::default()
        },
        ..ClientConfig::default()
    });
    let books = books(&client).await;
    let before = service.calls();

    service.inject_failures(std::iter::repeat(ServiceError::Throttled).take(5));
    let err = books.get("dune").await.unwrap_err();

    assert_eq!(err, CollectionError::Service(ServiceError::Throttled));
    assert_eq!(service.calls() - before, 3);
}

// ---- lifecycle ----

#[tokio::test]
async fn load_restores_schema_and_keys() {
    let (_, client) = setup(no_jitter());
    let books = books(&client).await;
    let loaded = client.load_collection("books").await.unwrap();

    assert_eq!(loaded.info(), books.info());
    assert_eq!(loaded.describe(true), books.describe(true));
    let found = ids(&loaded, &index("exactTitle").eq("Neuromancer"), &QueryOptions::default()).await;
    assert_eq!(found, vec!["neuromancer"]);
}

#[tokio::test]
async fn duplicate_and_missing_collections() {
    let (_, client) = setup(no_jitter());
    books(&client).await;

    let err = client
        .create_collection("books", CollectionSchemaDefinition::from_json(BOOKS).unwrap())
        .await
        .err();
    assert_eq!(
        err,
        Some(CollectionError::Service(ServiceError::CollectionExists {
            name: "books".into()
        }))
    );

    client.drop_collection("books").await.unwrap();
    assert!(matches!(
        client.load_collection("books").await,
        Err(CollectionError::Service(ServiceError::CollectionNotFound { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn list_collections_reports_every_registered_collection() {
    let (service, client) = setup(no_jitter());
    assert_eq!(client.list_collections().await.unwrap(), Vec::new());

    let books = books(&client).await;
    let authors = client
        .create_collection("authors", CollectionSchemaDefinition::from_json(BOOKS).unwrap())
        .await
        .unwrap();

    service.inject_failures([ServiceError::Throttled]);
    let listed = client.list_collections().await.unwrap();
    let names: Vec<&str> = listed.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["authors", "books"]);
    assert_eq!(&listed[0].info, authors.info());
    assert_eq!(&listed[1].info, books.info());

    client.drop_collection("authors").await.unwrap();
    let listed = client.list_collections().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "books");
}

#[tokio::test]
async fn export_then_import_keeps_keys() {
    let (_, client) = setup(ClientConfig {
        service: "memory://local".into(),
        ..no_jitter()
    });
    let books = books(&client).await;
    let json = books.export().to_json().unwrap();
    let described = books.describe(true);
    client.drop_collection("books").await.unwrap();

    let export = SchemaExport::from_json(&json).unwrap();
    assert_eq!(export.service, "memory://local");
    let imported = client.import_collection(export).await.unwrap();

    assert_eq!(imported.describe(true), described);
    imported.put(book("dune", "Dune", 1965, "Spice")).await.unwrap();
    let found = ids(&imported, &index("title").matching("dune"), &QueryOptions::default()).await;
    assert_eq!(found, vec!["dune"]);
}
