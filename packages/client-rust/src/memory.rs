//! In-memory [`CollectionService`] backed by [`DashMap`].
//!
//! Evaluates compiled queries the way a remote store would: only through the
//! keyless comparison of the order-revealing primitive and blind-index
//! equality. Used by tests and local development. Transient faults can be
//! queued to exercise retry paths.

use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use termvault_core::{
    CollectionInfo, CompiledOrdering, CompiledQuery, Constraint, ConstraintCondition, Direction,
    IndexEntry, IndexTerm, OreCipher, OreCiphertext, Value,
};
use tracing::trace;

use crate::error::ServiceError;
use crate::transport::{
    AggregateResult, CollectionService, CollectionSummary, Document, PutRequest, QueryReply,
    StoredCollection,
};

struct StoredDocument {
    source: Value,
    entries: Vec<IndexEntry>,
}

struct MemoryCollection {
    info: CollectionInfo,
    schema_blob: Vec<u8>,
    documents: RwLock<BTreeMap<String, StoredDocument>>,
}

pub struct MemoryCollectionService {
    ore: Arc<dyn OreCipher>,
    /// Keyed by collection id.
    collections: DashMap<String, Arc<MemoryCollection>>,
    /// Collection name to id.
    names: DashMap<String, String>,
    faults: Mutex<VecDeque<ServiceError>>,
    calls: AtomicUsize,
}

impl MemoryCollectionService {
    /// `ore` is only used for comparisons, never for encryption.
    #[must_use]
    pub fn new(ore: Arc<dyn OreCipher>) -> Self {
        Self {
            ore,
            collections: DashMap::new(),
            names: DashMap::new(),
            faults: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queues errors returned, in order, by the next calls instead of
    /// serving them.
    pub fn inject_failures(&self, errors: impl IntoIterator<Item = ServiceError>) {
        self.faults.lock().extend(errors);
    }

    /// Number of calls received, failed ones included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Documents stored in the collection called `name`.
    #[must_use]
    pub fn document_count(&self, name: &str) -> usize {
        self.by_name(name)
            .map_or(0, |collection| collection.documents.read().len())
    }

    fn admit(&self) -> Result<(), ServiceError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        match self.faults.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn by_name(&self, name: &str) -> Option<Arc<MemoryCollection>> {
        let id = self.names.get(name)?.value().clone();
        self.collections.get(&id).map(|c| Arc::clone(c.value()))
    }

    fn by_id(&self, id: &str) -> Result<Arc<MemoryCollection>, ServiceError> {
        self.collections
            .get(id)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| ServiceError::CollectionNotFound {
                name: id.to_string(),
            })
    }

    // -----------------------------------------------------------------------
    // Query evaluation
    // -----------------------------------------------------------------------

    fn satisfies(&self, document: &StoredDocument, constraint: &Constraint) -> bool {
        document
            .entries
            .iter()
            .filter(|entry| entry.index_id == constraint.index_id)
            .any(|entry| match (&constraint.condition, &entry.term) {
                (ConstraintCondition::Exact { term: wanted }, IndexTerm::Scalar { term }) => {
                    self.ore.compare(term, wanted) == Some(Ordering::Equal)
                }
                (ConstraintCondition::Range { lower, upper }, IndexTerm::Scalar { term }) => {
                    matches!(
                        self.ore.compare(term, lower),
                        Some(Ordering::Greater | Ordering::Equal)
                    ) && matches!(
                        self.ore.compare(term, upper),
                        Some(Ordering::Less | Ordering::Equal)
                    )
                }
                (ConstraintCondition::Token { token }, IndexTerm::Tokens { tokens, .. }) => {
                    tokens.contains(token)
                }
                _ => false,
            })
    }

    /// Documents without a term for the ordering index sort last in either
    /// direction.
    fn order(&self, a: &StoredDocument, b: &StoredDocument, ordering: &CompiledOrdering) -> Ordering {
        match (
            scalar_term(a, &ordering.index_id),
            scalar_term(b, &ordering.index_id),
        ) {
            (Some(a), Some(b)) => {
                let ord = self.ore.compare(a, b).unwrap_or(Ordering::Equal);
                match ordering.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    fn evaluate(&self, collection: &MemoryCollection, query: &CompiledQuery) -> QueryReply {
        let start = Instant::now();
        let documents = collection.documents.read();
        let mut matched: Vec<(&String, &StoredDocument)> = documents
            .iter()
            .filter(|(_, doc)| query.constraints.iter().all(|c| self.satisfies(doc, c)))
            .collect();

        // Stable sorts applied last-key-first give lexicographic ordering.
        for ordering in query.ordering.iter().rev() {
            matched.sort_by(|(_, a), (_, b)| self.order(a, b, ordering));
        }

        let aggregates = query
            .aggregates
            .iter()
            .map(|aggregate| AggregateResult {
                index_name: aggregate.index_name.clone(),
                aggregate: aggregate.aggregate,
                value: matched
                    .iter()
                    .filter(|(_, doc)| doc.entries.iter().any(|e| e.index_id == aggregate.index_id))
                    .count() as u64,
            })
            .collect();

        let documents = if query.skip_results {
            Vec::new()
        } else {
            matched
                .into_iter()
                .skip(query.offset.unwrap_or(0) as usize)
                .take(query.limit as usize)
                .map(|(id, doc)| Document {
                    id: id.clone(),
                    source: doc.source.clone(),
                })
                .collect()
        };

        #[allow(clippy::cast_possible_truncation)]
        let took_ms = start.elapsed().as_millis() as u64;
        QueryReply {
            documents,
            aggregates,
            took_ms,
        }
    }
}

fn scalar_term<'d>(document: &'d StoredDocument, index_id: &str) -> Option<&'d OreCiphertext> {
    document.entries.iter().find_map(|entry| match &entry.term {
        IndexTerm::Scalar { term } if entry.index_id == index_id => Some(term),
        _ => None,
    })
}

#[async_trait]
impl CollectionService for MemoryCollectionService {
    async fn create_collection(
        &self,
        name: &str,
        schema_blob: Vec<u8>,
    ) -> Result<CollectionInfo, ServiceError> {
        self.admit()?;
        let id = match self.names.entry(name.to_string()) {
            Entry::Occupied(_) => {
                return Err(ServiceError::CollectionExists {
                    name: name.to_string(),
                })
            }
            Entry::Vacant(vacant) => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                vacant.insert(id.clone());
                id
            }
        };
        let info = CollectionInfo {
            reference: format!("memory:{id}"),
            id: id.clone(),
        };
        self.collections.insert(
            id,
            Arc::new(MemoryCollection {
                info: info.clone(),
                schema_blob,
                documents: RwLock::new(BTreeMap::new()),
            }),
        );
        trace!(collection = %name, id = %info.id, "collection created");
        Ok(info)
    }

    async fn load_collection(&self, name: &str) -> Result<StoredCollection, ServiceError> {
        self.admit()?;
        let collection = self
            .by_name(name)
            .ok_or_else(|| ServiceError::CollectionNotFound {
                name: name.to_string(),
            })?;
        Ok(StoredCollection {
            info: collection.info.clone(),
            schema_blob: collection.schema_blob.clone(),
        })
    }

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>, ServiceError> {
        self.admit()?;
        let mut listed: Vec<CollectionSummary> = self
            .names
            .iter()
            .filter_map(|entry| {
                self.collections.get(entry.value()).map(|c| CollectionSummary {
                    name: entry.key().clone(),
                    info: c.info.clone(),
                })
            })
            .collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }

    async fn delete_collection(&self, name: &str) -> Result<(), ServiceError> {
        self.admit()?;
        let (_, id) = self
            .names
            .remove(name)
            .ok_or_else(|| ServiceError::CollectionNotFound {
                name: name.to_string(),
            })?;
        self.collections.remove(&id);
        Ok(())
    }

    async fn put(&self, collection_id: &str, request: PutRequest) -> Result<(), ServiceError> {
        self.put_batch(collection_id, vec![request]).await
    }

    async fn put_batch(
        &self,
        collection_id: &str,
        requests: Vec<PutRequest>,
    ) -> Result<(), ServiceError> {
        self.admit()?;
        let collection = self.by_id(collection_id)?;
        let mut documents = collection.documents.write();
        for request in requests {
            documents.insert(
                request.id,
                StoredDocument {
                    source: request.source,
                    entries: request.entries,
                },
            );
        }
        Ok(())
    }

    async fn get(&self, collection_id: &str, id: &str) -> Result<Option<Document>, ServiceError> {
        self.admit()?;
        let collection = self.by_id(collection_id)?;
        let documents = collection.documents.read();
        Ok(documents.get(id).map(|doc| Document {
            id: id.to_string(),
            source: doc.source.clone(),
        }))
    }

    async fn get_all(
        &self,
        collection_id: &str,
        ids: &[String],
    ) -> Result<Vec<Document>, ServiceError> {
        self.admit()?;
        let collection = self.by_id(collection_id)?;
        let documents = collection.documents.read();
        Ok(ids
            .iter()
            .filter_map(|id| {
                documents.get(id).map(|doc| Document {
                    id: id.clone(),
                    source: doc.source.clone(),
                })
            })
            .collect())
    }

    async fn delete(&self, collection_id: &str, id: &str) -> Result<(), ServiceError> {
        self.admit()?;
        let collection = self.by_id(collection_id)?;
        collection.documents.write().remove(id);
        Ok(())
    }

    async fn query(
        &self,
        collection_id: &str,
        query: CompiledQuery,
    ) -> Result<QueryReply, ServiceError> {
        self.admit()?;
        let collection = self.by_id(collection_id)?;
        Ok(self.evaluate(&collection, &query))
    }
}

#[cfg(test)]
mod tests {
    use termvault_core::testing::FakeOreCipher;
    use termvault_core::{BlindIndex, TokenScope};

    use super::*;

    fn service() -> MemoryCollectionService {
        MemoryCollectionService::new(Arc::new(FakeOreCipher))
    }

    fn scalar(index_id: &str, term: u64) -> IndexEntry {
        IndexEntry {
            index_name: index_id.to_string(),
            index_id: index_id.to_string(),
            term: IndexTerm::Scalar {
                term: FakeOreCipher.encrypt(term, &[0; 16], &[0; 16]).unwrap(),
            },
        }
    }

    fn put(id: &str, entries: Vec<IndexEntry>) -> PutRequest {
        PutRequest {
            id: id.to_string(),
            source: Value::from(id),
            entries,
        }
    }

    fn range(index_id: &str, lower: u64, upper: u64) -> Constraint {
        let enc = |t| FakeOreCipher.encrypt(t, &[0; 16], &[0; 16]).unwrap();
        Constraint {
            index_id: index_id.to_string(),
            index_name: index_id.to_string(),
            condition: ConstraintCondition::Range {
                lower: enc(lower),
                upper: enc(upper),
            },
        }
    }

    fn query(constraints: Vec<Constraint>) -> CompiledQuery {
        CompiledQuery {
            constraints,
            limit: 50,
            offset: None,
            ordering: Vec::new(),
            aggregates: Vec::new(),
            skip_results: false,
            unsatisfiable: false,
        }
    }

    fn ids(reply: &QueryReply) -> Vec<&str> {
        reply.documents.iter().map(|d| d.id.as_str()).collect()
    }

    async fn seeded() -> (MemoryCollectionService, String) {
        let service = service();
        let info = service.create_collection("c", Vec::new()).await.unwrap();
        service
            .put_batch(
                &info.id,
                vec![
                    put("a", vec![scalar("age", 30)]),
                    put("b", vec![scalar("age", 10)]),
                    put("c", vec![scalar("age", 20)]),
                    put("d", Vec::new()),
                ],
            )
            .await
            .unwrap();
        (service, info.id)
    }

    // ---- lifecycle ----

    #[tokio::test]
    async fn duplicate_collection_is_rejected() {
        let service = service();
        service.create_collection("c", vec![1]).await.unwrap();
        let err = service.create_collection("c", vec![2]).await.unwrap_err();
        assert_eq!(err, ServiceError::CollectionExists { name: "c".into() });
        assert_eq!(service.load_collection("c").await.unwrap().schema_blob, vec![1]);
    }

    #[tokio::test]
    async fn deleted_collection_is_gone() {
        let service = service();
        let info = service.create_collection("c", Vec::new()).await.unwrap();
        service.delete_collection("c").await.unwrap();
        assert!(matches!(
            service.load_collection("c").await,
            Err(ServiceError::CollectionNotFound { .. })
        ));
        assert!(service.get(&info.id, "x").await.is_err());
    }

    #[tokio::test]
    async fn lists_collections_by_name() {
        let service = service();
        let zeta = service.create_collection("zeta", Vec::new()).await.unwrap();
        let alpha = service.create_collection("alpha", Vec::new()).await.unwrap();
        service.create_collection("gone", Vec::new()).await.unwrap();
        service.delete_collection("gone").await.unwrap();

        let listed = service.list_collections().await.unwrap();
        assert_eq!(
            listed,
            vec![
                CollectionSummary { name: "alpha".into(), info: alpha },
                CollectionSummary { name: "zeta".into(), info: zeta },
            ]
        );
    }

    #[tokio::test]
    async fn injected_faults_are_served_in_order() {
        let service = service();
        service.inject_failures([ServiceError::Throttled, ServiceError::Timeout { timeout_ms: 5 }]);
        assert_eq!(
            service.create_collection("c", Vec::new()).await,
            Err(ServiceError::Throttled)
        );
        assert_eq!(
            service.create_collection("c", Vec::new()).await,
            Err(ServiceError::Timeout { timeout_ms: 5 })
        );
        assert!(service.create_collection("c", Vec::new()).await.is_ok());
        assert_eq!(service.calls(), 3);
    }

    // ---- documents ----

    #[tokio::test]
    async fn put_replaces_and_delete_is_idempotent() {
        let (service, id) = seeded().await;
        service
            .put(&id, PutRequest { source: Value::from("new"), ..put("a", Vec::new()) })
            .await
            .unwrap();
        let doc = service.get(&id, "a").await.unwrap().unwrap();
        assert_eq!(doc.source, Value::from("new"));

        service.delete(&id, "a").await.unwrap();
        service.delete(&id, "a").await.unwrap();
        assert_eq!(service.get(&id, "a").await.unwrap(), None);
        assert_eq!(service.document_count("c"), 3);
    }

    #[tokio::test]
    async fn get_all_keeps_request_order_and_skips_unknown() {
        let (service, id) = seeded().await;
        let wanted = ["c", "missing", "a"].map(String::from);
        let documents = service.get_all(&id, &wanted).await.unwrap();
        let found: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(found, vec!["c", "a"]);
    }

    // ---- queries ----

    #[tokio::test]
    async fn range_bounds_are_inclusive() {
        let (service, id) = seeded().await;
        let reply = service.query(&id, query(vec![range("age", 10, 20)])).await.unwrap();
        assert_eq!(ids(&reply), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn ordering_puts_missing_terms_last() {
        let (service, id) = seeded().await;
        let mut q = query(Vec::new());
        q.ordering.push(CompiledOrdering {
            index_id: "age".into(),
            index_name: "age".into(),
            direction: Direction::Desc,
        });
        let reply = service.query(&id, q).await.unwrap();
        assert_eq!(ids(&reply), vec!["a", "c", "b", "d"]);
    }

    #[tokio::test]
    async fn pagination_and_count() {
        let (service, id) = seeded().await;
        let mut q = query(Vec::new());
        q.offset = Some(1);
        q.limit = 2;
        q.aggregates.push(termvault_core::CompiledAggregate {
            index_id: "age".into(),
            index_name: "age".into(),
            aggregate: termvault_core::Aggregate::Count,
        });
        let reply = service.query(&id, q.clone()).await.unwrap();
        assert_eq!(ids(&reply), vec!["b", "c"]);
        assert_eq!(reply.aggregates[0].value, 3);

        q.skip_results = true;
        let reply = service.query(&id, q).await.unwrap();
        assert!(reply.documents.is_empty());
        assert_eq!(reply.aggregates[0].value, 3);
    }

    #[tokio::test]
    async fn tokens_must_all_be_present() {
        let service = service();
        let info = service.create_collection("c", Vec::new()).await.unwrap();
        let tokens = |ts: &[u8]| IndexEntry {
            index_name: "m".into(),
            index_id: "m".into(),
            term: IndexTerm::Tokens {
                scope: TokenScope::Merged,
                tokens: ts.iter().map(|&t| BlindIndex([t; 8])).collect(),
            },
        };
        service
            .put_batch(
                &info.id,
                vec![put("x", vec![tokens(&[1, 2, 3])]), put("y", vec![tokens(&[1])])],
            )
            .await
            .unwrap();
        let token = |t: u8| Constraint {
            index_id: "m".into(),
            index_name: "m".into(),
            condition: ConstraintCondition::Token {
                token: BlindIndex([t; 8]),
            },
        };
        let reply = service
            .query(&info.id, query(vec![token(1), token(3)]))
            .await
            .unwrap();
        assert_eq!(ids(&reply), vec!["x"]);
    }
}
