//! Engine facade
//!
//! The entry points the rules layer calls. Each request gets its own
//! guarded view of the store; the writer, resolver, shaker and purger are
//! built per request on top of it. No authorization happens here beyond
//! the reserved-domain check.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{EngineConfig, OrphanSweep};
use crate::context::RuleContext;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry, ObservationScope};
use crate::realtime::{ChangeEvent, ChangePublisher, HandlerResult, Subscription, Topic};
use crate::store::{all_rows, CollectionStore, FindOptions, SortOrder};
use crate::tree::{CompiledFilter, IndexNode, JsonTreeCompiler, PathCompiler};

use super::catalog::PathCatalog;
use super::domain::Domain;
use super::errors::{EngineError, EngineResult};
use super::guard::{GuardedStore, RequestGuard};
use super::increment::{apply_increment, apply_set, split_update};
use super::purge::Purger;
use super::resolver::{project, IndexResolver, Resolution, ResolveOptions};
use super::shaker::TreeShaker;
use super::writer::{IndexWriter, WriteOutcome};

/// Query request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Filter document (absent = match all)
    #[serde(default)]
    pub filter: Option<Value>,
    /// Fetch one document by id instead
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub size: Option<usize>,
    /// Return the number of matches
    #[serde(default)]
    pub count: bool,
    /// Top-level fields to return
    #[serde(default, rename = "return")]
    pub projection: Option<Vec<String>>,
}

/// Update request; exactly one of `filter` and `id` is required
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub filter: Option<Value>,
    #[serde(default)]
    pub id: Option<String>,
    /// `{"$set": {...}, "$inc": {...}}` or a plain field map
    pub update: Value,
    /// Create the document when a by-id target is missing
    #[serde(default)]
    pub upsert: bool,
}

/// Delete request; exactly one of `filter` and `id` is required
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub filter: Option<Value>,
    #[serde(default)]
    pub id: Option<String>,
}

/// Query result
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Documents(Vec<Value>),
    Count(usize),
    Single(Option<Value>),
}

impl QueryResult {
    /// JSON response shape
    pub fn to_json(&self) -> Value {
        match self {
            QueryResult::Documents(docs) => Value::Array(docs.clone()),
            QueryResult::Count(n) => json!({ "count": n }),
            QueryResult::Single(doc) => doc.clone().unwrap_or(Value::Null),
        }
    }

    /// Matched documents (empty for counts)
    pub fn documents(&self) -> Vec<Value> {
        match self {
            QueryResult::Documents(docs) => docs.clone(),
            QueryResult::Single(doc) => doc.iter().cloned().collect(),
            QueryResult::Count(_) => Vec::new(),
        }
    }
}

/// Orphan sweep totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub nodes_visited: usize,
    pub entries_pruned: usize,
    pub nodes_removed: usize,
}

/// Tree-indexed document engine
pub struct Engine {
    store: Arc<dyn CollectionStore>,
    compiler: Arc<dyn PathCompiler>,
    publisher: ChangePublisher,
    catalog: PathCatalog,
    metrics: Arc<MetricsRegistry>,
    config: EngineConfig,
}

impl Engine {
    /// Engine over `store` with the JSON tree compiler
    pub fn new(store: Arc<dyn CollectionStore>, config: EngineConfig) -> Self {
        let project = config.project_id.clone();
        log_event_with_fields(Event::EngineStart, &[("project", &project)]);
        Self {
            store,
            compiler: Arc::new(JsonTreeCompiler::new()),
            publisher: ChangePublisher::new(),
            catalog: PathCatalog::new(),
            metrics: Arc::new(MetricsRegistry::new()),
            config,
        }
    }

    /// Replace the path compiler
    pub fn with_compiler(mut self, compiler: Arc<dyn PathCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Share a publisher with other components
    pub fn with_publisher(mut self, publisher: ChangePublisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn publisher(&self) -> &ChangePublisher {
        &self.publisher
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ==================================================================
    // Writes
    // ==================================================================

    /// Store a document; an existing `_id` is replaced
    pub async fn create(&self, domain: &str, document: Value, ctx: &RuleContext) -> EngineResult<Value> {
        let domain = self.domain(domain, ctx)?;
        let store = self.guarded(ctx);
        let outcome = self.write(&store, &domain, document, ctx).await?;
        Ok(outcome.document)
    }

    /// Store several documents in order, stopping at the first failure
    pub async fn create_many(&self, domain: &str, documents: Vec<Value>, ctx: &RuleContext) -> EngineResult<Vec<Value>> {
        let domain = self.domain(domain, ctx)?;
        let store = self.guarded(ctx);
        let mut stored = Vec::with_capacity(documents.len());
        for document in documents {
            stored.push(self.write(&store, &domain, document, ctx).await?.document);
        }
        Ok(stored)
    }

    /// Apply `$set`/`$inc` to matching documents and re-index them
    pub async fn update(&self, domain: &str, request: UpdateRequest, ctx: &RuleContext) -> EngineResult<Vec<Value>> {
        let domain = self.domain(domain, ctx)?;
        let (set, inc) = split_update(&request.update)?;
        let store = self.guarded(ctx);

        let targets = match (&request.id, &request.filter) {
            (Some(id), None) => match self.by_id(&store, &domain, id).await? {
                Some(document) => vec![document],
                None if request.upsert => vec![json!({ "_id": id })],
                None => return Err(EngineError::not_found(format!("{}/{}", domain, id))),
            },
            (None, Some(filter)) => {
                let compiled = self.compile(&domain, filter)?;
                self.documents(&store, &domain, &compiled).await?
            }
            _ => {
                return Err(EngineError::validation(
                    "Update requires exactly one of 'filter' or 'id'",
                ))
            }
        };

        let mut updated = Vec::with_capacity(targets.len());
        for mut document in targets {
            apply_set(&mut document, &set);
            apply_increment(&mut document, &inc);
            updated.push(self.write(&store, &domain, document, ctx).await?.document);
        }
        Ok(updated)
    }

    async fn write(
        &self,
        store: &GuardedStore<'_>,
        domain: &Domain,
        document: Value,
        ctx: &RuleContext,
    ) -> EngineResult<WriteOutcome> {
        let writer = IndexWriter::new(store, self.compiler.as_ref(), &self.catalog);
        let outcome = match writer.write(domain, document, ctx.uid.as_deref()).await {
            Ok(outcome) => outcome,
            Err(err) => {
                log_event_with_fields(
                    Event::WriteFailed,
                    &[("domain", domain.as_str()), ("error", &err.to_string())],
                );
                return Err(err);
            }
        };

        self.metrics.record_write(outcome.nodes_written as u64);
        log_event_with_fields(
            Event::WriteCommit,
            &[
                ("domain", domain.as_str()),
                ("id", outcome.id()),
                ("created", if outcome.created { "true" } else { "false" }),
                ("nodes", &outcome.nodes_written.to_string()),
            ],
        );
        self.publish(outcome.event(self.topic(domain, ctx)));
        Ok(outcome)
    }

    // ==================================================================
    // Reads
    // ==================================================================

    /// Resolve a query
    pub async fn query(&self, domain: &str, request: QueryRequest, ctx: &RuleContext) -> EngineResult<QueryResult> {
        let domain = self.domain(domain, ctx)?;
        let store = self.guarded(ctx);

        if let Some(id) = &request.id {
            let document = self.by_id(&store, &domain, id).await?;
            let projection = request.projection.as_deref();
            return Ok(QueryResult::Single(
                document.map(|d| project(d, projection)),
            ));
        }

        let filter = request.filter.clone().unwrap_or(Value::Null);
        let compiled = self.compile(&domain, &filter)?;
        let options = ResolveOptions {
            skip: request.skip,
            size: request.size,
            count: request.count,
            projection: request.projection,
        };
        let report = IndexResolver::new(&store, self.compiler.as_ref())
            .resolve(&domain, &compiled, &options)
            .await?;
        self.record_repairs(report.repaired);
        self.metrics.increment_queries_executed();

        let result = match report.resolution {
            Resolution::Documents(docs) => QueryResult::Documents(docs),
            Resolution::Count(n) => QueryResult::Count(n),
        };
        let matched = match &result {
            QueryResult::Count(n) => *n,
            other => other.documents().len(),
        };
        log_event_with_fields(
            Event::QueryExecuted,
            &[
                ("domain", domain.as_str()),
                ("matched", &matched.to_string()),
                ("repaired", &report.repaired.to_string()),
            ],
        );
        Ok(result)
    }

    /// Fetch one document through the identity path
    pub async fn find_by_id(&self, domain: &str, id: &str, ctx: &RuleContext) -> EngineResult<Option<Value>> {
        let domain = self.domain(domain, ctx)?;
        let store = self.guarded(ctx);
        self.by_id(&store, &domain, id).await
    }

    async fn by_id(&self, store: &GuardedStore<'_>, domain: &Domain, id: &str) -> EngineResult<Option<Value>> {
        let compiled = self.compile(domain, &json!({ "_id": id }))?;
        Ok(self.documents(store, domain, &compiled).await?.into_iter().next())
    }

    async fn documents(
        &self,
        store: &GuardedStore<'_>,
        domain: &Domain,
        compiled: &CompiledFilter,
    ) -> EngineResult<Vec<Value>> {
        let report = IndexResolver::new(store, self.compiler.as_ref())
            .resolve(domain, compiled, &ResolveOptions::default())
            .await?;
        self.record_repairs(report.repaired);
        match report.resolution {
            Resolution::Documents(docs) => Ok(docs),
            Resolution::Count(_) => Ok(Vec::new()),
        }
    }

    // ==================================================================
    // Deletes
    // ==================================================================

    /// Delete matching documents; returns the deleted ids
    ///
    /// Repeating a delete returns an empty list.
    pub async fn delete(&self, domain: &str, request: DeleteRequest, ctx: &RuleContext) -> EngineResult<Vec<String>> {
        let domain = self.domain(domain, ctx)?;
        let filter = match (request.id, request.filter) {
            (Some(id), None) => json!({ "_id": id }),
            (None, Some(filter)) => filter,
            _ => {
                return Err(EngineError::validation(
                    "Delete requires exactly one of 'filter' or 'id'",
                ))
            }
        };
        let compiled = self.compile(&domain, &filter)?;
        let store = self.guarded(ctx);

        let report = Purger::new(&store, self.compiler.as_ref())
            .purge(&domain, &compiled)
            .await?;
        self.record_repairs(report.repaired);

        for id in &report.ids {
            store.delete_by_id(domain.as_str(), id).await?;
            self.publish(ChangeEvent::delete(self.topic(&domain, ctx), id.clone()));
        }
        self.metrics.record_purge(report.ids.len() as u64);
        log_event_with_fields(
            Event::PurgeComplete,
            &[("domain", domain.as_str()), ("deleted", &report.ids.len().to_string())],
        );

        if self.config.orphan_sweep == OrphanSweep::AfterDelete && !report.ids.is_empty() {
            self.sweep_domain(&store, &domain).await?;
        }
        Ok(report.ids)
    }

    /// Repair every node of a domain and delete nodes left without entries
    pub async fn sweep(&self, domain: &str, ctx: &RuleContext) -> EngineResult<SweepReport> {
        let domain = self.domain(domain, ctx)?;
        let store = self.guarded(ctx);
        self.sweep_domain(&store, &domain).await
    }

    async fn sweep_domain(&self, store: &GuardedStore<'_>, domain: &Domain) -> EngineResult<SweepReport> {
        let scope = ObservationScope::with_fields("SWEEP", &[("domain", domain.as_str())]);
        let result = self.sweep_paths(store, domain).await;
        match &result {
            Ok(report) => {
                self.metrics.add_entries_pruned(report.entries_pruned as u64);
                self.metrics.add_nodes_removed(report.nodes_removed as u64);
                let visited = report.nodes_visited.to_string();
                let pruned = report.entries_pruned.to_string();
                let removed = report.nodes_removed.to_string();
                scope.complete_with_fields(&[
                    ("nodes_visited", &visited),
                    ("entries_pruned", &pruned),
                    ("nodes_removed", &removed),
                ]);
                log_event_with_fields(
                    Event::SweepComplete,
                    &[("domain", domain.as_str()), ("nodes_removed", &removed)],
                );
            }
            Err(err) => scope.fail(&err.to_string()),
        }
        result
    }

    async fn sweep_paths(&self, store: &GuardedStore<'_>, domain: &Domain) -> EngineResult<SweepReport> {
        let shaker = TreeShaker::new(store, self.compiler.as_ref());
        let mut report = SweepReport::default();

        for path in self.catalog.paths(store, domain).await? {
            let collection = path.collection_name();
            let rows = store
                .find(&collection, &all_rows, FindOptions::all().sorted(SortOrder::Ascending))
                .await?;
            for row in rows {
                let Some(node) = IndexNode::from_row(&row) else {
                    continue;
                };
                report.nodes_visited += 1;
                let outcome = shaker.repair(node, &path, domain).await?;
                report.entries_pruned += outcome.pruned;
                match outcome.node {
                    None => report.nodes_removed += 1,
                    Some(node) if node.value.is_empty() => {
                        if store.delete_by_id(&collection, &node.key()).await? {
                            report.nodes_removed += 1;
                        }
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(report)
    }

    // ==================================================================
    // Change notifications
    // ==================================================================

    /// Call `handler` for every change to `domain` in the caller's project
    pub fn subscribe<F>(&self, domain: &str, ctx: &RuleContext, handler: F) -> EngineResult<Subscription>
    where
        F: Fn(&ChangeEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let domain = self.domain(domain, ctx)?;
        Ok(self.publisher.subscribe(self.topic(&domain, ctx), handler))
    }

    /// Receive changes to `domain` on a bounded channel
    pub fn watch(
        &self,
        domain: &str,
        ctx: &RuleContext,
        capacity: usize,
    ) -> EngineResult<(Subscription, tokio::sync::mpsc::Receiver<ChangeEvent>)> {
        let domain = self.domain(domain, ctx)?;
        Ok(self.publisher.watch(self.topic(&domain, ctx), capacity))
    }

    fn publish(&self, event: ChangeEvent) {
        let report = self.publisher.publish(&event);
        self.metrics.increment_events_published();
        if !report.failed.is_empty() {
            self.metrics.add_subscriber_failures(report.failed.len() as u64);
        }
    }

    // ==================================================================
    // Helpers
    // ==================================================================

    fn domain(&self, name: &str, ctx: &RuleContext) -> EngineResult<Domain> {
        let domain = Domain::parse(name)?;
        if self.config.is_reserved(name) && !ctx.use_master_key {
            return Err(EngineError::validation(format!(
                "Domain '{}' is reserved",
                name
            )));
        }
        Ok(domain)
    }

    fn compile(&self, domain: &Domain, filter: &Value) -> EngineResult<CompiledFilter> {
        self.compiler.compile(domain.as_str(), filter).map_err(|err| {
            self.metrics.increment_queries_rejected();
            log_event_with_fields(
                Event::QueryRejected,
                &[("domain", domain.as_str()), ("reason", &err.to_string())],
            );
            EngineError::from(err)
        })
    }

    fn guarded(&self, ctx: &RuleContext) -> GuardedStore<'_> {
        let guard = RequestGuard::new(
            ctx.cancellation.clone(),
            Duration::from_millis(self.config.store_timeout_ms),
        );
        GuardedStore::new(self.store.as_ref(), guard)
    }

    fn topic(&self, domain: &Domain, ctx: &RuleContext) -> Topic {
        let project = if ctx.application_id.is_empty() {
            self.config.project_id.as_str()
        } else {
            ctx.application_id.as_str()
        };
        Topic::new(project, domain.as_str())
    }

    fn record_repairs(&self, repaired: usize) {
        if repaired > 0 {
            self.metrics.add_entries_pruned(repaired as u64);
        }
    }
}
