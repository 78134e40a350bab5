//! The interception point between callers and a query executor.
//!
//! A [`Client`] wraps an executor and an ordered list of [`FindManyHook`]s.
//! Only `find_many` runs through the hooks; every singular lookup, count and
//! write is dispatched to the executor unchanged. The executor itself stays
//! reachable through [`Client::with_deleted`], the unscoped view that skips all
//! hooks.
//!
//! [`extend_with_soft_delete`] is the usual way to build a client: it derives
//! the schema metadata once and registers the [`SoftDeleteScope`] hook.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::args::{FindManyArgs, Filter};
use crate::error::Result;
use crate::schema::{Schema, SchemaMetadata};
use crate::scope::SoftDeleteScope;

/// A single row, keyed by field name. Included relations appear as nested rows
/// (a list for collections, a row or `null` for singular relations).
pub type Row = Map<String, Value>;

/// The operations an underlying data source provides.
pub trait QueryExecutor: Send + Sync {
    fn find_many(&self, entity: &str, args: &FindManyArgs) -> Result<Vec<Row>>;
    fn find_first(&self, entity: &str, args: &FindManyArgs) -> Result<Option<Row>>;
    /// `args.filter` must select a record by id or unique field.
    fn find_unique(&self, entity: &str, args: &FindManyArgs) -> Result<Option<Row>>;
    fn count(&self, entity: &str, filter: Option<&Filter>) -> Result<u64>;
    fn create(&self, entity: &str, data: &Row) -> Result<Row>;
    fn update(&self, entity: &str, filter: &Filter, data: &Row) -> Result<Row>;
    fn delete(&self, entity: &str, filter: &Filter) -> Result<Row>;
}

/// A pre-dispatch rewrite of `find_many` arguments.
pub trait FindManyHook: Send + Sync {
    fn name(&self) -> &str;
    fn before_find_many(&self, entity: &str, args: &FindManyArgs) -> FindManyArgs;
}

impl FindManyHook for SoftDeleteScope {
    fn name(&self) -> &str {
        "soft-delete-scope"
    }
    fn before_find_many(&self, entity: &str, args: &FindManyArgs) -> FindManyArgs {
        self.scope_root_args(entity, Some(args))
    }
}

pub struct Client<E> {
    base: Arc<E>, // shared executor, also handed out as the unscoped view
    hooks: Vec<Arc<dyn FindManyHook>>,
}

impl<E> Clone for Client<E> {
    fn clone(&self) -> Self {
        Self { base: Arc::clone(&self.base), hooks: self.hooks.clone() }
    }
}

impl<E: QueryExecutor> Client<E> {
    pub fn new(base: E) -> Self {
        Self::from_shared(Arc::new(base))
    }
    pub fn from_shared(base: Arc<E>) -> Self {
        Self { base, hooks: Vec::new() }
    }

    /// Register a hook. Hooks run in registration order, each one seeing the
    /// arguments produced by the previous.
    pub fn extend(mut self, hook: impl FindManyHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }
    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// The unscoped view: reads issued here see every row, deleted or not.
    pub fn with_deleted(&self) -> &E {
        &self.base
    }
    pub fn shared_executor(&self) -> Arc<E> {
        Arc::clone(&self.base)
    }

    fn intercept(&self, entity: &str, args: &FindManyArgs) -> FindManyArgs {
        let mut current = args.clone();
        for hook in &self.hooks {
            current = hook.before_find_many(entity, &current);
            debug!(hook = hook.name(), entity, "find_many arguments rewritten");
        }
        current
    }
}

impl<E: QueryExecutor> QueryExecutor for Client<E> {
    fn find_many(&self, entity: &str, args: &FindManyArgs) -> Result<Vec<Row>> {
        if self.hooks.is_empty() {
            return self.base.find_many(entity, args);
        }
        let rewritten = self.intercept(entity, args);
        self.base.find_many(entity, &rewritten)
    }
    fn find_first(&self, entity: &str, args: &FindManyArgs) -> Result<Option<Row>> {
        self.base.find_first(entity, args)
    }
    fn find_unique(&self, entity: &str, args: &FindManyArgs) -> Result<Option<Row>> {
        self.base.find_unique(entity, args)
    }
    fn count(&self, entity: &str, filter: Option<&Filter>) -> Result<u64> {
        self.base.count(entity, filter)
    }
    fn create(&self, entity: &str, data: &Row) -> Result<Row> {
        self.base.create(entity, data)
    }
    fn update(&self, entity: &str, filter: &Filter, data: &Row) -> Result<Row> {
        self.base.update(entity, filter, data)
    }
    fn delete(&self, entity: &str, filter: &Filter) -> Result<Row> {
        self.base.delete(entity, filter)
    }
}

pub fn extend_with_soft_delete<E: QueryExecutor>(base: E, schema: &Schema) -> Client<E> {
    let metadata = Arc::new(SchemaMetadata::extract(schema));
    debug!(
        entities = metadata.len(),
        soft_delete = metadata.soft_delete_entities().count(),
        "schema metadata extracted"
    );
    Client::new(base).extend(SoftDeleteScope::new(metadata))
}
