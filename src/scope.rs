//! Default soft-delete scoping of multi-row reads.
//!
//! [`SoftDeleteScope`] rewrites the argument tree of a `find_many` so that rows
//! carrying a deletion marker are left out by default:
//! * at the root, when the queried entity is soft-delete enabled, the caller's
//!   `where` is AND-ed with `deletedAt = null`;
//! * under `include`/`select`, every collection relation whose target entity is
//!   soft-delete enabled gets the same predicate, whether it was requested with
//!   a bare `true` or with a nested argument tree;
//! * nested trees are visited with the relation's target as the new frame of
//!   reference, to whatever depth the caller nested them.
//!
//! Recursion follows the caller's tree rather than the schema graph, so cyclic
//! schemas (`User -> Post -> User`) always terminate. Singular relations are
//! never filtered. Keys that do not name a declared relation are left alone.
//!
//! The rewriter works on a fresh copy of the caller's arguments and reads only
//! the shared, immutable [`SchemaMetadata`], so any number of threads may scope
//! requests at once without coordination.

use std::sync::Arc;

use crate::args::{FindManyArgs, Filter, Selection};
use crate::schema::{DELETION_MARKER, SchemaMetadata};

/// The "not deleted" predicate, `{ deletedAt: null }`.
pub fn deletion_predicate() -> Filter {
    Filter::is_null(DELETION_MARKER)
}

/// Combines a caller-supplied filter with the deletion predicate. The caller's
/// filter is kept verbatim as the first operand of a conjunction.
pub fn merge_deletion_filter(filter: Option<Filter>) -> Filter {
    match filter {
        None => deletion_predicate(),
        Some(filter) => Filter::And(vec![filter, deletion_predicate()]),
    }
}

#[derive(Debug, Clone)]
pub struct SoftDeleteScope {
    metadata: Arc<SchemaMetadata>,
}

impl SoftDeleteScope {
    pub fn new(metadata: Arc<SchemaMetadata>) -> Self {
        Self { metadata }
    }

    pub fn scope_root_args(&self, entity: &str, args: Option<&FindManyArgs>) -> FindManyArgs {
        let mut scoped = args.cloned().unwrap_or_default();
        if self.metadata.is_soft_delete(entity) {
            scoped.filter = Some(merge_deletion_filter(scoped.filter.take()));
        }
        self.scope_relations(entity, &mut scoped);
        scoped
    }

    pub fn scope_relations(&self, entity: &str, args: &mut FindManyArgs) {
        let Some(relations) = self.metadata.relations(entity) else {
            return;
        };
        for container in [args.include.as_mut(), args.select.as_mut()].into_iter().flatten() {
            for (name, selection) in container.iter_mut() {
                let Some(relation) = relations.get(name) else {
                    continue;
                };
                let scoped_target =
                    relation.is_collection && self.metadata.is_soft_delete(&relation.target);
                match selection {
                    Selection::Flag(true) => {
                        if scoped_target {
                            *selection = Selection::nested(
                                FindManyArgs::new().with_filter(deletion_predicate()),
                            );
                        }
                    }
                    Selection::Flag(false) => (),
                    Selection::Nested(nested) => {
                        if scoped_target {
                            nested.filter = Some(merge_deletion_filter(nested.filter.take()));
                        }
                        self.scope_relations(&relation.target, nested);
                    }
                }
            }
        }
    }
}
