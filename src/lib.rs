//! Softscope – soft-delete scoping for a query layer.
//!
//! An entity is *soft-deletable* when its schema carries a `deletedAt` field.
//! Deleting such a record means stamping that field with a timestamp rather
//! than removing the row. Softscope makes that convention invisible to readers:
//! * every collection read (`find_many`) on a soft-deletable entity only sees
//!   rows whose `deletedAt` is null;
//! * the same holds for any soft-deletable collection relation pulled in
//!   through `include` or `select`, at any depth;
//! * an explicit unscoped view ([`client::Client::with_deleted`]) still sees
//!   everything.
//!
//! Writes, counts and singular lookups (`find_first`, `find_unique`) pass
//! through untouched. Singular relations are never filtered either.
//!
//! ## Modules
//! * [`schema`] – The data model description and the [`schema::SchemaMetadata`]
//!   derived from it (which entities are soft-deletable, which relations are
//!   collections).
//! * [`args`] – The `find_many` argument tree: filters, `include`/`select`
//!   selections, ordering and paging.
//! * [`scope`] – The rewriter that injects `deletedAt: null` into an argument tree.
//! * [`client`] – The [`client::QueryExecutor`] seam and the hook-carrying
//!   [`client::Client`] that applies the rewriter.
//! * [`persist`] – A SQLite executor that interprets argument trees.
//! * [`server`] – A small HTTP surface over a client.
//! * [`seed`] – The demo schema and scenario data.
//!
//! ## Quick Start
//! ```
//! use softscope::args::{FindManyArgs, Selection};
//! use softscope::client::{QueryExecutor, extend_with_soft_delete};
//! use softscope::persist::{PersistenceMode, Persistor};
//! use softscope::seed::{demo_schema, reset_and_seed_scenario_data};
//!
//! let schema = demo_schema();
//! let persistor = Persistor::new(PersistenceMode::InMemory, &schema).unwrap();
//! let client = extend_with_soft_delete(persistor, &schema);
//! reset_and_seed_scenario_data(&client).unwrap();
//!
//! let args = FindManyArgs::new().include_relation("posts", Selection::flag());
//! let users = client.find_many("User", &args).unwrap();
//! assert_eq!(users.len(), 2);
//! let everyone = client.with_deleted().find_many("User", &FindManyArgs::new()).unwrap();
//! assert_eq!(everyone.len(), 3);
//! ```
//!
//! ## Limitations
//! Relation filters inside `where` (`some`, `every`, `none` and friends) are
//! not rewritten. A `where` clause that reaches through a relation can still
//! match soft-deleted related rows.

pub mod args;
pub mod client;
pub mod datatype;
pub mod error;
pub mod persist;
pub mod schema;
pub mod scope;
pub mod seed;
pub mod server;
pub mod settings;
pub(crate) mod sql;

pub use error::{Result, SoftscopeError};
