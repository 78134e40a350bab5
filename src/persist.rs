// used for persistence
use rusqlite::{Connection, params_from_iter};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, trace};

use crate::args::{Condition, FindManyArgs, Filter, Selection};
use crate::client::{QueryExecutor, Row};
use crate::error::{Result, SoftscopeError};
use crate::schema::{EntityModel, FieldModel, OtherHasher, RelationModel, Schema};
use crate::sql::{SqlBuilder, check_identifier, column_list, is_unique_selector, quote};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

// ------------- Persistence -------------
/// A SQLite-backed [`QueryExecutor`]. Every entity of the schema is stored in
/// a table of the same name with one column per scalar field. Relations are
/// resolved through the foreign key declared on their owning side.
pub struct Persistor {
    connection: Mutex<Connection>,
    schema: Schema,
}

// Which column of the parent row must equal which column of the related rows.
struct Link<'s> {
    local: &'s str,
    remote: &'s str,
}

impl Persistor {
    pub fn new(mode: PersistenceMode, schema: &Schema) -> Result<Self> {
        let connection = match &mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        let mut ddl = String::new();
        for entity in &schema.entities {
            ddl += &create_table(entity)?;
        }
        connection.execute_batch(&ddl)?;
        info!(?mode, entities = schema.entities.len(), "persistor ready");
        Ok(Self {
            connection: Mutex::new(connection),
            schema: schema.clone(),
        })
    }
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
    /// Removes every row of every entity.
    pub fn reset(&self) -> Result<()> {
        let connection = self.lock()?;
        for entity in &self.schema.entities {
            connection.execute(&format!("delete from {}", quote(&entity.name)), [])?;
        }
        debug!("all tables emptied");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|e| SoftscopeError::Lock(e.to_string()))
    }
    fn entity(&self, name: &str) -> Result<&EntityModel> {
        self.schema
            .entity(name)
            .ok_or_else(|| SoftscopeError::Execution(format!("Unknown entity '{name}'")))
    }
    fn require_unique(&self, entity: &EntityModel, filter: &Filter, operation: &str) -> Result<()> {
        if is_unique_selector(entity, filter) {
            Ok(())
        } else {
            Err(SoftscopeError::Execution(format!(
                "{operation} on {} needs an equality on an id or unique field, got {filter}",
                entity.name
            )))
        }
    }
    fn check_data(&self, entity: &EntityModel, data: &Row) -> Result<()> {
        for field in data.keys() {
            if entity.scalar_type(field).is_none() {
                return Err(SoftscopeError::Execution(format!(
                    "'{field}' is not a writable field of {}",
                    entity.name
                )));
            }
        }
        Ok(())
    }

    fn load(&self, connection: &Connection, entity_name: &str, args: &FindManyArgs) -> Result<Vec<Row>> {
        let entity = self.entity(entity_name)?;
        if args.include.is_some() && args.select.is_some() {
            return Err(SoftscopeError::Execution(format!(
                "select and include cannot be combined on the same level of {entity_name}"
            )));
        }
        if !args.options.is_empty() {
            let keys: Vec<&str> = args.options.keys().map(String::as_str).collect();
            return Err(SoftscopeError::Execution(format!(
                "Unsupported read options on {entity_name}: {}",
                keys.join(", ")
            )));
        }
        let mut builder = SqlBuilder::new(entity);
        let mut sql = format!("select {} from {}", column_list(entity), quote(&entity.name));
        if let Some(filter) = &args.filter {
            sql += &format!(" where {}", builder.filter(filter)?);
        }
        if !args.order_by.is_empty() {
            sql += &format!(" order by {}", builder.order(&args.order_by)?);
        }
        match (args.take, args.skip) {
            (Some(take), skip) => sql += &format!(" limit {take} offset {}", skip.unwrap_or(0)),
            (None, Some(skip)) => sql += &format!(" limit -1 offset {skip}"),
            (None, None) => (),
        }
        let mut rows = query_rows(connection, entity, &sql, builder.into_params())?;

        if let Some(include) = &args.include {
            for (name, selection) in include {
                self.attach(connection, entity, name, selection, &mut rows)?;
            }
        }
        if let Some(select) = &args.select {
            let mut kept = HashSet::new();
            for (name, selection) in select {
                if !selection.is_requested() {
                    continue;
                }
                let is_relation = entity.get(name).is_some_and(|f| f.relation().is_some());
                match (is_relation, selection) {
                    (true, _) => self.attach(connection, entity, name, selection, &mut rows)?,
                    (false, Selection::Flag(_)) => {
                        if entity.scalar_type(name).is_none() {
                            return Err(SoftscopeError::Execution(format!(
                                "Unknown field '{name}' selected on {entity_name}"
                            )));
                        }
                    }
                    (false, Selection::Nested(_)) => {
                        return Err(SoftscopeError::Execution(format!(
                            "'{name}' of {entity_name} is not a relation and takes no arguments"
                        )));
                    }
                }
                kept.insert(name.as_str());
            }
            for row in rows.iter_mut() {
                row.retain(|key, _| kept.contains(key.as_str()));
            }
        }
        Ok(rows)
    }

    fn attach(
        &self,
        connection: &Connection,
        entity: &EntityModel,
        name: &str,
        selection: &Selection,
        rows: &mut [Row],
    ) -> Result<()> {
        if !selection.is_requested() {
            return Ok(());
        }
        let (field, relation) = match entity.get(name) {
            Some(field) => match field.relation() {
                Some(relation) => (field, relation),
                None => {
                    return Err(SoftscopeError::Execution(format!(
                        "'{name}' is not a relation of {}",
                        entity.name
                    )));
                }
            },
            None => {
                return Err(SoftscopeError::Execution(format!(
                    "Unknown relation '{name}' on {}",
                    entity.name
                )));
            }
        };
        let nested = match selection {
            Selection::Nested(args) => (**args).clone(),
            Selection::Flag(_) => FindManyArgs::default(),
        };
        let link = self.link(entity, field, relation)?;
        // Paging applies per parent row, so paged relations are loaded row by row.
        if nested.take.is_some() || nested.skip.is_some() {
            for row in rows.iter_mut() {
                let key = row.get(link.local).cloned().unwrap_or(Value::Null);
                let related = if key.is_null() {
                    Vec::new()
                } else {
                    let mut child = nested.clone();
                    child.filter = Some(on_link(Filter::equals(link.remote, key), child.filter.take()));
                    if !field.is_list {
                        child.take = Some(1);
                    }
                    self.load(connection, &relation.target, &child)?
                };
                row.insert(name.to_string(), related_value(field, related));
            }
            return Ok(());
        }

        let mut seen: HashSet<String, OtherHasher> = HashSet::default();
        let mut keys = Vec::new();
        for row in rows.iter() {
            if let Some(key) = row.get(link.local).filter(|k| !k.is_null()) {
                if seen.insert(key.to_string()) {
                    keys.push(key.clone());
                }
            }
        }
        let mut grouped: HashMap<String, Vec<Row>, OtherHasher> = HashMap::default();
        if !keys.is_empty() {
            let mut child = nested;
            child.filter = Some(on_link(Filter::field(link.remote, Condition::In(keys)), child.filter.take()));
            // the link column is needed for grouping even when it was not selected
            let hidden = match child.select.as_mut() {
                Some(select) if !select.get(link.remote).is_some_and(Selection::is_requested) => {
                    select.insert(link.remote.to_string(), Selection::flag());
                    true
                }
                _ => false,
            };
            for mut related in self.load(connection, &relation.target, &child)? {
                let key = if hidden {
                    related.remove(link.remote)
                } else {
                    related.get(link.remote).cloned()
                };
                if let Some(key) = key {
                    grouped.entry(key.to_string()).or_default().push(related);
                }
            }
        }
        trace!(relation = name, parents = rows.len(), groups = grouped.len(), "relation loaded");
        for row in rows.iter_mut() {
            let related = row
                .get(link.local)
                .filter(|k| !k.is_null())
                .and_then(|k| grouped.get(&k.to_string()))
                .cloned()
                .unwrap_or_default();
            row.insert(name.to_string(), related_value(field, related));
        }
        Ok(())
    }

    fn link<'s>(
        &'s self,
        entity: &EntityModel,
        field: &FieldModel,
        relation: &'s RelationModel,
    ) -> Result<Link<'s>> {
        if let (Some(from), Some(to)) = (&relation.from_field, &relation.to_field) {
            return Ok(Link { local: from, remote: to });
        }
        let target = self.entity(&relation.target)?;
        let owning_side = target
            .fields
            .iter()
            .filter(|f| !(target.name == entity.name && f.name == field.name))
            .filter_map(FieldModel::relation)
            .find(|r| r.name == relation.name && r.target == entity.name && r.from_field.is_some());
        match owning_side {
            Some(RelationModel { from_field: Some(from), to_field: Some(to), .. }) => {
                Ok(Link { local: to, remote: from })
            }
            _ => Err(SoftscopeError::Execution(format!(
                "Relation '{}' between {} and {} declares no foreign key (implicit many-to-many relations are not supported)",
                relation.name, entity.name, relation.target
            ))),
        }
    }
}

impl QueryExecutor for Persistor {
    fn find_many(&self, entity: &str, args: &FindManyArgs) -> Result<Vec<Row>> {
        let connection = self.lock()?;
        self.load(&connection, entity, args)
    }
    fn find_first(&self, entity: &str, args: &FindManyArgs) -> Result<Option<Row>> {
        let mut first = args.clone();
        first.take = Some(1);
        Ok(self.find_many(entity, &first)?.into_iter().next())
    }
    fn find_unique(&self, entity: &str, args: &FindManyArgs) -> Result<Option<Row>> {
        let model = self.entity(entity)?;
        match &args.filter {
            Some(filter) => self.require_unique(model, filter, "find_unique")?,
            None => {
                return Err(SoftscopeError::Execution(format!(
                    "find_unique on {entity} needs a where clause"
                )));
            }
        }
        self.find_first(entity, args)
    }
    fn count(&self, entity: &str, filter: Option<&Filter>) -> Result<u64> {
        let model = self.entity(entity)?;
        let mut builder = SqlBuilder::new(model);
        let mut sql = format!("select count(*) from {}", quote(&model.name));
        if let Some(filter) = filter {
            sql += &format!(" where {}", builder.filter(filter)?);
        }
        trace!(entity, %sql, "count");
        let connection = self.lock()?;
        let count: i64 = connection.query_row(&sql, params_from_iter(builder.into_params()), |r| r.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
    fn create(&self, entity: &str, data: &Row) -> Result<Row> {
        let model = self.entity(entity)?;
        self.check_data(model, data)?;
        let mut builder = SqlBuilder::new(model);
        let sql = if data.is_empty() {
            format!("insert into {} default values returning {}", quote(&model.name), column_list(model))
        } else {
            let mut columns = Vec::with_capacity(data.len());
            let mut placeholders = Vec::with_capacity(data.len());
            for (field, value) in data {
                columns.push(quote(field));
                placeholders.push(builder.bind(field, value)?);
            }
            format!(
                "insert into {} ({}) values ({}) returning {}",
                quote(&model.name),
                columns.join(", "),
                placeholders.join(", "),
                column_list(model)
            )
        };
        let connection = self.lock()?;
        let created = query_rows(&connection, model, &sql, builder.into_params())?
            .into_iter()
            .next()
            .ok_or_else(|| SoftscopeError::Persistence(format!("insert into {entity} returned no row")))?;
        debug!(entity, "record created");
        Ok(created)
    }
    fn update(&self, entity: &str, filter: &Filter, data: &Row) -> Result<Row> {
        let model = self.entity(entity)?;
        self.require_unique(model, filter, "update")?;
        self.check_data(model, data)?;
        if data.is_empty() {
            let lookup = FindManyArgs::new().with_filter(filter.clone());
            return self.find_first(entity, &lookup)?.ok_or_else(|| not_found(entity, filter));
        }
        let mut builder = SqlBuilder::new(model);
        let assignments = builder.assignments(data)?;
        let clause = builder.filter(filter)?;
        let sql = format!(
            "update {} set {assignments} where {clause} returning {}",
            quote(&model.name),
            column_list(model)
        );
        let connection = self.lock()?;
        let updated = query_rows(&connection, model, &sql, builder.into_params())?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(entity, filter))?;
        debug!(entity, %filter, "record updated");
        Ok(updated)
    }
    fn delete(&self, entity: &str, filter: &Filter) -> Result<Row> {
        let model = self.entity(entity)?;
        self.require_unique(model, filter, "delete")?;
        let mut builder = SqlBuilder::new(model);
        let clause = builder.filter(filter)?;
        let sql = format!(
            "delete from {} where {clause} returning {}",
            quote(&model.name),
            column_list(model)
        );
        let connection = self.lock()?;
        let deleted = query_rows(&connection, model, &sql, builder.into_params())?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(entity, filter))?;
        debug!(entity, %filter, "record deleted");
        Ok(deleted)
    }
}

fn on_link(link: Filter, filter: Option<Filter>) -> Filter {
    match filter {
        None => link,
        Some(filter) => Filter::And(vec![link, filter]),
    }
}

// Collections become a list, singular relations their first row or null.
fn related_value(field: &FieldModel, related: Vec<Row>) -> Value {
    if field.is_list {
        Value::Array(related.into_iter().map(Value::Object).collect())
    } else {
        related.into_iter().next().map(Value::Object).unwrap_or(Value::Null)
    }
}

fn not_found(entity: &str, filter: &Filter) -> SoftscopeError {
    SoftscopeError::RecordNotFound {
        entity: entity.to_string(),
        filter: filter.to_string(),
    }
}

// The "STRICT" keyword is left out so the tables stay readable by older tools.
fn create_table(entity: &EntityModel) -> Result<String> {
    check_identifier(&entity.name)?;
    let mut columns = Vec::new();
    for field in &entity.fields {
        check_identifier(&field.name)?;
        let Some(scalar) = field.scalar_type() else {
            continue;
        };
        let mut column = format!("{} {}", quote(&field.name), scalar.affinity());
        if field.is_id {
            column += " primary key";
        } else {
            if !field.is_optional {
                column += " not null";
            }
            if field.is_unique {
                column += " unique";
            }
        }
        columns.push(column);
    }
    if columns.is_empty() {
        return Err(SoftscopeError::Persistence(format!(
            "Entity '{}' declares no scalar fields",
            entity.name
        )));
    }
    Ok(format!(
        "create table if not exists {} (\n    {}\n);\n",
        quote(&entity.name),
        columns.join(",\n    ")
    ))
}

fn query_rows(connection: &Connection, entity: &EntityModel, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>> {
    trace!(entity = %entity.name, %sql, "executing");
    let mut statement = connection.prepare(sql)?;
    let mut result = statement.query(params_from_iter(params))?;
    let mut rows = Vec::new();
    while let Some(record) = result.next()? {
        let mut row = Row::new();
        for (index, (field, scalar)) in entity.scalar_fields().enumerate() {
            let value = scalar.from_sql(&field.name, record.get_ref(index)?)?;
            row.insert(field.name.clone(), value);
        }
        rows.push(row);
    }
    Ok(rows)
}
