// other lookups use HashSet or HashMap with a fast hasher
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;
use std::collections::{HashMap, HashSet};

// a schema may be read from a JSON file
use serde::{Deserialize, Serialize};

use crate::datatype::ScalarType;

pub type OtherHasher = BuildHasherDefault<SeaHasher>;

/// Name of the reserved field that marks a row as logically deleted. An
/// entity declaring a field with this name takes part in soft-delete scoping.
pub const DELETION_MARKER: &str = "deletedAt";

// ------------- Schema description -------------
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub entities: Vec<EntityModel>,
}
impl Schema {
    pub fn new(entities: Vec<EntityModel>) -> Self {
        Self { entities }
    }
    pub fn entity(&self, name: &str) -> Option<&EntityModel> {
        self.entities.iter().find(|e| e.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityModel {
    pub name: String,
    pub fields: Vec<FieldModel>,
}
impl EntityModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }
    pub fn field(mut self, field: FieldModel) -> Self {
        self.fields.push(field);
        self
    }
    pub fn get(&self, name: &str) -> Option<&FieldModel> {
        self.fields.iter().find(|f| f.name == name)
    }
    pub fn scalar_fields(&self) -> impl Iterator<Item = (&FieldModel, ScalarType)> {
        self.fields
            .iter()
            .filter_map(|f| f.scalar_type().map(|ty| (f, ty)))
    }
    pub fn scalar_type(&self, name: &str) -> Option<ScalarType> {
        self.get(name).and_then(FieldModel::scalar_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldModel {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub is_list: bool,
    #[serde(default)]
    pub is_id: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldKind {
    Scalar {
        #[serde(rename = "type")]
        scalar: ScalarType,
    },
    Relation(RelationModel),
}

/// The declared link behind a relation field. Both sides of a relation share
/// `name`; only the owning side stores the foreign key, in `from_field`, which
/// refers to `to_field` on the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationModel {
    pub target: String,
    #[serde(rename = "relation")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_field: Option<String>,
}

impl FieldModel {
    fn with_kind(name: impl Into<String>, kind: FieldKind, is_list: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            is_list,
            is_id: false,
            is_unique: false,
            is_optional: false,
        }
    }
    pub fn scalar(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::with_kind(name, FieldKind::Scalar { scalar }, false)
    }
    pub fn id(name: impl Into<String>) -> Self {
        let mut field = Self::scalar(name, ScalarType::Int);
        field.is_id = true;
        field
    }
    pub fn relation_list(
        name: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self::with_kind(name, Self::relation_kind(target, relation), true)
    }
    pub fn relation_one(
        name: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self::with_kind(name, Self::relation_kind(target, relation), false)
    }
    fn relation_kind(target: impl Into<String>, relation: impl Into<String>) -> FieldKind {
        FieldKind::Relation(RelationModel {
            target: target.into(),
            name: relation.into(),
            from_field: None,
            to_field: None,
        })
    }
    // Has no effect on scalar fields.
    pub fn references(mut self, from_field: impl Into<String>, to_field: impl Into<String>) -> Self {
        if let FieldKind::Relation(relation) = &mut self.kind {
            relation.from_field = Some(from_field.into());
            relation.to_field = Some(to_field.into());
        }
        self
    }
    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }
    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match &self.kind {
            FieldKind::Scalar { scalar } => Some(*scalar),
            FieldKind::Relation(_) => None,
        }
    }
    pub fn relation(&self) -> Option<&RelationModel> {
        match &self.kind {
            FieldKind::Relation(relation) => Some(relation),
            FieldKind::Scalar { .. } => None,
        }
    }
}

// ------------- Metadata -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub is_collection: bool,
    pub target: String,
}

pub type RelationMap = HashMap<String, RelationDescriptor, OtherHasher>;

/// Lookups derived once from a [`Schema`]: which entities carry the deletion
/// marker, and which fields of each entity are relations to which target.
///
/// Targets are recorded by name only and resolved when they are looked up,
/// so declaration order within the schema does not matter.
#[derive(Debug, Default)]
pub struct SchemaMetadata {
    soft_delete_entities: HashSet<String, OtherHasher>,
    relations_by_entity: HashMap<String, RelationMap, OtherHasher>,
}

impl SchemaMetadata {
    pub fn extract(schema: &Schema) -> Self {
        let mut metadata = Self::default();
        for entity in &schema.entities {
            let mut relations = RelationMap::default();
            for field in &entity.fields {
                if field.name == DELETION_MARKER {
                    metadata.soft_delete_entities.insert(entity.name.clone());
                }
                if let FieldKind::Relation(relation) = &field.kind {
                    relations.insert(
                        field.name.clone(),
                        RelationDescriptor {
                            is_collection: field.is_list,
                            target: relation.target.clone(),
                        },
                    );
                }
            }
            metadata
                .relations_by_entity
                .insert(entity.name.clone(), relations);
        }
        metadata
    }
    pub fn is_soft_delete(&self, entity: &str) -> bool {
        self.soft_delete_entities.contains(entity)
    }
    pub fn relations(&self, entity: &str) -> Option<&RelationMap> {
        self.relations_by_entity.get(entity)
    }
    pub fn relation(&self, entity: &str, field: &str) -> Option<&RelationDescriptor> {
        self.relations(entity).and_then(|relations| relations.get(field))
    }
    pub fn soft_delete_entities(&self) -> impl Iterator<Item = &str> {
        self.soft_delete_entities.iter().map(String::as_str)
    }
    pub fn len(&self) -> usize {
        self.relations_by_entity.len()
    }
    pub fn is_empty(&self) -> bool {
        self.relations_by_entity.is_empty()
    }
}
