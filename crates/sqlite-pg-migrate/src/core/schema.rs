//! Static schema registry for the migrated entity types.
//!
//! Each entity type has a fixed field list that defines both the record
//! shape and the column order used on both stores, a source table, a
//! destination table inside the destination schema, and the renames that
//! apply when reading from the source.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Primary key column shared by every entity.
pub const ID: &str = "id";
/// Creation timestamp shared by every entity.
pub const CREATED: &str = "created";
/// Modification timestamp shared by the non-link entities.
pub const MODIFIED: &str = "modified";

/// Server-assigned fields left out of content comparisons.
pub const VOLATILE_FIELDS: &[&str] = &[CREATED, MODIFIED];

/// Destination schema that owns the movies catalog.
pub const DEFAULT_TARGET_SCHEMA: &str = "content";

/// One of the five migrated record shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Movie,
    Genre,
    Person,
    GenreLink,
    PersonLink,
}

impl EntityKind {
    /// All entity types, parents before the link tables that reference them.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Movie,
        EntityKind::Genre,
        EntityKind::Person,
        EntityKind::GenreLink,
        EntityKind::PersonLink,
    ];

    /// Registry entry for this entity type.
    pub fn schema(self) -> &'static EntitySchema {
        match self {
            EntityKind::Movie => &MOVIE,
            EntityKind::Genre => &GENRE,
            EntityKind::Person => &PERSON,
            EntityKind::GenreLink => &GENRE_LINK,
            EntityKind::PersonLink => &PERSON_LINK,
        }
    }

    /// Snake-case name used in logs, config and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Movie => "movie",
            EntityKind::Genre => "genre",
            EntityKind::Person => "person",
            EntityKind::GenreLink => "genre_link",
            EntityKind::PersonLink => "person_link",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.schema().source_table == s)
            .ok_or_else(|| MigrateError::Config(format!("unknown entity type '{}'", s)))
    }
}

/// Storage-neutral field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// 128-bit universally unique identifier.
    Uuid,
    /// Free text or an enumerated label.
    Text,
    /// Double precision float.
    Float,
    /// Calendar date.
    Date,
    /// Timestamp with time zone.
    Timestamp,
}

/// A single column of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub nullable: bool,
}

const fn field(name: &'static str, ty: FieldType) -> Field {
    Field {
        name,
        ty,
        nullable: false,
    }
}

const fn nullable(name: &'static str, ty: FieldType) -> Field {
    Field {
        name,
        ty,
        nullable: true,
    }
}

/// Registry entry describing one entity type on both stores.
#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    /// Table name in the source store.
    pub source_table: &'static str,
    /// Table name inside the destination schema.
    pub target_table: &'static str,
    /// Ordered field list; also the column order on both stores.
    pub fields: &'static [Field],
}

impl EntitySchema {
    /// Field names in column order.
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Schema-qualified, quoted destination table.
    pub fn qualified_target(&self, schema: &str) -> String {
        format!("{}.{}", quote_ident(schema), quote_ident(self.target_table))
    }

    /// Whether the field takes part in content comparisons.
    pub fn is_comparable(&self, name: &str) -> bool {
        !VOLATILE_FIELDS.contains(&name)
    }
}

static MOVIE: EntitySchema = EntitySchema {
    kind: EntityKind::Movie,
    source_table: "film_work",
    target_table: "film_work",
    fields: &[
        field(ID, FieldType::Uuid),
        field("title", FieldType::Text),
        nullable("description", FieldType::Text),
        nullable("creation_date", FieldType::Date),
        nullable("rating", FieldType::Float),
        field("type", FieldType::Text),
        field(CREATED, FieldType::Timestamp),
        field(MODIFIED, FieldType::Timestamp),
    ],
};

static GENRE: EntitySchema = EntitySchema {
    kind: EntityKind::Genre,
    source_table: "genre",
    target_table: "genre",
    fields: &[
        field(ID, FieldType::Uuid),
        field("name", FieldType::Text),
        nullable("description", FieldType::Text),
        field(CREATED, FieldType::Timestamp),
        field(MODIFIED, FieldType::Timestamp),
    ],
};

static PERSON: EntitySchema = EntitySchema {
    kind: EntityKind::Person,
    source_table: "person",
    target_table: "person",
    fields: &[
        field(ID, FieldType::Uuid),
        field("full_name", FieldType::Text),
        field(CREATED, FieldType::Timestamp),
        field(MODIFIED, FieldType::Timestamp),
    ],
};

static GENRE_LINK: EntitySchema = EntitySchema {
    kind: EntityKind::GenreLink,
    source_table: "genre_film_work",
    target_table: "genre_film_work",
    fields: &[
        field(ID, FieldType::Uuid),
        field("film_work_id", FieldType::Uuid),
        field("genre_id", FieldType::Uuid),
        field(CREATED, FieldType::Timestamp),
    ],
};

static PERSON_LINK: EntitySchema = EntitySchema {
    kind: EntityKind::PersonLink,
    source_table: "person_film_work",
    target_table: "person_film_work",
    fields: &[
        field(ID, FieldType::Uuid),
        field("film_work_id", FieldType::Uuid),
        field("person_id", FieldType::Uuid),
        nullable("role", FieldType::Text),
        field(CREATED, FieldType::Timestamp),
    ],
};

/// Widest field list across the registry.
pub fn max_field_count() -> usize {
    EntityKind::ALL
        .iter()
        .map(|k| k.schema().fields.len())
        .max()
        .unwrap_or(0)
}

/// Maps a record field name to the column it is read from in the source.
///
/// Applied only on the read side; the destination uses the field names as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenameMap(BTreeMap<String, String>);

impl RenameMap {
    /// A map with no renames.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Build from `(field, source_column)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Source column holding `field`.
    pub fn source_column<'a>(&'a self, field: &'a str) -> &'a str {
        self.0.get(field).map(String::as_str).unwrap_or(field)
    }

    /// Iterate over `(field, source_column)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Projection list for a SELECT against the source table.
    ///
    /// Renamed fields are aliased back to their record name so decoded rows
    /// always come back in field-list order under the record's names.
    pub fn projection(&self, schema: &EntitySchema) -> String {
        schema
            .fields
            .iter()
            .map(|f| {
                let column = self.source_column(f.name);
                if column == f.name {
                    quote_ident(f.name)
                } else {
                    format!("{} AS {}", quote_ident(column), quote_ident(f.name))
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for RenameMap {
    /// The source store names its timestamps `created_at` / `updated_at`.
    fn default() -> Self {
        Self::from_pairs([(CREATED, "created_at"), (MODIFIED, "updated_at")])
    }
}

/// Quote an identifier with double quotes (valid for SQLite and PostgreSQL).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
