//! Typed records for the five migrated entity types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::schema::{EntityKind, EntitySchema, Field};
use super::value::{SqlNullType, SqlValue};

/// A record that can travel between the two stores.
///
/// `to_values` and `from_values` both follow the registry field order.
pub trait Entity: Sized + Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    fn schema() -> &'static EntitySchema {
        Self::KIND.schema()
    }

    fn id(&self) -> Uuid;

    /// Values in field-list order.
    fn to_values(&self) -> Vec<SqlValue>;

    /// Build a record from values in field-list order.
    ///
    /// Fails when the arity differs from the field list or a value has the
    /// wrong type for its field.
    fn from_values(values: Vec<SqlValue>) -> Result<Self, String>;

    /// Named values excluding the volatile timestamp fields.
    fn comparable_values(&self) -> Vec<(&'static str, SqlValue)> {
        let schema = Self::schema();
        schema
            .fields
            .iter()
            .zip(self.to_values())
            .filter(|(f, _)| schema.is_comparable(f.name))
            .map(|(f, v)| (f.name, v))
            .collect()
    }
}

/// Kind of film work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilmworkType {
    Movie,
    TvShow,
}

impl FilmworkType {
    pub fn as_str(self) -> &'static str {
        match self {
            FilmworkType::Movie => "movie",
            FilmworkType::TvShow => "tv_show",
        }
    }
}

impl FromStr for FilmworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(FilmworkType::Movie),
            "tv_show" => Ok(FilmworkType::TvShow),
            other => Err(format!("unknown film work type '{}'", other)),
        }
    }
}

/// Part a person played in a film work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    Actor,
    Writer,
    Director,
    Producer,
}

impl RoleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleType::Actor => "actor",
            RoleType::Writer => "writer",
            RoleType::Director => "director",
            RoleType::Producer => "producer",
        }
    }
}

impl FromStr for RoleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actor" => Ok(RoleType::Actor),
            "writer" => Ok(RoleType::Writer),
            "director" => Ok(RoleType::Director),
            "producer" => Ok(RoleType::Producer),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Movie {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub creation_date: Option<NaiveDate>,
    /// In `[0, 100]` when present.
    pub rating: Option<f64>,
    pub r#type: FilmworkType,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Genre {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: Uuid,
    pub full_name: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// Film work ↔ genre association.
#[derive(Debug, Clone, PartialEq)]
pub struct GenreLink {
    pub id: Uuid,
    pub film_work_id: Uuid,
    pub genre_id: Uuid,
    pub created: DateTime<Utc>,
}

/// Film work ↔ person association.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonLink {
    pub id: Uuid,
    pub film_work_id: Uuid,
    pub person_id: Uuid,
    pub role: Option<RoleType>,
    pub created: DateTime<Utc>,
}

/// Sequential reader over a row's values, checked against the field list.
struct FieldCursor {
    fields: std::slice::Iter<'static, Field>,
    values: std::vec::IntoIter<SqlValue>,
}

impl FieldCursor {
    fn new(schema: &'static EntitySchema, values: Vec<SqlValue>) -> Result<Self, String> {
        if values.len() != schema.fields.len() {
            return Err(format!(
                "expected {} fields, got {}",
                schema.fields.len(),
                values.len()
            ));
        }
        Ok(Self {
            fields: schema.fields.iter(),
            values: values.into_iter(),
        })
    }

    fn next(&mut self) -> Result<(&'static Field, SqlValue), String> {
        match (self.fields.next(), self.values.next()) {
            (Some(f), Some(v)) => Ok((f, v)),
            _ => Err("row ended early".to_string()),
        }
    }

    fn required<T>(
        &mut self,
        extract: impl FnOnce(&'static Field, SqlValue) -> Result<Option<T>, String>,
    ) -> Result<T, String> {
        let (field, value) = self.next()?;
        extract(field, value)?.ok_or_else(|| format!("field '{}' is NULL", field.name))
    }

    fn uuid(&mut self) -> Result<Uuid, String> {
        self.required(|f, v| match v {
            SqlValue::Uuid(u) => Ok(Some(u)),
            SqlValue::Null(_) => Ok(None),
            other => Err(mismatch(f, "uuid", &other)),
        })
    }

    fn opt_text(&mut self) -> Result<Option<String>, String> {
        let (f, v) = self.next()?;
        match v {
            SqlValue::Text(s) => Ok(Some(s)),
            SqlValue::Null(_) => Ok(None),
            other => Err(mismatch(f, "text", &other)),
        }
    }

    fn text(&mut self) -> Result<String, String> {
        self.required(|f, v| match v {
            SqlValue::Text(s) => Ok(Some(s)),
            SqlValue::Null(_) => Ok(None),
            other => Err(mismatch(f, "text", &other)),
        })
    }

    fn opt_float(&mut self) -> Result<Option<f64>, String> {
        let (f, v) = self.next()?;
        match v {
            SqlValue::Float(x) => Ok(Some(x)),
            SqlValue::Null(_) => Ok(None),
            other => Err(mismatch(f, "float", &other)),
        }
    }

    fn opt_date(&mut self) -> Result<Option<NaiveDate>, String> {
        let (f, v) = self.next()?;
        match v {
            SqlValue::Date(d) => Ok(Some(d)),
            SqlValue::Null(_) => Ok(None),
            other => Err(mismatch(f, "date", &other)),
        }
    }

    fn timestamp(&mut self) -> Result<DateTime<Utc>, String> {
        self.required(|f, v| match v {
            SqlValue::Timestamp(ts) => Ok(Some(ts)),
            SqlValue::Null(_) => Ok(None),
            other => Err(mismatch(f, "timestamp", &other)),
        })
    }
}

fn mismatch(field: &Field, expected: &str, got: &SqlValue) -> String {
    format!(
        "field '{}': expected {}, got {:?}",
        field.name,
        expected,
        got.null_type()
    )
}

impl Entity for Movie {
    const KIND: EntityKind = EntityKind::Movie;

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.title.clone().into(),
            SqlValue::from_option(self.description.clone(), SqlNullType::Text),
            SqlValue::from_option(self.creation_date, SqlNullType::Date),
            SqlValue::from_option(self.rating, SqlNullType::Float),
            self.r#type.as_str().into(),
            self.created.into(),
            self.modified.into(),
        ]
    }

    fn from_values(values: Vec<SqlValue>) -> Result<Self, String> {
        let mut c = FieldCursor::new(Self::schema(), values)?;
        let movie = Movie {
            id: c.uuid()?,
            title: c.text()?,
            description: c.opt_text()?,
            creation_date: c.opt_date()?,
            rating: c.opt_float()?,
            r#type: c.text()?.parse()?,
            created: c.timestamp()?,
            modified: c.timestamp()?,
        };
        if let Some(rating) = movie.rating {
            if !(0.0..=100.0).contains(&rating) {
                return Err(format!("rating {} outside [0, 100]", rating));
            }
        }
        Ok(movie)
    }
}

impl Entity for Genre {
    const KIND: EntityKind = EntityKind::Genre;

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.name.clone().into(),
            SqlValue::from_option(self.description.clone(), SqlNullType::Text),
            self.created.into(),
            self.modified.into(),
        ]
    }

    fn from_values(values: Vec<SqlValue>) -> Result<Self, String> {
        let mut c = FieldCursor::new(Self::schema(), values)?;
        Ok(Genre {
            id: c.uuid()?,
            name: c.text()?,
            description: c.opt_text()?,
            created: c.timestamp()?,
            modified: c.timestamp()?,
        })
    }
}

impl Entity for Person {
    const KIND: EntityKind = EntityKind::Person;

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.full_name.clone().into(),
            self.created.into(),
            self.modified.into(),
        ]
    }

    fn from_values(values: Vec<SqlValue>) -> Result<Self, String> {
        let mut c = FieldCursor::new(Self::schema(), values)?;
        Ok(Person {
            id: c.uuid()?,
            full_name: c.text()?,
            created: c.timestamp()?,
            modified: c.timestamp()?,
        })
    }
}

impl Entity for GenreLink {
    const KIND: EntityKind = EntityKind::GenreLink;

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.film_work_id.into(),
            self.genre_id.into(),
            self.created.into(),
        ]
    }

    fn from_values(values: Vec<SqlValue>) -> Result<Self, String> {
        let mut c = FieldCursor::new(Self::schema(), values)?;
        Ok(GenreLink {
            id: c.uuid()?,
            film_work_id: c.uuid()?,
            genre_id: c.uuid()?,
            created: c.timestamp()?,
        })
    }
}

impl Entity for PersonLink {
    const KIND: EntityKind = EntityKind::PersonLink;

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.film_work_id.into(),
            self.person_id.into(),
            SqlValue::from_option(self.role.map(RoleType::as_str), SqlNullType::Text),
            self.created.into(),
        ]
    }

    fn from_values(values: Vec<SqlValue>) -> Result<Self, String> {
        let mut c = FieldCursor::new(Self::schema(), values)?;
        Ok(PersonLink {
            id: c.uuid()?,
            film_work_id: c.uuid()?,
            person_id: c.uuid()?,
            role: c.opt_text()?.map(|r| r.parse()).transpose()?,
            created: c.timestamp()?,
        })
    }
}
