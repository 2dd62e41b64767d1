//! Storage-independent building blocks: the schema registry, typed records,
//! neutral values and the store traits.

pub mod entity;
pub mod schema;
pub mod traits;
pub mod value;

pub use entity::{Entity, FilmworkType, Genre, GenreLink, Movie, Person, PersonLink, RoleType};
pub use schema::{EntityKind, EntitySchema, Field, FieldType, RenameMap};
pub use traits::{SourceReader, TargetWriter};
pub use value::{SqlNullType, SqlValue};
