//! Map dynamic values from an embedded scripting runtime into statically
//! typed host values.
//!
//! The runtime hands over a [`Value`] (nil, boolean, number, string, table,
//! function, channel, or an opaque host object). A [`Mapper`] walks it
//! depth-first and writes into a [`Target`]: scalars, `String`, `Option`,
//! `Box`, `Vec`, arrays, maps, [`AnyValue`], and structs deriving
//! [`Target`](derive@Target).
//!
//! # Field names
//!
//! Struct fields are looked up in the table by their declared name. With
//! [`Mapper::with_tag_name`], a field carrying `#[lua(<tag> = "alias")]` is
//! looked up as `alias` instead.
//!
//! # Private fields
//!
//! Only `pub` fields are settable. Other fields (and fields marked
//! `#[lua(skip)]`) are never read from the table nor written.
//!
//! ```ignore
//! #[derive(Clone, Target)]
//! pub struct Person {
//!     #[lua(json = "name")]
//!     pub name: String,
//!     #[lua(json = "age")]
//!     pub age: i32,
//! }
//!
//! let mut person = Person::zero();
//! Mapper::with_tag_name("json").map(&value, &mut person)?;
//! ```

extern crate self as luamap;

pub mod any;
pub mod config;
mod convert;
pub mod error;
pub mod mapper;
pub mod opaque;
pub mod target;
pub mod value;

pub use luamap_derive::Target;

pub use any::AnyValue;
pub use config::MapperConfig;
pub use error::{ConfigError, FieldPath, MapError, OpaqueDetail, PathSegment, TypeError};
pub use mapper::Mapper;
pub use opaque::Opaque;
pub use target::{
    ArrayTarget, ErasedTarget, FieldDesc, MapKind, MapTarget, PointerTarget, SliceTarget, Slot,
    StructTarget, Target, TypeDesc,
};
pub use value::{ChannelRef, FunctionRef, Table, Value, ValueType};

/// Map `value` into `output` with default options.
pub fn map<T: Target>(value: &Value, output: &mut T) -> Result<(), MapError> {
    Mapper::new().map(value, output)
}
