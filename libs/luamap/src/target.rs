//! Static targets: the host-side storage a dynamic value is mapped into.
//!
//! A type becomes a mapping target by implementing [`Target`]. Scalars,
//! `String`, `Option<T>`, `Box<T>`, `Vec<T>`, `[T; N]`, `HashMap<K, V>`,
//! `BTreeMap<K, V>` and [`AnyValue`] are covered here; host structs use
//! `#[derive(Target)]`.
//!
//! The dispatcher never sees concrete types. It works on [`ErasedTarget`]
//! and switches on the [`Slot`] a target exposes.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;

use crate::any::AnyValue;
use crate::error::MapError;
use crate::mapper::Mapper;
use crate::opaque::assign_cloned;
use crate::value::{ChannelRef, FunctionRef, Value};

/// Static type descriptor, rendered in Rust type syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDesc {
    Bool,
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    String,
    /// `Option<T>`: nil-able indirection.
    Pointer(Box<TypeDesc>),
    /// `Box<T>`: heap storage, maps exactly like `T`.
    Boxed(Box<TypeDesc>),
    /// `Vec<T>`.
    Slice(Box<TypeDesc>),
    /// `[T; N]`.
    Array(Box<TypeDesc>, usize),
    Map {
        kind: MapKind,
        key: Box<TypeDesc>,
        value: Box<TypeDesc>,
    },
    /// Derived struct; fields are enumerated through [`StructTarget`].
    Struct(&'static str),
    /// [`AnyValue`].
    Any,
    /// A category with no conversion (functions, channels).
    Unsupported(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    Hash,
    BTree,
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Bool => f.write_str("bool"),
            TypeDesc::I8 => f.write_str("i8"),
            TypeDesc::I16 => f.write_str("i16"),
            TypeDesc::I32 => f.write_str("i32"),
            TypeDesc::I64 => f.write_str("i64"),
            TypeDesc::Isize => f.write_str("isize"),
            TypeDesc::U8 => f.write_str("u8"),
            TypeDesc::U16 => f.write_str("u16"),
            TypeDesc::U32 => f.write_str("u32"),
            TypeDesc::U64 => f.write_str("u64"),
            TypeDesc::Usize => f.write_str("usize"),
            TypeDesc::F32 => f.write_str("f32"),
            TypeDesc::F64 => f.write_str("f64"),
            TypeDesc::String => f.write_str("String"),
            TypeDesc::Pointer(inner) => write!(f, "Option<{inner}>"),
            TypeDesc::Boxed(inner) => write!(f, "Box<{inner}>"),
            TypeDesc::Slice(elem) => write!(f, "Vec<{elem}>"),
            TypeDesc::Array(elem, len) => write!(f, "[{elem}; {len}]"),
            TypeDesc::Map { kind, key, value } => match kind {
                MapKind::Hash => write!(f, "HashMap<{key}, {value}>"),
                MapKind::BTree => write!(f, "BTreeMap<{key}, {value}>"),
            },
            TypeDesc::Struct(name) => f.write_str(name),
            TypeDesc::Any => f.write_str("AnyValue"),
            TypeDesc::Unsupported(name) => f.write_str(name),
        }
    }
}

/// A host type that dynamic values can be mapped into.
pub trait Target: Clone + 'static {
    /// Whether the zero value stands for "nothing". A nil opaque object can
    /// only be mapped into such targets.
    const HAS_NIL_STATE: bool = false;

    fn type_desc() -> TypeDesc;

    /// The value a `Nil` maps to, and the starting point for fresh allocations.
    fn zero() -> Self;

    /// Category view used by the dispatcher.
    fn slot(&mut self) -> Slot<'_>;

    fn set_zero(&mut self) {
        *self = Self::zero();
    }

    /// Opaque bridge: take `payload` if its concrete type is exactly `Self`.
    fn assign_opaque(&mut self, payload: &dyn Any) -> bool {
        assign_cloned(self, payload)
    }
}

/// Object-safe face of [`Target`]; every `Target` is one.
pub trait ErasedTarget {
    fn desc(&self) -> TypeDesc;
    fn slot_mut(&mut self) -> Slot<'_>;
    fn reset(&mut self);
    fn accept_opaque(&mut self, payload: &dyn Any) -> bool;
    fn has_nil_state(&self) -> bool;
}

impl<T: Target> ErasedTarget for T {
    fn desc(&self) -> TypeDesc {
        T::type_desc()
    }

    fn slot_mut(&mut self) -> Slot<'_> {
        Target::slot(self)
    }

    fn reset(&mut self) {
        Target::set_zero(self);
    }

    fn accept_opaque(&mut self, payload: &dyn Any) -> bool {
        Target::assign_opaque(self, payload)
    }

    fn has_nil_state(&self) -> bool {
        T::HAS_NIL_STATE
    }
}

/// Addressable storage, split by static category.
pub enum Slot<'a> {
    Bool(&'a mut bool),
    I8(&'a mut i8),
    I16(&'a mut i16),
    I32(&'a mut i32),
    I64(&'a mut i64),
    Isize(&'a mut isize),
    U8(&'a mut u8),
    U16(&'a mut u16),
    U32(&'a mut u32),
    U64(&'a mut u64),
    Usize(&'a mut usize),
    F32(&'a mut f32),
    F64(&'a mut f64),
    String(&'a mut String),
    Pointer(&'a mut dyn PointerTarget),
    Slice(&'a mut dyn SliceTarget),
    Array(&'a mut dyn ArrayTarget),
    Map(&'a mut dyn MapTarget),
    Struct(&'a mut dyn StructTarget),
    Interface(&'a mut AnyValue),
    Unsupported,
}

pub trait PointerTarget {
    fn pointee_mut(&mut self) -> Option<&mut dyn ErasedTarget>;

    /// Run `fill` on a fresh zero pointee and store it only if `fill` succeeds.
    fn fill_fresh(
        &mut self,
        fill: &mut dyn FnMut(&mut dyn ErasedTarget) -> Result<(), MapError>,
    ) -> Result<(), MapError>;
}

pub trait SliceTarget {
    /// Set the length to `len`, growing with zero elements.
    fn resize_to(&mut self, len: usize);

    fn element_mut(&mut self, index: usize) -> Option<&mut dyn ErasedTarget>;
}

pub trait ArrayTarget {
    fn array_len(&self) -> usize;

    fn element_mut(&mut self, index: usize) -> Option<&mut dyn ErasedTarget>;
}

pub trait MapTarget {
    fn clear_entries(&mut self);

    /// Convert `key` and `value` into fresh zero instances and insert them.
    /// Nothing is inserted if either conversion fails.
    fn insert_mapped(&mut self, mapper: &Mapper, key: &Value, value: &Value)
    -> Result<(), MapError>;
}

pub trait StructTarget {
    /// Fields in declaration order.
    fn fields(&self) -> &'static [FieldDesc];

    /// Storage of field `index`, or `None` if it is not settable.
    fn field_mut(&mut self, index: usize) -> Option<&mut dyn ErasedTarget>;
}

/// One struct field as seen by the mapper.
#[derive(Debug, Clone, Copy)]
pub struct FieldDesc {
    /// Declared field name.
    pub name: &'static str,
    /// Declared type, as written.
    pub ty: &'static str,
    /// `(tag key, tag value)` pairs from `#[lua(key = "value")]`.
    pub tags: &'static [(&'static str, &'static str)],
    /// Non-settable fields are never read from the table nor written.
    pub settable: bool,
}

impl FieldDesc {
    pub fn tag(&self, key: &str) -> Option<&'static str> {
        self.tags.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Table key for this field: the tag alias (text before the first comma)
    /// when `tag_name` resolves a non-empty one, else the declared name.
    pub fn lookup_name(&self, tag_name: &str) -> &'static str {
        if tag_name.is_empty() {
            return self.name;
        }
        match self.tag(tag_name) {
            Some(value) => {
                let alias = value.split_once(',').map_or(value, |(alias, _)| alias);
                if alias.is_empty() { self.name } else { alias }
            }
            None => self.name,
        }
    }
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

macro_rules! scalar_target {
    ($($t:ty => $variant:ident, $zero:expr;)*) => {
        $(
            impl Target for $t {
                fn type_desc() -> TypeDesc {
                    TypeDesc::$variant
                }

                fn zero() -> Self {
                    $zero
                }

                fn slot(&mut self) -> Slot<'_> {
                    Slot::$variant(self)
                }
            }
        )*
    };
}

scalar_target! {
    bool => Bool, false;
    i8 => I8, 0;
    i16 => I16, 0;
    i32 => I32, 0;
    i64 => I64, 0;
    isize => Isize, 0;
    u8 => U8, 0;
    u16 => U16, 0;
    u32 => U32, 0;
    u64 => U64, 0;
    usize => Usize, 0;
    f32 => F32, 0.0;
    f64 => F64, 0.0;
    String => String, String::new();
}

// ---------------------------------------------------------------------------
// Indirection
// ---------------------------------------------------------------------------

impl<T: Target> Target for Option<T> {
    const HAS_NIL_STATE: bool = true;

    fn type_desc() -> TypeDesc {
        TypeDesc::Pointer(Box::new(T::type_desc()))
    }

    fn zero() -> Self {
        None
    }

    fn slot(&mut self) -> Slot<'_> {
        Slot::Pointer(self)
    }

    /// Takes an `Option<T>` payload as is, or a `T` payload as `Some`.
    fn assign_opaque(&mut self, payload: &dyn Any) -> bool {
        if assign_cloned(self, payload) {
            return true;
        }
        let mut fresh = T::zero();
        if fresh.assign_opaque(payload) {
            *self = Some(fresh);
            true
        } else {
            false
        }
    }
}

impl<T: Target> PointerTarget for Option<T> {
    fn pointee_mut(&mut self) -> Option<&mut dyn ErasedTarget> {
        self.as_mut().map(|v| v as &mut dyn ErasedTarget)
    }

    fn fill_fresh(
        &mut self,
        fill: &mut dyn FnMut(&mut dyn ErasedTarget) -> Result<(), MapError>,
    ) -> Result<(), MapError> {
        let mut fresh = T::zero();
        fill(&mut fresh)?;
        *self = Some(fresh);
        Ok(())
    }
}

impl<T: Target> Target for Box<T> {
    const HAS_NIL_STATE: bool = T::HAS_NIL_STATE;

    fn type_desc() -> TypeDesc {
        TypeDesc::Boxed(Box::new(T::type_desc()))
    }

    fn zero() -> Self {
        Box::new(T::zero())
    }

    fn slot(&mut self) -> Slot<'_> {
        (**self).slot()
    }

    fn set_zero(&mut self) {
        (**self).set_zero();
    }

    /// Takes a `Box<T>` payload as is, or a `T` payload into the box.
    fn assign_opaque(&mut self, payload: &dyn Any) -> bool {
        assign_cloned(self, payload) || (**self).assign_opaque(payload)
    }
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

impl<T: Target> Target for Vec<T> {
    const HAS_NIL_STATE: bool = true;

    fn type_desc() -> TypeDesc {
        TypeDesc::Slice(Box::new(T::type_desc()))
    }

    fn zero() -> Self {
        Vec::new()
    }

    fn slot(&mut self) -> Slot<'_> {
        Slot::Slice(self)
    }
}

impl<T: Target> SliceTarget for Vec<T> {
    fn resize_to(&mut self, len: usize) {
        if len <= self.len() {
            self.truncate(len);
        } else {
            self.reserve_exact(len - self.len());
            self.resize_with(len, T::zero);
        }
    }

    fn element_mut(&mut self, index: usize) -> Option<&mut dyn ErasedTarget> {
        self.get_mut(index).map(|v| v as &mut dyn ErasedTarget)
    }
}

impl<T: Target, const N: usize> Target for [T; N] {
    fn type_desc() -> TypeDesc {
        TypeDesc::Array(Box::new(T::type_desc()), N)
    }

    fn zero() -> Self {
        std::array::from_fn(|_| T::zero())
    }

    fn slot(&mut self) -> Slot<'_> {
        Slot::Array(self)
    }
}

impl<T: Target, const N: usize> ArrayTarget for [T; N] {
    fn array_len(&self) -> usize {
        N
    }

    fn element_mut(&mut self, index: usize) -> Option<&mut dyn ErasedTarget> {
        self.get_mut(index).map(|v| v as &mut dyn ErasedTarget)
    }
}

// ---------------------------------------------------------------------------
// Maps
// ---------------------------------------------------------------------------

impl<K, V> Target for HashMap<K, V>
where
    K: Target + Eq + Hash,
    V: Target,
{
    const HAS_NIL_STATE: bool = true;

    fn type_desc() -> TypeDesc {
        TypeDesc::Map {
            kind: MapKind::Hash,
            key: Box::new(K::type_desc()),
            value: Box::new(V::type_desc()),
        }
    }

    fn zero() -> Self {
        HashMap::new()
    }

    fn slot(&mut self) -> Slot<'_> {
        Slot::Map(self)
    }
}

impl<K, V> MapTarget for HashMap<K, V>
where
    K: Target + Eq + Hash,
    V: Target,
{
    fn clear_entries(&mut self) {
        self.clear();
    }

    fn insert_mapped(
        &mut self,
        mapper: &Mapper,
        key: &Value,
        value: &Value,
    ) -> Result<(), MapError> {
        let mut k = K::zero();
        mapper.map_value(key, &mut k)?;
        let mut v = V::zero();
        mapper.map_value(value, &mut v)?;
        self.insert(k, v);
        Ok(())
    }
}

impl<K, V> Target for BTreeMap<K, V>
where
    K: Target + Ord,
    V: Target,
{
    const HAS_NIL_STATE: bool = true;

    fn type_desc() -> TypeDesc {
        TypeDesc::Map {
            kind: MapKind::BTree,
            key: Box::new(K::type_desc()),
            value: Box::new(V::type_desc()),
        }
    }

    fn zero() -> Self {
        BTreeMap::new()
    }

    fn slot(&mut self) -> Slot<'_> {
        Slot::Map(self)
    }
}

impl<K, V> MapTarget for BTreeMap<K, V>
where
    K: Target + Ord,
    V: Target,
{
    fn clear_entries(&mut self) {
        self.clear();
    }

    fn insert_mapped(
        &mut self,
        mapper: &Mapper,
        key: &Value,
        value: &Value,
    ) -> Result<(), MapError> {
        let mut k = K::zero();
        mapper.map_value(key, &mut k)?;
        let mut v = V::zero();
        mapper.map_value(value, &mut v)?;
        self.insert(k, v);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Interface and unsupported categories
// ---------------------------------------------------------------------------

impl Target for AnyValue {
    const HAS_NIL_STATE: bool = true;

    fn type_desc() -> TypeDesc {
        TypeDesc::Any
    }

    fn zero() -> Self {
        AnyValue::Nil
    }

    fn slot(&mut self) -> Slot<'_> {
        Slot::Interface(self)
    }
}

impl Target for FunctionRef {
    const HAS_NIL_STATE: bool = true;

    fn type_desc() -> TypeDesc {
        TypeDesc::Unsupported("FunctionRef")
    }

    fn zero() -> Self {
        FunctionRef::detached()
    }

    fn slot(&mut self) -> Slot<'_> {
        Slot::Unsupported
    }
}

impl Target for ChannelRef {
    const HAS_NIL_STATE: bool = true;

    fn type_desc() -> TypeDesc {
        TypeDesc::Unsupported("ChannelRef")
    }

    fn zero() -> Self {
        ChannelRef::detached()
    }

    fn slot(&mut self) -> Slot<'_> {
        Slot::Unsupported
    }
}

impl Target for char {
    fn type_desc() -> TypeDesc {
        TypeDesc::Unsupported("char")
    }

    fn zero() -> Self {
        '\0'
    }

    fn slot(&mut self) -> Slot<'_> {
        Slot::Unsupported
    }
}

impl Target for () {
    fn type_desc() -> TypeDesc {
        TypeDesc::Unsupported("()")
    }

    fn zero() -> Self {}

    fn slot(&mut self) -> Slot<'_> {
        Slot::Unsupported
    }
}
