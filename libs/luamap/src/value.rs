use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::{Equivalent, IndexMap};

use crate::opaque::Opaque;

/// Dynamic value as produced by the scripting runtime.
///
/// Strategy by type:
/// - Scalars (Bool, Number): copied, the runtime has a single numeric type
/// - String: owned text
/// - Table: shared reference, compared by identity
/// - Function, Channel: opaque runtime handles, compared by identity
/// - Opaque: arbitrary host value carried through the runtime untouched
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Function(FunctionRef),
    Table(Arc<Table>),
    Opaque(Opaque),
    Channel(ChannelRef),
}

/// Type tag of a [`Value`], rendered with the runtime's own names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Nil,
    Boolean,
    Number,
    String,
    Function,
    Table,
    UserData,
    Channel,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::Nil => "nil",
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Function => "function",
            ValueType::Table => "table",
            ValueType::UserData => "userdata",
            ValueType::Channel => "channel",
        })
    }
}

impl Value {
    pub fn type_tag(&self) -> ValueType {
        match self {
            Value::Nil => ValueType::Nil,
            Value::Bool(_) => ValueType::Boolean,
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Function(_) => ValueType::Function,
            Value::Table(_) => ValueType::Table,
            Value::Opaque(_) => ValueType::UserData,
            Value::Channel(_) => ValueType::Channel,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Raw equality: scalars by value, reference types by identity.
    pub fn raw_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.same(b),
            (Value::Table(a), Value::Table(b)) => Arc::ptr_eq(a, b),
            (Value::Opaque(a), Value::Opaque(b)) => a.same(b),
            (Value::Channel(a), Value::Channel(b)) => a.same(b),
            _ => false,
        }
    }

    /// 1-based position in a table's array part, if this key can address one.
    fn array_index(&self) -> Option<usize> {
        match self {
            Value::Number(n) if *n >= 1.0 && n.fract() == 0.0 && *n <= usize::MAX as f64 => {
                Some(*n as usize)
            }
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equal(other)
    }
}

static NIL: Value = Value::Nil;

/// Hashed identity of a key in the hash part. Scalars hash by value,
/// reference types by the address of their shared payload; the key value is
/// stored alongside, which keeps that address alive.
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyId {
    Bool(bool),
    /// Bits of the number, with `-0.0` folded into `0.0`.
    Number(u64),
    String(String),
    Ref(ValueType, usize),
}

const STRING_TAG: u8 = 2;

impl Hash for KeyId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            KeyId::Bool(b) => {
                0u8.hash(state);
                b.hash(state);
            }
            KeyId::Number(bits) => {
                1u8.hash(state);
                bits.hash(state);
            }
            KeyId::String(s) => {
                STRING_TAG.hash(state);
                s.as_str().hash(state);
            }
            KeyId::Ref(tag, addr) => {
                3u8.hash(state);
                tag.hash(state);
                addr.hash(state);
            }
        }
    }
}

/// Borrowed string key, looked up without allocating.
struct StrKey<'a>(&'a str);

impl Hash for StrKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        STRING_TAG.hash(state);
        self.0.hash(state);
    }
}

impl Equivalent<KeyId> for StrKey<'_> {
    fn equivalent(&self, key: &KeyId) -> bool {
        matches!(key, KeyId::String(s) if s == self.0)
    }
}

impl KeyId {
    /// `None` for keys that cannot index a table (nil, NaN).
    fn of(key: &Value) -> Option<Self> {
        Some(match key {
            Value::Nil => return None,
            Value::Number(n) if n.is_nan() => return None,
            Value::Bool(b) => KeyId::Bool(*b),
            Value::Number(n) if *n == 0.0 => KeyId::Number(0.0_f64.to_bits()),
            Value::Number(n) => KeyId::Number(n.to_bits()),
            Value::String(s) => KeyId::String(s.clone()),
            Value::Table(t) => KeyId::Ref(ValueType::Table, Arc::as_ptr(t) as usize),
            Value::Function(f) => KeyId::Ref(ValueType::Function, f.0.addr()),
            Value::Channel(c) => KeyId::Ref(ValueType::Channel, c.0.addr()),
            Value::Opaque(o) => KeyId::Ref(ValueType::UserData, o.addr()),
        })
    }

    fn index(i: usize) -> Self {
        KeyId::Number((i as f64).to_bits())
    }
}

/// The runtime's associative container.
///
/// Keys `1..=n` with no gap live in the array part; every other key lives in
/// the hash part in insertion order. `len()` is the length of the array part,
/// so it is always the maximal contiguous prefix starting at 1.
#[derive(Debug, Clone, Default)]
pub struct Table {
    array: Vec<Value>,
    hash: IndexMap<KeyId, (Value, Value)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an array-shaped table, `{a, b, c}`.
    pub fn from_array<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut table = Self::new();
        for (i, item) in items.into_iter().enumerate() {
            table.set(Value::Number((i + 1) as f64), item);
        }
        table
    }

    /// Length of the array part.
    pub fn len(&self) -> usize {
        self.array.len()
    }

    /// True if the table holds no pairs at all.
    pub fn is_empty(&self) -> bool {
        self.array.is_empty() && self.hash.is_empty()
    }

    /// Number of key/value pairs across both parts.
    pub fn pair_count(&self) -> usize {
        self.array.len() + self.hash.len()
    }

    pub fn get(&self, key: &Value) -> &Value {
        if let Some(i) = key.array_index() {
            if let Some(v) = self.array.get(i - 1) {
                return v;
            }
        }
        KeyId::of(key)
            .and_then(|id| self.hash.get(&id))
            .map_or(&NIL, |(_, v)| v)
    }

    /// Raw 1-based integer lookup.
    pub fn get_int(&self, index: usize) -> &Value {
        match index.checked_sub(1).and_then(|i| self.array.get(i)) {
            Some(v) => v,
            None => self.hash.get(&KeyId::index(index)).map_or(&NIL, |(_, v)| v),
        }
    }

    pub fn get_str(&self, key: &str) -> &Value {
        self.hash.get(&StrKey(key)).map_or(&NIL, |(_, v)| v)
    }

    /// Assign `table[key] = value`. Assigning `Nil` removes the key.
    /// `Nil` and NaN keys are ignored.
    pub fn set(&mut self, key: impl Into<Value>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let Some(id) = KeyId::of(&key) else {
            return;
        };

        if let Some(i) = key.array_index() {
            if i <= self.array.len() {
                if value.is_nil() {
                    // Punching a hole: the tail after it is no longer contiguous.
                    let tail = self.array.split_off(i - 1);
                    for (offset, v) in tail.into_iter().enumerate().skip(1) {
                        let k = Value::Number((i + offset) as f64);
                        self.hash.insert(KeyId::index(i + offset), (k, v));
                    }
                } else {
                    self.array[i - 1] = value;
                }
                return;
            }
            if i == self.array.len() + 1 && !value.is_nil() {
                self.hash.shift_remove(&id);
                self.array.push(value);
                self.absorb_hash_tail();
                return;
            }
        }

        if value.is_nil() {
            self.hash.shift_remove(&id);
        } else {
            match self.hash.get_mut(&id) {
                Some(slot) => slot.1 = value,
                None => {
                    self.hash.insert(id, (key, value));
                }
            }
        }
    }

    /// Append at `len() + 1`.
    pub fn push(&mut self, value: impl Into<Value>) {
        let next = Value::Number((self.array.len() + 1) as f64);
        self.set(next, value);
    }

    /// All pairs: the array part in order, then the hash part in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Value, &Value)> + '_ {
        let array = self
            .array
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::Number((i + 1) as f64), v));
        let hash = self.hash.values().map(|(k, v)| (k.clone(), v));
        array.chain(hash)
    }

    /// Elements of the array part, `t[1]..t[len]`.
    pub fn array(&self) -> &[Value] {
        &self.array
    }

    /// Move `len()+1`, `len()+2`, ... from the hash part while they exist.
    fn absorb_hash_tail(&mut self) {
        while let Some((_, v)) = self.hash.shift_remove(&KeyId::index(self.array.len() + 1)) {
            self.array.push(v);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Table
where
    K: Into<Value>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Table::new();
        for (k, v) in iter {
            table.set(k, v);
        }
        table
    }
}

/// Identity handle onto a runtime object that is not data (a function, a
/// channel). The payload is whatever the runtime uses to refer to it.
#[derive(Clone)]
struct Handle {
    name: String,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Handle {
    fn same(&self, other: &Handle) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

/// Runtime function reference.
#[derive(Clone)]
pub struct FunctionRef(Handle);

impl FunctionRef {
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, inner: T) -> Self {
        Self(Handle {
            name: name.into(),
            inner: Arc::new(inner),
        })
    }

    /// Handle that refers to nothing in the runtime.
    pub fn detached() -> Self {
        Self::new("nil", ())
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.inner.downcast_ref()
    }

    pub fn same(&self, other: &FunctionRef) -> bool {
        self.0.same(&other.0)
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function: {}", self.0.name)
    }
}

/// Runtime channel reference.
#[derive(Clone)]
pub struct ChannelRef(Handle);

impl ChannelRef {
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, inner: T) -> Self {
        Self(Handle {
            name: name.into(),
            inner: Arc::new(inner),
        })
    }

    /// Handle that refers to nothing in the runtime.
    pub fn detached() -> Self {
        Self::new("nil", ())
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.inner.downcast_ref()
    }

    pub fn same(&self, other: &ChannelRef) -> bool {
        self.0.same(&other.0)
    }
}

impl fmt::Debug for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel: {}", self.0.name)
    }
}

// ---------------------------------------------------------------------------
// From impls: host scalars → Value
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

number_from!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(Arc::new(t))
    }
}

impl From<Arc<Table>> for Value {
    fn from(t: Arc<Table>) -> Self {
        Value::Table(t)
    }
}

impl From<Opaque> for Value {
    fn from(o: Opaque) -> Self {
        Value::Opaque(o)
    }
}

impl From<FunctionRef> for Value {
    fn from(f: FunctionRef) -> Self {
        Value::Function(f)
    }
}

impl From<ChannelRef> for Value {
    fn from(c: ChannelRef) -> Self {
        Value::Channel(c)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_part_is_contiguous_prefix() {
        let mut t = Table::from_array([1, 2, 3]);
        t.set("a", 123);
        assert_eq!(t.len(), 3);
        assert_eq!(t.pair_count(), 4);

        t.set(5, 5);
        assert_eq!(t.len(), 3, "gap at 4 keeps 5 in the hash part");
        t.set(4, 4);
        assert_eq!(t.len(), 5, "filling the gap absorbs 5");
    }

    #[test]
    fn hole_moves_tail_to_hash() {
        let mut t = Table::from_array(["a", "b", "c", "d"]);
        t.set(2, Value::Nil);
        assert_eq!(t.len(), 1);
        assert_eq!(t.get_int(3), &Value::from("c"));
        assert_eq!(t.get_int(4), &Value::from("d"));
        assert!(t.get_int(2).is_nil());
    }

    #[test]
    fn map_shaped_table_has_zero_length() {
        let t: Table = [("x", 1), ("y", 2)].into_iter().collect();
        assert_eq!(t.len(), 0);
        assert!(!t.is_empty());
        assert_eq!(t.get_str("y"), &Value::Number(2.0));
    }

    #[test]
    fn nil_assignment_removes_key() {
        let mut t = Table::new();
        t.set("k", "v");
        t.set("k", Value::Nil);
        assert!(t.is_empty());
        t.set(Value::Nil, 1);
        t.set(f64::NAN, 1);
        assert!(t.is_empty());
    }

    #[test]
    fn tables_compare_by_identity() {
        let a = Value::from(Table::new());
        let b = Value::from(Table::new());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);

        let mut t = Table::new();
        t.set(a.clone(), "first");
        t.set(b.clone(), "second");
        assert_eq!(t.get(&a), &Value::from("first"));
        assert_eq!(t.get(&b), &Value::from("second"));
    }

    #[test]
    fn hash_part_scales_to_many_keys() {
        let n = 50_000;
        let mut t = Table::new();
        for i in 0..n {
            t.set(format!("k{i}"), i);
        }
        assert_eq!(t.pair_count(), n);
        assert_eq!(t.get_str("k0"), &Value::from(0));
        assert_eq!(t.get_str("k49999"), &Value::from(49_999));
        assert!(t.get_str("k50000").is_nil());

        let keys: Vec<Value> = t.iter().take(3).map(|(k, _)| k).collect();
        assert_eq!(keys, vec![Value::from("k0"), Value::from("k1"), Value::from("k2")]);
    }

    #[test]
    fn scalar_and_reference_keys() {
        let mut t = Table::new();
        t.set(0.0, "zero");
        assert_eq!(t.get(&Value::Number(-0.0)), &Value::from("zero"));
        t.set(true, 1);
        t.set(2.5, 2);
        assert_eq!(t.get(&Value::Bool(true)), &Value::from(1));
        assert_eq!(t.get(&Value::Number(2.5)), &Value::from(2));
        assert!(t.get(&Value::from("true")).is_nil());

        let f = FunctionRef::new("f", ());
        let o = Opaque::new(7_u8);
        t.set(f.clone(), "func");
        t.set(o.clone(), "obj");
        assert_eq!(t.get(&Value::Function(f)), &Value::from("func"));
        assert_eq!(t.get(&Value::Opaque(o)), &Value::from("obj"));
        assert!(t.get(&Value::Function(FunctionRef::new("f", ()))).is_nil());
        assert!(t.get(&Value::Opaque(Opaque::new(7_u8))).is_nil());

        t.set(2.5, Value::Nil);
        assert!(t.get(&Value::Number(2.5)).is_nil());
        let keys: Vec<Value> = t.iter().map(|(k, _)| k).collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(keys[0], Value::Number(0.0));
        assert_eq!(keys[1], Value::Bool(true));
    }

    #[test]
    fn iter_yields_array_then_hash() {
        let mut t = Table::from_array([10, 20]);
        t.set("k", true);
        let keys: Vec<Value> = t.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![Value::Number(1.0), Value::Number(2.0), Value::from("k")]
        );
    }
}
