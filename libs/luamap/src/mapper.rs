use crate::any::AnyValue;
use crate::config::MapperConfig;
use crate::convert;
use crate::error::{MapError, TypeError};
use crate::opaque;
use crate::target::{
    ArrayTarget, ErasedTarget, MapTarget, PointerTarget, SliceTarget, Slot, StructTarget, Target,
};
use crate::value::{Table, Value};

/// Maps dynamic values into static targets.
///
/// A `Mapper` only holds its configuration, so one instance can serve any
/// number of mapping calls, from any number of threads, as long as each call
/// writes to its own target.
///
/// # Policies
///
/// - `Nil` resets the target to its zero value. For structs only settable
///   fields are reset.
/// - Struct, slice and array conversion stop at the first failing field or
///   element and report its path.
/// - Map conversion is best effort: a pair whose key or value does not
///   convert is dropped and the remaining pairs are still inserted. No error
///   is reported for dropped pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapper {
    /// Struct tag key for table key aliases. Empty: use declared field names.
    tag_name: String,
}

/// Why a converter declined the value.
enum Rejected {
    Shape,
    Category,
}

fn store<T>(out: &mut T, converted: Option<T>) -> Result<(), Rejected> {
    match converted {
        Some(v) => {
            *out = v;
            Ok(())
        }
        None => Err(Rejected::Shape),
    }
}

impl Mapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve struct field keys through the tag `tag_name`.
    pub fn with_tag_name(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
        }
    }

    pub fn from_config(config: &MapperConfig) -> Self {
        Self::with_tag_name(config.tag_name.clone())
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    /// Map `value` into `output`.
    pub fn map<T: Target>(&self, value: &Value, output: &mut T) -> Result<(), MapError> {
        tracing::trace!(source = %value.type_tag(), output = %T::type_desc(), "mapping value");
        self.map_value(value, output)
    }

    /// Map `value` through an out-pointer.
    ///
    /// `output` must be an `Option<T>`. A `None` pointer cannot be written
    /// through: it fails with [`MapError::OutputValueIsNil`] unless `value`
    /// is `Nil`, in which case nothing happens.
    pub fn map_pointer(
        &self,
        value: &Value,
        output: &mut dyn ErasedTarget,
    ) -> Result<(), MapError> {
        match output.slot_mut() {
            Slot::Pointer(ptr) => match ptr.pointee_mut() {
                Some(pointee) => self.map_value(value, pointee),
                None if value.is_nil() => Ok(()),
                None => Err(MapError::OutputValueIsNil),
            },
            _ => Err(MapError::NotAPointer(output.desc())),
        }
    }

    /// Map `value` into already addressable storage.
    pub fn map_value(&self, value: &Value, target: &mut dyn ErasedTarget) -> Result<(), MapError> {
        if value.is_nil() {
            target.reset();
            return Ok(());
        }
        self.map_non_nil(value, target)
    }

    fn map_non_nil(&self, value: &Value, target: &mut dyn ErasedTarget) -> Result<(), MapError> {
        if let Value::Opaque(obj) = value {
            if !matches!(target.slot_mut(), Slot::Interface(_)) {
                return opaque::bridge(obj, target);
            }
        }

        let outcome = match target.slot_mut() {
            Slot::Bool(out) => store(out, convert::to_bool(value)),
            Slot::I8(out) => store(out, convert::to_i8(value)),
            Slot::I16(out) => store(out, convert::to_i16(value)),
            Slot::I32(out) => store(out, convert::to_i32(value)),
            Slot::I64(out) => store(out, convert::to_i64(value)),
            Slot::Isize(out) => store(out, convert::to_isize(value)),
            Slot::U8(out) => store(out, convert::to_u8(value)),
            Slot::U16(out) => store(out, convert::to_u16(value)),
            Slot::U32(out) => store(out, convert::to_u32(value)),
            Slot::U64(out) => store(out, convert::to_u64(value)),
            Slot::Usize(out) => store(out, convert::to_usize(value)),
            Slot::F32(out) => store(out, convert::to_f32(value)),
            Slot::F64(out) => store(out, convert::to_f64(value)),
            Slot::String(out) => store(out, convert::to_string(value)),
            Slot::Pointer(ptr) => return self.map_pointee(value, ptr),
            Slot::Slice(slice) => match value {
                Value::Table(table) => return self.map_slice(table, slice),
                _ => Err(Rejected::Shape),
            },
            Slot::Array(array) => match value {
                Value::Table(table) => return self.map_array(table, array),
                _ => Err(Rejected::Shape),
            },
            Slot::Map(map) => match value {
                Value::Table(table) => return self.map_table_entries(table, map),
                _ => Err(Rejected::Shape),
            },
            Slot::Struct(fields) => match value {
                Value::Table(table) => return self.map_struct(table, fields),
                _ => Err(Rejected::Shape),
            },
            Slot::Interface(out) => {
                *out = AnyValue::from_value(value);
                return Ok(());
            }
            Slot::Unsupported => Err(Rejected::Category),
        };

        outcome.map_err(|rejected| match rejected {
            Rejected::Shape => TypeError::new(target.desc(), value).into(),
            Rejected::Category => MapError::UnsupportedType(target.desc()),
        })
    }

    /// Fresh pointee, assigned only once the value mapped into it cleanly.
    fn map_pointee(&self, value: &Value, ptr: &mut dyn PointerTarget) -> Result<(), MapError> {
        ptr.fill_fresh(&mut |pointee: &mut dyn ErasedTarget| self.map_non_nil(value, pointee))
    }

    fn map_slice(&self, table: &Table, slice: &mut dyn SliceTarget) -> Result<(), MapError> {
        slice.resize_to(table.len());
        for (index, item) in table.array().iter().enumerate() {
            if let Some(elem) = slice.element_mut(index) {
                self.map_value(item, elem).map_err(|e| e.at_index(index))?;
            }
        }
        Ok(())
    }

    /// `min(N, len)` elements positionally; the remaining slots are zeroed.
    fn map_array(&self, table: &Table, array: &mut dyn ArrayTarget) -> Result<(), MapError> {
        let items = table.array();
        for index in 0..array.array_len() {
            let Some(elem) = array.element_mut(index) else {
                break;
            };
            match items.get(index) {
                Some(item) => self.map_value(item, elem).map_err(|e| e.at_index(index))?,
                None => elem.reset(),
            }
        }
        Ok(())
    }

    fn map_table_entries(&self, table: &Table, map: &mut dyn MapTarget) -> Result<(), MapError> {
        map.clear_entries();
        for (key, value) in table.iter() {
            if let Err(error) = map.insert_mapped(self, &key, value) {
                tracing::debug!(key = ?key, %error, "incompatible table pair, skipping");
            }
        }
        Ok(())
    }

    fn map_struct(&self, table: &Table, target: &mut dyn StructTarget) -> Result<(), MapError> {
        for (index, field) in target.fields().iter().enumerate() {
            if !field.settable {
                continue;
            }
            let Some(storage) = target.field_mut(index) else {
                continue;
            };
            let key = field.lookup_name(&self.tag_name);
            tracing::trace!(field = field.name, ty = field.ty, key, "mapping field");
            self.map_value(table.get_str(key), storage)
                .map_err(|e| e.in_field(field.name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use super::*;
    use crate::error::OpaqueDetail;
    use crate::opaque::Opaque;
    use crate::target::TypeDesc;
    use crate::value::{ChannelRef, FunctionRef};

    fn ud<T: std::any::Any + Send + Sync>(v: T) -> Value {
        Value::Opaque(Opaque::new(v))
    }

    #[test]
    fn map_bool() {
        let mut output = true;
        map_ok(&Value::Bool(false), &mut output);
        assert!(!output);
        map_ok(&Value::Bool(true), &mut output);
        assert!(output);

        let err = crate::map(&Value::from(12345), &mut output).unwrap_err();
        assert_eq!(err.to_string(), "bool expected but got Lua number");

        map_ok(&Value::Nil, &mut output);
        assert!(!output, "nil resets to the zero value");

        map_ok(&ud(true), &mut output);
        assert!(output);
        let err = crate::map(&ud(1234_i32), &mut output).unwrap_err();
        assert_eq!(err.to_string(), "bool expected but got Lua user data of i32");
        let err = crate::map(&Value::Opaque(Opaque::nil()), &mut output).unwrap_err();
        assert_eq!(err.to_string(), "bool expected but got Lua user data of nil");
    }

    #[test]
    fn map_integers() {
        let mut a = 7_i32;
        map_ok(&Value::Nil, &mut a);
        assert_eq!(a, 0);
        map_ok(&Value::from(1234), &mut a);
        assert_eq!(a, 1234);
        let err = crate::map(&Value::Bool(true), &mut a).unwrap_err();
        assert_eq!(err.to_string(), "i32 expected but got Lua boolean");
        map_ok(&ud(99_i32), &mut a);
        assert_eq!(a, 99);
        let err = crate::map(&ud("abce"), &mut a).unwrap_err();
        assert_eq!(err.to_string(), "i32 expected but got Lua user data of &str");

        let mut b = 0_i8;
        map_ok(&Value::from(12), &mut b);
        assert_eq!(b, 12);
        let err = crate::map(&ud(12_i32), &mut b).unwrap_err();
        assert_eq!(err.to_string(), "i8 expected but got Lua user data of i32");

        let mut c = 0_u64;
        map_ok(&Value::Number(444.4), &mut c);
        assert_eq!(c, 444);

        let mut d = 0_usize;
        map_ok(&Value::from(3), &mut d);
        assert_eq!(d, 3);
    }

    #[test]
    fn map_floats_and_strings() {
        let mut f = 0.0_f32;
        map_ok(&Value::Number(1.5), &mut f);
        assert_eq!(f, 1.5);
        let mut g = 0.0_f64;
        map_ok(&ud(2.25_f64), &mut g);
        assert_eq!(g, 2.25);

        let mut s = String::from("old");
        map_ok(&Value::from("string"), &mut s);
        assert_eq!(s, "string");
        let err = crate::map(&Value::from(1), &mut s).unwrap_err();
        assert_eq!(err.to_string(), "String expected but got Lua number");
        map_ok(&Value::Nil, &mut s);
        assert_eq!(s, "");
    }

    #[test]
    fn map_pointer_allocates() {
        let mut output: Option<Box<i32>> = None;
        map_ok(&Value::from(123), &mut output);
        assert_eq!(output.as_deref(), Some(&123));

        map_ok(&Value::Nil, &mut output);
        assert!(output.is_none());

        let err = crate::map(&Value::from("abc"), &mut output).unwrap_err();
        assert_eq!(err.to_string(), "Box<i32> expected but got Lua string");
        assert!(output.is_none(), "failed conversion leaves the pointer untouched");

        map_ok(&Value::Opaque(Opaque::nil()), &mut output);
        assert!(output.is_none());

        map_ok(&ud(5_i32), &mut output);
        assert_eq!(output.as_deref(), Some(&5));

        let err = crate::map(&ud(123.0_f64), &mut output).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Option<Box<i32>> expected but got Lua user data of f64"
        );
    }

    #[test]
    fn opaque_wrappers_bridge_exactly() {
        let mut p: Option<i32> = None;
        map_ok(&ud(Some(5_i32)), &mut p);
        assert_eq!(p, Some(5));

        let mut b: Box<i32> = Box::new(0);
        map_ok(&ud(Box::new(6_i32)), &mut b);
        assert_eq!(*b, 6);

        let err = crate::map(&ud(Some(5_i64)), &mut p).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Option<i32> expected but got Lua user data of Option<i64>"
        );
    }

    #[test]
    fn map_slice() {
        let tbl = Value::from(Table::from_array([1, 2, 3]));
        let mut output: Vec<i32> = Vec::new();
        map_ok(&tbl, &mut output);
        assert_eq!(output, vec![1, 2, 3]);

        output = vec![1];
        map_ok(&tbl, &mut output);
        assert_eq!(output, vec![1, 2, 3]);

        output = vec![1, 2, 3, 4, 5, 6, 7];
        let capacity = output.capacity();
        map_ok(&tbl, &mut output);
        assert_eq!(output, vec![1, 2, 3]);
        assert_eq!(output.capacity(), capacity, "large enough storage is reused");

        let mut floats: Vec<f32> = Vec::new();
        map_ok(&tbl, &mut floats);
        assert_eq!(floats, vec![1.0, 2.0, 3.0]);

        let mut mixed = Table::from_array([1, 2, 3]);
        mixed.push(true);
        let err = crate::map(&mixed.into(), &mut output).unwrap_err();
        assert_eq!(err.to_string(), "[3]: i32 expected but got Lua boolean");

        map_ok(&Value::Nil, &mut output);
        assert!(output.is_empty());

        output = vec![1, 2, 3];
        map_ok(&Value::Opaque(Opaque::nil()), &mut output);
        assert!(output.is_empty());

        map_ok(&ud(vec![4, 5, 6]), &mut output);
        assert_eq!(output, vec![4, 5, 6]);

        let err = crate::map(&ud([1, 2, 3]), &mut output).unwrap_err();
        assert_eq!(err.to_string(), "Vec<i32> expected but got Lua user data of [i32; 3]");
        let err = crate::map(&ud(vec![1.0_f32]), &mut output).unwrap_err();
        assert_eq!(err.to_string(), "Vec<i32> expected but got Lua user data of Vec<f32>");
        let err = crate::map(&Value::Bool(true), &mut output).unwrap_err();
        assert_eq!(err.to_string(), "Vec<i32> expected but got Lua boolean");
    }

    #[test]
    fn map_array() {
        let mut t = Table::from_array([1.0, 2.0, 3.0, 4.0, 5.5]);
        t.set("a", 123);
        let tbl = Value::from(t);

        let mut a = [0_i32; 3];
        map_ok(&tbl, &mut a);
        assert_eq!(a, [1, 2, 3]);

        let mut b = [9_i32; 10];
        map_ok(&tbl, &mut b);
        assert_eq!(b, [1, 2, 3, 4, 5, 0, 0, 0, 0, 0]);

        let mut c = [false; 2];
        let err = crate::map(&tbl, &mut c).unwrap_err();
        assert_eq!(err.to_string(), "[0]: bool expected but got Lua number");

        let err = crate::map(&Value::from(1234), &mut a).unwrap_err();
        assert_eq!(err.to_string(), "[i32; 3] expected but got Lua number");

        map_ok(&ud([4, 5, 6]), &mut a);
        assert_eq!(a, [4, 5, 6]);
        let err = crate::map(&ud([4, 5, 6]), &mut c).unwrap_err();
        assert_eq!(err.to_string(), "[bool; 2] expected but got Lua user data of [i32; 3]");
    }

    #[test]
    fn map_map_is_best_effort() {
        let mut t = Table::new();
        t.set("abc", 123);
        t.set(222, 222);
        t.set(333, "333");
        t.set(444, 444.4);
        let mut output: HashMap<i32, i32> = HashMap::new();
        map_ok(&t.into(), &mut output);
        assert_eq!(output.len(), 2);
        assert_eq!(output[&222], 222);
        assert_eq!(output[&444], 444);

        map_ok(&Table::from_array([1, 2, 3]).into(), &mut output);
        assert_eq!(output, HashMap::from([(1, 1), (2, 2), (3, 3)]));

        let err = crate::map(&Value::from(123), &mut output).unwrap_err();
        assert_eq!(err.to_string(), "HashMap<i32, i32> expected but got Lua number");

        map_ok(&Value::Opaque(Opaque::nil()), &mut output);
        assert!(output.is_empty());
        let err = crate::map(&ud(123_i32), &mut output).unwrap_err();
        assert_eq!(err.to_string(), "HashMap<i32, i32> expected but got Lua user data of i32");
        map_ok(&ud(HashMap::from([(1, 1)])), &mut output);
        assert_eq!(output, HashMap::from([(1, 1)]));
    }

    #[test]
    fn map_map_starts_clean() {
        let mut output: BTreeMap<String, String> = BTreeMap::new();
        output.insert("stale".to_string(), "x".to_string());
        let t: Table = [("a", "1"), ("b", "2")].into_iter().collect();
        map_ok(&t.into(), &mut output);
        assert_eq!(output.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn map_map_drops_exactly_the_bad_pairs() {
        for (good, bad) in [(0, 0), (3, 0), (0, 4), (5, 2)] {
            let mut t = Table::new();
            for i in 0..good {
                t.set(format!("g{i}"), i);
            }
            for i in 0..bad {
                t.set(format!("b{i}"), true);
            }
            let mut output: HashMap<String, u32> = HashMap::new();
            map_ok(&t.into(), &mut output);
            assert_eq!(output.len(), good, "good={good} bad={bad}");
        }
    }

    #[test]
    fn map_interface() {
        let mut output = AnyValue::Bool(true);
        map_ok(&Value::Nil, &mut output);
        assert!(output.is_nil());
        map_ok(&Value::from(10), &mut output);
        assert_eq!(output, AnyValue::Number(10.0));
        map_ok(&ud(3_u8), &mut output);
        assert_eq!(output.as_opaque().and_then(|o| o.downcast_ref::<u8>()), Some(&3));
        map_ok(&Value::Opaque(Opaque::nil()), &mut output);
        assert!(output.is_nil());
        map_ok(&Table::from_array(["a"]).into(), &mut output);
        assert_eq!(output, AnyValue::Array(vec![AnyValue::String("a".to_string())]));
    }

    #[test]
    fn unsupported_categories() {
        let mut f = FunctionRef::detached();
        let err = crate::map(&Value::Function(FunctionRef::new("g", ())), &mut f).unwrap_err();
        assert!(matches!(err, MapError::UnsupportedType(TypeDesc::Unsupported("FunctionRef"))));
        assert_eq!(err.to_string(), "unsupported type: FunctionRef");
        map_ok(&Value::Opaque(Opaque::nil()), &mut f);
        assert_eq!(f.name(), "nil");

        let mut c = ChannelRef::detached();
        let err = crate::map(&Value::from(1), &mut c).unwrap_err();
        assert_eq!(err.to_string(), "unsupported type: ChannelRef");

        let mut ch = 'a';
        let err = crate::map(&Value::from("x"), &mut ch).unwrap_err();
        assert_eq!(err.to_string(), "unsupported type: char");
        map_ok(&Value::Nil, &mut ch);
        assert_eq!(ch, '\0');
    }

    #[test]
    fn pointer_entry_point() {
        let mapper = Mapper::new();

        let mut n = 5_i32;
        let err = mapper.map_pointer(&Value::from(1), &mut n).unwrap_err();
        assert_eq!(err.to_string(), "output must be a pointer but got i32");

        let mut nil: Option<i32> = None;
        let err = mapper.map_pointer(&Value::Bool(true), &mut nil).unwrap_err();
        assert!(matches!(err, MapError::OutputValueIsNil));
        assert_eq!(err.to_string(), "output value is nil");
        mapper.map_pointer(&Value::Nil, &mut nil).unwrap();
        assert!(nil.is_none());

        let mut p = Some(0_i32);
        mapper.map_pointer(&Value::from(42), &mut p).unwrap();
        assert_eq!(p, Some(42));
    }

    #[test]
    fn type_error_carries_structure() {
        let mut out = 0_i16;
        let err = crate::map(&ud(vec![1_u8]), &mut out).unwrap_err();
        let MapError::Type(te) = &err else {
            panic!("expected type error, got {err:?}");
        };
        assert_eq!(te.expected(), &TypeDesc::I16);
        assert_eq!(te.found(), crate::ValueType::UserData);
        assert_eq!(te.opaque_detail(), Some(&OpaqueDetail::Of("Vec<u8>".to_string())));
    }

    fn map_ok<T: Target>(value: &Value, out: &mut T) {
        if let Err(e) = crate::map(value, out) {
            panic!("unexpected error: {e}");
        }
    }
}
