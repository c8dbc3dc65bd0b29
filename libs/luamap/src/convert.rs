//! Primitive converters. Each returns `None` when the dynamic shape does not
//! belong to the target's family; the dispatcher turns that into a
//! `TypeError`. Opaque sources never reach these, they go through the bridge.
//!
//! Numbers convert with `as`: floats truncate toward zero when the target is
//! an integer, saturate at the target's bounds, and NaN becomes 0.

use crate::value::Value;

pub(crate) fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

pub(crate) fn to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        _ => None,
    }
}

macro_rules! numeric {
    ($($name:ident => $t:ty),* $(,)?) => {
        $(
            pub(crate) fn $name(value: &Value) -> Option<$t> {
                number(value).map(|n| n as $t)
            }
        )*
    };
}

numeric! {
    to_i8 => i8,
    to_i16 => i16,
    to_i32 => i32,
    to_i64 => i64,
    to_isize => isize,
    to_u8 => u8,
    to_u16 => u16,
    to_u32 => u32,
    to_u64 => u64,
    to_usize => usize,
    to_f32 => f32,
    to_f64 => f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_to_int_truncates() {
        assert_eq!(to_i32(&Value::Number(444.4)), Some(444));
        assert_eq!(to_i32(&Value::Number(-2.9)), Some(-2));
        assert_eq!(to_u8(&Value::Number(5.5)), Some(5));
    }

    #[test]
    fn out_of_range_saturates() {
        assert_eq!(to_i8(&Value::Number(1000.0)), Some(i8::MAX));
        assert_eq!(to_u32(&Value::Number(-1.0)), Some(0));
        assert_eq!(to_i64(&Value::Number(f64::NAN)), Some(0));
    }

    #[test]
    fn families_do_not_mix() {
        assert_eq!(to_bool(&Value::Number(1.0)), None);
        assert_eq!(to_i32(&Value::Bool(true)), None);
        assert_eq!(to_i32(&Value::from("31")), None);
        assert_eq!(to_string(&Value::Number(31.0)), None);
        assert_eq!(to_f32(&Value::Number(1.5)), Some(1.5));
    }
}
