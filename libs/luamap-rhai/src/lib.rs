//! rhai as a value producer for `luamap`.
//!
//! Script results (`rhai::Dynamic`) are translated into the runtime value
//! model and can then be mapped into host types:
//!
//! ```ignore
//! let engine = rhai::Engine::new();
//! let mut person = Person::zero();
//! Converter::new().eval_into(&engine, r#"#{ name: "Michel" }"#, &Mapper::new(), &mut person)?;
//! ```

use luamap::{FunctionRef, MapError, Mapper, Opaque, Table, Target, Value};
use rhai::{Array, Blob, Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, Map, FLOAT, INT};

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("script error: {0}")]
    Eval(#[from] Box<EvalAltResult>),

    #[error(transparent)]
    Map(#[from] MapError),
}

type Extractor = fn(&Dynamic) -> Option<Opaque>;

fn extract<T: Clone + Send + Sync + 'static>(dynamic: &Dynamic) -> Option<Opaque> {
    if dynamic.is::<T>() {
        dynamic.clone().try_cast::<T>().map(Opaque::new)
    } else {
        None
    }
}

/// Translates `rhai::Dynamic` into [`Value`].
///
/// | rhai              | value                              |
/// |-------------------|------------------------------------|
/// | `()`              | `Nil`                              |
/// | `bool`            | `Bool`                             |
/// | `INT`, `FLOAT`    | `Number`                           |
/// | `char`, string    | `String`                           |
/// | array             | table, elements at `1..=len`       |
/// | object map        | table keyed by strings             |
/// | function pointer  | `Function`, named after the target |
/// | blob              | opaque `Vec<u8>`                   |
/// | registered type   | opaque of that type                |
/// | anything else     | opaque `Dynamic`                   |
#[derive(Default)]
pub struct Converter {
    extractors: Vec<Extractor>,
}

impl Converter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unwrap custom values of type `T` into opaques of `T`, so they can be
    /// bridged into `T` targets.
    pub fn register<T: Clone + Send + Sync + 'static>(&mut self) -> &mut Self {
        self.extractors.push(extract::<T>);
        self
    }

    pub fn convert(&self, dynamic: &Dynamic) -> Value {
        let dynamic = dynamic.flatten_clone();

        if dynamic.is_unit() {
            return Value::Nil;
        }
        if let Some(b) = dynamic.clone().try_cast::<bool>() {
            return Value::Bool(b);
        }
        if let Some(n) = dynamic.clone().try_cast::<INT>() {
            return Value::Number(n as f64);
        }
        if let Some(n) = dynamic.clone().try_cast::<FLOAT>() {
            return Value::Number(n);
        }
        if let Some(c) = dynamic.clone().try_cast::<char>() {
            return Value::String(c.to_string());
        }
        if let Some(s) = dynamic.clone().try_cast::<ImmutableString>() {
            return Value::String(s.to_string());
        }
        if let Some(items) = dynamic.clone().try_cast::<Array>() {
            return self.convert_array(items).into();
        }
        if let Some(map) = dynamic.clone().try_cast::<Map>() {
            return self.convert_map(map).into();
        }
        if let Some(fn_ptr) = dynamic.clone().try_cast::<FnPtr>() {
            return Value::Function(FunctionRef::new(fn_ptr.fn_name(), dynamic));
        }
        if let Some(blob) = dynamic.clone().try_cast::<Blob>() {
            return Value::Opaque(Opaque::new(blob));
        }

        if let Some(obj) = self.extractors.iter().find_map(|extract| extract(&dynamic)) {
            return Value::Opaque(obj);
        }

        tracing::debug!(
            type_name = dynamic.type_name(),
            "unregistered script value, passing through as opaque"
        );
        Value::Opaque(Opaque::new(dynamic))
    }

    fn convert_array(&self, items: Array) -> Table {
        let mut table = Table::new();
        for (i, item) in items.iter().enumerate() {
            table.set(i + 1, self.convert(item));
        }
        table
    }

    fn convert_map(&self, map: Map) -> Table {
        let mut table = Table::new();
        for (key, item) in &map {
            table.set(key.as_str(), self.convert(item));
        }
        table
    }

    /// Evaluate `script` and convert its result.
    pub fn eval(&self, engine: &Engine, script: &str) -> Result<Value, ScriptError> {
        let result = engine.eval::<Dynamic>(script)?;
        Ok(self.convert(&result))
    }

    /// Evaluate `script` and map its result into `output`.
    pub fn eval_into<T: Target>(
        &self,
        engine: &Engine,
        script: &str,
        mapper: &Mapper,
        output: &mut T,
    ) -> Result<(), ScriptError> {
        let value = self.eval(engine, script)?;
        mapper.map(&value, output)?;
        Ok(())
    }
}
