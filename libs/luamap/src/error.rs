use std::fmt;

use crate::opaque::Opaque;
use crate::target::TypeDesc;
use crate::value::{Value, ValueType};

/// Error returned by every mapping entry point.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MapError {
    #[error("output must be a pointer but got {0}")]
    NotAPointer(TypeDesc),

    #[error("output value is nil")]
    OutputValueIsNil,

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("unsupported type: {0}")]
    UnsupportedType(TypeDesc),

    /// Failure inside a struct field or a sequence element.
    #[error("{path}: {error}")]
    At {
        path: FieldPath,
        #[source]
        error: Box<MapError>,
    },
}

impl MapError {
    /// Prefix the error with a struct field name.
    pub fn in_field(self, field: &'static str) -> Self {
        self.prepend(PathSegment::Field(field))
    }

    /// Prefix the error with a 0-based element index.
    pub fn at_index(self, index: usize) -> Self {
        self.prepend(PathSegment::Index(index))
    }

    fn prepend(self, segment: PathSegment) -> Self {
        match self {
            MapError::At { mut path, error } => {
                path.0.insert(0, segment);
                MapError::At { path, error }
            }
            other => MapError::At {
                path: FieldPath(vec![segment]),
                error: Box::new(other),
            },
        }
    }

    /// The innermost error, with any path annotation removed.
    pub fn root(&self) -> &MapError {
        match self {
            MapError::At { error, .. } => error.root(),
            other => other,
        }
    }

    /// Where the error happened, if it happened below the top level.
    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            MapError::At { path, .. } => Some(path),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(&'static str),
    Index(usize),
}

/// Location of a failure, rendered as `Role[0].Name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i == 0 => f.write_str(name)?,
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// What an opaque source wrapped, recorded at the time of the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpaqueDetail {
    Nil,
    Of(String),
}

/// Mismatch between a dynamic source shape and a static target category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{expected} expected but got Lua {}", found_text(.found, .opaque))]
pub struct TypeError {
    expected: TypeDesc,
    found: ValueType,
    /// Set when `found` is `UserData`.
    opaque: Option<OpaqueDetail>,
}

impl TypeError {
    pub fn new(expected: TypeDesc, value: &Value) -> Self {
        match value {
            Value::Opaque(obj) => Self::opaque(expected, obj),
            other => Self {
                expected,
                found: other.type_tag(),
                opaque: None,
            },
        }
    }

    pub fn opaque(expected: TypeDesc, obj: &Opaque) -> Self {
        let detail = if obj.is_nil() {
            OpaqueDetail::Nil
        } else {
            OpaqueDetail::Of(obj.type_name())
        };
        Self {
            expected,
            found: ValueType::UserData,
            opaque: Some(detail),
        }
    }

    pub fn expected(&self) -> &TypeDesc {
        &self.expected
    }

    pub fn found(&self) -> ValueType {
        self.found
    }

    pub fn opaque_detail(&self) -> Option<&OpaqueDetail> {
        self.opaque.as_ref()
    }
}

fn found_text(found: &ValueType, opaque: &Option<OpaqueDetail>) -> String {
    match opaque {
        None => found.to_string(),
        Some(OpaqueDetail::Nil) => "user data of nil".to_string(),
        Some(OpaqueDetail::Of(ty)) => format!("user data of {ty}"),
    }
}

/// Failure loading a [`MapperConfig`](crate::MapperConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Parse(String),

    #[error("config error: {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}
