//! Structural JSON schemas.
//!
//! A schema summarizes every body observed at an endpoint so far. Samples
//! start precise (every field required, every value a single primitive kind)
//! and widen as they merge: fields turn optional, primitive kinds accumulate
//! into the [`ValueSchema`] bitset, and differently shaped samples meet in a
//! [`UnionSchema`] with at most one branch per shape.

/// A structural description of a JSON value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schema {
    Object(ObjectSchema),
    Array(ArraySchema),
    Value(ValueSchema),
    Union(UnionSchema),
}

/// An object shape. Fields are unique by key and kept sorted by key, which
/// makes merging deterministic and serialization canonical.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectSchema {
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub key: String,
    pub value: Schema,
    pub required: bool,
}

impl ObjectSchema {
    /// Build an object schema, sorting fields by key. Later duplicates win;
    /// JSON objects with repeated keys behave the same way in most parsers.
    pub fn new(mut fields: Vec<FieldSchema>) -> Self {
        fields.sort_by(|a, b| a.key.cmp(&b.key));
        fields.dedup_by(|b, a| {
            if a.key == b.key {
                std::mem::swap(a, b);
                true
            } else {
                false
            }
        });
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub(crate) fn into_fields(self) -> Vec<FieldSchema> {
        self.fields
    }
}

/// An array shape. `element` is `None` only for arrays never seen non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArraySchema {
    pub element: Option<Box<Schema>>,
}

/// Primitive kinds observed at one position, as a bitset. At least one flag
/// is set in any schema produced by inference or merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValueSchema {
    pub maybe_string: bool,
    pub maybe_number: bool,
    pub maybe_bool: bool,
    pub maybe_null: bool,
}

impl ValueSchema {
    pub fn string() -> Self {
        Self {
            maybe_string: true,
            ..Self::default()
        }
    }

    pub fn number() -> Self {
        Self {
            maybe_number: true,
            ..Self::default()
        }
    }

    pub fn boolean() -> Self {
        Self {
            maybe_bool: true,
            ..Self::default()
        }
    }

    pub fn null() -> Self {
        Self {
            maybe_null: true,
            ..Self::default()
        }
    }
}

/// Shapes that met at the same position: at most one branch per shape, at
/// least two branches populated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnionSchema {
    pub object: Option<ObjectSchema>,
    pub array: Option<ArraySchema>,
    pub value: Option<ValueSchema>,
}

impl Schema {
    /// Lift any schema into union form.
    pub(crate) fn into_union(self) -> UnionSchema {
        match self {
            Schema::Object(o) => UnionSchema {
                object: Some(o),
                ..UnionSchema::default()
            },
            Schema::Array(a) => UnionSchema {
                array: Some(a),
                ..UnionSchema::default()
            },
            Schema::Value(v) => UnionSchema {
                value: Some(v),
                ..UnionSchema::default()
            },
            Schema::Union(u) => u,
        }
    }
}
