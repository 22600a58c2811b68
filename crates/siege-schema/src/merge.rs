//! Least-upper-bound merge over the schema lattice.
//!
//! Same shapes collapse pointwise; different shapes meet in a union with one
//! branch per shape. Merge depth is bounded by the shallower input, so the
//! recursion terminates. The operation is commutative and idempotent.

use crate::schema::{ArraySchema, FieldSchema, ObjectSchema, Schema, UnionSchema, ValueSchema};

/// Merge two optional schemas; absence is the lattice bottom.
pub fn merge(a: Option<Schema>, b: Option<Schema>) -> Option<Schema> {
    match (a, b) {
        (None, None) => None,
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (Some(a), Some(b)) => Some(merge_schemas(a, b)),
    }
}

/// Merge two schemas into the least upper bound of both.
pub fn merge_schemas(a: Schema, b: Schema) -> Schema {
    match (a, b) {
        (Schema::Object(a), Schema::Object(b)) => Schema::Object(merge_objects(a, b)),
        (Schema::Array(a), Schema::Array(b)) => Schema::Array(merge_arrays(a, b)),
        (Schema::Value(a), Schema::Value(b)) => Schema::Value(merge_values(a, b)),
        (a, b) => Schema::Union(merge_unions(a.into_union(), b.into_union())),
    }
}

fn merge_objects(a: ObjectSchema, b: ObjectSchema) -> ObjectSchema {
    // Both field lists are sorted by key; merge-join them. A field present in
    // only one side becomes optional.
    let mut fields = Vec::new();
    let mut left = a.into_fields().into_iter();
    let mut right = b.into_fields().into_iter();
    let mut l = left.next();
    let mut r = right.next();

    loop {
        match (l.take(), r.take()) {
            (None, None) => break,
            (Some(lf), None) => {
                fields.push(optional(lf));
                l = left.next();
            }
            (None, Some(rf)) => {
                fields.push(optional(rf));
                r = right.next();
            }
            (Some(lf), Some(rf)) => match lf.key.cmp(&rf.key) {
                std::cmp::Ordering::Less => {
                    fields.push(optional(lf));
                    l = left.next();
                    r = Some(rf);
                }
                std::cmp::Ordering::Greater => {
                    fields.push(optional(rf));
                    l = Some(lf);
                    r = right.next();
                }
                std::cmp::Ordering::Equal => {
                    fields.push(FieldSchema {
                        key: lf.key,
                        value: merge_schemas(lf.value, rf.value),
                        required: lf.required && rf.required,
                    });
                    l = left.next();
                    r = right.next();
                }
            },
        }
    }

    ObjectSchema::new(fields)
}

fn optional(field: FieldSchema) -> FieldSchema {
    FieldSchema {
        required: false,
        ..field
    }
}

fn merge_arrays(a: ArraySchema, b: ArraySchema) -> ArraySchema {
    ArraySchema {
        element: merge(a.element.map(|e| *e), b.element.map(|e| *e)).map(Box::new),
    }
}

fn merge_values(a: ValueSchema, b: ValueSchema) -> ValueSchema {
    ValueSchema {
        maybe_string: a.maybe_string || b.maybe_string,
        maybe_number: a.maybe_number || b.maybe_number,
        maybe_bool: a.maybe_bool || b.maybe_bool,
        maybe_null: a.maybe_null || b.maybe_null,
    }
}

fn merge_unions(a: UnionSchema, b: UnionSchema) -> UnionSchema {
    UnionSchema {
        object: merge_branch(a.object, b.object, merge_objects),
        array: merge_branch(a.array, b.array, merge_arrays),
        value: merge_branch(a.value, b.value, merge_values),
    }
}

fn merge_branch<T>(a: Option<T>, b: Option<T>, f: impl FnOnce(T, T) -> T) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}
