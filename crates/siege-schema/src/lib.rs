mod infer;
mod merge;
mod openapi;
mod schema;

pub use infer::{infer, infer_bytes};
pub use merge::{merge, merge_schemas};
pub use openapi::{operation_value, paths_fragment, schema_value, OperationParts};
pub use schema::{ArraySchema, FieldSchema, ObjectSchema, Schema, UnionSchema, ValueSchema};
