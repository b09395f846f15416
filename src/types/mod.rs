//! Typed values and the key encoder used by indexes.

mod key_schema;
mod type_id;
mod value;

pub use key_schema::KeySchema;
pub use type_id::TypeId;
pub use value::Value;
