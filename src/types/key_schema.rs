use crate::common::{Result, TypeError, TypeErrorKind};

use super::{TypeId, Value};

/// Describes the columns of an index key and turns key values into the
/// fixed-size byte strings the hash index stores.
///
/// Each column is encoded little-endian at its own fixed width, in column
/// order; varchars carry a 2-byte length and are zero-padded to their
/// declared maximum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    types: Vec<TypeId>,
    key_size: usize,
}

impl KeySchema {
    pub fn new(types: Vec<TypeId>) -> Self {
        let key_size = types.iter().map(TypeId::encoded_size).sum();
        Self { types, key_size }
    }

    /// Returns the column types.
    pub fn types(&self) -> &[TypeId] {
        &self.types
    }

    /// Number of bytes in every encoded key.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Encodes one key. The output is always exactly `key_size` bytes.
    pub fn encode(&self, values: &[Value]) -> Result<Vec<u8>> {
        if values.len() != self.types.len() {
            return Err(TypeError::new(
                TypeErrorKind::MismatchType,
                format!(
                    "key has {} columns but {} values were given",
                    self.types.len(),
                    values.len()
                ),
            )
            .into());
        }

        let mut key = Vec::with_capacity(self.key_size);
        for (value, type_id) in values.iter().zip(&self.types) {
            encode_column(value, *type_id, &mut key)?;
        }
        debug_assert_eq!(key.len(), self.key_size);
        Ok(key)
    }

    /// Decodes a key produced by [`KeySchema::encode`].
    pub fn decode(&self, key: &[u8]) -> Result<Vec<Value>> {
        if key.len() != self.key_size {
            return Err(TypeError::new(
                TypeErrorKind::OutOfRange,
                format!("expected {} key bytes, got {}", self.key_size, key.len()),
            )
            .into());
        }

        let mut values = Vec::with_capacity(self.types.len());
        let mut offset = 0;
        for type_id in &self.types {
            let width = type_id.encoded_size();
            values.push(decode_column(&key[offset..offset + width], *type_id)?);
            offset += width;
        }
        Ok(values)
    }
}

fn encode_column(value: &Value, type_id: TypeId, out: &mut Vec<u8>) -> Result<()> {
    match (value, type_id) {
        (Value::Null, _) => {
            return Err(TypeError::new(
                TypeErrorKind::NotImplemented,
                "null values cannot be used as index keys",
            )
            .into())
        }
        (Value::Boolean(b), TypeId::Boolean) => out.push(u8::from(*b)),
        (Value::TinyInt(v), TypeId::TinyInt) => out.extend_from_slice(&v.to_le_bytes()),
        (Value::SmallInt(v), TypeId::SmallInt) => out.extend_from_slice(&v.to_le_bytes()),
        (Value::Integer(v), TypeId::Integer) => out.extend_from_slice(&v.to_le_bytes()),
        (Value::BigInt(v), TypeId::BigInt) => out.extend_from_slice(&v.to_le_bytes()),
        (Value::Decimal(v), TypeId::Decimal) => out.extend_from_slice(&v.to_le_bytes()),
        (Value::Timestamp(v), TypeId::Timestamp) => out.extend_from_slice(&v.to_le_bytes()),
        (Value::Varchar(s), TypeId::Varchar(max_len)) => {
            let bytes = s.as_bytes();
            if bytes.len() > max_len as usize {
                return Err(TypeError::new(
                    TypeErrorKind::OutOfRange,
                    format!("string of {} bytes exceeds VARCHAR({max_len})", bytes.len()),
                )
                .into());
            }
            out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
            out.extend_from_slice(bytes);
            out.resize(out.len() + max_len as usize - bytes.len(), 0);
        }
        _ => {
            return Err(TypeError::new(
                TypeErrorKind::MismatchType,
                format!("value {value} does not match key column type {type_id}"),
            )
            .into())
        }
    }
    Ok(())
}

fn decode_column(bytes: &[u8], type_id: TypeId) -> Result<Value> {
    let fixed = |n: usize| -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[..n].copy_from_slice(&bytes[..n]);
        buf
    };

    let value = match type_id {
        TypeId::Boolean => Value::Boolean(bytes[0] != 0),
        TypeId::TinyInt => Value::TinyInt(bytes[0] as i8),
        TypeId::SmallInt => Value::SmallInt(i16::from_le_bytes([bytes[0], bytes[1]])),
        TypeId::Integer => {
            Value::Integer(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        TypeId::BigInt => Value::BigInt(i64::from_le_bytes(fixed(8))),
        TypeId::Decimal => Value::Decimal(f64::from_le_bytes(fixed(8))),
        TypeId::Timestamp => Value::Timestamp(u64::from_le_bytes(fixed(8))),
        TypeId::Varchar(max_len) => {
            let len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
            if len > max_len as usize {
                return Err(TypeError::new(
                    TypeErrorKind::OutOfRange,
                    format!("stored length {len} exceeds VARCHAR({max_len})"),
                )
                .into());
            }
            let s = std::str::from_utf8(&bytes[2..2 + len]).map_err(|e| {
                TypeError::new(TypeErrorKind::Conversion, format!("invalid utf-8: {e}"))
            })?;
            Value::Varchar(s.to_string())
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CairnError;

    fn type_kind(err: CairnError) -> TypeErrorKind {
        match err {
            CairnError::Type(e) => e.kind,
            other => panic!("expected a type error, got {other}"),
        }
    }

    #[test]
    fn test_key_size() {
        let schema = KeySchema::new(vec![TypeId::Integer, TypeId::Varchar(10), TypeId::Boolean]);
        assert_eq!(schema.key_size(), 4 + 12 + 1);
        assert_eq!(KeySchema::new(vec![TypeId::Integer]).key_size(), 4);
    }

    #[test]
    fn test_encode_layout() {
        let schema = KeySchema::new(vec![TypeId::Integer, TypeId::Varchar(4)]);
        let key = schema
            .encode(&[Value::Integer(7), Value::Varchar("ab".into())])
            .unwrap();
        assert_eq!(key, vec![7, 0, 0, 0, 2, 0, b'a', b'b', 0, 0]);
        assert_eq!(
            schema.decode(&key).unwrap(),
            vec![Value::Integer(7), Value::Varchar("ab".into())]
        );
    }

    #[test]
    fn test_equal_values_encode_identically() {
        let schema = KeySchema::new(vec![TypeId::BigInt, TypeId::Varchar(8)]);
        let a = schema
            .encode(&[Value::BigInt(-5), Value::Varchar("key".into())])
            .unwrap();
        let b = schema
            .encode(&[Value::BigInt(-5), Value::Varchar("key".into())])
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), schema.key_size());
    }

    #[test]
    fn test_encode_errors() {
        let schema = KeySchema::new(vec![TypeId::Integer, TypeId::Varchar(2)]);

        let err = schema.encode(&[Value::Integer(1)]).unwrap_err();
        assert_eq!(type_kind(err), TypeErrorKind::MismatchType);

        let err = schema
            .encode(&[Value::BigInt(1), Value::Varchar("a".into())])
            .unwrap_err();
        assert_eq!(type_kind(err), TypeErrorKind::MismatchType);

        let err = schema
            .encode(&[Value::Integer(1), Value::Varchar("abc".into())])
            .unwrap_err();
        assert_eq!(type_kind(err), TypeErrorKind::OutOfRange);

        let err = schema
            .encode(&[Value::Null, Value::Varchar("a".into())])
            .unwrap_err();
        assert_eq!(type_kind(err), TypeErrorKind::NotImplemented);
    }

    #[test]
    fn test_decode_wrong_length() {
        let schema = KeySchema::new(vec![TypeId::Integer]);
        let err = schema.decode(&[1, 2]).unwrap_err();
        assert_eq!(type_kind(err), TypeErrorKind::OutOfRange);
    }
}
