use std::fmt;

/// The value types a key column can have.
/// Every type has a fixed width inside an encoded key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeId {
    /// Boolean type: 1 byte (0 = false, 1 = true)
    Boolean,

    /// 8-bit signed integer: 1 byte
    TinyInt,

    /// 16-bit signed integer: 2 bytes, little-endian
    SmallInt,

    /// 32-bit signed integer: 4 bytes, little-endian
    Integer,

    /// 64-bit signed integer: 8 bytes, little-endian
    BigInt,

    /// 64-bit floating point decimal: 8 bytes, IEEE 754
    Decimal,

    /// Character string of at most n bytes.
    /// Encoded as length (2 bytes) + data, zero-padded to n.
    Varchar(u16),

    /// Timestamp: 8 bytes, microseconds since Unix epoch
    Timestamp,
}

impl TypeId {
    /// Returns the number of bytes this type occupies in an encoded key.
    pub fn encoded_size(&self) -> usize {
        match self {
            TypeId::Boolean | TypeId::TinyInt => 1,
            TypeId::SmallInt => 2,
            TypeId::Integer => 4,
            TypeId::BigInt | TypeId::Decimal | TypeId::Timestamp => 8,
            TypeId::Varchar(n) => 2 + *n as usize,
        }
    }

    /// Returns true for the integer types.
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            TypeId::TinyInt | TypeId::SmallInt | TypeId::Integer | TypeId::BigInt
        )
    }

    /// Returns true if values of this type can be compared with values of `other`.
    pub fn is_coercible_to(&self, other: &TypeId) -> bool {
        match (self, other) {
            (a, b) if a == b => true,
            (TypeId::Varchar(_), TypeId::Varchar(_)) => true,
            (a, b) => {
                (a.is_integral() || *a == TypeId::Decimal)
                    && (b.is_integral() || *b == TypeId::Decimal)
            }
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeId::Boolean => write!(f, "BOOLEAN"),
            TypeId::TinyInt => write!(f, "TINYINT"),
            TypeId::SmallInt => write!(f, "SMALLINT"),
            TypeId::Integer => write!(f, "INTEGER"),
            TypeId::BigInt => write!(f, "BIGINT"),
            TypeId::Decimal => write!(f, "DECIMAL"),
            TypeId::Varchar(n) => write!(f, "VARCHAR({})", n),
            TypeId::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}
