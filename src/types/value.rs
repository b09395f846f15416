use std::cmp::Ordering;
use std::fmt;

use crate::common::{TypeError, TypeErrorKind};

use super::TypeId;

type TypeResult<T> = std::result::Result<T, TypeError>;

/// A typed value. Operations dispatch on the variant pair with `match`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value - can be any type
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Decimal(f64),
    Varchar(String),
    /// Microseconds since Unix epoch
    Timestamp(u64),
}

/// Numeric view used by arithmetic and comparison.
#[derive(Clone, Copy)]
enum Numeric {
    Int(i64),
    Dec(f64),
}

impl Value {
    /// Returns the type of this value, or None for null.
    /// A varchar reports its own length as the maximum.
    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(TypeId::Boolean),
            Value::TinyInt(_) => Some(TypeId::TinyInt),
            Value::SmallInt(_) => Some(TypeId::SmallInt),
            Value::Integer(_) => Some(TypeId::Integer),
            Value::BigInt(_) => Some(TypeId::BigInt),
            Value::Decimal(_) => Some(TypeId::Decimal),
            Value::Varchar(s) => Some(TypeId::Varchar(s.len().min(u16::MAX as usize) as u16)),
            Value::Timestamp(_) => Some(TypeId::Timestamp),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn numeric(&self) -> Option<Numeric> {
        match self {
            Value::TinyInt(v) => Some(Numeric::Int(*v as i64)),
            Value::SmallInt(v) => Some(Numeric::Int(*v as i64)),
            Value::Integer(v) => Some(Numeric::Int(*v as i64)),
            Value::BigInt(v) => Some(Numeric::Int(*v)),
            Value::Decimal(v) => Some(Numeric::Dec(*v)),
            _ => None,
        }
    }

    /// Compares two non-null values of coercible types.
    pub fn compare(&self, other: &Value) -> TypeResult<Ordering> {
        if self.is_null() || other.is_null() {
            return Err(TypeError::new(
                TypeErrorKind::NotImplemented,
                "comparison with null",
            ));
        }

        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
            (Value::Varchar(a), Value::Varchar(b)) => Ok(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Ok(a.cmp(b)),
            _ => match (self.numeric(), other.numeric()) {
                (Some(Numeric::Int(a)), Some(Numeric::Int(b))) => Ok(a.cmp(&b)),
                (Some(a), Some(b)) => as_f64(a).partial_cmp(&as_f64(b)).ok_or_else(|| {
                    TypeError::new(TypeErrorKind::Decimal, "comparison with NaN")
                }),
                _ => Err(mismatch(self, other)),
            },
        }
    }

    /// Adds two numeric values. The result takes the wider operand type.
    pub fn add(&self, other: &Value) -> TypeResult<Value> {
        self.arithmetic(other, "add", i64::checked_add, |a, b| a + b)
    }

    pub fn subtract(&self, other: &Value) -> TypeResult<Value> {
        self.arithmetic(other, "subtract", i64::checked_sub, |a, b| a - b)
    }

    pub fn multiply(&self, other: &Value) -> TypeResult<Value> {
        self.arithmetic(other, "multiply", i64::checked_mul, |a, b| a * b)
    }

    pub fn divide(&self, other: &Value) -> TypeResult<Value> {
        match other.numeric() {
            Some(Numeric::Int(0)) => {
                return Err(TypeError::new(TypeErrorKind::DivideByZero, "division by zero"))
            }
            Some(Numeric::Dec(d)) if d == 0.0 => {
                return Err(TypeError::new(TypeErrorKind::DivideByZero, "division by zero"))
            }
            _ => {}
        }
        self.arithmetic(other, "divide", i64::checked_div, |a, b| a / b)
    }

    fn arithmetic(
        &self,
        other: &Value,
        op: &str,
        int_op: fn(i64, i64) -> Option<i64>,
        dec_op: fn(f64, f64) -> f64,
    ) -> TypeResult<Value> {
        if self.is_null() || other.is_null() {
            return Ok(Value::Null);
        }

        match (self.numeric(), other.numeric()) {
            (Some(Numeric::Int(a)), Some(Numeric::Int(b))) => {
                let result = int_op(a, b).ok_or_else(|| {
                    TypeError::new(
                        TypeErrorKind::OutOfRange,
                        format!("{op} of {a} and {b} overflows"),
                    )
                })?;
                integral_from_i64(result, wider_integral(self, other))
            }
            (Some(a), Some(b)) => Ok(Value::Decimal(dec_op(as_f64(a), as_f64(b)))),
            _ => Err(TypeError::new(
                TypeErrorKind::IncompatibleType,
                format!("cannot {op} {self} and {other}"),
            )),
        }
    }

    /// Converts this value to `target`, checking ranges.
    pub fn cast_as(&self, target: TypeId) -> TypeResult<Value> {
        match (self, target) {
            (Value::Null, _) => Ok(Value::Null),
            (Value::Boolean(_), TypeId::Boolean) | (Value::Timestamp(_), TypeId::Timestamp) => {
                Ok(self.clone())
            }
            (Value::Varchar(s), TypeId::Varchar(max_len)) => {
                if s.len() > max_len as usize {
                    return Err(TypeError::new(
                        TypeErrorKind::OutOfRange,
                        format!("string of {} bytes exceeds VARCHAR({max_len})", s.len()),
                    ));
                }
                Ok(self.clone())
            }
            (Value::Varchar(s), t) if t.is_integral() => {
                let parsed = s.trim().parse::<i64>().map_err(|_| {
                    TypeError::new(TypeErrorKind::Conversion, format!("'{s}' is not an integer"))
                })?;
                integral_from_i64(parsed, t)
            }
            (Value::Varchar(s), TypeId::Decimal) => s
                .trim()
                .parse::<f64>()
                .map(Value::Decimal)
                .map_err(|_| {
                    TypeError::new(TypeErrorKind::Conversion, format!("'{s}' is not a decimal"))
                }),
            _ => match (self.numeric(), target) {
                (Some(Numeric::Int(v)), t) if t.is_integral() => integral_from_i64(v, t),
                (Some(n), TypeId::Decimal) => Ok(Value::Decimal(as_f64(n))),
                (Some(Numeric::Dec(v)), t) if t.is_integral() => {
                    if !v.is_finite() || v < i64::MIN as f64 || v > i64::MAX as f64 {
                        return Err(TypeError::new(
                            TypeErrorKind::Decimal,
                            format!("{v} cannot be converted to {t}"),
                        ));
                    }
                    integral_from_i64(v.trunc() as i64, t)
                }
                (Some(_), TypeId::Varchar(max_len)) => {
                    Value::Varchar(self.to_string()).cast_as(TypeId::Varchar(max_len))
                }
                _ => Err(TypeError::new(
                    TypeErrorKind::IncompatibleType,
                    format!("cannot cast {self} to {target}"),
                )),
            },
        }
    }
}

fn as_f64(n: Numeric) -> f64 {
    match n {
        Numeric::Int(v) => v as f64,
        Numeric::Dec(v) => v,
    }
}

fn integral_rank(value: &Value) -> u8 {
    match value {
        Value::TinyInt(_) => 0,
        Value::SmallInt(_) => 1,
        Value::Integer(_) => 2,
        _ => 3,
    }
}

fn wider_integral(a: &Value, b: &Value) -> TypeId {
    match integral_rank(a).max(integral_rank(b)) {
        0 => TypeId::TinyInt,
        1 => TypeId::SmallInt,
        2 => TypeId::Integer,
        _ => TypeId::BigInt,
    }
}

fn integral_from_i64(v: i64, target: TypeId) -> TypeResult<Value> {
    let out_of_range =
        || TypeError::new(TypeErrorKind::OutOfRange, format!("{v} does not fit {target}"));
    match target {
        TypeId::TinyInt => i8::try_from(v).map(Value::TinyInt).map_err(|_| out_of_range()),
        TypeId::SmallInt => i16::try_from(v).map(Value::SmallInt).map_err(|_| out_of_range()),
        TypeId::Integer => i32::try_from(v).map(Value::Integer).map_err(|_| out_of_range()),
        TypeId::BigInt => Ok(Value::BigInt(v)),
        _ => Err(TypeError::new(
            TypeErrorKind::UnknownType,
            format!("{target} is not an integer type"),
        )),
    }
}

fn mismatch(a: &Value, b: &Value) -> TypeError {
    TypeError::new(
        TypeErrorKind::MismatchType,
        format!("cannot compare {a} with {b}"),
    )
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::Varchar(s) => write!(f, "'{}'", s),
            Value::Timestamp(v) => write!(f, "TIMESTAMP({})", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare() {
        assert_eq!(
            Value::Integer(3).compare(&Value::BigInt(10)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::Decimal(2.5).compare(&Value::TinyInt(2)).unwrap(),
            Ordering::Greater
        );
        assert_eq!(
            Value::Varchar("b".into())
                .compare(&Value::Varchar("a".into()))
                .unwrap(),
            Ordering::Greater
        );

        let err = Value::Boolean(true).compare(&Value::Integer(1)).unwrap_err();
        assert!(err.is(TypeErrorKind::MismatchType));
        let err = Value::Null.compare(&Value::Integer(1)).unwrap_err();
        assert!(err.is(TypeErrorKind::NotImplemented));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(
            Value::TinyInt(2).add(&Value::Integer(40)).unwrap(),
            Value::Integer(42)
        );
        assert_eq!(
            Value::Integer(7).divide(&Value::Integer(2)).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            Value::Decimal(1.5).multiply(&Value::Integer(2)).unwrap(),
            Value::Decimal(3.0)
        );
        assert_eq!(Value::Null.add(&Value::Integer(1)).unwrap(), Value::Null);
    }

    #[test]
    fn test_arithmetic_errors() {
        let err = Value::TinyInt(100).add(&Value::TinyInt(100)).unwrap_err();
        assert!(err.is(TypeErrorKind::OutOfRange));

        let err = Value::Integer(1).divide(&Value::Integer(0)).unwrap_err();
        assert!(err.is(TypeErrorKind::DivideByZero));

        let err = Value::BigInt(i64::MIN)
            .divide(&Value::BigInt(-1))
            .unwrap_err();
        assert!(err.is(TypeErrorKind::OutOfRange));

        let err = Value::Varchar("x".into())
            .subtract(&Value::Integer(1))
            .unwrap_err();
        assert!(err.is(TypeErrorKind::IncompatibleType));
    }

    #[test]
    fn test_cast() {
        assert_eq!(
            Value::BigInt(12).cast_as(TypeId::TinyInt).unwrap(),
            Value::TinyInt(12)
        );
        assert!(Value::Integer(300)
            .cast_as(TypeId::TinyInt)
            .unwrap_err()
            .is(TypeErrorKind::OutOfRange));
        assert_eq!(
            Value::Varchar(" 17 ".into()).cast_as(TypeId::Integer).unwrap(),
            Value::Integer(17)
        );
        assert!(Value::Varchar("abc".into())
            .cast_as(TypeId::Integer)
            .unwrap_err()
            .is(TypeErrorKind::Conversion));
        assert!(Value::Decimal(f64::NAN)
            .cast_as(TypeId::BigInt)
            .unwrap_err()
            .is(TypeErrorKind::Decimal));
        assert_eq!(
            Value::Integer(5).cast_as(TypeId::Varchar(4)).unwrap(),
            Value::Varchar("5".into())
        );
        assert!(Value::Boolean(true)
            .cast_as(TypeId::Timestamp)
            .unwrap_err()
            .is(TypeErrorKind::IncompatibleType));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Varchar("hi".into()).to_string(), "'hi'");
    }
}
