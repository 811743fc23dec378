//! SQL type descriptors and typed constants
//!
//! A [`Constant`] is the leaf value the code generator materializes. Its
//! runtime representation is fully determined by its [`TypeInfo`] and the
//! encoding it is generated with:
//!
//! - numeric, boolean and temporal types use their integer/floating storage
//!   width, with `MIN` of that width as the null sentinel
//! - unencoded strings become a (start, pointer, length) triple
//! - dictionary-encoded strings become a 32-bit id

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Null sentinel for dictionary-encoded string ids
pub const NULL_DICT_ID: i32 = i32::MIN;

/// Null sentinel for FLOAT values
pub const NULL_FLOAT: f32 = f32::MIN_POSITIVE;

/// Null sentinel for DOUBLE values
pub const NULL_DOUBLE: f64 = f64::MIN_POSITIVE;

/// SQL type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    /// BOOLEAN
    Boolean,
    /// SMALLINT (16-bit)
    SmallInt,
    /// INTEGER (32-bit)
    Int,
    /// BIGINT (64-bit)
    BigInt,
    /// FLOAT (32-bit)
    Float,
    /// DOUBLE (64-bit)
    Double,
    /// DECIMAL(precision, scale), stored as a scaled integer
    Decimal,
    /// TIME
    Time,
    /// TIMESTAMP
    Timestamp,
    /// DATE
    Date,
    /// INTERVAL DAY TO SECOND
    IntervalDayTime,
    /// INTERVAL YEAR TO MONTH
    IntervalYearMonth,
    /// CHAR(n)
    Char,
    /// VARCHAR(n)
    Varchar,
    /// TEXT
    Text,
    /// Array of any element type
    Array,
    /// Geospatial point
    Point,
}

impl SqlType {
    /// Whether the type is a character string type
    pub fn is_string(self) -> bool {
        matches!(self, Self::Char | Self::Varchar | Self::Text)
    }

    /// Whether the type is an exact integer type
    pub fn is_integer(self) -> bool {
        matches!(self, Self::SmallInt | Self::Int | Self::BigInt)
    }

    /// Whether the type is a date/time type
    pub fn is_time(self) -> bool {
        matches!(self, Self::Time | Self::Timestamp | Self::Date)
    }

    /// Whether the type is an interval type
    pub fn is_time_interval(self) -> bool {
        matches!(self, Self::IntervalDayTime | Self::IntervalYearMonth)
    }

    /// Whether the type is a floating point type
    pub fn is_fp(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// SQL spelling of the type
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::SmallInt => "SMALLINT",
            Self::Int => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Decimal => "DECIMAL",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Date => "DATE",
            Self::IntervalDayTime => "INTERVAL_DAY_TIME",
            Self::IntervalYearMonth => "INTERVAL_YEAR_MONTH",
            Self::Char => "CHAR",
            Self::Varchar => "VARCHAR",
            Self::Text => "TEXT",
            Self::Array => "ARRAY",
            Self::Point => "POINT",
        }
    }
}

/// Encoding a value is materialized with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EncodingType {
    /// No special encoding; strings are carried as raw bytes
    #[default]
    None,
    /// Strings are carried as 32-bit ids into a string dictionary
    Dict,
}

/// Full type descriptor of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeInfo {
    /// SQL type tag
    pub sql_type: SqlType,
    /// NOT NULL constraint
    pub notnull: bool,
    /// Decimal precision (0 for other types)
    pub precision: u8,
    /// Decimal scale (0 for other types)
    pub scale: u8,
    /// Column compression
    pub compression: EncodingType,
    /// Compression parameter; the dictionary id for dictionary encoding
    pub comp_param: i32,
}

impl TypeInfo {
    /// Nullable, unencoded type
    pub fn new(sql_type: SqlType) -> Self {
        Self {
            sql_type,
            notnull: false,
            precision: 0,
            scale: 0,
            compression: EncodingType::None,
            comp_param: 0,
        }
    }

    /// DECIMAL(precision, scale)
    pub fn decimal(precision: u8, scale: u8) -> Self {
        Self {
            precision,
            scale,
            ..Self::new(SqlType::Decimal)
        }
    }

    /// Same type with a NOT NULL constraint
    pub fn not_null(mut self) -> Self {
        self.notnull = true;
        self
    }

    /// Same type, dictionary-encoded against `dict_id`
    pub fn with_dict(mut self, dict_id: i32) -> Self {
        self.compression = EncodingType::Dict;
        self.comp_param = dict_id;
        self
    }

    /// Whether the type is a decimal
    pub fn is_decimal(&self) -> bool {
        self.sql_type == SqlType::Decimal
    }

    /// Whether the type is a character string type
    pub fn is_string(&self) -> bool {
        self.sql_type.is_string()
    }

    /// Whether the type is a boolean
    pub fn is_boolean(&self) -> bool {
        self.sql_type == SqlType::Boolean
    }

    /// The integer type a decimal is stored as.
    ///
    /// Precision up to 4 digits fits SMALLINT, up to 9 fits INTEGER, the rest
    /// is BIGINT.
    pub fn decimal_storage_type(&self) -> SqlType {
        match self.precision {
            0..=4 => SqlType::SmallInt,
            5..=9 => SqlType::Int,
            _ => SqlType::BigInt,
        }
    }

    /// Type used for code generation: decimals collapse to their integer
    /// storage type, everything else is unchanged.
    pub fn codegen_type(&self) -> SqlType {
        if self.is_decimal() {
            self.decimal_storage_type()
        } else {
            self.sql_type
        }
    }

    /// Storage width in bits of a value of this type inside the literal
    /// buffer or a column.
    pub fn bit_width(&self) -> Result<u32> {
        let bits = match self.codegen_type() {
            SqlType::Boolean => 8,
            SqlType::SmallInt => 16,
            SqlType::Int => 32,
            SqlType::BigInt => 64,
            SqlType::Float => 32,
            SqlType::Double => 64,
            SqlType::Time
            | SqlType::Timestamp
            | SqlType::Date
            | SqlType::IntervalDayTime
            | SqlType::IntervalYearMonth => 64,
            // dictionary ids and packed string headers are both 32-bit
            SqlType::Char | SqlType::Varchar | SqlType::Text => 32,
            other => {
                return Err(Error::invariant(format!(
                    "no storage width for type {}",
                    other.name()
                )));
            }
        };
        Ok(bits)
    }

    /// Check that an integer payload fits this type's storage width
    pub fn fit_int_storage(&self, value: i64) -> Result<i64> {
        let fits = match self.codegen_type() {
            SqlType::SmallInt => i16::try_from(value).is_ok(),
            SqlType::Int => i32::try_from(value).is_ok(),
            _ => true,
        };
        if fits {
            Ok(value)
        } else {
            Err(Error::invariant(format!(
                "{value} does not fit {} storage",
                self.codegen_type().name()
            )))
        }
    }

    /// Integer null sentinel of this type
    pub fn inline_int_null_value(&self) -> Result<i64> {
        let value = match self.codegen_type() {
            SqlType::Boolean => i8::MIN as i64,
            SqlType::SmallInt => i16::MIN as i64,
            SqlType::Int => i32::MIN as i64,
            SqlType::BigInt
            | SqlType::Time
            | SqlType::Timestamp
            | SqlType::Date
            | SqlType::IntervalDayTime
            | SqlType::IntervalYearMonth => i64::MIN,
            SqlType::Char | SqlType::Varchar | SqlType::Text
                if self.compression == EncodingType::Dict =>
            {
                NULL_DICT_ID as i64
            }
            other => {
                return Err(Error::invariant(format!(
                    "no integer null sentinel for type {}",
                    other.name()
                )));
            }
        };
        Ok(value)
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_decimal() {
            write!(f, "DECIMAL({},{})", self.precision, self.scale)?;
        } else {
            f.write_str(self.sql_type.name())?;
        }
        if self.compression == EncodingType::Dict {
            write!(f, " ENCODING DICT({})", self.comp_param)?;
        }
        if self.notnull {
            f.write_str(" NOT NULL")?;
        }
        Ok(())
    }
}

/// Payload of a constant
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    /// BOOLEAN payload
    Bool(bool),
    /// SMALLINT payload
    SmallInt(i16),
    /// INTEGER payload
    Int(i32),
    /// BIGINT payload; also the scaled integer of a DECIMAL
    BigInt(i64),
    /// Time, timestamp, date and interval payloads
    Time(i64),
    /// FLOAT payload
    Float(f32),
    /// DOUBLE payload
    Double(f64),
    /// String payload
    Str(String),
    /// No payload (null constant)
    Null,
}

/// Typed SQL constant
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    type_info: TypeInfo,
    is_null: bool,
    value: Datum,
}

impl Constant {
    /// Create a constant; `Datum::Null` makes it a null of `type_info`
    pub fn new(type_info: TypeInfo, value: Datum) -> Self {
        let is_null = matches!(value, Datum::Null);
        Self {
            type_info,
            is_null,
            value,
        }
    }

    /// Create a null constant of the given type
    pub fn null(type_info: TypeInfo) -> Self {
        Self {
            type_info,
            is_null: true,
            value: Datum::Null,
        }
    }

    /// BOOLEAN constant
    pub fn boolean(value: bool) -> Self {
        Self::new(TypeInfo::new(SqlType::Boolean), Datum::Bool(value))
    }

    /// SMALLINT constant
    pub fn smallint(value: i16) -> Self {
        Self::new(TypeInfo::new(SqlType::SmallInt), Datum::SmallInt(value))
    }

    /// INTEGER constant
    pub fn int(value: i32) -> Self {
        Self::new(TypeInfo::new(SqlType::Int), Datum::Int(value))
    }

    /// BIGINT constant
    pub fn bigint(value: i64) -> Self {
        Self::new(TypeInfo::new(SqlType::BigInt), Datum::BigInt(value))
    }

    /// FLOAT constant
    pub fn float(value: f32) -> Self {
        Self::new(TypeInfo::new(SqlType::Float), Datum::Float(value))
    }

    /// DOUBLE constant
    pub fn double(value: f64) -> Self {
        Self::new(TypeInfo::new(SqlType::Double), Datum::Double(value))
    }

    /// DECIMAL constant from its scaled integer value
    pub fn decimal(scaled: i64, precision: u8, scale: u8) -> Self {
        Self::new(TypeInfo::decimal(precision, scale), Datum::BigInt(scaled))
    }

    /// Temporal or interval constant
    pub fn temporal(sql_type: SqlType, value: i64) -> Self {
        Self::new(TypeInfo::new(sql_type), Datum::Time(value))
    }

    /// Unencoded TEXT constant
    pub fn text(value: impl Into<String>) -> Self {
        Self::new(TypeInfo::new(SqlType::Text), Datum::Str(value.into()))
    }

    /// TEXT constant encoded against dictionary `dict_id`
    pub fn dict_text(value: impl Into<String>, dict_id: i32) -> Self {
        Self::new(
            TypeInfo::new(SqlType::Text).with_dict(dict_id),
            Datum::Str(value.into()),
        )
    }

    /// Same constant with a NOT NULL type
    pub fn not_null(mut self) -> Self {
        self.type_info = self.type_info.not_null();
        self
    }

    /// Type descriptor
    pub fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    /// Whether the constant is null
    pub fn is_null(&self) -> bool {
        self.is_null
    }

    /// Raw payload
    pub fn value(&self) -> &Datum {
        &self.value
    }

    /// Boolean payload
    pub fn bool_value(&self) -> Result<bool> {
        match self.value {
            Datum::Bool(v) => Ok(v),
            _ => Err(self.payload_mismatch("BOOLEAN")),
        }
    }

    /// Integer payload widened to 64 bits. Covers the integer, decimal and
    /// temporal families.
    pub fn int_value(&self) -> Result<i64> {
        match self.value {
            Datum::SmallInt(v) => Ok(v as i64),
            Datum::Int(v) => Ok(v as i64),
            Datum::BigInt(v) | Datum::Time(v) => Ok(v),
            _ => Err(self.payload_mismatch("integer")),
        }
    }

    /// FLOAT payload
    pub fn float_value(&self) -> Result<f32> {
        match self.value {
            Datum::Float(v) => Ok(v),
            _ => Err(self.payload_mismatch("FLOAT")),
        }
    }

    /// DOUBLE payload
    pub fn double_value(&self) -> Result<f64> {
        match self.value {
            Datum::Double(v) => Ok(v),
            _ => Err(self.payload_mismatch("DOUBLE")),
        }
    }

    /// String payload
    pub fn str_value(&self) -> Result<&str> {
        match &self.value {
            Datum::Str(v) => Ok(v),
            _ => Err(self.payload_mismatch("string")),
        }
    }

    fn payload_mismatch(&self, expected: &str) -> Error {
        Error::invariant(format!(
            "constant of type {} carries {:?}, expected a {} payload",
            self.type_info, self.value, expected
        ))
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Const ")?;
        match &self.value {
            Datum::Null => f.write_str("NULL")?,
            Datum::Bool(v) => write!(f, "{}", if *v { "t" } else { "f" })?,
            Datum::SmallInt(v) => write!(f, "{v}")?,
            Datum::Int(v) => write!(f, "{v}")?,
            Datum::BigInt(v) | Datum::Time(v) => write!(f, "{v}")?,
            Datum::Float(v) => write!(f, "{v}")?,
            Datum::Double(v) => write!(f, "{v}")?,
            Datum::Str(v) => write!(f, "'{v}'")?,
        }
        write!(f, " {})", self.type_info)
    }
}
