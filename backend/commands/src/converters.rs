//! Argument converters: turn a token into a typed parameter value.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use parlor_core::Timestamp;
use regex::Regex;
use thiserror::Error;

use crate::error::{BoxError, ConversionError};
use crate::services::Value;

static MODULE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[A-Za-z_][A-Za-z0-9_]*::)+").unwrap());

/// Strip module paths from a type name: `alloc::string::String` -> `String`.
pub fn short_type_name(full: &str) -> String {
    MODULE_PATH.replace_all(full, "").into_owned()
}

/// Converts a single argument token into a value.
pub trait ArgConverter: Send + Sync {
    fn convert(&self, token: &str) -> Result<Value, BoxError>;
}

impl<F> ArgConverter for F
where
    F: Fn(&str) -> Result<Value, BoxError> + Send + Sync,
{
    fn convert(&self, token: &str) -> Result<Value, BoxError> {
        self(token)
    }
}

// ---------------------------------------------------------------------------
// Type metadata
// ---------------------------------------------------------------------------

/// Runtime identity of a parameter or dependency type.
#[derive(Clone)]
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
    enum_converter: Option<Arc<dyn ArgConverter>>,
}

impl TypeInfo {
    pub fn of<T: Any + Send + Sync>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            enum_converter: None,
        }
    }

    /// Type info for an enum that falls back to name-or-value conversion.
    pub fn enumeration<E: ArgEnum>() -> Self {
        Self {
            enum_converter: Some(Arc::new(EnumConverter::<E>::new())),
            ..Self::of::<E>()
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn full_name(&self) -> &'static str {
        self.name
    }

    pub fn display_name(&self) -> String {
        short_type_name(self.name)
    }

    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    pub fn is_enum(&self) -> bool {
        self.enum_converter.is_some()
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("enum", &self.is_enum())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// An enum usable as a command argument.
///
/// Tokens match a variant name case-insensitively, or its numeric value.
pub trait ArgEnum: Copy + Send + Sync + 'static {
    /// `(name, value, variant)` for every variant.
    fn variants() -> &'static [(&'static str, i64, Self)];
}

#[derive(Debug, Error)]
#[error("'{token}' is not one of: {expected}")]
struct UnknownVariant {
    token: String,
    expected: String,
}

/// Generic converter for [`ArgEnum`] types.
pub struct EnumConverter<E>(PhantomData<fn() -> E>);

impl<E: ArgEnum> EnumConverter<E> {
    pub fn new() -> Self {
        Self(PhantomData)
    }

    pub fn parse(token: &str) -> Option<E> {
        let token = token.trim();
        let variants = E::variants();
        if let Some((_, _, v)) = variants.iter().find(|(name, _, _)| name.eq_ignore_ascii_case(token)) {
            return Some(*v);
        }
        let value: i64 = token.parse().ok()?;
        variants.iter().find(|(_, n, _)| *n == value).map(|(_, _, v)| *v)
    }
}

impl<E: ArgEnum> Default for EnumConverter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ArgEnum> ArgConverter for EnumConverter<E> {
    fn convert(&self, token: &str) -> Result<Value, BoxError> {
        match Self::parse(token) {
            Some(v) => Ok(Arc::new(v)),
            None => Err(Box::new(UnknownVariant {
                token: token.to_string(),
                expected: E::variants()
                    .iter()
                    .map(|(name, _, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", "),
            })),
        }
    }
}

// ---------------------------------------------------------------------------
// Scalar converters
// ---------------------------------------------------------------------------

/// Converter for any `FromStr` type; surrounding whitespace is ignored.
pub struct ParseConverter<T>(PhantomData<fn() -> T>);

impl<T> ParseConverter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for ParseConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ArgConverter for ParseConverter<T>
where
    T: FromStr + Send + Sync + 'static,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    fn convert(&self, token: &str) -> Result<Value, BoxError> {
        let value: T = token.trim().parse()?;
        Ok(Arc::new(value))
    }
}

#[derive(Debug, Error)]
#[error("invalid time span: {0}")]
struct TimeSpanError(String);

/// Parse `[d.]hh:mm[:ss[.fffffffff]]`, or a bare integer number of days.
pub fn parse_time_span(raw: &str) -> Result<Duration, BoxError> {
    let s = raw.trim();
    let invalid = || -> BoxError { Box::new(TimeSpanError(raw.to_string())) };
    if s.is_empty() {
        return Err(invalid());
    }
    if !s.contains(':') {
        let days: u64 = s.parse().map_err(|_| invalid())?;
        let secs = days.checked_mul(86_400).ok_or_else(invalid)?;
        return Ok(Duration::from_secs(secs));
    }

    let (days, clock) = match s.split_once('.') {
        Some((d, rest)) if !d.contains(':') => (d.parse::<u64>().map_err(|_| invalid())?, rest),
        _ => (0, s),
    };
    let parts: Vec<&str> = clock.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(invalid());
    }

    let field = |s: &str, max: u64| -> Result<u64, BoxError> {
        let value: u64 = s.parse().map_err(|_| invalid())?;
        if value >= max {
            return Err(invalid());
        }
        Ok(value)
    };
    let hours = field(parts[0], 24)?;
    let minutes = field(parts[1], 60)?;
    let (seconds, nanos) = match parts.get(2) {
        None => (0, 0),
        Some(&sec) => match sec.split_once('.') {
            None => (field(sec, 60)?, 0),
            Some((whole, frac)) => {
                if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                let nanos: u32 = format!("{frac:0<9}").parse().map_err(|_| invalid())?;
                (field(whole, 60)?, nanos)
            }
        },
    };

    let total = days
        .checked_mul(86_400)
        .and_then(|d| d.checked_add(hours * 3_600 + minutes * 60 + seconds))
        .ok_or_else(invalid)?;
    Ok(Duration::new(total, nanos))
}

#[derive(Debug, Error)]
#[error("invalid date/time: {0}")]
struct DateTimeError(String);

/// Parse RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD` (as UTC).
pub fn parse_date_time(raw: &str) -> Result<DateTime<Utc>, BoxError> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Some(naive) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    Err(Box::new(DateTimeError(raw.to_string())))
}

fn parse_bool(raw: &str) -> Result<Value, BoxError> {
    let value: bool = raw.trim().to_ascii_lowercase().parse()?;
    Ok(Arc::new(value))
}

fn parse_timestamp(raw: &str) -> Result<Value, BoxError> {
    let s = raw.trim();
    let ts = match s.parse::<i64>() {
        Ok(micros) => Timestamp(micros),
        Err(_) => Timestamp::from(parse_date_time(s)?),
    };
    Ok(Arc::new(ts))
}

fn parse_string(raw: &str) -> Result<Value, BoxError> {
    Ok(Arc::new(raw.to_string()))
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Type-keyed map of argument converters.
///
/// Mutable while the engine is being set up, shared read-only afterwards.
#[derive(Clone)]
pub struct ConverterRegistry {
    converters: HashMap<TypeId, Arc<dyn ArgConverter>>,
}

impl ConverterRegistry {
    /// A registry with the built-in scalar converters.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_parse::<i8>();
        registry.register_parse::<i16>();
        registry.register_parse::<i32>();
        registry.register_parse::<i64>();
        registry.register_parse::<i128>();
        registry.register_parse::<isize>();
        registry.register_parse::<u8>();
        registry.register_parse::<u16>();
        registry.register_parse::<u32>();
        registry.register_parse::<u64>();
        registry.register_parse::<u128>();
        registry.register_parse::<usize>();
        registry.register_parse::<f32>();
        registry.register_parse::<f64>();
        registry.register_parse::<char>();
        registry.register::<bool>(parse_bool);
        registry.register::<String>(parse_string);
        registry.register_fn::<Duration, _>(parse_time_span);
        registry.register_fn::<DateTime<Utc>, _>(parse_date_time);
        registry.register_fn::<NaiveDate, _>(|s| Ok(NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?));
        registry.register::<Timestamp>(parse_timestamp);
        registry
    }

    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Register or replace the converter for `T`.
    pub fn register<T: Any>(&mut self, converter: impl ArgConverter + 'static) -> &mut Self {
        self.converters.insert(TypeId::of::<T>(), Arc::new(converter));
        self
    }

    /// Register a typed parse function for `T`.
    pub fn register_fn<T, F>(&mut self, parse: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&str) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register::<T>(move |token: &str| -> Result<Value, BoxError> {
            Ok(Arc::new(parse(token)?))
        })
    }

    /// Register a `FromStr`-based converter for `T`.
    pub fn register_parse<T>(&mut self) -> &mut Self
    where
        T: FromStr + Send + Sync + 'static,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.register::<T>(ParseConverter::<T>::new())
    }

    /// Direct mapping first, then the enum fallback carried by `ty`.
    pub fn get_converter(&self, ty: &TypeInfo) -> Option<Arc<dyn ArgConverter>> {
        self.converters
            .get(&ty.id())
            .cloned()
            .or_else(|| ty.enum_converter.clone())
    }

    pub fn convert(&self, ty: &TypeInfo, token: &str) -> Result<Value, ConversionError> {
        let converter = self.get_converter(ty).ok_or_else(|| ConversionError {
            target: ty.display_name(),
            token: token.to_string(),
            source: format!("no converter registered for {}", ty.display_name()).into(),
        })?;
        converter.convert(token).map_err(|source| ConversionError {
            target: ty.display_name(),
            token: token.to_string(),
            source,
        })
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
