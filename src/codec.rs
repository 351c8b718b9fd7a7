//! Wire text codec for readable and writable values.
//!
//! Every value that crosses the socket is rendered as a short piece of text
//! that slots directly into an update frame:
//!
//! ```text
//! 42          integers
//! -0.125      floats (shortest round-trip decimal, never locale dependent)
//! true        booleans
//! "label"     strings, quoted, embedded quotes are NOT escaped
//! [1,2,3]     sequences, empty sequence is []
//! ```
//!
//! Strings are deliberately not escaped: a string containing `"` produces a
//! frame the console cannot parse. Callers exposing free-form text must keep
//! quotes out of it. Command arguments never carry quotes (the tokenizer
//! strips them), and string arguments containing a backslash or a control
//! byte are rejected, so a `set` cannot corrupt the frames.
//!
//! [`Value`] writes integral doubles with a trailing `.0` so they decode as
//! doubles again; the plain float impls write `2`.
//!
//! [`WireValue`] is the extension point. Any type that implements it can be
//! bound as a readable or writable.

use crate::error::CodecError;

/// Coarse type tag carried by registry bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Signed or unsigned integer.
    Int,
    /// Floating point number.
    Double,
    /// Quoted string.
    Str,
    /// `true` / `false`.
    Bool,
    /// `[...]` sequence.
    Seq,
    /// Decided per value at runtime ([`Value`]).
    Dynamic,
}

impl ValueKind {
    /// Lowercase name, as shown in `set` error entries.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Double => "double",
            Self::Str => "string",
            Self::Bool => "bool",
            Self::Seq => "sequence",
            Self::Dynamic => "dynamic",
        }
    }
}

/// A value that can be rendered to and parsed from wire text.
pub trait WireValue: Sized {
    /// Type tag recorded alongside bindings of this type.
    const KIND: ValueKind;

    /// Render this value as wire text.
    fn to_wire(&self) -> String;

    /// Parse wire text produced by [`WireValue::to_wire`].
    fn from_wire(text: &str) -> Result<Self, CodecError>;

    /// Parse a command argument.
    ///
    /// The tokenizer has already stripped quoting from arguments, so types
    /// whose wire form is quoted override this to accept bare text.
    fn from_arg(arg: &str) -> Result<Self, CodecError> {
        Self::from_wire(arg)
    }
}

macro_rules! impl_wire_int {
    ($($ty:ty),*) => {$(
        impl WireValue for $ty {
            const KIND: ValueKind = ValueKind::Int;

            fn to_wire(&self) -> String {
                self.to_string()
            }

            fn from_wire(text: &str) -> Result<Self, CodecError> {
                text.trim()
                    .parse()
                    .map_err(|_| CodecError::new(stringify!($ty), text))
            }
        }
    )*};
}

impl_wire_int!(i32, i64, u32, u64);

macro_rules! impl_wire_float {
    ($($ty:ty),*) => {$(
        impl WireValue for $ty {
            const KIND: ValueKind = ValueKind::Double;

            fn to_wire(&self) -> String {
                // JSON has no spelling for NaN or infinities
                if self.is_finite() {
                    self.to_string()
                } else {
                    "null".to_string()
                }
            }

            fn from_wire(text: &str) -> Result<Self, CodecError> {
                let text_trimmed = text.trim();
                if text_trimmed == "null" {
                    return Ok(<$ty>::NAN);
                }
                text_trimmed
                    .parse()
                    .map_err(|_| CodecError::new(stringify!($ty), text))
            }
        }
    )*};
}

impl_wire_float!(f32, f64);

impl WireValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn to_wire(&self) -> String {
        let text = if *self { "true" } else { "false" };
        text.to_string()
    }

    fn from_wire(text: &str) -> Result<Self, CodecError> {
        match text.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(CodecError::new("bool", text)),
        }
    }
}

impl WireValue for String {
    const KIND: ValueKind = ValueKind::Str;

    fn to_wire(&self) -> String {
        format!("\"{self}\"")
    }

    /// Best effort: anything that is not a quoted string decodes as `""`.
    fn from_wire(text: &str) -> Result<Self, CodecError> {
        let quoted = text.len() >= 2 && text.starts_with('"') && text.ends_with('"');
        if quoted {
            Ok(text[1..text.len() - 1].to_string())
        } else {
            Ok(String::new())
        }
    }

    fn from_arg(arg: &str) -> Result<Self, CodecError> {
        let text = if arg.starts_with('"') {
            Self::from_wire(arg)?
        } else {
            arg.to_string()
        };
        check_frame_safe(&text)?;
        Ok(text)
    }
}

/// Reject text that would break out of a quoted string inside a frame.
fn check_frame_safe(text: &str) -> Result<(), CodecError> {
    if text.chars().any(|c| c == '\\' || c.is_ascii_control()) {
        return Err(CodecError::new("string without backslashes or control bytes", text));
    }
    Ok(())
}

impl<T: WireValue> WireValue for Vec<T> {
    const KIND: ValueKind = ValueKind::Seq;

    fn to_wire(&self) -> String {
        let items: Vec<String> = self.iter().map(WireValue::to_wire).collect();
        format!("[{}]", items.join(","))
    }

    fn from_wire(text: &str) -> Result<Self, CodecError> {
        let inner = sequence_body(text)?;
        split_top_level(inner)
            .into_iter()
            .map(|item| T::from_wire(item.trim()))
            .collect()
    }

    fn from_arg(arg: &str) -> Result<Self, CodecError> {
        let inner = sequence_body(arg)?;
        split_top_level(inner)
            .into_iter()
            .map(|item| T::from_arg(item.trim()))
            .collect()
    }
}

/// Strip the brackets from a sequence, rejecting anything else.
fn sequence_body(text: &str) -> Result<&str, CodecError> {
    let trimmed = text.trim();
    trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| CodecError::new("sequence", text))
}

/// Split a sequence body on commas that are not nested or quoted.
///
/// An empty (or all-whitespace) body yields no items.
fn split_top_level(body: &str) -> Vec<&str> {
    if body.trim().is_empty() {
        return Vec::new();
    }

    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '[' if !quoted => depth += 1,
            ']' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                items.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&body[start..]);
    items
}

/// A dynamically typed wire value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer.
    Int(i64),
    /// Floating point number.
    Double(f64),
    /// String.
    Str(String),
    /// Boolean.
    Bool(bool),
    /// Sequence of values.
    Seq(Vec<Value>),
}

impl Value {
    /// Type tag of this particular value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Double(_) => ValueKind::Double,
            Self::Str(_) => ValueKind::Str,
            Self::Bool(_) => ValueKind::Bool,
            Self::Seq(_) => ValueKind::Seq,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl WireValue for Value {
    const KIND: ValueKind = ValueKind::Dynamic;

    #[allow(clippy::float_cmp)]
    fn to_wire(&self) -> String {
        match self {
            Self::Int(v) => v.to_wire(),
            Self::Double(v) if v.is_finite() && v.fract() == 0.0 => format!("{v:.1}"),
            Self::Double(v) => v.to_wire(),
            Self::Str(v) => v.to_wire(),
            Self::Bool(v) => v.to_wire(),
            Self::Seq(v) => v.to_wire(),
        }
    }

    /// Infer the type from the text: quoted → string, bracketed → sequence,
    /// `true`/`false` → bool, integral → int, otherwise float.
    fn from_wire(text: &str) -> Result<Self, CodecError> {
        let trimmed = text.trim();
        if trimmed.starts_with('"') {
            return String::from_wire(trimmed).map(Self::Str);
        }
        if trimmed.starts_with('[') {
            return Vec::<Value>::from_wire(trimmed).map(Self::Seq);
        }
        if let Ok(b) = bool::from_wire(trimmed) {
            return Ok(Self::Bool(b));
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Ok(Self::Int(i));
        }
        f64::from_wire(trimmed)
            .map(Self::Double)
            .map_err(|_| CodecError::new("value", text))
    }

    /// Like [`WireValue::from_wire`], but unrecognised text becomes a string.
    fn from_arg(arg: &str) -> Result<Self, CodecError> {
        if arg.trim_start().starts_with('[') {
            return Vec::<Value>::from_arg(arg).map(Self::Seq);
        }
        let value = Self::from_wire(arg).unwrap_or_else(|_| Self::Str(arg.to_string()));
        if let Self::Str(text) = &value {
            check_frame_safe(text)?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: WireValue + PartialEq + std::fmt::Debug>(value: T) {
        let text = value.to_wire();
        let decoded = T::from_wire(&text).unwrap();
        assert_eq!(decoded, value, "round trip through {text:?}");
    }

    #[test]
    fn test_integers_round_trip() {
        round_trip(0i32);
        round_trip(-17i32);
        round_trip(i32::MAX);
        round_trip(i32::MIN);
        round_trip(i64::MIN);
        round_trip(u64::MAX);
    }

    #[test]
    fn test_floats_round_trip() {
        round_trip(0.0f64);
        round_trip(-0.5f64);
        round_trip(0.1f64);
        round_trip(1e-300f64);
        round_trip(f64::MAX);
        round_trip(f64::MIN_POSITIVE);
        round_trip(3.25f32);
    }

    #[test]
    fn test_float_text_is_plain_decimal() {
        assert_eq!(1.5f64.to_wire(), "1.5");
        assert_eq!(2.0f64.to_wire(), "2");
        assert_eq!((-0.25f64).to_wire(), "-0.25");
    }

    #[test]
    fn test_non_finite_float_renders_null() {
        assert_eq!(f64::NAN.to_wire(), "null");
        assert_eq!(f64::INFINITY.to_wire(), "null");
        assert!(f64::from_wire("null").unwrap().is_nan());
    }

    #[test]
    fn test_bool_round_trip() {
        round_trip(true);
        round_trip(false);
        assert!(bool::from_wire("yes").is_err());
    }

    #[test]
    fn test_string_round_trip() {
        round_trip(String::new());
        round_trip("hello world".to_string());
        round_trip("semi;colon and [brackets]".to_string());
        round_trip("x".repeat(4096));
    }

    #[test]
    fn test_string_is_quoted_without_escaping() {
        assert_eq!("abc".to_string().to_wire(), "\"abc\"");
        // Known limitation: embedded quotes pass through untouched
        assert_eq!("a\"b".to_string().to_wire(), "\"a\"b\"");
    }

    #[test]
    fn test_malformed_string_decodes_empty() {
        assert_eq!(String::from_wire("abc").unwrap(), "");
        assert_eq!(String::from_wire("\"").unwrap(), "");
        assert_eq!(String::from_wire("").unwrap(), "");
        assert_eq!(String::from_wire("\"abc").unwrap(), "");
    }

    #[test]
    fn test_string_arg_accepts_bare_text() {
        assert_eq!(String::from_arg("a b;c").unwrap(), "a b;c");
        assert_eq!(String::from_arg("\"quoted\"").unwrap(), "quoted");
    }

    #[test]
    fn test_sequences_round_trip() {
        round_trip(Vec::<i32>::new());
        round_trip(vec![1i32]);
        round_trip(vec![1i32, -2, 3]);
        round_trip(vec![0.5f64, -1.25]);
        round_trip(vec!["a".to_string(), "b,c".to_string(), String::new()]);
        round_trip(vec![vec![1i64, 2], vec![], vec![3]]);
    }

    #[test]
    fn test_sequence_text() {
        assert_eq!(Vec::<i32>::new().to_wire(), "[]");
        assert_eq!(vec![1i32].to_wire(), "[1]");
        assert_eq!(vec![1i32, 2, 3].to_wire(), "[1,2,3]");
    }

    #[test]
    fn test_sequence_rejects_missing_brackets() {
        assert!(Vec::<i32>::from_wire("1,2").is_err());
        assert!(Vec::<i32>::from_wire("[1,x]").is_err());
    }

    #[test]
    fn test_sequence_arg_with_bare_strings() {
        let parsed = Vec::<String>::from_arg("[a, b ,c]").unwrap();
        assert_eq!(parsed, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_integer_rejects_garbage() {
        let err = i32::from_wire("12abc").unwrap_err();
        assert_eq!(err.expected, "i32");
        assert_eq!(err.input, "12abc");
    }

    #[test]
    fn test_dynamic_value_inference() {
        assert_eq!(Value::from_wire("42").unwrap(), Value::Int(42));
        assert_eq!(Value::from_wire("4.5").unwrap(), Value::Double(4.5));
        assert_eq!(Value::from_wire("true").unwrap(), Value::Bool(true));
        assert_eq!(Value::from_wire("\"hi\"").unwrap(), Value::from("hi"));
        assert_eq!(
            Value::from_wire("[1,\"a\",[false]]").unwrap(),
            Value::Seq(vec![
                Value::Int(1),
                Value::from("a"),
                Value::Seq(vec![Value::Bool(false)]),
            ])
        );
        assert!(Value::from_wire("nope").is_err());
    }

    #[test]
    fn test_dynamic_value_round_trip() {
        round_trip(Value::Seq(vec![]));
        round_trip(Value::Seq(vec![Value::Int(-3), Value::Double(0.75), Value::from("x y")]));
    }

    #[test]
    fn test_integral_doubles_stay_doubles() {
        assert_eq!(Value::Double(2.0).to_wire(), "2.0");
        round_trip(Value::Double(2.0));
        round_trip(Value::Double(5.0));
        round_trip(Value::Double(1e20));
        round_trip(Value::Seq(vec![Value::Double(1.0), Value::Int(1)]));

        let text = Value::Double(-0.0).to_wire();
        assert_eq!(text, "-0.0");
        match Value::from_wire(&text).unwrap() {
            Value::Double(v) => assert!(v == 0.0 && v.is_sign_negative()),
            other => panic!("Expected Double, got: {other:?}"),
        }
    }

    #[test]
    fn test_string_arg_rejects_frame_breaking_text() {
        assert!(String::from_arg("a\\").is_err());
        assert!(String::from_arg("a\x1fb").is_err());
        assert!(String::from_arg("line\nbreak").is_err());
        assert!(Vec::<String>::from_arg("[ok, bad\\]").is_err());
        assert!(Value::from_arg("a\\").is_err());
        assert!(Value::from_arg("[1,x\x1fy]").is_err());
        assert_eq!(String::from_arg("tab-free text").unwrap(), "tab-free text");
    }

    #[test]
    fn test_dynamic_value_arg_falls_back_to_string() {
        assert_eq!(Value::from_arg("hello").unwrap(), Value::from("hello"));
        assert_eq!(Value::from_arg("7").unwrap(), Value::Int(7));
        assert_eq!(
            Value::from_arg("[a,1]").unwrap(),
            Value::Seq(vec![Value::from("a"), Value::Int(1)])
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(i32::KIND, ValueKind::Int);
        assert_eq!(f64::KIND, ValueKind::Double);
        assert_eq!(String::KIND, ValueKind::Str);
        assert_eq!(Vec::<bool>::KIND, ValueKind::Seq);
        assert_eq!(Value::Bool(true).kind(), ValueKind::Bool);
    }
}
