use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::parameters::{JobParameters, ParameterType, ParameterValue};
use crate::error::BatchError;

/// A value stored in an [`ExecutionContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ContextValue {
    String(String),
    Long(i64),
    Double(f64),
    Date(DateTime<Utc>),
    Bool(bool),
    Parameters(JobParameters),
}

impl ContextValue {
    /// Infer a value from command-line text: integers, then floats, then
    /// booleans, falling back to a string.
    ///
    /// Text only becomes a number when it is exactly how that number prints,
    /// so `0012` keeps its zeros and `NaN` or `inf` never reach the store.
    pub fn infer(raw: &str) -> ContextValue {
        if let Ok(v) = raw.parse::<i64>()
            && v.to_string() == raw
        {
            return ContextValue::Long(v);
        }
        if let Ok(v) = raw.parse::<f64>()
            && v.is_finite()
            && v.to_string() == raw
        {
            return ContextValue::Double(v);
        }
        match raw {
            "true" => ContextValue::Bool(true),
            "false" => ContextValue::Bool(false),
            _ => ContextValue::String(raw.to_string()),
        }
    }

    /// Convert into a job parameter value.
    ///
    /// Without a requested type the runtime type decides; values with no
    /// parameter counterpart are rendered as strings. With a requested type
    /// the value is coerced and a mismatch is an error.
    pub fn to_parameter_value(
        &self,
        name: &str,
        requested: Option<ParameterType>,
    ) -> Result<ParameterValue, BatchError> {
        match (requested, self) {
            (None, ContextValue::String(s)) => Ok(ParameterValue::String(s.clone())),
            (None, ContextValue::Long(v)) => Ok(ParameterValue::Long(*v)),
            (None, ContextValue::Double(v)) => Ok(ParameterValue::Double(*v)),
            (None, ContextValue::Date(d)) => Ok(ParameterValue::Date(*d)),
            (None, other) => Ok(ParameterValue::String(other.to_string())),
            (Some(ParameterType::String), other) => Ok(ParameterValue::String(other.to_string())),
            (Some(ParameterType::Long), ContextValue::Long(v)) => Ok(ParameterValue::Long(*v)),
            (Some(ParameterType::Double), ContextValue::Double(v)) => {
                Ok(ParameterValue::Double(*v))
            }
            (Some(ParameterType::Double), ContextValue::Long(v)) => {
                Ok(ParameterValue::Double(*v as f64))
            }
            (Some(ParameterType::Date), ContextValue::Date(d)) => Ok(ParameterValue::Date(*d)),
            (Some(ty), ContextValue::String(s)) => ty.parse(name, s),
            (Some(ty), other) => Err(BatchError::InvalidJobParameters(format!(
                "context value '{other}' for '{name}' cannot be used as a {ty:?} parameter"
            ))),
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::String(s) => write!(f, "{s}"),
            ContextValue::Long(v) => write!(f, "{v}"),
            ContextValue::Double(v) => write!(f, "{v}"),
            ContextValue::Date(d) => write!(f, "{}", ParameterValue::Date(*d)),
            ContextValue::Bool(b) => write!(f, "{b}"),
            ContextValue::Parameters(p) => write!(f, "{{{p}}}"),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        ContextValue::String(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        ContextValue::String(value)
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        ContextValue::Long(value)
    }
}

impl From<f64> for ContextValue {
    fn from(value: f64) -> Self {
        ContextValue::Double(value)
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        ContextValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for ContextValue {
    fn from(value: DateTime<Utc>) -> Self {
        ContextValue::Date(value)
    }
}

impl From<JobParameters> for ContextValue {
    fn from(value: JobParameters) -> Self {
        ContextValue::Parameters(value)
    }
}

/// String-keyed state saved with an execution and handed back on restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    entries: BTreeMap<String, ContextValue>,
    #[serde(skip)]
    dirty: bool,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        let key = key.into();
        let value = value.into();
        if self.entries.get(&key) != Some(&value) {
            self.entries.insert(key, value);
            self.dirty = true;
        }
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(ContextValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(ContextValue::Long(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_parameters(&self, key: &str) -> Option<&JobParameters> {
        match self.get(key) {
            Some(ContextValue::Parameters(p)) => Some(p),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ContextValue)> {
        self.entries.iter()
    }

    /// True when an entry changed since the last [`clear_dirty`](Self::clear_dirty).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::JobParametersBuilder;

    #[test]
    fn put_marks_dirty_only_on_change() {
        let mut ctx = ExecutionContext::new();
        assert!(!ctx.is_dirty());
        ctx.put("foo", "bar");
        assert!(ctx.is_dirty());
        ctx.clear_dirty();
        ctx.put("foo", "bar");
        assert!(!ctx.is_dirty());
        ctx.put("foo", "baz");
        assert!(ctx.is_dirty());
    }

    #[test]
    fn typed_getters() {
        let mut ctx = ExecutionContext::new();
        ctx.put("name", "bar");
        ctx.put("count", 7i64);
        let params = JobParametersBuilder::new()
            .add_string("x", "y")
            .to_job_parameters();
        ctx.put("params", params.clone());

        assert_eq!(ctx.get_string("name"), Some("bar"));
        assert_eq!(ctx.get_long("count"), Some(7));
        assert_eq!(ctx.get_parameters("params"), Some(&params));
        assert_eq!(ctx.get_long("name"), None);
        assert_eq!(ctx.to_string(), "{count=7, name=bar, params={x=y}}");
    }

    #[test]
    fn infer_from_text() {
        assert_eq!(ContextValue::infer("12"), ContextValue::Long(12));
        assert_eq!(ContextValue::infer("1.5"), ContextValue::Double(1.5));
        assert_eq!(ContextValue::infer("true"), ContextValue::Bool(true));
        assert_eq!(ContextValue::infer("bar"), ContextValue::String("bar".into()));
    }

    #[test]
    fn infer_keeps_text_that_does_not_print_back_the_same() {
        assert_eq!(ContextValue::infer("0012"), ContextValue::String("0012".into()));
        assert_eq!(ContextValue::infer("+5"), ContextValue::String("+5".into()));
        assert_eq!(ContextValue::infer("1.50"), ContextValue::String("1.50".into()));
        assert_eq!(ContextValue::infer("-3"), ContextValue::Long(-3));
        for raw in ["NaN", "inf", "-inf", "infinity"] {
            assert_eq!(ContextValue::infer(raw), ContextValue::String(raw.into()));
        }
    }

    #[test]
    fn inferred_context_survives_json_round_trip() {
        let mut ctx = ExecutionContext::new();
        for (key, raw) in [("x", "NaN"), ("y", "inf"), ("id", "0012"), ("ratio", "0.25")] {
            ctx.put(key, ContextValue::infer(raw));
        }
        ctx.clear_dirty();
        let json = serde_json::to_string(&ctx).unwrap();
        let back: ExecutionContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
        assert_eq!(back.get_string("id"), Some("0012"));
    }

    #[test]
    fn runtime_typed_conversion() {
        assert_eq!(
            ContextValue::Long(3).to_parameter_value("n", None).unwrap(),
            ParameterValue::Long(3)
        );
        assert_eq!(
            ContextValue::Bool(true).to_parameter_value("flag", None).unwrap(),
            ParameterValue::String("true".into())
        );
    }

    #[test]
    fn requested_type_conversion() {
        assert_eq!(
            ContextValue::from("42")
                .to_parameter_value("n", Some(ParameterType::Long))
                .unwrap(),
            ParameterValue::Long(42)
        );
        assert_eq!(
            ContextValue::Long(2)
                .to_parameter_value("n", Some(ParameterType::Double))
                .unwrap(),
            ParameterValue::Double(2.0)
        );
        let err = ContextValue::Bool(true)
            .to_parameter_value("n", Some(ParameterType::Long))
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidJobParameters(_)));
    }

    #[test]
    fn serde_keeps_entries_and_drops_dirty_flag() {
        let mut ctx = ExecutionContext::new();
        ctx.put("foo", "bar");
        let json = serde_json::to_string(&ctx).unwrap();
        let back: ExecutionContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get_string("foo"), Some("bar"));
        assert!(!back.is_dirty());
    }
}
