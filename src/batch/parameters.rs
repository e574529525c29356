use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::BatchError;

/// A typed job parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParameterValue {
    String(String),
    Long(i64),
    Double(f64),
    Date(DateTime<Utc>),
}

impl ParameterValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::String(_) => "string",
            ParameterValue::Long(_) => "long",
            ParameterValue::Double(_) => "double",
            ParameterValue::Date(_) => "date",
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::String(s) => write!(f, "{s}"),
            ParameterValue::Long(v) => write!(f, "{v}"),
            ParameterValue::Double(v) => write!(f, "{v}"),
            ParameterValue::Date(d) => write!(f, "{}", d.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

/// The type named by a key suffix such as `count(long)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    String,
    Long,
    Double,
    Date,
}

impl ParameterType {
    fn from_suffix(suffix: &str) -> Option<ParameterType> {
        match suffix {
            "string" => Some(ParameterType::String),
            "long" | "int" => Some(ParameterType::Long),
            "double" => Some(ParameterType::Double),
            "date" => Some(ParameterType::Date),
            _ => None,
        }
    }

    /// Parse a raw string into a value of this type.
    pub fn parse(self, name: &str, raw: &str) -> Result<ParameterValue, BatchError> {
        let invalid = |ty: &str| {
            BatchError::InvalidJobParameters(format!(
                "value '{raw}' for parameter '{name}' is not a valid {ty}"
            ))
        };
        match self {
            ParameterType::String => Ok(ParameterValue::String(raw.to_string())),
            ParameterType::Long => raw
                .trim()
                .parse::<i64>()
                .map(ParameterValue::Long)
                .map_err(|_| invalid("long")),
            ParameterType::Double => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(ParameterValue::Double)
                .ok_or_else(|| invalid("double")),
            ParameterType::Date => parse_date(raw.trim())
                .map(ParameterValue::Date)
                .ok_or_else(|| invalid("date")),
        }
    }
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Split a key spec into its name and optional type, e.g. `run.id(long)`.
/// Unknown suffixes are kept as part of the name.
pub fn parse_key_spec(spec: &str) -> (&str, Option<ParameterType>) {
    if let Some(open) = spec.rfind('(')
        && spec.ends_with(')')
        && let Some(ty) = ParameterType::from_suffix(&spec[open + 1..spec.len() - 1])
    {
        return (&spec[..open], Some(ty));
    }
    (spec, None)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParameter {
    pub value: ParameterValue,
    /// Identifying parameters take part in the job instance identity.
    #[serde(default = "default_identifying")]
    pub identifying: bool,
}

fn default_identifying() -> bool {
    true
}

impl JobParameter {
    pub fn new(value: ParameterValue, identifying: bool) -> Self {
        Self { value, identifying }
    }

    pub fn identifying(value: ParameterValue) -> Self {
        Self::new(value, true)
    }

    /// Parse a command-line style `name[(type)]=value` assignment. A leading
    /// `-` on the name marks the parameter as non-identifying.
    pub fn parse_assignment(assignment: &str) -> Result<(String, JobParameter), BatchError> {
        let (spec, raw) = assignment.split_once('=').ok_or_else(|| {
            BatchError::InvalidJobParameters(format!(
                "expected name=value, got '{assignment}'"
            ))
        })?;
        let (spec, identifying) = match spec.strip_prefix('-') {
            Some(rest) => (rest, false),
            None => (spec, true),
        };
        let (name, ty) = parse_key_spec(spec.trim());
        if name.is_empty() {
            return Err(BatchError::InvalidJobParameters(format!(
                "missing parameter name in '{assignment}'"
            )));
        }
        let value = ty.unwrap_or(ParameterType::String).parse(name, raw)?;
        Ok((name.to_string(), JobParameter::new(value, identifying)))
    }
}

/// Immutable set of named job parameters.
///
/// Backed by an ordered map so that equal parameter sets always iterate and
/// serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobParameters {
    parameters: BTreeMap<String, JobParameter>,
}

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&JobParameter> {
        self.parameters.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JobParameter)> {
        self.parameters.iter()
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.get(name).map(|p| &p.value) {
            Some(ParameterValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_long(&self, name: &str) -> Option<i64> {
        match self.get(name).map(|p| &p.value) {
            Some(ParameterValue::Long(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_double(&self, name: &str) -> Option<f64> {
        match self.get(name).map(|p| &p.value) {
            Some(ParameterValue::Double(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_date(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.get(name).map(|p| &p.value) {
            Some(ParameterValue::Date(v)) => Some(*v),
            _ => None,
        }
    }

    /// The subset of parameters that identify a job instance.
    pub fn identifying(&self) -> JobParameters {
        JobParameters {
            parameters: self
                .parameters
                .iter()
                .filter(|(_, p)| p.identifying)
                .map(|(k, p)| (k.clone(), p.clone()))
                .collect(),
        }
    }

    /// Hex SHA-256 over the identifying parameters. Two launches with the same
    /// job name and job key address the same job instance.
    ///
    /// Each parameter is hashed as `name=type:value;` with separators escaped,
    /// so `"3"` and `3` or `{a: "1,b=2"}` and `{a: "1", b: "2"}` get different keys.
    pub fn job_key(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, param) in self.parameters.iter().filter(|(_, p)| p.identifying) {
            let canonical = format!(
                "{}={}:{};",
                escape_key_part(name),
                param.value.type_name(),
                escape_key_part(&param.value.to_string())
            );
            hasher.update(canonical.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

fn escape_key_part(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '=' | ':' | ';') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Display for JobParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, param) in &self.parameters {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            write!(f, "{name}={}", param.value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobParametersBuilder {
    parameters: BTreeMap<String, JobParameter>,
}

impl JobParametersBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parameters(parameters: &JobParameters) -> Self {
        Self {
            parameters: parameters.parameters.clone(),
        }
    }

    pub fn add_string(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_value(name, ParameterValue::String(value.into()))
    }

    pub fn add_long(self, name: impl Into<String>, value: i64) -> Self {
        self.add_value(name, ParameterValue::Long(value))
    }

    pub fn add_double(self, name: impl Into<String>, value: f64) -> Self {
        self.add_value(name, ParameterValue::Double(value))
    }

    pub fn add_date(self, name: impl Into<String>, value: DateTime<Utc>) -> Self {
        self.add_value(name, ParameterValue::Date(value))
    }

    pub fn add_value(self, name: impl Into<String>, value: ParameterValue) -> Self {
        self.add_parameter(name, JobParameter::identifying(value))
    }

    pub fn add_parameter(mut self, name: impl Into<String>, parameter: JobParameter) -> Self {
        self.parameters.insert(name.into(), parameter);
        self
    }

    pub fn to_job_parameters(self) -> JobParameters {
        JobParameters {
            parameters: self.parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_spec_suffixes() {
        assert_eq!(parse_key_spec("foo"), ("foo", None));
        assert_eq!(parse_key_spec("foo(long)"), ("foo", Some(ParameterType::Long)));
        assert_eq!(parse_key_spec("foo(int)"), ("foo", Some(ParameterType::Long)));
        assert_eq!(parse_key_spec("run.date(date)"), ("run.date", Some(ParameterType::Date)));
        assert_eq!(parse_key_spec("foo(bar)"), ("foo(bar)", None));
    }

    #[test]
    fn typed_parse_failures_are_invalid_parameters() {
        let err = ParameterType::Long.parse("count", "ten").unwrap_err();
        assert!(matches!(err, BatchError::InvalidJobParameters(_)));
        assert!(err.to_string().contains("count"));

        for raw in ["NaN", "inf", "-infinity"] {
            let err = ParameterType::Double.parse("ratio", raw).unwrap_err();
            assert!(matches!(err, BatchError::InvalidJobParameters(_)));
        }
        assert_eq!(
            ParameterType::Double.parse("ratio", " 0.5 ").unwrap(),
            ParameterValue::Double(0.5)
        );
    }

    #[test]
    fn dates_accept_rfc3339_and_plain_days() {
        let day = parse_date("2024-03-01").unwrap();
        assert_eq!(day.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        let ts = parse_date("2024-03-01T10:00:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T08:00:00+00:00");
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn parse_assignment_handles_types_and_identifying_flag() {
        let (name, p) = JobParameter::parse_assignment("run.id(long)=42").unwrap();
        assert_eq!(name, "run.id");
        assert_eq!(p.value, ParameterValue::Long(42));
        assert!(p.identifying);

        let (name, p) = JobParameter::parse_assignment("-note=hello=world").unwrap();
        assert_eq!(name, "note");
        assert_eq!(p.value, ParameterValue::String("hello=world".into()));
        assert!(!p.identifying);

        assert!(JobParameter::parse_assignment("novalue").is_err());
        assert!(JobParameter::parse_assignment("=x").is_err());
    }

    #[test]
    fn builder_and_getters() {
        let params = JobParametersBuilder::new()
            .add_string("foo", "bar")
            .add_long("count", 3)
            .add_double("ratio", 0.5)
            .to_job_parameters();
        assert_eq!(params.len(), 3);
        assert_eq!(params.get_string("foo"), Some("bar"));
        assert_eq!(params.get_long("count"), Some(3));
        assert_eq!(params.get_double("ratio"), Some(0.5));
        assert_eq!(params.get_long("foo"), None);
        assert_eq!(params.to_string(), "count=3,foo=bar,ratio=0.5");
    }

    #[test]
    fn job_key_ignores_non_identifying_parameters() {
        let a = JobParametersBuilder::new()
            .add_string("foo", "bar")
            .to_job_parameters();
        let b = JobParametersBuilder::from_parameters(&a)
            .add_parameter(
                "note",
                JobParameter::new(ParameterValue::String("x".into()), false),
            )
            .to_job_parameters();
        assert_ne!(a, b);
        assert_eq!(a.job_key(), b.job_key());
        assert_eq!(a.job_key().len(), 64);

        let c = JobParametersBuilder::new()
            .add_string("foo", "baz")
            .to_job_parameters();
        assert_ne!(a.job_key(), c.job_key());
    }

    #[test]
    fn job_key_tells_types_and_separators_apart() {
        let text = JobParametersBuilder::new()
            .add_string("n", "3")
            .to_job_parameters();
        let number = JobParametersBuilder::new().add_long("n", 3).to_job_parameters();
        assert_ne!(text.job_key(), number.job_key());

        let joined = JobParametersBuilder::new()
            .add_string("a", "1,b=2")
            .to_job_parameters();
        let split = JobParametersBuilder::new()
            .add_string("a", "1")
            .add_string("b", "2")
            .to_job_parameters();
        assert_eq!(joined.to_string(), split.to_string());
        assert_ne!(joined.job_key(), split.job_key());

        let semi = JobParametersBuilder::new()
            .add_string("a", "1;b=string:2")
            .to_job_parameters();
        assert_ne!(semi.job_key(), split.job_key());
    }

    #[test]
    fn serialization_is_stable_for_equal_sets() {
        let a = JobParametersBuilder::new()
            .add_string("b", "2")
            .add_string("a", "1")
            .to_job_parameters();
        let b = JobParametersBuilder::new()
            .add_string("a", "1")
            .add_string("b", "2")
            .to_job_parameters();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        let back: JobParameters = serde_json::from_str(&serde_json::to_string(&a).unwrap()).unwrap();
        assert_eq!(back, a);
    }
}
