use crate::error::{PipelineError, ValidationError};
use crate::pipeline::{Context, Step};

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Type of a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    /// `true`/`false` and the usual spellings (`y`, `no`, `on`, `0`, ...).
    Bool,
    /// 64-bit float.
    Float,
    /// 64-bit signed integer.
    Int,
    /// Any string.
    Str,
}

impl ParamKind {
    const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Float => "float",
            Self::Int => "int",
            Self::Str => "str",
        }
    }

    fn cast(self, raw: &str) -> Option<ParamValue> {
        match self {
            Self::Bool => parse_bool(raw).map(ParamValue::Bool),
            Self::Float => raw.trim().parse().ok().map(ParamValue::Float),
            Self::Int => raw.trim().parse().ok().map(ParamValue::Int),
            Self::Str => Some(ParamValue::Str(raw.to_string())),
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Some(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// A typed parameter value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean value.
    Bool(bool),
    /// Float value.
    Float(f64),
    /// Integer value.
    Int(i64),
    /// String value.
    Str(String),
}

/// A named, typed parameter with an optional default.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    /// Name as used in filter strings.
    pub name: String,
    /// Expected type.
    pub kind: ParamKind,
    /// Value used when the filter leaves the parameter out. `None` makes it required.
    pub default: Option<ParamValue>,
}

impl Parameter {
    /// A parameter the filter must supply.
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    /// A parameter falling back to `default`.
    pub fn optional(name: impl Into<String>, kind: ParamKind, default: ParamValue) -> Self {
        Self {
            name: name.into(),
            kind,
            default: Some(default),
        }
    }

    /// Whether the filter must supply this parameter.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Parsed `name1=value1&name2=value2` filter string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterQuery {
    pairs: BTreeMap<String, String>,
}

impl FilterQuery {
    /// Parses a filter string. An empty string yields an empty query; later pairs
    /// override earlier ones with the same name.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidFilter` if a pair is not `name=value`.
    pub fn parse(filter: &str) -> Result<Self, ValidationError> {
        let mut pairs = BTreeMap::new();

        if filter.trim().is_empty() {
            return Ok(Self { pairs });
        }

        for single in filter.split('&') {
            let mut parts = single.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(name), Some(value), None) if !name.is_empty() => {
                    pairs.insert(name.to_string(), value.to_string());
                }
                _ => return Err(ValidationError::InvalidFilter(filter.to_string())),
            }
        }

        Ok(Self { pairs })
    }

    /// Raw value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs.get(name).map(String::as_str)
    }
}

/// Arguments resolved from a filter against a parameter set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Arguments {
    values: BTreeMap<String, ParamValue>,
}

impl Arguments {
    /// Value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Integer value of `name`.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(ParamValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    /// Float value of `name`.
    #[must_use]
    pub fn float(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            Some(ParamValue::Float(value)) => Some(*value),
            _ => None,
        }
    }

    /// String value of `name`.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(ParamValue::Str(value)) => Some(value),
            _ => None,
        }
    }

    /// Boolean value of `name`.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(ParamValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    /// All arguments as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.values).unwrap_or(Value::Null)
    }
}

/// The parameters a step declares.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    /// Creates a parameter set.
    #[must_use]
    pub const fn new(params: Vec<Parameter>) -> Self {
        Self { params }
    }

    /// Resolves `query` into typed arguments.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if a required parameter is missing, a value
    /// does not cast, or the query names an undeclared parameter.
    pub fn bind(&self, query: &FilterQuery) -> Result<Arguments, ValidationError> {
        if let Some(unknown) = query
            .pairs
            .keys()
            .find(|name| !self.params.iter().any(|p| &p.name == *name))
        {
            return Err(ValidationError::UnknownParameter(unknown.clone()));
        }

        let mut values = BTreeMap::new();
        for param in &self.params {
            let value = match (query.get(&param.name), &param.default) {
                (Some(raw), _) => {
                    param
                        .kind
                        .cast(raw)
                        .ok_or_else(|| ValidationError::InvalidValue {
                            name: param.name.clone(),
                            value: raw.to_string(),
                            kind: param.kind.name(),
                        })?
                }
                (None, Some(default)) => default.clone(),
                (None, None) => return Err(ValidationError::MissingParameter(param.name.clone())),
            };
            values.insert(param.name.clone(), value);
        }

        Ok(Arguments { values })
    }
}

/// A step whose arguments come from a filter string.
///
/// The filter is parsed and checked when the step is built, so a malformed
/// filter never reaches a running pipeline.
pub struct ParameterizedStep<F> {
    arguments: Arguments,
    f: F,
    name: String,
}

impl<F> ParameterizedStep<F>
where
    F: Fn(&Arguments, Context) -> Result<Context, PipelineError> + Send + Sync + 'static,
{
    /// Builds the step.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the filter does not parse or does not fit
    /// `params`.
    pub fn new(
        name: impl Into<String>,
        params: &ParameterSet,
        filter: &str,
        f: F,
    ) -> Result<Self, ValidationError> {
        let arguments = params.bind(&FilterQuery::parse(filter)?)?;

        Ok(Self {
            arguments,
            f,
            name: name.into(),
        })
    }

    /// The bound arguments.
    #[must_use]
    pub const fn arguments(&self) -> &Arguments {
        &self.arguments
    }
}

#[async_trait]
impl<F> Step for ParameterizedStep<F>
where
    F: Fn(&Arguments, Context) -> Result<Context, PipelineError> + Send + Sync + 'static,
{
    async fn call(&self, context: Context) -> Result<Context, PipelineError> {
        (self.f)(&self.arguments, context)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;

    use assert_matches::assert_matches;
    use serde_json::json;

    fn arrivals_params() -> ParameterSet {
        ParameterSet::new(vec![
            Parameter::required("airport", ParamKind::Str),
            Parameter::optional("limit", ParamKind::Int, ParamValue::Int(10)),
            Parameter::optional("delayed", ParamKind::Bool, ParamValue::Bool(false)),
        ])
    }

    #[test]
    fn test_parse_filter() {
        let query = FilterQuery::parse("airport=EBBR&limit=5").unwrap();

        assert_eq!(query.get("airport"), Some("EBBR"));
        assert_eq!(query.get("limit"), Some("5"));
        assert_eq!(FilterQuery::parse("").unwrap(), FilterQuery::default());
    }

    #[test]
    fn test_parse_rejects_malformed_pairs() {
        for filter in ["airport", "airport=EBBR&limit", "a=b=c", "=EBBR"] {
            assert_matches!(
                FilterQuery::parse(filter),
                Err(ValidationError::InvalidFilter(_)),
                "{filter}"
            );
        }
    }

    #[test]
    fn test_bind_applies_defaults_and_casts() {
        let query = FilterQuery::parse("airport=EBBR&delayed=yes").unwrap();

        let args = arrivals_params().bind(&query).unwrap();

        assert_eq!(args.str("airport"), Some("EBBR"));
        assert_eq!(args.int("limit"), Some(10));
        assert_eq!(args.bool("delayed"), Some(true));
        assert_eq!(
            args.to_json(),
            json!({"airport": "EBBR", "limit": 10, "delayed": true})
        );
    }

    #[test]
    fn test_bind_errors() {
        let params = arrivals_params();

        assert_eq!(
            params.bind(&FilterQuery::parse("limit=5").unwrap()),
            Err(ValidationError::MissingParameter("airport".to_string()))
        );
        assert_matches!(
            params.bind(&FilterQuery::parse("airport=EBBR&limit=five").unwrap()),
            Err(ValidationError::InvalidValue { name, kind: "int", .. }) if name == "limit"
        );
        assert_eq!(
            params.bind(&FilterQuery::parse("airport=EBBR&runway=25L").unwrap()),
            Err(ValidationError::UnknownParameter("runway".to_string()))
        );
    }

    #[test]
    fn test_float_and_bool_spellings() {
        let params = ParameterSet::new(vec![
            Parameter::required("lat", ParamKind::Float),
            Parameter::required("on", ParamKind::Bool),
        ]);

        let args = params
            .bind(&FilterQuery::parse("lat=50.9&on=OFF").unwrap())
            .unwrap();

        assert_eq!(args.float("lat"), Some(50.9));
        assert_eq!(args.bool("on"), Some(false));
    }

    #[tokio::test]
    async fn test_parameterized_step_in_pipeline() {
        let step = ParameterizedStep::new(
            "arrivals",
            &arrivals_params(),
            "airport=EBBR&limit=2",
            |args: &Arguments, _| {
                Ok(json!({
                    "airport": args.str("airport"),
                    "limit": args.int("limit"),
                }))
            },
        )
        .unwrap();

        let pipeline = Pipeline::new().step(step);

        assert_eq!(
            pipeline.run(Value::Null).await.unwrap(),
            json!({"airport": "EBBR", "limit": 2})
        );
    }

    #[test]
    fn test_parameterized_step_validates_on_construction() {
        let result = ParameterizedStep::new(
            "arrivals",
            &arrivals_params(),
            "limit=2",
            |_: &Arguments, context| Ok(context),
        );

        assert_matches!(result.map(|_| ()), Err(ValidationError::MissingParameter(_)));
    }
}
