//! Request validation.
//!
//! Request bodies are first parsed as untyped JSON, then converted field by
//! field into typed values. Every problem found is reported, not just the
//! first one, using the `{loc, msg, type}` shape from [`FieldError`].

use crate::error::{AppError, FieldError};
use axum::{
    Json,
    extract::{FromRequest, Path, Query, Request, rejection::JsonRejection, rejection::PathRejection, rejection::QueryRejection},
};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// Conversion from an untyped JSON value at location `loc`.
pub trait FromJson: Sized {
    fn from_json(value: &Value, loc: &[Value]) -> Result<Self, Vec<FieldError>>;
}

/// JSON body extractor that runs [`FromJson`] validation.
///
/// Rejections are always [`AppError::Validation`], so handlers never see
/// axum's plain-text rejection bodies.
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: FromJson,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<Value>::from_request(req, state)
            .await
            .map_err(json_rejection)?;

        T::from_json(&value, &[json!("body")])
            .map(ValidJson)
            .map_err(AppError::Validation)
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    let kind = match rejection {
        JsonRejection::MissingJsonContentType(_) => "content_type",
        _ => "json_invalid",
    };
    AppError::validation(vec![json!("body")], rejection.body_text(), kind)
}

/// Collects typed fields out of a JSON object, recording every failure.
pub struct Fields<'a> {
    object: Option<&'a Map<String, Value>>,
    loc: Vec<Value>,
    errors: Vec<FieldError>,
}

impl<'a> Fields<'a> {
    pub fn new(value: &'a Value, loc: &[Value]) -> Self {
        let mut fields = Self {
            object: value.as_object(),
            loc: loc.to_vec(),
            errors: Vec::new(),
        };
        if fields.object.is_none() {
            fields.errors.push(FieldError::new(
                fields.loc.clone(),
                "Input should be a valid dictionary",
                "dict_type",
            ));
        }
        fields
    }

    fn field_loc(&self, name: &str) -> Vec<Value> {
        let mut loc = self.loc.clone();
        loc.push(json!(name));
        loc
    }

    fn raw(&self, name: &str) -> Option<&'a Value> {
        self.object.and_then(|o| o.get(name)).filter(|v| !v.is_null())
    }

    /// Record a failure for `name`.
    pub fn reject(&mut self, name: &str, msg: impl Into<String>, kind: &str) {
        let loc = self.field_loc(name);
        self.errors.push(FieldError::new(loc, msg, kind));
    }

    pub fn required_str(&mut self, name: &str) -> Option<String> {
        if self.object.is_none() {
            return None;
        }
        match self.raw(name) {
            None => {
                self.reject(name, "Field required", "missing");
                None
            }
            Some(value) => self.as_string(name, value),
        }
    }

    /// A string that may be absent or null.
    pub fn optional_str(&mut self, name: &str) -> Option<String> {
        let value = self.raw(name)?;
        self.as_string(name, value)
    }

    pub fn optional_bool(&mut self, name: &str) -> Option<bool> {
        let value = self.raw(name)?;
        match value.as_bool() {
            Some(b) => Some(b),
            None => {
                self.reject(name, "Input should be a valid boolean", "bool_type");
                None
            }
        }
    }

    pub fn required_array(&mut self, name: &str) -> Option<&'a Vec<Value>> {
        if self.object.is_none() {
            return None;
        }
        match self.raw(name) {
            None => {
                self.reject(name, "Field required", "missing");
                None
            }
            Some(Value::Array(items)) => Some(items),
            Some(_) => {
                self.reject(name, "Input should be a valid list", "list_type");
                None
            }
        }
    }

    /// Validate a nested value with its own [`FromJson`] impl.
    pub fn nested<T: FromJson>(&mut self, loc: &[Value], value: &Value) -> Option<T> {
        match T::from_json(value, loc) {
            Ok(parsed) => Some(parsed),
            Err(errors) => {
                self.errors.extend(errors);
                None
            }
        }
    }

    fn as_string(&mut self, name: &str, value: &Value) -> Option<String> {
        match value.as_str() {
            Some(s) => Some(s.to_string()),
            None => {
                self.reject(name, "Input should be a valid string", "string_type");
                None
            }
        }
    }

    pub fn loc(&self) -> &[Value] {
        &self.loc
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<FieldError> {
        self.errors
    }
}

/// `skip`/`limit` pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub skip: i64,
    pub limit: i64,
}

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;

impl Default for Pagination {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    /// Parse pagination from the raw query map.
    pub fn from_query(query: Result<Query<HashMap<String, String>>, QueryRejection>) -> Result<Self, AppError> {
        let Query(params) = query.map_err(|rejection| {
            AppError::validation(vec![json!("query")], rejection.body_text(), "query_invalid")
        })?;

        let mut errors = Vec::new();
        let skip = parse_bounded(&params, "skip", 0, 0, i64::MAX, &mut errors);
        let limit = parse_bounded(&params, "limit", DEFAULT_LIMIT, 1, MAX_LIMIT, &mut errors);

        if errors.is_empty() {
            Ok(Self { skip, limit })
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

fn parse_bounded(
    params: &HashMap<String, String>,
    name: &str,
    default: i64,
    min: i64,
    max: i64,
    errors: &mut Vec<FieldError>,
) -> i64 {
    let Some(raw) = params.get(name) else {
        return default;
    };
    let loc = vec![json!("query"), json!(name)];
    match raw.parse::<i64>() {
        Ok(n) if n < min => {
            errors.push(FieldError::new(
                loc,
                format!("Input should be greater than or equal to {min}"),
                "greater_than_equal",
            ));
            default
        }
        Ok(n) if n > max => {
            errors.push(FieldError::new(
                loc,
                format!("Input should be less than or equal to {max}"),
                "less_than_equal",
            ));
            default
        }
        Ok(n) => n,
        Err(_) => {
            errors.push(FieldError::new(
                loc,
                "Input should be a valid integer, unable to parse string as an integer",
                "int_parsing",
            ));
            default
        }
    }
}

/// Integer token id from the request path.
pub fn token_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    path.map(|Path(id)| id).map_err(|_| {
        AppError::validation(
            vec![json!("path"), json!("token_id")],
            "Input should be a valid integer, unable to parse string as an integer",
            "int_parsing",
        )
    })
}

/// String segment `name` from the request path.
///
/// Segments that do not percent-decode to UTF-8 are rejected here so they
/// get the same error shape as every other parameter.
pub fn path_param(path: Result<Path<String>, PathRejection>, name: &'static str) -> Result<String, AppError> {
    path.map(|Path(value)| value).map_err(|rejection| {
        AppError::validation(
            vec![json!("path"), json!(name)],
            rejection.body_text(),
            "string_unicode",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> Result<Query<HashMap<String, String>>, QueryRejection> {
        Ok(Query(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }

    #[test]
    fn pagination_defaults() {
        assert_eq!(Pagination::from_query(query(&[])).unwrap(), Pagination::default());
    }

    #[test]
    fn pagination_rejects_out_of_range_values() {
        let err = Pagination::from_query(query(&[("skip", "-1"), ("limit", "5000")])).unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].loc, vec![json!("query"), json!("skip")]);
        assert_eq!(errors[1].kind, "less_than_equal");
    }

    #[test]
    fn pagination_rejects_non_numeric() {
        let err = Pagination::from_query(query(&[("limit", "ten")])).unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors[0].kind, "int_parsing");
    }

    #[test]
    fn fields_reports_every_problem() {
        let value = json!({"name": 5, "flag": "yes"});
        let mut fields = Fields::new(&value, &[json!("body")]);
        assert!(fields.required_str("name").is_none());
        assert!(fields.required_str("missing").is_none());
        assert!(fields.optional_bool("flag").is_none());
        assert!(fields.optional_str("absent").is_none());

        let kinds: Vec<_> = fields.into_errors().into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec!["string_type", "missing", "bool_type"]);
    }

    #[test]
    fn non_object_body_is_a_single_error() {
        let value = json!([1, 2]);
        let mut fields = Fields::new(&value, &[json!("body")]);
        assert!(fields.required_str("uuid").is_none());
        let errors = fields.into_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, "dict_type");
    }
}
