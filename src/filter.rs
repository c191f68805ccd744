//! Query filters and pagination for list routes.
//!
//! A resource's filter parameters are the configured `query_params` whose model fields
//! have a filterable type. Each parameter may repeat: values of one parameter are OR'd,
//! distinct parameters are AND'd.

use crate::error::AppError;
use crate::model::{ResourceModel, Row};
use crate::schema::FieldType;
use serde_json::Value;

pub const SKIP_PARAM: &str = "skip";
pub const LIMIT_PARAM: &str = "limit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterParam {
    pub name: String,
    pub ty: FieldType,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub params: Vec<FilterParam>,
}

impl FilterSpec {
    pub fn new(params: Vec<FilterParam>) -> Self {
        FilterSpec { params }
    }

    pub fn for_model(model: &ResourceModel) -> Self {
        let params = model
            .query_params
            .iter()
            .filter_map(|name| model.field(name))
            .filter(|f| f.ty.is_filterable())
            .map(|f| FilterParam {
                name: f.name.clone(),
                ty: f.ty,
            })
            .collect();
        FilterSpec { params }
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Collect and type the values of known parameters; other query keys are ignored.
    pub fn parse(&self, query: &[(String, String)]) -> Result<Filter, AppError> {
        let mut terms = Vec::new();
        for p in &self.params {
            let mut values = Vec::new();
            for (_, raw) in query.iter().filter(|(k, _)| *k == p.name) {
                let v = p.ty.parse_str(raw).ok_or_else(|| {
                    AppError::Validation(format!("query parameter {}: '{}' is not a valid {}", p.name, raw, p.ty))
                })?;
                values.push(v);
            }
            if !values.is_empty() {
                terms.push(FilterTerm {
                    field: p.name.clone(),
                    values,
                });
            }
        }
        Ok(Filter { terms })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterTerm {
    pub field: String,
    pub values: Vec<Value>,
}

/// AND of terms, each an OR of equality tests. Empty matches everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub terms: Vec<FilterTerm>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.terms.iter().all(|t| {
            let cell = row.get(&t.field).unwrap_or(&Value::Null);
            t.values.iter().any(|v| values_equal(cell, v))
        })
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub skip: u64,
    pub limit: u64,
}

impl Pagination {
    /// `limit` defaults to and is capped at the resource's `paginate`.
    pub fn parse(skip: Option<&str>, limit: Option<&str>, paginate: u32) -> Result<Self, AppError> {
        let max = u64::from(paginate);
        let skip = match skip {
            Some(s) => parse_count(SKIP_PARAM, s)?,
            None => 0,
        };
        let limit = match limit {
            Some(s) => parse_count(LIMIT_PARAM, s)?.min(max),
            None => max,
        };
        Ok(Pagination { skip, limit })
    }

    pub fn from_query(query: &[(String, String)], paginate: u32) -> Result<Self, AppError> {
        let get = |key: &str| query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        Self::parse(get(SKIP_PARAM), get(LIMIT_PARAM), paginate)
    }
}

fn parse_count(name: &str, s: &str) -> Result<u64, AppError> {
    s.trim()
        .parse::<u64>()
        .map_err(|_| AppError::Validation(format!("query parameter {}: '{}' is not a non-negative integer", name, s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> FilterSpec {
        FilterSpec::new(vec![
            FilterParam {
                name: "name".into(),
                ty: FieldType::String,
            },
            FilterParam {
                name: "age".into(),
                ty: FieldType::Integer,
            },
        ])
    }

    fn q(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn row(v: Value) -> Row {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn or_within_and_across() {
        let f = spec()
            .parse(&q(&[("name", "Patrick"), ("name", "Vivienne"), ("age", "28"), ("other", "x")]))
            .unwrap();
        assert_eq!(f.terms.len(), 2);
        assert_eq!(f.terms[0].values, vec![json!("Patrick"), json!("Vivienne")]);
        assert!(f.matches(&row(json!({"name": "Patrick", "age": 28}))));
        assert!(f.matches(&row(json!({"name": "Vivienne", "age": 28}))));
        assert!(!f.matches(&row(json!({"name": "Patrick", "age": 36}))));
        assert!(!f.matches(&row(json!({"name": "Max", "age": 28}))));
    }

    #[test]
    fn malformed_value_is_validation_error() {
        assert!(matches!(
            spec().parse(&q(&[("age", "old")])),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn empty_filter_matches_all() {
        let f = spec().parse(&[]).unwrap();
        assert!(f.is_empty());
        assert!(f.matches(&row(json!({"name": "x"}))));
    }

    #[test]
    fn limit_is_capped() {
        assert_eq!(Pagination::parse(None, None, 10).unwrap(), Pagination { skip: 0, limit: 10 });
        assert_eq!(Pagination::parse(Some("5"), Some("50"), 10).unwrap(), Pagination { skip: 5, limit: 10 });
        assert_eq!(Pagination::parse(None, Some("3"), 10).unwrap().limit, 3);
        assert!(Pagination::parse(Some("-1"), None, 10).is_err());
    }
}
