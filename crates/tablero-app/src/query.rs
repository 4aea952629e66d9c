// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Search mini-language.
//!
//! `cor=a@b.com | (id=5 & des=fuga)` reads as "email is a@b.com, or id is 5
//! and the description mentions fuga". Single-condition groups land in the
//! bucket of their field; multi-condition groups are packed into one opaque
//! `combinado` token that the server unpacks. Input without any operator is
//! a plain description search.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::{FieldCode, FieldSchema};

pub const COMBINED_KEY: &str = "combinado";

/// Bytes left alone by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    MalformedCondition { condition: String },
    UnknownField { field: String, allowed: String },
    EmptyValue { field: String },
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedCondition { condition } => {
                write!(f, "malformed condition \"{condition}\"; use field=value")
            }
            Self::UnknownField { field, allowed } => {
                write!(f, "unknown field \"{field}\"; allowed fields: {allowed}")
            }
            Self::EmptyValue { field } => write!(f, "missing value for field \"{field}\""),
        }
    }
}

impl std::error::Error for QueryError {}

/// Values collected per field plus the combined tokens, in output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    buckets: Vec<(FieldCode, Vec<String>)>,
    combined: Vec<String>,
}

impl ParameterSet {
    fn empty(schema: FieldSchema) -> Self {
        Self {
            buckets: schema
                .fields()
                .into_iter()
                .map(|field| (field, Vec::new()))
                .collect(),
            combined: Vec::new(),
        }
    }

    fn push(&mut self, field: FieldCode, value: String) {
        if let Some((_, values)) = self.buckets.iter_mut().find(|(code, _)| *code == field) {
            values.push(value);
        }
    }

    pub fn values(&self, field: FieldCode) -> &[String] {
        self.buckets
            .iter()
            .find(|(code, _)| *code == field)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn combined(&self) -> &[String] {
        &self.combined
    }

    pub fn is_empty(&self) -> bool {
        self.combined.is_empty() && self.buckets.iter().all(|(_, values)| values.is_empty())
    }

    /// Packs a multi-condition group as `f=v1,v2:f2=v3` in field order.
    fn combined_token(&self) -> Option<String> {
        let parts: Vec<String> = self
            .buckets
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(field, values)| format!("{}={}", field.as_str(), values.join(",")))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(":"))
        }
    }

    pub fn to_query_string(&self) -> String {
        let fields = self.buckets.iter().flat_map(|(field, values)| {
            values
                .iter()
                .map(move |value| format!("{}={}", field.as_str(), encode_component(value)))
        });
        let combined = self
            .combined
            .iter()
            .map(|token| format!("{COMBINED_KEY}={}", encode_component(token)));
        fields.chain(combined).collect::<Vec<_>>().join("&")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryParser {
    schema: FieldSchema,
}

impl QueryParser {
    pub const fn new(schema: FieldSchema) -> Self {
        Self { schema }
    }

    pub const fn schema(self) -> FieldSchema {
        self.schema
    }

    /// Normalized query string for the search endpoint. Blank input yields
    /// an empty string, meaning no filter.
    pub fn parse(self, input: &str) -> Result<String, QueryError> {
        if input.trim().is_empty() {
            return Ok(String::new());
        }
        if !input.contains(['=', '|', '&']) {
            return Ok(format!("{}={}", FieldCode::Des.as_str(), encode_component(input)));
        }
        Ok(self.parameters(input)?.to_query_string())
    }

    pub fn parameters(self, input: &str) -> Result<ParameterSet, QueryError> {
        let mut params = ParameterSet::empty(self.schema);
        if !input.contains(['=', '|', '&']) {
            if !input.trim().is_empty() {
                params.push(FieldCode::Des, input.to_owned());
            }
            return Ok(params);
        }

        for group in input.split('|') {
            let group = strip_group_parens(group.trim());
            let conditions: Vec<&str> = group.split('&').map(str::trim).collect();
            let multi = conditions.len() > 1;
            let mut scratch = ParameterSet::empty(self.schema);

            for condition in conditions {
                let (field, value) = self.condition(condition)?;
                if multi {
                    scratch.push(field, value);
                } else {
                    params.push(field, value);
                }
            }

            if multi && let Some(token) = scratch.combined_token() {
                params.combined.push(token);
            }
        }
        Ok(params)
    }

    fn condition(self, condition: &str) -> Result<(FieldCode, String), QueryError> {
        let mut parts = condition.split('=');
        let (Some(field), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(QueryError::MalformedCondition {
                condition: condition.to_owned(),
            });
        };
        let (field, value) = (field.trim(), value.trim());
        let Some(code) = self.schema.field(field) else {
            return Err(QueryError::UnknownField {
                field: field.to_owned(),
                allowed: self.schema.allowed_list(),
            });
        };
        if value.is_empty() {
            return Err(QueryError::EmptyValue {
                field: field.to_owned(),
            });
        }
        Ok((code, value.to_owned()))
    }
}

/// Drops one leading `(` and one trailing `)`; nested parens are kept.
fn strip_group_parens(group: &str) -> &str {
    let group = group.strip_prefix('(').unwrap_or(group);
    let group = group.strip_suffix(')').unwrap_or(group);
    group.trim()
}

pub fn parse_query(input: &str) -> Result<String, QueryError> {
    QueryParser::default().parse(input)
}

#[cfg(test)]
mod tests {
    use super::{QueryError, QueryParser, encode_component, parse_query};
    use crate::{FieldCode, FieldSchema};

    #[test]
    fn plain_text_searches_description() {
        assert_eq!(parse_query("fuga de agua").unwrap(), "des=fuga%20de%20agua");
        assert_eq!(parse_query("a@b (x)").unwrap(), "des=a%40b%20(x)");
        assert_eq!(parse_query("   ").unwrap(), "");
    }

    #[test]
    fn single_condition_goes_to_its_bucket() {
        assert_eq!(parse_query("id=5").unwrap(), "id=5");
        assert_eq!(parse_query(" des = hola mundo ").unwrap(), "des=hola%20mundo");
    }

    #[test]
    fn or_groups_follow_field_order() {
        assert_eq!(
            parse_query("cor=a@b.com|cod=X1").unwrap(),
            "cor=a%40b.com&cod=X1"
        );
        assert_eq!(parse_query("cod=X1 | cor=a@b.com").unwrap(), "cor=a%40b.com&cod=X1");
        assert_eq!(parse_query("id=1|id=2").unwrap(), "id=1&id=2");
    }

    #[test]
    fn and_group_becomes_combined_token() {
        assert_eq!(
            parse_query("id=5&des=hola").unwrap(),
            "combinado=id%3D5%3Ades%3Dhola"
        );
        assert_eq!(
            parse_query("des=b & id=5 & des=c").unwrap(),
            "combinado=id%3D5%3Ades%3Db%2Cc"
        );
    }

    #[test]
    fn mixed_groups_keep_buckets_before_combined() {
        let params = QueryParser::default()
            .parameters("(id=5 & cod=A) | cor=x@y.z | (des=foo & des=bar)")
            .unwrap();
        assert_eq!(params.values(FieldCode::Cor), ["x@y.z"]);
        assert_eq!(params.combined(), ["cod=A:id=5", "des=foo,bar"]);
        assert_eq!(
            params.to_query_string(),
            "cor=x%40y.z&combinado=cod%3DA%3Aid%3D5&combinado=des%3Dfoo%2Cbar"
        );
    }

    #[test]
    fn parens_are_stripped_once() {
        assert_eq!(parse_query("(id=5)").unwrap(), "id=5");
        let err = parse_query("((id=5))").unwrap_err();
        assert!(matches!(err, QueryError::UnknownField { ref field, .. } if field == "(id"));
    }

    #[test]
    fn unknown_field_lists_allowed() {
        let err = parse_query("foo=bar").unwrap_err();
        assert_eq!(
            err,
            QueryError::UnknownField {
                field: "foo".to_owned(),
                allowed: "cor, cod, id, des".to_owned(),
            }
        );
        assert!(err.to_string().contains("foo"));
        assert!(err.to_string().contains("cor, cod, id, des"));
    }

    #[test]
    fn empty_value_names_field() {
        let err = parse_query("id=").unwrap_err();
        assert_eq!(
            err,
            QueryError::EmptyValue {
                field: "id".to_owned()
            }
        );
        assert!(err.to_string().contains("\"id\""));
    }

    #[test]
    fn malformed_conditions_are_rejected() {
        for input in ["id=5=6", "id=5&cod", "id=5|", "des=a&&id=1"] {
            let err = parse_query(input).unwrap_err();
            assert!(
                matches!(err, QueryError::MalformedCondition { .. }),
                "{input}: {err:?}"
            );
        }
    }

    #[test]
    fn first_error_wins() {
        let err = parse_query("foo=1|id=").unwrap_err();
        assert!(matches!(err, QueryError::UnknownField { .. }));
    }

    #[test]
    fn legacy_schema_accepts_name_field() {
        let legacy = QueryParser::new(FieldSchema::Legacy);
        assert_eq!(legacy.parse("nom=Ana|id=2").unwrap(), "nom=Ana&id=2");
        let err = legacy.parse("cor=a@b.com").unwrap_err();
        assert!(err.to_string().contains("nom, cod, id, des"));
    }

    #[test]
    fn parsing_is_repeatable() {
        let input = "(cor=a@b.com & des=x y) | id=9";
        let first = parse_query(input).unwrap();
        for _ in 0..5 {
            assert_eq!(parse_query(input).unwrap(), first);
        }
    }

    #[test]
    fn encoding_matches_uri_component_rules() {
        assert_eq!(encode_component("a-b_c.d!e~f*g'h(i)j"), "a-b_c.d!e~f*g'h(i)j");
        assert_eq!(encode_component("á ñ/?#"), "%C3%A1%20%C3%B1%2F%3F%23");
    }
}
