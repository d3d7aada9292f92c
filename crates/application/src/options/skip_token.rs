use querylens_core::{AppError, AppResult, ValidationError};
use querylens_domain::BinaryOperatorKind;
use serde_json::Value;

use crate::expression::Expr;
use crate::query::SortKey;
use crate::wrappers::Row;

/// Decoded `$skiptoken`: the ordering values of the last row already served.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkipToken {
    values: Vec<(String, Value)>,
}

impl SkipToken {
    /// Creates a token from `(property, value)` pairs in ordering order.
    #[must_use]
    pub fn new(values: Vec<(String, Value)>) -> Self {
        Self { values }
    }

    /// Returns `(property, value)` pairs in ordering order.
    #[must_use]
    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }
}

/// Encodes and interprets server-driven paging tokens.
pub trait SkipTokenHandler: Send + Sync {
    /// Decodes raw `$skiptoken` text.
    fn parse(&self, raw: &str) -> AppResult<SkipToken>;

    /// Builds the predicate keeping rows ordered after the token.
    fn predicate(&self, token: &SkipToken, variable: &str, keys: &[SortKey]) -> AppResult<Expr>;

    /// Encodes the token for the page after `last`; `None` when no key can be encoded.
    fn next_token(&self, last: &Row, variable: &str, keys: &[SortKey])
    -> AppResult<Option<String>>;
}

/// Handler for `Name-value` pairs separated by commas, values as JSON literals.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSkipTokenHandler;

fn malformed(raw: &str, reason: &str) -> AppError {
    ValidationError::invalid(format!("skip token '{raw}' is malformed: {reason}")).into()
}

/// Names of the sort keys that read a property of the row variable.
fn key_properties<'k>(keys: &'k [SortKey], variable: &str) -> Vec<(&'k str, bool)> {
    keys.iter()
        .filter_map(|key| match &key.expression {
            Expr::Member { source, name }
                if matches!(source.as_ref(), Expr::Parameter { name: parameter } if parameter == variable) =>
            {
                Some((name.as_str(), key.descending))
            }
            _ => None,
        })
        .collect()
}

/// `key` strictly after `value` in an ordering where nulls come first.
fn after(key: Expr, value: &Value, descending: bool) -> Expr {
    let constant = Expr::constant(value.clone());
    match (value.is_null(), descending) {
        (true, false) => Expr::binary(
            BinaryOperatorKind::NotEqual,
            key,
            Expr::constant(Value::Null),
            false,
        ),
        (true, true) => Expr::constant(Value::Bool(false)),
        (false, false) => Expr::binary(BinaryOperatorKind::GreaterThan, key, constant, false),
        (false, true) => Expr::binary(
            BinaryOperatorKind::Or,
            Expr::binary(BinaryOperatorKind::LessThan, key.clone(), constant, false),
            Expr::binary(
                BinaryOperatorKind::Equal,
                key,
                Expr::constant(Value::Null),
                false,
            ),
            false,
        ),
    }
}

impl SkipTokenHandler for DefaultSkipTokenHandler {
    fn parse(&self, raw: &str) -> AppResult<SkipToken> {
        let mut values = Vec::new();
        let mut rest = raw.trim();
        while !rest.is_empty() {
            let (name, tail) = rest
                .split_once('-')
                .ok_or_else(|| malformed(raw, "expected 'Name-value'"))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(malformed(raw, "empty property name"));
            }

            let mut stream = serde_json::Deserializer::from_str(tail).into_iter::<Value>();
            let value = match stream.next() {
                Some(Ok(value)) => value,
                Some(Err(error)) => return Err(malformed(raw, &error.to_string())),
                None => return Err(malformed(raw, "missing value")),
            };
            let consumed = stream.byte_offset();
            values.push((name.to_owned(), value));

            let remaining = tail[consumed..].trim_start();
            rest = match remaining.strip_prefix(',') {
                Some(next) if !next.trim().is_empty() => next.trim_start(),
                Some(_) => return Err(malformed(raw, "trailing ','")),
                None if remaining.is_empty() => remaining,
                None => return Err(malformed(raw, "expected ','")),
            };
        }

        if values.is_empty() {
            return Err(malformed(raw, "no values"));
        }
        Ok(SkipToken::new(values))
    }

    fn predicate(&self, token: &SkipToken, variable: &str, keys: &[SortKey]) -> AppResult<Expr> {
        let directions = key_properties(keys, variable);
        let mut predicate: Option<Expr> = None;
        let mut equal_so_far: Option<Expr> = None;

        for (name, value) in token.values() {
            let descending = directions
                .iter()
                .find(|(key, _)| key == name)
                .is_some_and(|(_, descending)| *descending);
            let key = Expr::member(Expr::parameter(variable), name.as_str());

            let strictly_after = after(key.clone(), value, descending);
            let branch = match &equal_so_far {
                Some(equal) => {
                    Expr::binary(BinaryOperatorKind::And, equal.clone(), strictly_after, false)
                }
                None => strictly_after,
            };
            predicate = Some(match predicate {
                Some(previous) => Expr::binary(BinaryOperatorKind::Or, previous, branch, false),
                None => branch,
            });

            let equal = Expr::binary(
                BinaryOperatorKind::Equal,
                key,
                Expr::constant(value.clone()),
                false,
            );
            equal_so_far = Some(match equal_so_far {
                Some(previous) => Expr::binary(BinaryOperatorKind::And, previous, equal, false),
                None => equal,
            });
        }

        predicate.ok_or_else(|| AppError::Internal("skip token carries no values".to_owned()))
    }

    fn next_token(
        &self,
        last: &Row,
        variable: &str,
        keys: &[SortKey],
    ) -> AppResult<Option<String>> {
        let properties = key_properties(keys, variable);
        if properties.is_empty() {
            return Ok(None);
        }

        let mut encoded = Vec::with_capacity(properties.len());
        for (name, _) in properties {
            let value = last.property(name).unwrap_or(Value::Null);
            let literal = serde_json::to_string(&value)
                .map_err(|error| AppError::Internal(format!("skip token value: {error}")))?;
            encoded.push(format!("{name}-{literal}"));
        }

        Ok(Some(encoded.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{DefaultSkipTokenHandler, SkipTokenHandler};
    use crate::expression::Expr;
    use crate::query::SortKey;
    use crate::wrappers::Row;

    fn key(name: &str, descending: bool) -> SortKey {
        SortKey {
            expression: Expr::member(Expr::parameter("$it"), name),
            descending,
        }
    }

    #[test]
    fn parses_json_literals_with_commas_inside_strings() {
        let token = DefaultSkipTokenHandler
            .parse(r#"Name-"Doe, Jane",Age--3,Id-7"#)
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(
            token.values(),
            &[
                ("Name".to_owned(), json!("Doe, Jane")),
                ("Age".to_owned(), json!(-3)),
                ("Id".to_owned(), json!(7)),
            ]
        );
    }

    #[test]
    fn rejects_malformed_tokens() {
        for raw in ["", "Name", "Name-", "-5", "Id-1,", "Id-1 Age-2"] {
            assert!(DefaultSkipTokenHandler.parse(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn next_token_encodes_the_property_keys_of_the_last_row() {
        let row = Row::Instance(json!({"Id": 3, "Name": "Carol"}));
        let keys = vec![
            key("Name", false),
            SortKey {
                expression: Expr::constant(Value::Null),
                descending: false,
            },
            key("Id", false),
        ];

        let token = DefaultSkipTokenHandler
            .next_token(&row, "$it", &keys)
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(token.as_deref(), Some(r#"Name-"Carol",Id-3"#));
    }

    #[test]
    fn predicate_orders_lexicographically() {
        let token = DefaultSkipTokenHandler
            .parse("Age-30,Id-2")
            .unwrap_or_else(|_| unreachable!());
        let predicate = DefaultSkipTokenHandler
            .predicate(&token, "$it", &[key("Age", true), key("Id", false)])
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(
            predicate.to_string(),
            "((($it.Age lt 30) or ($it.Age eq null)) or (($it.Age eq 30) and ($it.Id gt 2)))"
        );
    }
}
