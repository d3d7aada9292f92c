use querylens_core::{AppResult, ValidationError};
use querylens_domain::{
    ApplyClause, ComputeClause, ExpandItem, FilterClause, OrderByClause, QueryOptionKind,
    SearchClause, SelectExpandClause, SelectItem,
};
use serde::de::DeserializeOwned;

/// Turns raw option text into parsed clauses.
///
/// Tokenizing the URL query language is left to implementors; the core only
/// consumes the clause trees.
pub trait ClauseParser: Send + Sync {
    /// Parses `$filter`.
    fn parse_filter(&self, raw: &str) -> AppResult<FilterClause>;

    /// Parses `$orderby`.
    fn parse_order_by(&self, raw: &str) -> AppResult<OrderByClause>;

    /// Parses `$search`.
    fn parse_search(&self, raw: &str) -> AppResult<SearchClause>;

    /// Parses `$compute`.
    fn parse_compute(&self, raw: &str) -> AppResult<ComputeClause>;

    /// Parses `$apply`.
    fn parse_apply(&self, raw: &str) -> AppResult<ApplyClause>;

    /// Parses `$select` and `$expand` of the top level together.
    fn parse_select_expand(
        &self,
        select: Option<&str>,
        expand: Option<&str>,
    ) -> AppResult<SelectExpandClause>;
}

/// Parses an unsigned `$top`/`$skip` value.
pub fn parse_count_value(kind: QueryOptionKind, raw: &str) -> AppResult<u64> {
    raw.trim().parse::<u64>().map_err(|_| {
        ValidationError::invalid(format!(
            "invalid value '{raw}' for {kind}; a non-negative integer is required"
        ))
        .into()
    })
}

/// Parses a `$count` value.
pub fn parse_bool_value(kind: QueryOptionKind, raw: &str) -> AppResult<bool> {
    match raw.trim() {
        value if value.eq_ignore_ascii_case("true") => Ok(true),
        value if value.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(ValidationError::invalid(format!(
            "invalid value '{raw}' for {kind}; 'true' or 'false' is required"
        ))
        .into()),
    }
}

/// Parser for clause trees serialized as JSON.
///
/// `$select` is a JSON array of property names (`"*"` selects everything),
/// `$expand` a JSON array of expand items.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonClauseParser;

impl JsonClauseParser {
    fn parse<T: DeserializeOwned>(kind: QueryOptionKind, raw: &str) -> AppResult<T> {
        serde_json::from_str(raw).map_err(|error| {
            ValidationError::invalid(format!("{kind} is not a valid clause: {error}")).into()
        })
    }
}

impl ClauseParser for JsonClauseParser {
    fn parse_filter(&self, raw: &str) -> AppResult<FilterClause> {
        Self::parse(QueryOptionKind::Filter, raw)
    }

    fn parse_order_by(&self, raw: &str) -> AppResult<OrderByClause> {
        Self::parse(QueryOptionKind::OrderBy, raw)
    }

    fn parse_search(&self, raw: &str) -> AppResult<SearchClause> {
        Self::parse(QueryOptionKind::Search, raw)
    }

    fn parse_compute(&self, raw: &str) -> AppResult<ComputeClause> {
        Self::parse(QueryOptionKind::Compute, raw)
    }

    fn parse_apply(&self, raw: &str) -> AppResult<ApplyClause> {
        Self::parse(QueryOptionKind::Apply, raw)
    }

    fn parse_select_expand(
        &self,
        select: Option<&str>,
        expand: Option<&str>,
    ) -> AppResult<SelectExpandClause> {
        let mut items = Vec::new();
        if let Some(raw) = select {
            let names: Vec<String> = Self::parse(QueryOptionKind::Select, raw)?;
            items.extend(names.into_iter().map(|name| {
                if name == "*" {
                    SelectItem::Wildcard
                } else {
                    SelectItem::Property { name }
                }
            }));
        }
        if let Some(raw) = expand {
            let expansions: Vec<ExpandItem> = Self::parse(QueryOptionKind::Expand, raw)?;
            items.extend(expansions.into_iter().map(SelectItem::Expand));
        }

        Ok(SelectExpandClause { items })
    }
}

#[cfg(test)]
mod tests {
    use querylens_core::AppError;
    use querylens_domain::{QueryOptionKind, SelectItem};

    use super::{ClauseParser, JsonClauseParser, parse_bool_value, parse_count_value};

    #[test]
    fn select_and_expand_merge_into_one_clause() {
        let clause = JsonClauseParser
            .parse_select_expand(Some(r#"["Name","*"]"#), Some(r#"[{"navigation":"Orders"}]"#))
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(clause.items.len(), 3);
        assert!(clause.all_selected());
        assert!(matches!(&clause.items[2], SelectItem::Expand(item) if item.navigation == "Orders"));
    }

    #[test]
    fn malformed_clause_is_a_validation_error() {
        let error = JsonClauseParser.parse_filter("{not json").err();

        assert!(matches!(error, Some(AppError::Validation(_))));
    }

    #[test]
    fn scalar_values_reject_garbage() {
        assert_eq!(parse_count_value(QueryOptionKind::Top, " 5 ").ok(), Some(5));
        assert!(parse_count_value(QueryOptionKind::Top, "-1").is_err());
        assert_eq!(parse_bool_value(QueryOptionKind::Count, "TRUE").ok(), Some(true));
        assert!(parse_bool_value(QueryOptionKind::Count, "yes").is_err());
    }
}
