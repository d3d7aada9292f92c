use querylens_core::{AppError, AppResult};
use querylens_domain::{
    BinaryOperatorKind, DataModel, PropertyKind, QueryNode, SearchClause, UnaryOperatorKind,
};
use serde_json::Value;
use tracing::debug;

use super::QueryBinderContext;
use crate::expression::Expr;
use crate::query::QueryOperator;

/// Domain-specific meaning of a free-text `$search` term.
pub trait SearchBinder: Send + Sync {
    /// Binds one term to a predicate over the context's range variable.
    fn bind_search_term(&self, term: &str, context: &QueryBinderContext) -> AppResult<Expr>;
}

/// Matches terms against a closed vocabulary of values of one property.
///
/// A term equal (ignoring case) to a vocabulary entry selects rows whose
/// property holds that entry; any other term matches nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularySearchBinder {
    property: String,
    vocabulary: Vec<String>,
}

impl VocabularySearchBinder {
    /// Creates a binder over an explicit vocabulary.
    #[must_use]
    pub fn new(property: impl Into<String>, vocabulary: Vec<String>) -> Self {
        Self {
            property: property.into(),
            vocabulary,
        }
    }

    /// Creates a binder whose vocabulary is the member names of an enum property.
    pub fn for_enum(model: &DataModel, type_name: &str, property: &str) -> AppResult<Self> {
        let definition = model.property(type_name, property, false).ok_or_else(|| {
            AppError::Configuration(format!(
                "property '{property}' is not declared on '{type_name}'"
            ))
        })?;
        let PropertyKind::Enum { enum_type } = definition.kind() else {
            return Err(AppError::Configuration(format!(
                "property '{type_name}/{property}' is not an enum property"
            )));
        };
        let enum_type = model.enum_type(enum_type).ok_or_else(|| {
            AppError::Configuration(format!("enum type '{enum_type}' is not declared"))
        })?;

        Ok(Self::new(
            definition.name(),
            enum_type
                .members()
                .iter()
                .map(|member| member.name.clone())
                .collect(),
        ))
    }
}

impl SearchBinder for VocabularySearchBinder {
    fn bind_search_term(&self, term: &str, context: &QueryBinderContext) -> AppResult<Expr> {
        let Some(entry) = self
            .vocabulary
            .iter()
            .find(|entry| entry.eq_ignore_ascii_case(term))
        else {
            return Ok(Expr::constant(Value::Bool(false)));
        };

        Ok(Expr::binary(
            BinaryOperatorKind::Equal,
            Expr::member(Expr::parameter(context.range_variable()), self.property.as_str()),
            Expr::constant(Value::String(entry.clone())),
            false,
        ))
    }
}

fn bind_search_node(
    node: &QueryNode,
    binder: &dyn SearchBinder,
    context: &QueryBinderContext,
) -> AppResult<Expr> {
    match node {
        QueryNode::SearchTerm { text } => binder.bind_search_term(text, context),
        QueryNode::BinaryOperator {
            operator: operator @ (BinaryOperatorKind::And | BinaryOperatorKind::Or),
            left,
            right,
        } => Ok(Expr::binary(
            *operator,
            bind_search_node(left, binder, context)?,
            bind_search_node(right, binder, context)?,
            false,
        )),
        QueryNode::UnaryOperator {
            operator: UnaryOperatorKind::Not,
            operand,
        } => Ok(Expr::not(bind_search_node(operand, binder, context)?)),
        other => Err(AppError::Internal(format!(
            "unexpected node in $search: {other:?}"
        ))),
    }
}

/// Binds `$search` with the domain's term binder.
pub fn bind_search(
    clause: &SearchClause,
    binder: &dyn SearchBinder,
    context: &QueryBinderContext,
) -> AppResult<QueryOperator> {
    let predicate = bind_search_node(&clause.expression, binder, context)?;
    debug!(predicate = %predicate, "bound search");

    Ok(QueryOperator::Where {
        variable: context.range_variable().to_owned(),
        predicate,
    })
}
