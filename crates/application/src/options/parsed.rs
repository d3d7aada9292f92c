use std::fmt::{Debug, Formatter};
use std::sync::{Arc, OnceLock};

use querylens_core::AppResult;
use querylens_domain::{
    ApplyClause, ComputeClause, DefaultQuerySettings, FilterClause, OrderByClause,
    QueryOptionKind, SearchClause, SelectExpandClause,
};

use super::parser::ClauseParser;
use super::skip_token::{SkipToken, SkipTokenHandler};
use crate::binders::{
    QueryBinderContext, SearchBinder, SelectExpandBinder, bind_apply, bind_compute, bind_filter,
    bind_order_by, bind_search,
};
use crate::query::{Projection, Query, QueryOperator, SortKey};
use crate::resolver::ModelRestrictionResolver;
use crate::validators::{QueryOptionValidator, ValidationContext};

type Parse<T> = Box<dyn Fn(&str) -> AppResult<T> + Send + Sync>;

/// One raw query option, parsed on first use and cached afterwards.
pub struct QueryOption<T> {
    kind: QueryOptionKind,
    raw: String,
    parse: Parse<T>,
    parsed: OnceLock<T>,
}

/// `$filter`.
pub type FilterQueryOption = QueryOption<FilterClause>;
/// `$orderby`.
pub type OrderByQueryOption = QueryOption<OrderByClause>;
/// `$top` or `$skip`.
pub type PagingQueryOption = QueryOption<u64>;
/// `$count`.
pub type CountQueryOption = QueryOption<bool>;
/// `$skiptoken`.
pub type SkipTokenQueryOption = QueryOption<SkipToken>;
/// `$search`.
pub type SearchQueryOption = QueryOption<SearchClause>;
/// `$compute`.
pub type ComputeQueryOption = QueryOption<ComputeClause>;
/// `$apply`.
pub type ApplyQueryOption = QueryOption<ApplyClause>;

impl<T> QueryOption<T> {
    pub(super) fn new(
        kind: QueryOptionKind,
        raw: impl Into<String>,
        parse: impl Fn(&str) -> AppResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            raw: raw.into(),
            parse: Box::new(parse),
            parsed: OnceLock::new(),
        }
    }

    pub(super) fn with_parser(
        kind: QueryOptionKind,
        raw: impl Into<String>,
        parser: &Arc<dyn ClauseParser>,
        parse: fn(&dyn ClauseParser, &str) -> AppResult<T>,
    ) -> Self
    where
        T: 'static,
    {
        let parser = Arc::clone(parser);
        Self::new(kind, raw, move |raw| parse(parser.as_ref(), raw))
    }

    /// Returns which option this is.
    #[must_use]
    pub fn kind(&self) -> QueryOptionKind {
        self.kind
    }

    /// Returns the option text as received.
    #[must_use]
    pub fn raw_value(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed value, parsing it on first access.
    pub fn value(&self) -> AppResult<&T> {
        if let Some(parsed) = self.parsed.get() {
            return Ok(parsed);
        }

        let parsed = (self.parse)(&self.raw)?;
        Ok(self.parsed.get_or_init(|| parsed))
    }
}

impl<T: Debug> Debug for QueryOption<T> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("QueryOption")
            .field("kind", &self.kind)
            .field("raw", &self.raw)
            .field("parsed", &self.parsed.get())
            .finish()
    }
}

fn saturating_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

impl FilterQueryOption {
    /// Validates with the registry's `$filter` validator.
    pub fn validate(&self, context: &ValidationContext<'_>) -> AppResult<()> {
        context.registry().filter().validate(self.value()?, context)
    }

    /// Appends the bound predicate to `query`.
    pub fn apply_to(&self, query: Query, context: &QueryBinderContext) -> AppResult<Query> {
        Ok(query.then(bind_filter(self.value()?, context)?))
    }
}

impl OrderByQueryOption {
    /// Validates with the registry's `$orderby` validator.
    pub fn validate(&self, context: &ValidationContext<'_>) -> AppResult<()> {
        context.registry().order_by().validate(self.value()?, context)
    }

    /// Binds the sort keys.
    pub fn sort_keys(&self, context: &QueryBinderContext) -> AppResult<Vec<SortKey>> {
        bind_order_by(self.value()?, context)
    }

    /// Appends the ordering to `query`.
    pub fn apply_to(&self, query: Query, context: &QueryBinderContext) -> AppResult<Query> {
        Ok(query.then(QueryOperator::OrderBy {
            variable: self.value()?.range_variable.clone(),
            keys: self.sort_keys(context)?,
        }))
    }
}

impl PagingQueryOption {
    /// Validates with the registry's `$top` or `$skip` validator.
    pub fn validate(&self, context: &ValidationContext<'_>) -> AppResult<()> {
        let registry = context.registry();
        match self.kind {
            QueryOptionKind::Skip => registry.skip().validate(self.value()?, context),
            _ => registry.top().validate(self.value()?, context),
        }
    }

    /// Appends a skip or take operator to `query`.
    pub fn apply_to(&self, query: Query) -> AppResult<Query> {
        let count = saturating_usize(*self.value()?);
        Ok(query.then(match self.kind {
            QueryOptionKind::Skip => QueryOperator::Skip { count },
            _ => QueryOperator::Take { count },
        }))
    }
}

impl CountQueryOption {
    /// Validates with the registry's `$count` validator.
    pub fn validate(&self, context: &ValidationContext<'_>) -> AppResult<()> {
        context.registry().count().validate(self.value()?, context)
    }
}

impl SkipTokenQueryOption {
    /// Validates with the registry's `$skiptoken` validator.
    pub fn validate(&self, context: &ValidationContext<'_>) -> AppResult<()> {
        context.registry().skip_token().validate(self.value()?, context)
    }

    /// Appends the "after the token" predicate to `query`.
    pub fn apply_to(
        &self,
        query: Query,
        handler: &dyn SkipTokenHandler,
        variable: &str,
        keys: &[SortKey],
    ) -> AppResult<Query> {
        Ok(query.then(QueryOperator::Where {
            variable: variable.to_owned(),
            predicate: handler.predicate(self.value()?, variable, keys)?,
        }))
    }
}

impl SearchQueryOption {
    /// Validates with the registry's `$search` validator.
    pub fn validate(&self, context: &ValidationContext<'_>) -> AppResult<()> {
        context.registry().search().validate(self.value()?, context)
    }

    /// Appends the search predicate produced by `binder` to `query`.
    pub fn apply_to(
        &self,
        query: Query,
        binder: &dyn SearchBinder,
        context: &QueryBinderContext,
    ) -> AppResult<Query> {
        Ok(query.then(bind_search(self.value()?, binder, context)?))
    }
}

impl ComputeQueryOption {
    /// Validates with the registry's `$compute` validator.
    pub fn validate(&self, context: &ValidationContext<'_>) -> AppResult<()> {
        context.registry().compute().validate(self.value()?, context)
    }

    /// Appends the computed values and returns the context exposing them.
    pub fn apply_to(
        &self,
        query: Query,
        context: &QueryBinderContext,
    ) -> AppResult<(Query, QueryBinderContext)> {
        let (operator, next) = bind_compute(self.value()?, context)?;
        Ok((query.then(operator), next))
    }
}

impl ApplyQueryOption {
    /// Validates with the registry's `$apply` validator.
    pub fn validate(&self, context: &ValidationContext<'_>) -> AppResult<()> {
        context.registry().apply().validate(self.value()?, context)
    }

    /// Appends the pipeline and returns the context of its result rows.
    pub fn apply_to(
        &self,
        query: Query,
        context: &QueryBinderContext,
    ) -> AppResult<(Query, QueryBinderContext)> {
        let (pipeline, next) = bind_apply(self.value()?, context)?;
        Ok((query.chain(pipeline), next))
    }
}

/// `$select` and `$expand`, parsed together.
pub struct SelectExpandQueryOption {
    raw_select: Option<String>,
    raw_expand: Option<String>,
    parser: Arc<dyn ClauseParser>,
    parsed: OnceLock<SelectExpandClause>,
}

impl SelectExpandQueryOption {
    pub(super) fn new(
        raw_select: Option<String>,
        raw_expand: Option<String>,
        parser: Arc<dyn ClauseParser>,
    ) -> Self {
        Self {
            raw_select,
            raw_expand,
            parser,
            parsed: OnceLock::new(),
        }
    }

    /// Returns the `$select` text as received.
    #[must_use]
    pub fn raw_select(&self) -> Option<&str> {
        self.raw_select.as_deref()
    }

    /// Returns the `$expand` text as received.
    #[must_use]
    pub fn raw_expand(&self) -> Option<&str> {
        self.raw_expand.as_deref()
    }

    /// Returns the parsed clause, parsing it on first access.
    pub fn value(&self) -> AppResult<&SelectExpandClause> {
        if let Some(parsed) = self.parsed.get() {
            return Ok(parsed);
        }

        let parsed = self
            .parser
            .parse_select_expand(self.raw_select(), self.raw_expand())?;
        Ok(self.parsed.get_or_init(|| parsed))
    }

    /// Validates with the registry's `$select`/`$expand` validator.
    pub fn validate(&self, context: &ValidationContext<'_>) -> AppResult<()> {
        context
            .registry()
            .select_expand()
            .validate(self.value()?, context)
    }

    /// Binds the projection of the result rows.
    pub fn projection(
        &self,
        context: &QueryBinderContext,
        resolver: &ModelRestrictionResolver,
        defaults: DefaultQuerySettings,
    ) -> AppResult<Projection> {
        SelectExpandBinder::new(context, resolver, defaults).bind(Some(self.value()?))
    }
}

impl Debug for SelectExpandQueryOption {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SelectExpandQueryOption")
            .field("raw_select", &self.raw_select)
            .field("raw_expand", &self.raw_expand)
            .field("parsed", &self.parsed.get())
            .finish_non_exhaustive()
    }
}
