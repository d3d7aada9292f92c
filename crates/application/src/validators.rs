//! Per-option validators and the registry that hands them out.

use std::fmt::{Debug, Formatter};
use std::sync::OnceLock;

use querylens_core::{AppError, AppResult};
use querylens_domain::{
    ApplyClause, ComputeClause, DefaultQuerySettings, ElementId, FilterClause, OrderByClause,
    SearchClause, SelectExpandClause, ValidationSettings,
};

use crate::binders::QueryBinderContext;
use crate::options::{QueryOptions, SkipToken};
use crate::resolver::ModelRestrictionResolver;

mod apply;
mod count;
mod extension;
mod filter;
mod options;
mod order_by;
mod paging;
mod select_expand;
mod walk;

pub use apply::ApplyQueryValidator;
pub use count::CountQueryValidator;
pub use extension::{ComputeQueryValidator, SearchQueryValidator};
pub use filter::FilterQueryValidator;
pub use options::QueryOptionsValidator;
pub use order_by::OrderByQueryValidator;
pub use paging::{SkipQueryValidator, SkipTokenQueryValidator, TopQueryValidator};
pub use select_expand::SelectExpandQueryValidator;

/// Validates one parsed query option.
pub trait QueryOptionValidator<O: ?Sized>: Send + Sync {
    /// Fails with the first violation found.
    fn validate(&self, option: &O, context: &ValidationContext<'_>) -> AppResult<()>;

    /// Non-failing variant returning whether the option is valid and why not.
    fn try_validate(&self, option: &O, context: &ValidationContext<'_>) -> (bool, Vec<AppError>) {
        match self.validate(option, context) {
            Ok(()) => (true, Vec::new()),
            Err(error) => (false, vec![error]),
        }
    }
}

/// Everything a validator may consult for one request.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    binder: &'a QueryBinderContext,
    resolver: &'a ModelRestrictionResolver,
    settings: &'a ValidationSettings,
    defaults: &'a DefaultQuerySettings,
    registry: &'a QueryValidatorRegistry,
    navigation: Option<&'a ElementId>,
}

impl<'a> ValidationContext<'a> {
    /// Creates a context for options applied to the binder context's rows.
    #[must_use]
    pub fn new(
        binder: &'a QueryBinderContext,
        resolver: &'a ModelRestrictionResolver,
        settings: &'a ValidationSettings,
        defaults: &'a DefaultQuerySettings,
        registry: &'a QueryValidatorRegistry,
    ) -> Self {
        Self {
            binder,
            resolver,
            settings,
            defaults,
            registry,
            navigation: None,
        }
    }

    /// Returns the context for rows reached through a navigation property.
    #[must_use]
    pub fn with_navigation(mut self, navigation: Option<&'a ElementId>) -> Self {
        self.navigation = navigation;
        self
    }

    /// Returns the same context over differently shaped rows.
    #[must_use]
    pub fn for_binder<'b>(&self, binder: &'b QueryBinderContext) -> ValidationContext<'b>
    where
        'a: 'b,
    {
        ValidationContext {
            binder,
            resolver: self.resolver,
            settings: self.settings,
            defaults: self.defaults,
            registry: self.registry,
            navigation: self.navigation,
        }
    }

    /// Returns the binding context describing the current rows.
    #[must_use]
    pub fn binder(&self) -> &'a QueryBinderContext {
        self.binder
    }

    /// Returns the restriction resolver.
    #[must_use]
    pub fn resolver(&self) -> &'a ModelRestrictionResolver {
        self.resolver
    }

    /// Returns the request limits.
    #[must_use]
    pub fn settings(&self) -> &'a ValidationSettings {
        self.settings
    }

    /// Returns the request capability defaults.
    #[must_use]
    pub fn defaults(&self) -> &'a DefaultQuerySettings {
        self.defaults
    }

    /// Returns the registry validators delegate nested options to.
    #[must_use]
    pub fn registry(&self) -> &'a QueryValidatorRegistry {
        self.registry
    }

    /// Returns the navigation property the rows were reached through.
    #[must_use]
    pub fn navigation(&self) -> Option<&'a ElementId> {
        self.navigation
    }
}

type Slot<O> = OnceLock<Box<dyn QueryOptionValidator<O>>>;

fn slot<O>(validator: impl QueryOptionValidator<O> + 'static) -> Slot<O> {
    OnceLock::from(Box::new(validator) as Box<dyn QueryOptionValidator<O>>)
}

/// Per-request validator lookup.
///
/// Every validator is created on first use and cached; `with_*` replaces one
/// before it is ever used.
#[derive(Default)]
pub struct QueryValidatorRegistry {
    options: Slot<QueryOptions>,
    filter: Slot<FilterClause>,
    order_by: Slot<OrderByClause>,
    top: Slot<u64>,
    skip: Slot<u64>,
    skip_token: Slot<SkipToken>,
    count: Slot<bool>,
    select_expand: Slot<SelectExpandClause>,
    compute: Slot<ComputeClause>,
    search: Slot<SearchClause>,
    apply: Slot<ApplyClause>,
}

impl Debug for QueryValidatorRegistry {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("QueryValidatorRegistry")
            .finish_non_exhaustive()
    }
}

impl QueryValidatorRegistry {
    /// Creates a registry that uses the default validators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the top-level validator.
    #[must_use]
    pub fn with_options_validator(
        mut self,
        validator: impl QueryOptionValidator<QueryOptions> + 'static,
    ) -> Self {
        self.options = slot(validator);
        self
    }

    /// Replaces the `$filter` validator.
    #[must_use]
    pub fn with_filter_validator(
        mut self,
        validator: impl QueryOptionValidator<FilterClause> + 'static,
    ) -> Self {
        self.filter = slot(validator);
        self
    }

    /// Replaces the `$orderby` validator.
    #[must_use]
    pub fn with_order_by_validator(
        mut self,
        validator: impl QueryOptionValidator<OrderByClause> + 'static,
    ) -> Self {
        self.order_by = slot(validator);
        self
    }

    /// Replaces the `$top` validator.
    #[must_use]
    pub fn with_top_validator(mut self, validator: impl QueryOptionValidator<u64> + 'static) -> Self {
        self.top = slot(validator);
        self
    }

    /// Replaces the `$skip` validator.
    #[must_use]
    pub fn with_skip_validator(
        mut self,
        validator: impl QueryOptionValidator<u64> + 'static,
    ) -> Self {
        self.skip = slot(validator);
        self
    }

    /// Replaces the `$skiptoken` validator.
    #[must_use]
    pub fn with_skip_token_validator(
        mut self,
        validator: impl QueryOptionValidator<SkipToken> + 'static,
    ) -> Self {
        self.skip_token = slot(validator);
        self
    }

    /// Replaces the `$count` validator.
    #[must_use]
    pub fn with_count_validator(
        mut self,
        validator: impl QueryOptionValidator<bool> + 'static,
    ) -> Self {
        self.count = slot(validator);
        self
    }

    /// Replaces the `$select`/`$expand` validator.
    #[must_use]
    pub fn with_select_expand_validator(
        mut self,
        validator: impl QueryOptionValidator<SelectExpandClause> + 'static,
    ) -> Self {
        self.select_expand = slot(validator);
        self
    }

    /// Replaces the `$compute` validator.
    #[must_use]
    pub fn with_compute_validator(
        mut self,
        validator: impl QueryOptionValidator<ComputeClause> + 'static,
    ) -> Self {
        self.compute = slot(validator);
        self
    }

    /// Replaces the `$search` validator.
    #[must_use]
    pub fn with_search_validator(
        mut self,
        validator: impl QueryOptionValidator<SearchClause> + 'static,
    ) -> Self {
        self.search = slot(validator);
        self
    }

    /// Replaces the `$apply` validator.
    #[must_use]
    pub fn with_apply_validator(
        mut self,
        validator: impl QueryOptionValidator<ApplyClause> + 'static,
    ) -> Self {
        self.apply = slot(validator);
        self
    }

    /// Returns the top-level validator.
    pub fn options(&self) -> &dyn QueryOptionValidator<QueryOptions> {
        self.options
            .get_or_init(|| Box::new(QueryOptionsValidator))
            .as_ref()
    }

    /// Returns the `$filter` validator.
    pub fn filter(&self) -> &dyn QueryOptionValidator<FilterClause> {
        self.filter
            .get_or_init(|| Box::new(FilterQueryValidator))
            .as_ref()
    }

    /// Returns the `$orderby` validator.
    pub fn order_by(&self) -> &dyn QueryOptionValidator<OrderByClause> {
        self.order_by
            .get_or_init(|| Box::new(OrderByQueryValidator))
            .as_ref()
    }

    /// Returns the `$top` validator.
    pub fn top(&self) -> &dyn QueryOptionValidator<u64> {
        self.top.get_or_init(|| Box::new(TopQueryValidator)).as_ref()
    }

    /// Returns the `$skip` validator.
    pub fn skip(&self) -> &dyn QueryOptionValidator<u64> {
        self.skip.get_or_init(|| Box::new(SkipQueryValidator)).as_ref()
    }

    /// Returns the `$skiptoken` validator.
    pub fn skip_token(&self) -> &dyn QueryOptionValidator<SkipToken> {
        self.skip_token
            .get_or_init(|| Box::new(SkipTokenQueryValidator))
            .as_ref()
    }

    /// Returns the `$count` validator.
    pub fn count(&self) -> &dyn QueryOptionValidator<bool> {
        self.count
            .get_or_init(|| Box::new(CountQueryValidator))
            .as_ref()
    }

    /// Returns the `$select`/`$expand` validator.
    pub fn select_expand(&self) -> &dyn QueryOptionValidator<SelectExpandClause> {
        self.select_expand
            .get_or_init(|| Box::new(SelectExpandQueryValidator))
            .as_ref()
    }

    /// Returns the `$compute` validator.
    pub fn compute(&self) -> &dyn QueryOptionValidator<ComputeClause> {
        self.compute
            .get_or_init(|| Box::new(ComputeQueryValidator))
            .as_ref()
    }

    /// Returns the `$search` validator.
    pub fn search(&self) -> &dyn QueryOptionValidator<SearchClause> {
        self.search
            .get_or_init(|| Box::new(SearchQueryValidator))
            .as_ref()
    }

    /// Returns the `$apply` validator.
    pub fn apply(&self) -> &dyn QueryOptionValidator<ApplyClause> {
        self.apply
            .get_or_init(|| Box::new(ApplyQueryValidator))
            .as_ref()
    }
}
