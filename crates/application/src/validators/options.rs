use querylens_core::{AppResult, ValidationError};
use querylens_domain::QueryOptionKind;

use super::{QueryOptionValidator, ValidationContext};
use crate::binders::apply_result_context;
use crate::options::QueryOptions;

/// Default top-level validator.
///
/// Every option present, plus an implicit count for `/$count` paths, must be
/// in the allow-list; the options are then validated one by one against the
/// shape they are applied to.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptionsValidator;

impl QueryOptionValidator<QueryOptions> for QueryOptionsValidator {
    fn validate(&self, option: &QueryOptions, context: &ValidationContext<'_>) -> AppResult<()> {
        let count_request = option.context().is_count_request();
        let allowed = context.settings().allowed_query_options;
        for &kind in QueryOptionKind::all() {
            let requested =
                option.is_present(kind) || (kind == QueryOptionKind::Count && count_request);
            if requested && !allowed.contains(kind) {
                return Err(ValidationError::QueryOptionNotAllowed {
                    option: kind.as_str().to_owned(),
                }
                .into());
            }
        }

        let base = context.binder();
        let applied = match option.apply() {
            Some(apply) => apply_result_context(apply.value()?, base),
            None => base.clone(),
        };
        let shaped = match option.compute() {
            Some(compute) => compute
                .value()?
                .items
                .iter()
                .fold(applied.clone(), |next, item| next.with_computed(item.alias.clone())),
            None => applied.clone(),
        };
        let after_apply = context.for_binder(&applied);
        let after_compute = context.for_binder(&shaped);

        for &kind in QueryOptionKind::all() {
            match kind {
                QueryOptionKind::Compute => {
                    if let Some(compute) = option.compute() {
                        compute.validate(&after_apply)?;
                    }
                }
                QueryOptionKind::Apply => {
                    if let Some(apply) = option.apply() {
                        apply.validate(context)?;
                    }
                }
                QueryOptionKind::Skip => {
                    if let Some(skip) = option.skip() {
                        skip.validate(&after_compute)?;
                    }
                }
                QueryOptionKind::Top => {
                    if let Some(top) = option.top() {
                        top.validate(&after_compute)?;
                    }
                }
                QueryOptionKind::OrderBy => {
                    if let Some(order_by) = option.order_by() {
                        order_by.validate(&after_compute)?;
                    }
                }
                QueryOptionKind::Filter => {
                    if let Some(filter) = option.filter() {
                        filter.validate(&after_compute)?;
                    }
                }
                QueryOptionKind::Search => {
                    if let Some(search) = option.search() {
                        search.validate(&after_compute)?;
                    }
                }
                QueryOptionKind::Count => {
                    if count_request {
                        context.registry().count().validate(&true, &after_compute)?;
                    } else if let Some(count) = option.count() {
                        count.validate(&after_compute)?;
                    }
                }
                QueryOptionKind::SkipToken => {
                    if let Some(skip_token) = option.skip_token() {
                        skip_token.validate(&after_compute)?;
                    }
                }
                QueryOptionKind::Expand => {
                    if let Some(select_expand) = option.select_expand() {
                        select_expand.validate(&after_compute)?;
                    }
                }
                QueryOptionKind::Select | QueryOptionKind::Format | QueryOptionKind::DeltaToken => {}
            }
        }

        Ok(())
    }
}
