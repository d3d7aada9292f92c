use querylens_core::AppResult;
use querylens_domain::{ComputeClause, SearchClause};

use super::{QueryOptionValidator, ValidationContext};

/// Default `$compute` validator; accepts every parsed clause.
///
/// Replace it through the registry to restrict computed values.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeQueryValidator;

impl QueryOptionValidator<ComputeClause> for ComputeQueryValidator {
    fn validate(&self, _option: &ComputeClause, _context: &ValidationContext<'_>) -> AppResult<()> {
        Ok(())
    }
}

/// Default `$search` validator; accepts every parsed clause.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchQueryValidator;

impl QueryOptionValidator<SearchClause> for SearchQueryValidator {
    fn validate(&self, _option: &SearchClause, _context: &ValidationContext<'_>) -> AppResult<()> {
        Ok(())
    }
}
