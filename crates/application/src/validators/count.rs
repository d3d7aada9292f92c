use querylens_core::{AppResult, ValidationError};

use super::{QueryOptionValidator, ValidationContext};
use crate::binders::ResultShape;

/// Default `$count` validator.
///
/// Applies both to `$count=true` and to a request path ending in `/$count`;
/// the counted collection is the queried type, or the navigation the rows
/// were reached through.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountQueryValidator;

impl QueryOptionValidator<bool> for CountQueryValidator {
    fn validate(&self, option: &bool, context: &ValidationContext<'_>) -> AppResult<()> {
        if !*option {
            return Ok(());
        }
        let ResultShape::Entity { type_name } = context.binder().shape() else {
            return Ok(());
        };

        let navigation = context.navigation();
        if context.resolver().is_not_countable(
            navigation,
            type_name,
            context.defaults().enable_count,
        ) {
            let property = navigation
                .and_then(|navigation| navigation.property_name())
                .unwrap_or(type_name);
            return Err(ValidationError::PropertyRestricted {
                property: property.to_owned(),
                option: "$count".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}
