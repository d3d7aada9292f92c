use querylens_core::{AppError, AppResult, ValidationError};
use querylens_domain::{ElementId, ExpandItem, SelectExpandClause, StructuredTypeDefinition};

use super::{QueryOptionValidator, ValidationContext};
use crate::binders::{QueryBinderContext, ResultShape, ShapeProperty};
use crate::resolver::PropertyPosition;

/// Default `$select`/`$expand` validator.
///
/// Nested `$filter`, `$orderby`, `$top`, `$skip` and `$count` are handed to
/// the registry with the expanded navigation as context.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectExpandQueryValidator;

fn restricted(property: &str, option: &str) -> AppError {
    ValidationError::PropertyRestricted {
        property: property.to_owned(),
        option: option.to_owned(),
    }
    .into()
}

/// Depth an expansion reaches; `$levels=max` counts as one level.
fn expansion_depth(item: &ExpandItem) -> u32 {
    let own = match item.levels {
        Some(0) | None => 1,
        Some(levels) => levels,
    };
    let nested = item.select_expand.as_ref().map_or(0, clause_depth);
    own.max(nested + 1)
}

fn clause_depth(clause: &SelectExpandClause) -> u32 {
    clause.expanded().map(expansion_depth).max().unwrap_or(0)
}

fn validate_dynamic(
    clause: &SelectExpandClause,
    properties: &[ShapeProperty],
    case_insensitive: bool,
) -> AppResult<()> {
    if clause.expanded().next().is_some() {
        return Err(ValidationError::invalid("$expand cannot follow an aggregating $apply").into());
    }

    for name in clause.selected_properties() {
        if ShapeProperty::find(properties, name, case_insensitive).is_none() {
            return Err(ValidationError::UnknownProperty {
                property: name.to_owned(),
                type_name: "$apply result".to_owned(),
            }
            .into());
        }
    }

    Ok(())
}

fn validate_level(
    clause: &SelectExpandClause,
    context: &ValidationContext<'_>,
    type_name: &str,
    is_root: bool,
) -> AppResult<()> {
    let binder = context.binder();
    let case_insensitive = binder.settings().enable_case_insensitive;
    let definition = binder.model().require_type(type_name)?;
    let position = match context.navigation() {
        Some(hop) => PropertyPosition::behind(hop, type_name),
        None => PropertyPosition::direct(type_name),
    };

    for name in clause.selected_properties() {
        match definition.find_property(name, case_insensitive) {
            Some(property) if property.is_navigation() => {
                return Err(ValidationError::invalid(format!(
                    "navigation property '{name}' must be expanded, not selected"
                ))
                .into());
            }
            Some(property) => {
                let element = ElementId::of_property(definition.name(), property.name());
                if context.resolver().is_not_selectable(
                    &element,
                    position,
                    context.defaults().enable_select,
                ) {
                    return Err(restricted(property.name(), "$select"));
                }
            }
            None if is_root && binder.is_computed(name) => {}
            None => {
                return Err(ValidationError::UnknownProperty {
                    property: name.to_owned(),
                    type_name: definition.name().to_owned(),
                }
                .into());
            }
        }
    }

    for item in clause.expanded() {
        validate_expansion(item, definition, position, context)?;
    }

    Ok(())
}

fn validate_expansion(
    item: &ExpandItem,
    definition: &StructuredTypeDefinition,
    position: PropertyPosition<'_>,
    context: &ValidationContext<'_>,
) -> AppResult<()> {
    let binder = context.binder();
    let property = definition
        .find_property(&item.navigation, binder.settings().enable_case_insensitive)
        .ok_or_else(|| ValidationError::UnknownProperty {
            property: item.navigation.clone(),
            type_name: definition.name().to_owned(),
        })?;
    let Some(target_name) = property
        .structured_target()
        .filter(|_| property.is_navigation())
    else {
        return Err(ValidationError::invalid(format!(
            "'{}' is not a navigation property and cannot be expanded",
            property.name()
        ))
        .into());
    };

    let element = ElementId::of_property(definition.name(), property.name());
    let Some(configuration) = context.resolver().expand_configuration(
        &element,
        position,
        context.defaults().enable_expand,
    ) else {
        return Err(restricted(property.name(), "$expand"));
    };

    let depth = expansion_depth(item);
    if configuration.max_depth > 0 && depth > configuration.max_depth {
        return Err(ValidationError::LimitExceeded {
            option: "$expand".to_owned(),
            limit: u64::from(configuration.max_depth),
            value: u64::from(depth),
        }
        .into());
    }

    let target = QueryBinderContext::new(
        binder.model_handle(),
        binder.settings().clone(),
        target_name,
    )?;
    let nested = context.for_binder(&target).with_navigation(Some(&element));
    let registry = context.registry();

    if let Some(filter) = &item.filter {
        registry.filter().validate(filter, &nested)?;
    }
    if let Some(order_by) = &item.order_by {
        registry.order_by().validate(order_by, &nested)?;
    }
    if let Some(top) = item.top {
        registry.top().validate(&top, &nested)?;
    }
    if let Some(skip) = item.skip {
        registry.skip().validate(&skip, &nested)?;
    }
    if item.count {
        registry.count().validate(&true, &nested)?;
    }
    if let Some(clause) = &item.select_expand {
        validate_level(clause, &nested, target_name, false)?;
    }

    Ok(())
}

impl QueryOptionValidator<SelectExpandClause> for SelectExpandQueryValidator {
    fn validate(
        &self,
        option: &SelectExpandClause,
        context: &ValidationContext<'_>,
    ) -> AppResult<()> {
        let binder = context.binder();
        match binder.shape() {
            ResultShape::Dynamic { properties } => validate_dynamic(
                option,
                properties,
                binder.settings().enable_case_insensitive,
            ),
            ResultShape::Entity { type_name } => {
                let limit = context.settings().max_expansion_depth;
                let depth = clause_depth(option);
                if limit > 0 && depth > limit {
                    return Err(ValidationError::LimitExceeded {
                        option: "MaxExpansionDepth".to_owned(),
                        limit: u64::from(limit),
                        value: u64::from(depth),
                    }
                    .into());
                }

                validate_level(option, context, type_name, true)
            }
        }
    }
}
