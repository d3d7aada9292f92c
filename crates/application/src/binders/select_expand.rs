use querylens_core::{AppError, AppResult};
use querylens_domain::{
    DefaultQuerySettings, ElementId, ExpandItem, IT, SelectExpandClause, SelectItem,
    StructuredTypeDefinition,
};
use tracing::debug;

use super::{QueryBinderContext, ResultShape, ShapeProperty, bind_filter, bind_order_by};
use crate::expression::Expr;
use crate::query::{ProjectedExpansion, ProjectedProperty, Projection, QueryOperator, SortKey};
use crate::resolver::{ModelRestrictionResolver, PropertyPosition};

const DEFAULT_MAX_LEVELS: u32 = 2;

/// Where a nested projection sits in the expansion tree.
struct Level {
    type_name: String,
    hop: Option<ElementId>,
    depth: u32,
}

/// Binds `$select`/`$expand` into a projection over the current rows.
///
/// The clause is assumed validated; unknown names surface as internal errors.
#[derive(Debug)]
pub struct SelectExpandBinder<'a> {
    context: &'a QueryBinderContext,
    resolver: &'a ModelRestrictionResolver,
    defaults: DefaultQuerySettings,
    max_depth: u32,
}

impl<'a> SelectExpandBinder<'a> {
    /// Creates a binder with the default expansion depth.
    #[must_use]
    pub fn new(
        context: &'a QueryBinderContext,
        resolver: &'a ModelRestrictionResolver,
        defaults: DefaultQuerySettings,
    ) -> Self {
        Self {
            context,
            resolver,
            defaults,
            max_depth: DEFAULT_MAX_LEVELS,
        }
    }

    /// Limits how deep automatic expansions are followed.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Binds the clause; `None` selects every structural property.
    pub fn bind(&self, clause: Option<&SelectExpandClause>) -> AppResult<Projection> {
        let projection = match self.context.shape() {
            ResultShape::Dynamic { properties } => self.bind_dynamic(clause, properties)?,
            ResultShape::Entity { type_name } => self.bind_entity(
                &Level {
                    type_name: type_name.clone(),
                    hop: None,
                    depth: 0,
                },
                self.context.range_variable(),
                clause,
            )?,
        };

        debug!(
            type_name = projection.type_name.as_deref().unwrap_or("dynamic"),
            select_all = projection.select_all,
            properties = projection.properties.len(),
            expansions = projection.expansions.len(),
            "bound select/expand"
        );
        Ok(projection)
    }

    fn case_insensitive(&self) -> bool {
        self.context.settings().enable_case_insensitive
    }

    fn bind_dynamic(
        &self,
        clause: Option<&SelectExpandClause>,
        properties: &[ShapeProperty],
    ) -> AppResult<Projection> {
        let variable = self.context.range_variable();
        let select_all = clause.is_none_or(SelectExpandClause::all_selected);
        if clause.is_some_and(|clause| clause.expanded().next().is_some()) {
            return Err(AppError::Internal(
                "$expand cannot follow an aggregating $apply".to_owned(),
            ));
        }

        let mut projected = Vec::new();
        if !select_all {
            for name in clause.iter().flat_map(|clause| clause.selected_properties()) {
                let property = ShapeProperty::find(properties, name, self.case_insensitive())
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "property '{name}' is not part of the aggregated result"
                        ))
                    })?;
                push_property(&mut projected, variable, &property.name, false);
            }
        }

        Ok(Projection {
            variable: variable.to_owned(),
            type_name: None,
            select_all,
            structural: if select_all {
                properties.iter().map(|property| property.name.clone()).collect()
            } else {
                Vec::new()
            },
            properties: projected,
            expansions: Vec::new(),
        })
    }

    fn position<'l>(&self, level: &'l Level) -> PropertyPosition<'l> {
        match &level.hop {
            Some(hop) => PropertyPosition::behind(hop, &level.type_name),
            None => PropertyPosition::direct(&level.type_name),
        }
    }

    fn bind_entity(
        &self,
        level: &Level,
        variable: &str,
        clause: Option<&SelectExpandClause>,
    ) -> AppResult<Projection> {
        let definition = self.context.model().require_type(&level.type_name)?;
        let position = self.position(level);
        let select_all = clause.is_none_or(SelectExpandClause::all_selected);

        let mut properties = Vec::new();
        if !select_all {
            for name in clause.iter().flat_map(|clause| clause.selected_properties()) {
                let canonical = self.selected_name(definition, name, level)?;
                push_property(&mut properties, variable, &canonical, false);
            }
            for property in definition.properties() {
                let element = ElementId::of_property(definition.name(), property.name());
                if !property.is_navigation() && self.resolver.is_auto_select(&element, position) {
                    push_property(&mut properties, variable, property.name(), false);
                }
            }
        }

        let mut expansions = Vec::new();
        for item in clause.iter().flat_map(|clause| clause.expanded()) {
            expansions.push(self.bind_expansion(definition, level, variable, item)?);
        }
        if level.depth < self.max_depth {
            let navigations = definition
                .properties()
                .iter()
                .filter(|property| property.is_navigation());
            for property in navigations {
                let element = ElementId::of_property(definition.name(), property.name());
                let already = expansions
                    .iter()
                    .any(|expansion: &ProjectedExpansion| expansion.name == property.name());
                if !already && self.resolver.is_auto_expand(&element, position) {
                    let item = ExpandItem::new(property.name());
                    expansions.push(self.bind_expansion(definition, level, variable, &item)?);
                }
            }
        }

        if !select_all && !expansions.is_empty() {
            for key in definition.key() {
                push_property(&mut properties, variable, key, true);
            }
        }

        Ok(Projection {
            variable: variable.to_owned(),
            type_name: Some(definition.name().to_owned()),
            select_all,
            structural: definition
                .properties()
                .iter()
                .filter(|property| !property.is_navigation())
                .map(|property| property.name().to_owned())
                .collect(),
            properties,
            expansions,
        })
    }

    fn selected_name(
        &self,
        definition: &StructuredTypeDefinition,
        name: &str,
        level: &Level,
    ) -> AppResult<String> {
        match definition.find_property(name, self.case_insensitive()) {
            Some(property) if property.is_navigation() => Err(AppError::Internal(format!(
                "navigation property '{name}' must be expanded, not selected"
            ))),
            Some(property) => Ok(property.name().to_owned()),
            None if level.depth == 0 && self.context.is_computed(name) => Ok(self
                .context
                .computed_properties()
                .iter()
                .find(|alias| alias.as_str() == name || alias.eq_ignore_ascii_case(name))
                .map_or_else(|| name.to_owned(), Clone::clone)),
            None => Err(AppError::Internal(format!(
                "property '{name}' is not declared on '{}'",
                definition.name()
            ))),
        }
    }

    fn levels_limit(&self, element: &ElementId, level: &Level) -> u32 {
        self.resolver
            .expand_configuration(element, self.position(level), self.defaults.enable_expand)
            .map(|configuration| configuration.max_depth)
            .filter(|max_depth| *max_depth > 0)
            .unwrap_or(DEFAULT_MAX_LEVELS)
    }

    fn nested_clause(
        &self,
        item: &ExpandItem,
        element: &ElementId,
        target: &StructuredTypeDefinition,
        level: &Level,
    ) -> Option<SelectExpandClause> {
        let levels = match item.levels {
            Some(0) => self.levels_limit(element, level),
            Some(levels) => levels,
            None => return item.select_expand.clone(),
        };
        let recursive = target
            .find_property(&item.navigation, self.case_insensitive())
            .is_some_and(|property| property.is_navigation());
        if levels <= 1 || !recursive {
            return item.select_expand.clone();
        }

        let mut nested = item.select_expand.clone().unwrap_or_default();
        nested.items.push(SelectItem::Expand(ExpandItem {
            levels: Some(levels - 1),
            ..item.clone()
        }));
        Some(nested)
    }

    fn bind_expansion(
        &self,
        definition: &StructuredTypeDefinition,
        level: &Level,
        variable: &str,
        item: &ExpandItem,
    ) -> AppResult<ProjectedExpansion> {
        let navigation = definition
            .find_property(&item.navigation, self.case_insensitive())
            .filter(|property| property.is_navigation())
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "'{}' is not a navigation property of '{}'",
                    item.navigation,
                    definition.name()
                ))
            })?;
        let target_name = navigation.structured_target().ok_or_else(|| {
            AppError::Internal(format!("'{}' has no target type", navigation.name()))
        })?;
        let target = self.context.model().require_type(target_name)?;
        let element = ElementId::of_property(definition.name(), navigation.name());

        let nested_context = QueryBinderContext::new(
            self.context.model_handle(),
            self.context.settings().clone(),
            target_name,
        )?;
        let nested_variable = nested_variable(item)?;

        let filter = match &item.filter {
            Some(clause) => match bind_filter(clause, &nested_context)? {
                QueryOperator::Where { predicate, .. } => Some(predicate),
                other => {
                    return Err(AppError::Internal(format!(
                        "filter bound to unexpected operator '{}'",
                        other.name()
                    )));
                }
            },
            None => None,
        };
        let order_by: Vec<SortKey> = match &item.order_by {
            Some(clause) => bind_order_by(clause, &nested_context)?,
            None => Vec::new(),
        };

        let nested_clause = self.nested_clause(item, &element, target, level);
        let nested_level = Level {
            type_name: target_name.to_owned(),
            hop: Some(element),
            depth: level.depth + 1,
        };
        let projection = self.bind_entity(&nested_level, &nested_variable, nested_clause.as_ref())?;

        Ok(ProjectedExpansion {
            name: navigation.name().to_owned(),
            source: Expr::member(Expr::parameter(variable), navigation.name()),
            is_collection: navigation.is_collection(),
            filter,
            order_by,
            skip: item.skip.map(saturating_usize),
            top: item.top.map(saturating_usize),
            count: item.count,
            projection,
        })
    }
}

fn nested_variable(item: &ExpandItem) -> AppResult<String> {
    match (&item.filter, &item.order_by) {
        (Some(filter), Some(order_by)) if filter.range_variable != order_by.range_variable => {
            Err(AppError::Internal(format!(
                "nested options of '{}' use different range variables",
                item.navigation
            )))
        }
        (Some(filter), _) => Ok(filter.range_variable.clone()),
        (None, Some(order_by)) => Ok(order_by.range_variable.clone()),
        (None, None) => Ok(IT.to_owned()),
    }
}

fn saturating_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

fn push_property(
    properties: &mut Vec<ProjectedProperty>,
    variable: &str,
    name: &str,
    auto_selected: bool,
) {
    if properties.iter().any(|property| property.name == name) {
        return;
    }

    properties.push(ProjectedProperty {
        name: name.to_owned(),
        expression: Expr::member(Expr::parameter(variable), name),
        auto_selected,
    });
}
