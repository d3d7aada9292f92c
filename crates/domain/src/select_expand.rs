use serde::{Deserialize, Serialize};

use crate::clause::{FilterClause, OrderByClause};

/// One expanded navigation with its nested options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandItem {
    /// Navigation property name.
    pub navigation: String,
    /// Nested `$select`/`$expand`; `None` selects every structural property.
    #[serde(default)]
    pub select_expand: Option<SelectExpandClause>,
    /// Nested `$filter` over the navigation target.
    #[serde(default)]
    pub filter: Option<FilterClause>,
    /// Nested `$orderby` over the navigation target.
    #[serde(default)]
    pub order_by: Option<OrderByClause>,
    /// Nested `$top`.
    #[serde(default)]
    pub top: Option<u64>,
    /// Nested `$skip`.
    #[serde(default)]
    pub skip: Option<u64>,
    /// Nested `$count`.
    #[serde(default)]
    pub count: bool,
    /// `$levels`; `Some(0)` means `max`.
    #[serde(default)]
    pub levels: Option<u32>,
}

impl ExpandItem {
    /// Creates a plain expansion without nested options.
    #[must_use]
    pub fn new(navigation: impl Into<String>) -> Self {
        Self {
            navigation: navigation.into(),
            select_expand: None,
            filter: None,
            order_by: None,
            top: None,
            skip: None,
            count: false,
            levels: None,
        }
    }
}

/// One `$select` or `$expand` item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum SelectItem {
    /// A structural, computed or navigation property selected by name.
    Property {
        /// Property name.
        name: String,
    },
    /// `*`.
    Wildcard,
    /// An expanded navigation.
    Expand(ExpandItem),
}

/// Parsed `$select` and `$expand` of one level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectExpandClause {
    /// Items in request order.
    #[serde(default)]
    pub items: Vec<SelectItem>,
}

impl SelectExpandClause {
    /// Creates a clause selecting the named properties.
    #[must_use]
    pub fn select(names: &[&str]) -> Self {
        Self {
            items: names
                .iter()
                .map(|name| SelectItem::Property {
                    name: (*name).to_owned(),
                })
                .collect(),
        }
    }

    /// Appends an expansion.
    #[must_use]
    pub fn with_expand(mut self, expand: ExpandItem) -> Self {
        self.items.push(SelectItem::Expand(expand));
        self
    }

    /// Returns whether every structural property is selected.
    #[must_use]
    pub fn all_selected(&self) -> bool {
        let mut has_property = false;
        for item in &self.items {
            match item {
                SelectItem::Wildcard => return true,
                SelectItem::Property { .. } => has_property = true,
                SelectItem::Expand(_) => {}
            }
        }

        !has_property
    }

    /// Iterates explicitly selected property names.
    pub fn selected_properties(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match item {
            SelectItem::Property { name } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Iterates expanded navigations.
    pub fn expanded(&self) -> impl Iterator<Item = &ExpandItem> {
        self.items.iter().filter_map(|item| match item {
            SelectItem::Expand(expand) => Some(expand),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ExpandItem, SelectExpandClause, SelectItem};

    #[test]
    fn expand_only_clause_selects_everything() {
        let clause = SelectExpandClause::default().with_expand(ExpandItem::new("Orders"));

        assert!(clause.all_selected());
        assert_eq!(clause.expanded().count(), 1);
    }

    #[test]
    fn explicit_properties_narrow_the_selection() {
        let clause = SelectExpandClause::select(&["Id", "Name"]);

        assert!(!clause.all_selected());
        assert_eq!(clause.selected_properties().collect::<Vec<_>>(), ["Id", "Name"]);
    }

    #[test]
    fn wildcard_wins_over_explicit_properties() {
        let mut clause = SelectExpandClause::select(&["Id"]);
        clause.items.push(SelectItem::Wildcard);

        assert!(clause.all_selected());
    }
}
