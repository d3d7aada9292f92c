use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::ops::BitOr;
use std::str::FromStr;

use chrono::{FixedOffset, Offset, Utc};
use querylens_core::{AppError, ValidationError};
use serde::{Deserialize, Serialize};

use crate::clause::{BinaryOperatorKind, UnaryOperatorKind};

/// System query options known to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOptionKind {
    /// `$compute`
    Compute,
    /// `$apply`
    Apply,
    /// `$filter`
    Filter,
    /// `$search`
    Search,
    /// `$count`
    Count,
    /// `$orderby`
    OrderBy,
    /// `$skiptoken`
    SkipToken,
    /// `$skip`
    Skip,
    /// `$top`
    Top,
    /// `$expand`
    Expand,
    /// `$select`
    Select,
    /// `$format`
    Format,
    /// `$deltatoken`
    DeltaToken,
}

impl QueryOptionKind {
    /// Returns every option in validation order.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[QueryOptionKind] = &[
            QueryOptionKind::Compute,
            QueryOptionKind::Apply,
            QueryOptionKind::Skip,
            QueryOptionKind::Top,
            QueryOptionKind::OrderBy,
            QueryOptionKind::Filter,
            QueryOptionKind::Search,
            QueryOptionKind::Count,
            QueryOptionKind::SkipToken,
            QueryOptionKind::Expand,
            QueryOptionKind::Select,
            QueryOptionKind::Format,
            QueryOptionKind::DeltaToken,
        ];

        ALL
    }

    /// Returns the `$`-prefixed wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compute => "$compute",
            Self::Apply => "$apply",
            Self::Filter => "$filter",
            Self::Search => "$search",
            Self::Count => "$count",
            Self::OrderBy => "$orderby",
            Self::SkipToken => "$skiptoken",
            Self::Skip => "$skip",
            Self::Top => "$top",
            Self::Expand => "$expand",
            Self::Select => "$select",
            Self::Format => "$format",
            Self::DeltaToken => "$deltatoken",
        }
    }

    fn bit(self) -> u16 {
        match self {
            Self::Compute => 1 << 0,
            Self::Apply => 1 << 1,
            Self::Filter => 1 << 2,
            Self::Search => 1 << 3,
            Self::Count => 1 << 4,
            Self::OrderBy => 1 << 5,
            Self::SkipToken => 1 << 6,
            Self::Skip => 1 << 7,
            Self::Top => 1 << 8,
            Self::Expand => 1 << 9,
            Self::Select => 1 << 10,
            Self::Format => 1 << 11,
            Self::DeltaToken => 1 << 12,
        }
    }
}

impl Display for QueryOptionKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for QueryOptionKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let name = value.strip_prefix('$').unwrap_or(value).to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str()[1..] == name)
            .ok_or_else(|| {
                AppError::Validation(ValidationError::invalid(format!(
                    "the query parameter '{value}' is not supported"
                )))
            })
    }
}

/// Bit set of query options a request may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<QueryOptionKind>", into = "Vec<QueryOptionKind>")]
pub struct AllowedQueryOptions(u16);

impl AllowedQueryOptions {
    /// No option allowed.
    pub const NONE: Self = Self(0);

    /// Returns the set with every option allowed.
    #[must_use]
    pub fn all() -> Self {
        QueryOptionKind::all()
            .iter()
            .fold(Self::NONE, |allowed, kind| allowed | *kind)
    }

    /// Returns whether the option is allowed.
    #[must_use]
    pub fn contains(&self, kind: QueryOptionKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Returns a copy without the option.
    #[must_use]
    pub fn without(self, kind: QueryOptionKind) -> Self {
        Self(self.0 & !kind.bit())
    }
}

impl Default for AllowedQueryOptions {
    fn default() -> Self {
        Self::all()
    }
}

impl BitOr<QueryOptionKind> for AllowedQueryOptions {
    type Output = Self;

    fn bitor(self, kind: QueryOptionKind) -> Self::Output {
        Self(self.0 | kind.bit())
    }
}

impl From<Vec<QueryOptionKind>> for AllowedQueryOptions {
    fn from(kinds: Vec<QueryOptionKind>) -> Self {
        kinds
            .into_iter()
            .fold(Self::NONE, |allowed, kind| allowed | kind)
    }
}

impl From<AllowedQueryOptions> for Vec<QueryOptionKind> {
    fn from(allowed: AllowedQueryOptions) -> Self {
        QueryOptionKind::all()
            .iter()
            .copied()
            .filter(|kind| allowed.contains(*kind))
            .collect()
    }
}

/// How member access on a possibly-null path is bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPropagation {
    /// Short-circuit to null when a source on the path is null.
    #[default]
    Always,
    /// Assume every source on the path is non-null.
    Never,
}

impl FromStr for NullPropagation {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            _ => Err(AppError::Configuration(format!(
                "unknown null propagation mode '{value}'"
            ))),
        }
    }
}

/// Binding settings for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Null handling for member access.
    pub null_propagation: NullPropagation,
    /// Resolve property names ignoring ASCII case.
    pub enable_case_insensitive: bool,
    /// Offset east of UTC, in seconds, used for date functions.
    pub time_zone_offset_seconds: i32,
    /// Server-driven page size.
    pub page_size: Option<u32>,
    /// Append key ordering whenever paging applies.
    pub ensure_stable_ordering: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            null_propagation: NullPropagation::Always,
            enable_case_insensitive: false,
            time_zone_offset_seconds: 0,
            page_size: None,
            ensure_stable_ordering: true,
        }
    }
}

impl QuerySettings {
    /// Returns the configured time zone.
    #[must_use]
    pub fn time_zone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.time_zone_offset_seconds).unwrap_or_else(|| Utc.fix())
    }
}

/// Validation limits for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Largest accepted `$top`.
    pub max_top: Option<u64>,
    /// Largest accepted `$skip`.
    pub max_skip: Option<u64>,
    /// Deepest accepted `$expand` nesting.
    pub max_expansion_depth: u32,
    /// Deepest accepted `any`/`all` nesting.
    pub max_any_all_expression_depth: u32,
    /// Largest accepted `$filter` node count.
    pub max_node_count: u32,
    /// Largest accepted number of `$orderby` items.
    pub max_order_by_node_count: u32,
    /// Options the request may use.
    pub allowed_query_options: AllowedQueryOptions,
    /// Explicit order-by allow-list; empty means "use the model".
    pub allowed_order_by_properties: BTreeSet<String>,
    /// Functions allowed in expressions; `None` allows all.
    pub allowed_functions: Option<BTreeSet<String>>,
    /// Binary operators allowed in expressions; `None` allows all.
    pub allowed_binary_operators: Option<BTreeSet<BinaryOperatorKind>>,
    /// Unary operators allowed in expressions; `None` allows all.
    pub allowed_unary_operators: Option<BTreeSet<UnaryOperatorKind>>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_top: None,
            max_skip: None,
            max_expansion_depth: 2,
            max_any_all_expression_depth: 1,
            max_node_count: 100,
            max_order_by_node_count: 5,
            allowed_query_options: AllowedQueryOptions::all(),
            allowed_order_by_properties: BTreeSet::new(),
            allowed_functions: None,
            allowed_binary_operators: None,
            allowed_unary_operators: None,
        }
    }
}

/// Request-level capability defaults used when the model says nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultQuerySettings {
    /// Properties are filterable unless restricted.
    pub enable_filter: bool,
    /// Properties are sortable unless restricted.
    pub enable_order_by: bool,
    /// Properties are selectable unless restricted.
    pub enable_select: bool,
    /// Navigations are expandable unless restricted.
    pub enable_expand: bool,
    /// Collections are countable unless restricted.
    pub enable_count: bool,
    /// `$skiptoken` paging is enabled.
    pub enable_skip_token: bool,
    /// Largest `$top` when the model sets none.
    pub max_top: Option<u32>,
}

impl DefaultQuerySettings {
    /// Returns settings with every capability enabled.
    #[must_use]
    pub fn enable_all() -> Self {
        Self {
            enable_filter: true,
            enable_order_by: true,
            enable_select: true,
            enable_expand: true,
            enable_count: true,
            enable_skip_token: true,
            max_top: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AllowedQueryOptions, NullPropagation, QueryOptionKind, QuerySettings};

    #[test]
    fn allowed_options_track_membership() {
        let allowed = AllowedQueryOptions::all().without(QueryOptionKind::Top);

        assert!(!allowed.contains(QueryOptionKind::Top));
        assert!(allowed.contains(QueryOptionKind::Filter));
        assert!(!AllowedQueryOptions::NONE.contains(QueryOptionKind::Filter));
    }

    #[test]
    fn allowed_options_deserialize_from_names() {
        let allowed: AllowedQueryOptions =
            serde_json::from_str(r#"["filter", "top"]"#).unwrap_or_else(|_| unreachable!());

        assert!(allowed.contains(QueryOptionKind::Filter));
        assert!(allowed.contains(QueryOptionKind::Top));
        assert!(!allowed.contains(QueryOptionKind::Skip));
    }

    #[test]
    fn option_kind_parses_wire_names() {
        assert_eq!(
            "$orderby".parse::<QueryOptionKind>().ok(),
            Some(QueryOptionKind::OrderBy)
        );
        assert!("$bogus".parse::<QueryOptionKind>().is_err());
    }

    #[test]
    fn null_propagation_parses_case_insensitively() {
        assert_eq!("NEVER".parse::<NullPropagation>().ok(), Some(NullPropagation::Never));
    }

    #[test]
    fn out_of_range_time_zone_falls_back_to_utc() {
        let settings = QuerySettings {
            time_zone_offset_seconds: 999_999,
            ..QuerySettings::default()
        };

        assert_eq!(settings.time_zone().local_minus_utc(), 0);
    }
}
