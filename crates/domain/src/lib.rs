//! Type model, capability annotations, request settings and parsed query clauses.

#![forbid(unsafe_code)]

mod annotations;
mod apply;
mod clause;
mod model;
mod model_bound;
mod select_expand;
mod settings;

pub use annotations::{AnnotationLookup, ModelAnnotations, RestrictionAnnotation};
pub use apply::{
    AggregateExpression, AggregateExpressionKind, AggregationMethod, ApplyClause,
    GroupByPropertyNode, TransformationNode,
};
pub use clause::{
    BinaryOperatorKind, ComputeClause, ComputeExpression, FilterClause, IT, OrderByClause,
    OrderByDirection, OrderByItem, QueryNode, SearchClause, THIS, UnaryOperatorKind,
};
pub use model::{
    DataModel, ElementId, EnumMember, EnumTypeDefinition, PrimitiveKind, PropertyDefinition,
    PropertyKind, StructuredTypeDefinition, TypeKind,
};
pub use model_bound::{ExpandConfiguration, ModelBoundQuerySettings, SelectExpandType};
pub use select_expand::{ExpandItem, SelectExpandClause, SelectItem};
pub use settings::{
    AllowedQueryOptions, DefaultQuerySettings, NullPropagation, QueryOptionKind, QuerySettings,
    ValidationSettings,
};
