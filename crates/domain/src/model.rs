use std::collections::{BTreeMap, HashSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use querylens_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::annotations::{ModelAnnotations, RestrictionAnnotation};
use crate::model_bound::ModelBoundQuerySettings;

/// Supported primitive property types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    /// UTF-8 string.
    String,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// Double precision float.
    Double,
    /// Decimal number.
    Decimal,
    /// Boolean.
    Boolean,
    /// Calendar date (`YYYY-MM-DD`).
    Date,
    /// RFC 3339 timestamp with offset.
    DateTimeOffset,
    /// Time of day (`HH:MM:SS`).
    TimeOfDay,
    /// Globally unique identifier.
    Guid,
}

impl PrimitiveKind {
    /// Returns a stable name for the primitive type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTimeOffset => "date_time_offset",
            Self::TimeOfDay => "time_of_day",
            Self::Guid => "guid",
        }
    }

    /// Returns whether values of this type support arithmetic.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int32 | Self::Int64 | Self::Double | Self::Decimal
        )
    }

    /// Returns whether values of this type carry date or time parts.
    #[must_use]
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTimeOffset | Self::TimeOfDay)
    }
}

impl FromStr for PrimitiveKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "string" => Ok(Self::String),
            "int32" => Ok(Self::Int32),
            "int64" => Ok(Self::Int64),
            "double" => Ok(Self::Double),
            "decimal" => Ok(Self::Decimal),
            "boolean" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "date_time_offset" => Ok(Self::DateTimeOffset),
            "time_of_day" => Ok(Self::TimeOfDay),
            "guid" => Ok(Self::Guid),
            _ => Err(AppError::Configuration(format!(
                "unknown primitive kind '{value}'"
            ))),
        }
    }
}

/// What a property holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    /// Primitive scalar value.
    Primitive {
        /// Primitive type.
        primitive: PrimitiveKind,
    },
    /// Enumeration member name.
    Enum {
        /// Enum type name.
        enum_type: String,
    },
    /// Inline complex value.
    Complex {
        /// Complex type name.
        complex_type: String,
    },
    /// Reference to related entities.
    Navigation {
        /// Target entity type name.
        target_type: String,
    },
}

/// A property declared on a structured type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    name: NonEmptyString,
    #[serde(flatten)]
    kind: PropertyKind,
    #[serde(default)]
    is_collection: bool,
    #[serde(default = "default_nullable")]
    is_nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl PropertyDefinition {
    /// Creates a property with an explicit kind.
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> AppResult<Self> {
        Ok(Self {
            name: NonEmptyString::new(name)?,
            kind,
            is_collection: false,
            is_nullable: true,
        })
    }

    /// Creates a primitive property.
    pub fn primitive(name: impl Into<String>, primitive: PrimitiveKind) -> AppResult<Self> {
        Self::new(name, PropertyKind::Primitive { primitive })
    }

    /// Creates an enum-typed property.
    pub fn enumeration(name: impl Into<String>, enum_type: impl Into<String>) -> AppResult<Self> {
        Self::new(
            name,
            PropertyKind::Enum {
                enum_type: enum_type.into(),
            },
        )
    }

    /// Creates a complex-typed property.
    pub fn complex(name: impl Into<String>, complex_type: impl Into<String>) -> AppResult<Self> {
        Self::new(
            name,
            PropertyKind::Complex {
                complex_type: complex_type.into(),
            },
        )
    }

    /// Creates a navigation property.
    pub fn navigation(
        name: impl Into<String>,
        target_type: impl Into<String>,
        is_collection: bool,
    ) -> AppResult<Self> {
        let mut property = Self::new(
            name,
            PropertyKind::Navigation {
                target_type: target_type.into(),
            },
        )?;
        property.is_collection = is_collection;
        Ok(property)
    }

    /// Marks the property as a collection.
    #[must_use]
    pub fn into_collection(mut self) -> Self {
        self.is_collection = true;
        self
    }

    /// Marks the property as non-nullable.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    /// Returns the property name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the property kind.
    #[must_use]
    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    /// Returns whether the property holds a collection.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.is_collection
    }

    /// Returns whether the property may be null.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.is_nullable
    }

    /// Returns whether the property is a navigation property.
    #[must_use]
    pub fn is_navigation(&self) -> bool {
        matches!(self.kind, PropertyKind::Navigation { .. })
    }

    /// Returns whether the property is complex-typed.
    #[must_use]
    pub fn is_complex(&self) -> bool {
        matches!(self.kind, PropertyKind::Complex { .. })
    }

    /// Returns whether the property is a single primitive or enum value.
    #[must_use]
    pub fn is_structural_scalar(&self) -> bool {
        !self.is_collection
            && matches!(
                self.kind,
                PropertyKind::Primitive { .. } | PropertyKind::Enum { .. }
            )
    }

    /// Returns the primitive kind for primitive properties.
    #[must_use]
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self.kind {
            PropertyKind::Primitive { primitive } => Some(primitive),
            _ => None,
        }
    }

    /// Returns the structured type this property points to, for complex and navigation properties.
    #[must_use]
    pub fn structured_target(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::Complex { complex_type } => Some(complex_type.as_str()),
            PropertyKind::Navigation { target_type } => Some(target_type.as_str()),
            _ => None,
        }
    }
}

/// Whether a structured type has identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    /// Keyed entity type.
    Entity,
    /// Keyless complex type.
    Complex,
}

/// Entity or complex type description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredTypeDefinition {
    name: NonEmptyString,
    kind: TypeKind,
    #[serde(default)]
    key: Vec<String>,
    properties: Vec<PropertyDefinition>,
}

impl StructuredTypeDefinition {
    /// Creates a validated entity type.
    pub fn entity(
        name: impl Into<String>,
        key: Vec<String>,
        properties: Vec<PropertyDefinition>,
    ) -> AppResult<Self> {
        Self::new(name, TypeKind::Entity, key, properties)
    }

    /// Creates a validated complex type.
    pub fn complex(name: impl Into<String>, properties: Vec<PropertyDefinition>) -> AppResult<Self> {
        Self::new(name, TypeKind::Complex, Vec::new(), properties)
    }

    /// Creates a validated structured type.
    pub fn new(
        name: impl Into<String>,
        kind: TypeKind,
        key: Vec<String>,
        properties: Vec<PropertyDefinition>,
    ) -> AppResult<Self> {
        let name = NonEmptyString::new(name)?;
        let definition = Self {
            name,
            kind,
            key,
            properties,
        };
        definition.check()?;
        Ok(definition)
    }

    fn check(&self) -> AppResult<()> {
        let mut seen = HashSet::new();
        for property in &self.properties {
            if !seen.insert(property.name()) {
                return Err(AppError::Configuration(format!(
                    "duplicate property '{}' on type '{}'",
                    property.name(),
                    self.name
                )));
            }
        }

        match self.kind {
            TypeKind::Entity if self.key.is_empty() => {
                return Err(AppError::Configuration(format!(
                    "entity type '{}' must declare a key",
                    self.name
                )));
            }
            TypeKind::Complex if !self.key.is_empty() => {
                return Err(AppError::Configuration(format!(
                    "complex type '{}' cannot declare a key",
                    self.name
                )));
            }
            _ => {}
        }

        for key in &self.key {
            let Some(property) = self.properties.iter().find(|p| p.name() == key) else {
                return Err(AppError::Configuration(format!(
                    "key property '{}' is not declared on type '{}'",
                    key, self.name
                )));
            };
            if !property.is_structural_scalar() {
                return Err(AppError::Configuration(format!(
                    "key property '{}' on type '{}' must be a single primitive",
                    key, self.name
                )));
            }
        }

        Ok(())
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the type kind.
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Returns the key property names in declaration order.
    #[must_use]
    pub fn key(&self) -> &[String] {
        &self.key
    }

    /// Returns all declared properties.
    #[must_use]
    pub fn properties(&self) -> &[PropertyDefinition] {
        &self.properties
    }

    /// Looks up a property, optionally ignoring ASCII case.
    #[must_use]
    pub fn find_property(&self, name: &str, case_insensitive: bool) -> Option<&PropertyDefinition> {
        self.properties
            .iter()
            .find(|property| property.name() == name)
            .or_else(|| {
                case_insensitive
                    .then(|| {
                        self.properties
                            .iter()
                            .find(|property| property.name().eq_ignore_ascii_case(name))
                    })
                    .flatten()
            })
    }

    /// Iterates single-valued primitive and enum properties.
    pub fn structural_scalars(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties
            .iter()
            .filter(|property| property.is_structural_scalar())
    }
}

/// One member of an enum type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumMember {
    /// Member name.
    pub name: String,
    /// Underlying numeric value.
    pub value: i64,
}

/// Enumeration type description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumTypeDefinition {
    name: NonEmptyString,
    members: Vec<EnumMember>,
    #[serde(default)]
    is_flags: bool,
}

impl EnumTypeDefinition {
    /// Creates a validated enum type.
    pub fn new(name: impl Into<String>, members: Vec<EnumMember>, is_flags: bool) -> AppResult<Self> {
        let name = NonEmptyString::new(name)?;
        if members.is_empty() {
            return Err(AppError::Configuration(format!(
                "enum type '{name}' must declare at least one member"
            )));
        }

        Ok(Self {
            name,
            members,
            is_flags,
        })
    }

    /// Returns the enum type name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns enum members in declaration order.
    #[must_use]
    pub fn members(&self) -> &[EnumMember] {
        &self.members
    }

    /// Returns whether values may combine several members.
    #[must_use]
    pub fn is_flags(&self) -> bool {
        self.is_flags
    }

    /// Finds a member by name, ignoring ASCII case.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<&EnumMember> {
        self.members
            .iter()
            .find(|member| member.name.eq_ignore_ascii_case(name))
    }
}

/// Stable identity of a model element used by the annotation side-table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId {
    type_name: String,
    property_name: Option<String>,
}

impl ElementId {
    /// Identifies a structured type.
    #[must_use]
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            property_name: None,
        }
    }

    /// Identifies a property on its declaring type.
    #[must_use]
    pub fn of_property(type_name: impl Into<String>, property_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            property_name: Some(property_name.into()),
        }
    }

    /// Returns the (declaring) type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.type_name.as_str()
    }

    /// Returns the property name for property elements.
    #[must_use]
    pub fn property_name(&self) -> Option<&str> {
        self.property_name.as_deref()
    }
}

impl Display for ElementId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.property_name {
            Some(property) => write!(formatter, "{}/{}", self.type_name, property),
            None => formatter.write_str(self.type_name.as_str()),
        }
    }
}

/// Read-only type model with its annotation side-table.
#[derive(Debug, Clone, Default)]
pub struct DataModel {
    types: BTreeMap<String, StructuredTypeDefinition>,
    enums: BTreeMap<String, EnumTypeDefinition>,
    annotations: ModelAnnotations,
}

impl DataModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a structured type.
    pub fn with_type(mut self, definition: StructuredTypeDefinition) -> AppResult<Self> {
        let name = definition.name().to_owned();
        if self.types.contains_key(name.as_str()) || self.enums.contains_key(name.as_str()) {
            return Err(AppError::Configuration(format!(
                "type '{name}' is already declared"
            )));
        }

        self.types.insert(name, definition);
        Ok(self)
    }

    /// Adds an enum type.
    pub fn with_enum(mut self, definition: EnumTypeDefinition) -> AppResult<Self> {
        let name = definition.name().to_owned();
        if self.types.contains_key(name.as_str()) || self.enums.contains_key(name.as_str()) {
            return Err(AppError::Configuration(format!(
                "type '{name}' is already declared"
            )));
        }

        self.enums.insert(name, definition);
        Ok(self)
    }

    /// Attaches restriction flags to a model element.
    pub fn with_restrictions(
        mut self,
        element: ElementId,
        restrictions: RestrictionAnnotation,
    ) -> AppResult<Self> {
        self.require_element(&element)?;
        self.annotations.set_restrictions(element, restrictions);
        Ok(self)
    }

    /// Attaches model-bound query settings to a model element.
    pub fn with_query_settings(
        mut self,
        element: ElementId,
        settings: ModelBoundQuerySettings,
    ) -> AppResult<Self> {
        self.require_element(&element)?;
        self.annotations.set_query_settings(element, settings);
        Ok(self)
    }

    /// Checks that every type reference in the model resolves.
    pub fn check_references(&self) -> AppResult<()> {
        for definition in self.types.values() {
            for property in definition.properties() {
                let missing = match property.kind() {
                    PropertyKind::Primitive { .. } => None,
                    PropertyKind::Enum { enum_type } => {
                        (!self.enums.contains_key(enum_type)).then_some(enum_type)
                    }
                    PropertyKind::Complex { complex_type } => self
                        .types
                        .get(complex_type)
                        .is_none_or(|target| target.kind() != TypeKind::Complex)
                        .then_some(complex_type),
                    PropertyKind::Navigation { target_type } => self
                        .types
                        .get(target_type)
                        .is_none_or(|target| target.kind() != TypeKind::Entity)
                        .then_some(target_type),
                };

                if let Some(missing) = missing {
                    return Err(AppError::Configuration(format!(
                        "property '{}/{}' references unknown type '{}'",
                        definition.name(),
                        property.name(),
                        missing
                    )));
                }
            }
        }

        Ok(())
    }

    /// Looks up a structured type by name.
    #[must_use]
    pub fn structured_type(&self, name: &str) -> Option<&StructuredTypeDefinition> {
        self.types.get(name)
    }

    /// Looks up a structured type, failing when it is not declared.
    pub fn require_type(&self, name: &str) -> AppResult<&StructuredTypeDefinition> {
        self.types
            .get(name)
            .ok_or_else(|| AppError::Configuration(format!("type '{name}' is not declared")))
    }

    /// Looks up an enum type by name.
    #[must_use]
    pub fn enum_type(&self, name: &str) -> Option<&EnumTypeDefinition> {
        self.enums.get(name)
    }

    /// Looks up a property on a structured type.
    #[must_use]
    pub fn property(
        &self,
        type_name: &str,
        property_name: &str,
        case_insensitive: bool,
    ) -> Option<&PropertyDefinition> {
        self.types
            .get(type_name)
            .and_then(|definition| definition.find_property(property_name, case_insensitive))
    }

    /// Iterates every structured type.
    pub fn types(&self) -> impl Iterator<Item = &StructuredTypeDefinition> {
        self.types.values()
    }

    /// Returns the annotation side-table.
    #[must_use]
    pub fn annotations(&self) -> &ModelAnnotations {
        &self.annotations
    }

    fn require_element(&self, element: &ElementId) -> AppResult<()> {
        let definition = self.require_type(element.type_name())?;
        if let Some(property) = element.property_name()
            && definition.find_property(property, false).is_none()
        {
            return Err(AppError::Configuration(format!(
                "cannot annotate unknown property '{element}'"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DataModel, ElementId, EnumMember, EnumTypeDefinition, PrimitiveKind, PropertyDefinition,
        StructuredTypeDefinition,
    };
    use crate::RestrictionAnnotation;

    fn property(name: &str, kind: PrimitiveKind) -> PropertyDefinition {
        PropertyDefinition::primitive(name, kind).unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn entity_requires_declared_key() {
        let result = StructuredTypeDefinition::entity(
            "Person",
            vec!["Id".to_owned()],
            vec![property("Name", PrimitiveKind::String)],
        );
        assert!(result.is_err());
    }

    #[test]
    fn structured_type_rejects_duplicate_properties() {
        let result = StructuredTypeDefinition::complex(
            "Address",
            vec![
                property("City", PrimitiveKind::String),
                property("City", PrimitiveKind::String),
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn property_lookup_honours_case_insensitivity() {
        let person = StructuredTypeDefinition::entity(
            "Person",
            vec!["Id".to_owned()],
            vec![property("Id", PrimitiveKind::Int32)],
        )
        .unwrap_or_else(|_| unreachable!());

        assert!(person.find_property("id", false).is_none());
        assert!(person.find_property("id", true).is_some());
    }

    #[test]
    fn annotating_unknown_property_fails() {
        let model = DataModel::new()
            .with_type(
                StructuredTypeDefinition::entity(
                    "Person",
                    vec!["Id".to_owned()],
                    vec![property("Id", PrimitiveKind::Int32)],
                )
                .unwrap_or_else(|_| unreachable!()),
            )
            .unwrap_or_else(|_| unreachable!());

        let result = model.with_restrictions(
            ElementId::of_property("Person", "Missing"),
            RestrictionAnnotation::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn check_references_reports_missing_enum() {
        let model = DataModel::new()
            .with_type(
                StructuredTypeDefinition::entity(
                    "Product",
                    vec!["Id".to_owned()],
                    vec![
                        property("Id", PrimitiveKind::Int32),
                        PropertyDefinition::enumeration("Color", "Color")
                            .unwrap_or_else(|_| unreachable!()),
                    ],
                )
                .unwrap_or_else(|_| unreachable!()),
            )
            .unwrap_or_else(|_| unreachable!());
        assert!(model.check_references().is_err());

        let model = model
            .with_enum(
                EnumTypeDefinition::new(
                    "Color",
                    vec![EnumMember {
                        name: "Red".to_owned(),
                        value: 1,
                    }],
                    false,
                )
                .unwrap_or_else(|_| unreachable!()),
            )
            .unwrap_or_else(|_| unreachable!());
        assert!(model.check_references().is_ok());
    }
}
