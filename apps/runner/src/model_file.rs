use std::path::Path;

use querylens_core::{AppError, AppResult};
use querylens_domain::{
    DataModel, ElementId, EnumTypeDefinition, ModelBoundQuerySettings, RestrictionAnnotation,
    StructuredTypeDefinition,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct RestrictionEntry {
    element: ElementId,
    restrictions: RestrictionAnnotation,
}

#[derive(Debug, Deserialize)]
struct QuerySettingsEntry {
    element: ElementId,
    settings: ModelBoundQuerySettings,
}

/// On-disk model description: types, enums and their annotations.
#[derive(Debug, Deserialize)]
pub(crate) struct ModelFile {
    types: Vec<StructuredTypeDefinition>,
    #[serde(default)]
    enums: Vec<EnumTypeDefinition>,
    #[serde(default)]
    restrictions: Vec<RestrictionEntry>,
    #[serde(default)]
    query_settings: Vec<QuerySettingsEntry>,
}

impl ModelFile {
    pub(crate) fn parse(text: &str) -> AppResult<Self> {
        serde_json::from_str(text)
            .map_err(|error| AppError::Configuration(format!("invalid model document: {error}")))
    }

    /// Builds the model, re-running the checks serde skips.
    pub(crate) fn into_model(self) -> AppResult<DataModel> {
        let mut model = DataModel::new();
        for definition in self.enums {
            model = model.with_enum(EnumTypeDefinition::new(
                definition.name(),
                definition.members().to_vec(),
                definition.is_flags(),
            )?)?;
        }
        for definition in self.types {
            model = model.with_type(StructuredTypeDefinition::new(
                definition.name(),
                definition.kind(),
                definition.key().to_vec(),
                definition.properties().to_vec(),
            )?)?;
        }
        model.check_references()?;

        for entry in self.restrictions {
            model = model.with_restrictions(entry.element, entry.restrictions)?;
        }
        for entry in self.query_settings {
            model = model.with_query_settings(entry.element, entry.settings)?;
        }

        Ok(model)
    }
}

fn read(path: &Path) -> AppResult<String> {
    std::fs::read_to_string(path).map_err(|error| {
        AppError::Configuration(format!("failed to read '{}': {error}", path.display()))
    })
}

pub(crate) fn load_model(path: &Path) -> AppResult<DataModel> {
    ModelFile::parse(&read(path)?)?.into_model()
}

/// Loads the source rows: a JSON array of objects.
pub(crate) fn load_rows(path: &Path) -> AppResult<Vec<Value>> {
    let rows: Vec<Value> = serde_json::from_str(&read(path)?).map_err(|error| {
        AppError::Configuration(format!(
            "'{}' is not a JSON array of records: {error}",
            path.display()
        ))
    })?;

    if let Some(position) = rows.iter().position(|row| !row.is_object()) {
        return Err(AppError::Configuration(format!(
            "record {position} in '{}' is not a JSON object",
            path.display()
        )));
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use querylens_core::AppError;
    use querylens_domain::{AnnotationLookup, ElementId};

    use super::ModelFile;

    const MODEL: &str = r#"{
        "types": [{
            "name": "Book",
            "kind": "entity",
            "key": ["Id"],
            "properties": [
                { "name": "Id", "kind": "primitive", "primitive": "int32", "is_nullable": false },
                { "name": "Title", "kind": "primitive", "primitive": "string" },
                { "name": "Genre", "kind": "enum", "enum_type": "Genre" }
            ]
        }],
        "enums": [{ "name": "Genre", "members": [{ "name": "Fiction", "value": 0 }] }],
        "restrictions": [{
            "element": { "type_name": "Book", "property_name": "Title" },
            "restrictions": { "not_sortable": true }
        }],
        "query_settings": [{
            "element": { "type_name": "Book", "property_name": null },
            "settings": { "page_size": 10 }
        }]
    }"#;

    #[test]
    fn model_document_builds_an_annotated_model() {
        let model = ModelFile::parse(MODEL)
            .and_then(ModelFile::into_model)
            .unwrap_or_else(|error| panic!("model failed to load: {error}"));

        assert!(model.structured_type("Book").is_some());
        let title = ElementId::of_property("Book", "Title");
        assert!(
            model
                .annotations()
                .restrictions(&title)
                .is_some_and(|restrictions| restrictions.not_sortable)
        );
        assert_eq!(
            model
                .annotations()
                .query_settings(&ElementId::of_type("Book"))
                .and_then(|settings| settings.page_size),
            Some(10)
        );
    }

    #[test]
    fn dangling_enum_reference_is_a_configuration_error() {
        let broken = MODEL.replace(r#""enum_type": "Genre""#, r#""enum_type": "Mood""#);

        let result = ModelFile::parse(&broken).and_then(ModelFile::into_model);
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }
}
