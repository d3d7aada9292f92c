use querylens_core::{AppError, AppResult};

/// Maps model property names to output names.
pub trait PropertyMapper {
    /// Returns the output name, or `None` to omit the property.
    fn map_property(&self, name: &str) -> Option<String>;
}

/// Mapper that keeps model names unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPropertyMapper;

impl PropertyMapper for IdentityPropertyMapper {
    fn map_property(&self, name: &str) -> Option<String> {
        Some(name.to_owned())
    }
}

impl<F> PropertyMapper for F
where
    F: Fn(&str) -> Option<String>,
{
    fn map_property(&self, name: &str) -> Option<String> {
        self(name)
    }
}

pub(super) fn mapped_name(mapper: &dyn PropertyMapper, name: &str) -> AppResult<Option<String>> {
    match mapper.map_property(name) {
        Some(mapped) if mapped.is_empty() => Err(AppError::Configuration(format!(
            "property mapper returned an empty name for property '{name}'"
        ))),
        mapped => Ok(mapped),
    }
}
