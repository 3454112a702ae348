use super::field::{FieldMap, FieldValue};

/// An ECS-shaped document ready to be buffered and indexed.
///
/// Documents are built once by the mapper and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: FieldMap,
}

impl Document {
    pub fn from_fields(fields: FieldMap) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn into_fields(self) -> FieldMap {
        self.fields
    }

    /// Looks up a field by dotted path (`log.origin.file.line`).
    ///
    /// A top-level key that itself contains dots wins over the nested walk.
    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        if let Some(value) = self.fields.get(path) {
            return Some(value);
        }

        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(FieldValue::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<FieldMap> for Document {
    fn from(fields: FieldMap) -> Self {
        Self::from_fields(fields)
    }
}
