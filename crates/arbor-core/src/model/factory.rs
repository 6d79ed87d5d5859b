use super::kind::ModelType;
use super::types::{
    CAROUSEL_MIME_TYPE, CarouselModel, FILE_MIME_TYPE, FileModel, TEXT_MIME_TYPE, TextModel,
};
use crate::part::Part;
use std::collections::BTreeMap;

pub type ModelConstructor = fn() -> Box<dyn ModelType>;

/// Maps root part MIME types to model types.
#[derive(Debug, Clone)]
pub struct ModelFactory {
    constructors: BTreeMap<String, ModelConstructor>,
}

impl Default for ModelFactory {
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register(TEXT_MIME_TYPE, || Box::new(TextModel));
        factory.register(FILE_MIME_TYPE, || Box::new(FileModel::default()));
        factory.register(CAROUSEL_MIME_TYPE, || Box::new(CarouselModel));
        factory
    }
}

impl ModelFactory {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, mime_type: impl Into<String>, constructor: ModelConstructor) {
        self.constructors.insert(mime_type.into(), constructor);
    }

    pub fn knows(&self, mime_type: &str) -> bool {
        self.constructors.contains_key(mime_type)
    }

    /// The model type for `part`, or `None` when the part has no typed
    /// representation.
    pub fn create(&self, part: &Part) -> Option<Box<dyn ModelType>> {
        if part.is_response_summary() {
            return None;
        }
        self.constructors
            .get(part.mime_base())
            .map(|constructor| constructor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::ROLE_RESPONSE_SUMMARY;

    #[test]
    fn test_create_by_mime_type() {
        let factory = ModelFactory::default();
        let part = Part::new(TEXT_MIME_TYPE, "{}");
        assert_eq!(factory.create(&part).map(|kind| kind.name()), Some("text"));
        assert!(factory.create(&Part::new("text/plain", "hi")).is_none());
    }

    #[test]
    fn test_response_summary_is_untyped() {
        let mut factory = ModelFactory::empty();
        factory.register("application/json", || Box::new(TextModel));
        let mut part = Part::new("application/json", "{}");
        assert!(factory.create(&part).is_some());
        part.set_role(ROLE_RESPONSE_SUMMARY);
        assert!(factory.create(&part).is_none());
    }
}
