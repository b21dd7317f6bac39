//! Stamps the collector's own identity onto incoming resources.

use crate::models::{resource::keys, AttributeValue, Resource};
use std::sync::Arc;

/// Adds process-identity attributes to resources that lack them.
///
/// Existing attributes always win; the tagger never overwrites what the
/// producing service reported.
#[derive(Debug, Clone, Default)]
pub struct ResourceTagger {
    attributes: Vec<(String, AttributeValue)>,
}

impl ResourceTagger {
    /// Creates a tagger that stamps `service.instance.id`.
    #[must_use]
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            attributes: vec![(
                keys::SERVICE_INSTANCE_ID.to_string(),
                AttributeValue::String(instance_id.into()),
            )],
        }
    }

    /// Adds an extra attribute to stamp.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Returns a resource carrying every configured attribute.
    ///
    /// The input is returned as-is when nothing needs adding.
    #[must_use]
    pub fn tag(&self, resource: Arc<Resource>) -> Arc<Resource> {
        if self.attributes.iter().all(|(key, _)| resource.contains(key)) {
            return resource;
        }

        let mut tagged = (*resource).clone();
        for (key, value) in &self.attributes {
            tagged.insert_if_absent(key, value.clone());
        }
        Arc::new(tagged)
    }
}
