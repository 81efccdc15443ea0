//! Model definitions exchanged with the Custom Types API.
//!
//! # Design
//! The API treats custom type and shared slice definitions as opaque JSON
//! documents identified by a string `id`. Only `id` is typed; every other
//! field is kept in a JSON map and passed through untouched. Equality is
//! `serde_json::Value` equality, so object key order never matters while
//! array order does. The field map never holds an `id` key; `id` always lives
//! in the typed field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A model that can be diffed and addressed by id.
pub trait Model: Clone + PartialEq {
    fn id(&self) -> &str;
}

/// A content type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomTypeModel {
    pub id: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

/// A reusable content component definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedSliceModel {
    pub id: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

macro_rules! model_impl {
    ($model:ident) => {
        impl $model {
            pub fn new(id: impl Into<String>) -> Self {
                Self {
                    id: id.into(),
                    fields: Map::new(),
                }
            }

            /// Set one opaque field, replacing any previous value.
            ///
            /// `"id"` sets the model id instead. A non-string id is ignored.
            pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
                let key = key.into();
                let value = value.into();
                if key == "id" {
                    if let Value::String(id) = value {
                        self.id = id;
                    }
                } else {
                    self.fields.insert(key, value);
                }
                self
            }

            pub fn field(&self, key: &str) -> Option<&Value> {
                self.fields.get(key)
            }

            /// Every field except `id`.
            pub fn fields(&self) -> &Map<String, Value> {
                &self.fields
            }
        }

        impl Model for $model {
            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

model_impl!(CustomTypeModel);
model_impl!(SharedSliceModel);

/// Payload of a delete operation: only the id of the removed model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelId {
    pub id: String,
}

impl<M: Model> From<&M> for ModelId {
    fn from(model: &M) -> Self {
        Self {
            id: model.id().to_string(),
        }
    }
}

/// A before or after snapshot of a repository's models, used for diffing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionModels {
    #[serde(default)]
    pub custom_types: Vec<CustomTypeModel>,
    #[serde(default)]
    pub slices: Vec<SharedSliceModel>,
}

impl TransactionModels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_custom_types(mut self, custom_types: Vec<CustomTypeModel>) -> Self {
        self.custom_types = custom_types;
        self
    }

    pub fn with_slices(mut self, slices: Vec<SharedSliceModel>) -> Self {
        self.slices = slices;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_serializes_flat() {
        let model = CustomTypeModel::new("page")
            .with("label", "Page")
            .with("repeatable", true);
        let value = serde_json::to_value(&model).unwrap();
        assert_eq!(value, json!({ "id": "page", "label": "Page", "repeatable": true }));
    }

    #[test]
    fn model_keeps_unknown_fields() {
        let value = json!({
            "id": "hero",
            "type": "SharedSlice",
            "variations": [{ "id": "default" }]
        });
        let slice: SharedSliceModel = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(slice.id(), "hero");
        assert_eq!(slice.field("type"), Some(&json!("SharedSlice")));
        assert_eq!(serde_json::to_value(&slice).unwrap(), value);
    }

    #[test]
    fn model_requires_id() {
        let result: Result<CustomTypeModel, _> = serde_json::from_value(json!({ "label": "Page" }));
        assert!(result.is_err());
    }

    #[test]
    fn with_id_sets_the_model_id() {
        let model = CustomTypeModel::new("page").with("id", "blog").with("label", "Blog");
        assert_eq!(model.id(), "blog");
        assert!(model.field("id").is_none());
        assert_eq!(
            serde_json::to_value(&model).unwrap(),
            json!({ "id": "blog", "label": "Blog" })
        );
    }

    #[test]
    fn with_non_string_id_is_ignored() {
        let slice = SharedSliceModel::new("hero").with("id", 42);
        assert_eq!(slice.id(), "hero");
        assert!(slice.fields().is_empty());
    }

    #[test]
    fn equality_ignores_key_order() {
        let a: CustomTypeModel =
            serde_json::from_str(r#"{"id":"page","label":"Page","json":{"a":1,"b":2}}"#).unwrap();
        let b: CustomTypeModel =
            serde_json::from_str(r#"{"json":{"b":2,"a":1},"label":"Page","id":"page"}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn equality_respects_array_order() {
        let a = SharedSliceModel::new("hero").with("variations", json!(["default", "dark"]));
        let b = SharedSliceModel::new("hero").with("variations", json!(["dark", "default"]));
        assert_ne!(a, b);
    }

    #[test]
    fn transaction_models_default_missing_collections() {
        let models: TransactionModels =
            serde_json::from_value(json!({ "customTypes": [{ "id": "page" }] })).unwrap();
        assert_eq!(models.custom_types.len(), 1);
        assert!(models.slices.is_empty());
    }
}
