//! Compute the changes that turn one model collection into another.
//!
//! Models are matched by id. `after` is walked in order: a model with a
//! matching id still unclaimed in `before` is claimed and yields an update
//! when the two differ, any other model yields an insert. Every `before`
//! model left unclaimed afterwards yields a delete, in `before` order.
//!
//! Differ means `!=` on the model, which compares field values
//! structurally. Reordered object keys are not a change; reordered arrays
//! are.
//!
//! Duplicate ids are not supported input. With duplicates in `before`, each
//! `after` model claims the first unclaimed match and the rest are deleted.

use crate::types::Model;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelChange<M> {
    Insert(M),
    Update(M),
    Delete(M),
}

impl<M: Model> ModelChange<M> {
    pub fn model(&self) -> &M {
        match self {
            ModelChange::Insert(model) | ModelChange::Update(model) | ModelChange::Delete(model) => {
                model
            }
        }
    }
}

pub fn diff<M: Model>(before: &[M], after: &[M]) -> Vec<ModelChange<M>> {
    let mut unclaimed: Vec<Option<&M>> = before.iter().map(Some).collect();
    let mut changes = Vec::new();

    for after_model in after {
        let position = unclaimed
            .iter()
            .position(|slot| matches!(slot, Some(model) if model.id() == after_model.id()));

        match position.and_then(|index| unclaimed[index].take()) {
            Some(before_model) => {
                if before_model != after_model {
                    changes.push(ModelChange::Update(after_model.clone()));
                }
            }
            None => changes.push(ModelChange::Insert(after_model.clone())),
        }
    }

    changes.extend(
        unclaimed
            .into_iter()
            .flatten()
            .map(|model| ModelChange::Delete(model.clone())),
    );

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CustomTypeModel;

    fn model(id: &str, label: &str) -> CustomTypeModel {
        CustomTypeModel::new(id).with("label", label)
    }

    fn ids(changes: &[ModelChange<CustomTypeModel>]) -> Vec<String> {
        changes
            .iter()
            .map(|change| match change {
                ModelChange::Insert(m) => format!("insert:{}", m.id),
                ModelChange::Update(m) => format!("update:{}", m.id),
                ModelChange::Delete(m) => format!("delete:{}", m.id),
            })
            .collect()
    }

    #[test]
    fn identical_collections_produce_nothing() {
        let models = vec![model("a", "A"), model("b", "B")];
        assert!(diff(&models, &models).is_empty());
    }

    #[test]
    fn empty_before_inserts_everything_in_order() {
        let after = vec![model("b", "B"), model("a", "A")];
        assert_eq!(ids(&diff(&[], &after)), ["insert:b", "insert:a"]);
    }

    #[test]
    fn empty_after_deletes_everything_in_order() {
        let before = vec![model("b", "B"), model("a", "A")];
        assert_eq!(ids(&diff(&before, &[])), ["delete:b", "delete:a"]);
    }

    #[test]
    fn updates_and_inserts_follow_after_then_deletes_follow_before() {
        let before = vec![model("a", "A"), model("b", "B"), model("c", "C")];
        let after = vec![model("a", "A"), model("b", "B prime"), model("d", "D")];

        let changes = diff(&before, &after);

        assert_eq!(
            changes,
            vec![
                ModelChange::Update(model("b", "B prime")),
                ModelChange::Insert(model("d", "D")),
                ModelChange::Delete(model("c", "C")),
            ]
        );
    }

    #[test]
    fn update_carries_the_after_value() {
        let changes = diff(&[model("a", "old")], &[model("a", "new")]);
        assert_eq!(changes[0].model().field("label"), Some(&serde_json::json!("new")));
    }

    #[test]
    fn reordering_a_collection_is_not_a_change() {
        let before = vec![model("a", "A"), model("b", "B")];
        let after = vec![model("b", "B"), model("a", "A")];
        assert!(diff(&before, &after).is_empty());
    }

    #[test]
    fn key_order_inside_a_model_is_not_a_change() {
        let before: CustomTypeModel =
            serde_json::from_str(r#"{"id":"a","label":"A","repeatable":true}"#).unwrap();
        let after: CustomTypeModel =
            serde_json::from_str(r#"{"repeatable":true,"id":"a","label":"A"}"#).unwrap();
        assert!(diff(&[before], &[after]).is_empty());
    }

    #[test]
    fn nested_array_order_is_a_change() {
        let before = model("a", "A").with("tabs", serde_json::json!(["Main", "SEO"]));
        let after = model("a", "A").with("tabs", serde_json::json!(["SEO", "Main"]));
        assert_eq!(ids(&diff(&[before], &[after])), ["update:a"]);
    }

    #[test]
    fn duplicate_before_ids_claim_first_match() {
        let before = vec![model("a", "first"), model("a", "second")];
        let after = vec![model("a", "first")];
        assert_eq!(
            diff(&before, &after),
            vec![ModelChange::Delete(model("a", "second"))]
        );
    }

    #[test]
    fn duplicate_after_ids_claim_successive_matches() {
        let before = vec![model("a", "first"), model("a", "second")];
        let after = vec![model("a", "second"), model("a", "second")];
        assert_eq!(ids(&diff(&before, &after)), ["update:a"]);
    }
}
