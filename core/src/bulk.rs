//! Bulk changesets: ordered insert, update and delete operations on custom
//! types and shared slices, submitted to the API in one request.
//!
//! # Design
//! `Change` is the closed set of six operations with their payloads. The
//! API exposes two changeset endpoints, `bulk` and `bulk-update`, with the
//! same operation vocabulary. `Operation<E>` and `Transaction<E>` tag a
//! `Change` with the endpoint marker `E` so a changeset built for one
//! endpoint cannot be submitted to the other. All logic is shared; only
//! the marker's `BulkEndpoint` constants differ.
//!
//! On the wire an operation is `{"type": "...", "id": "...", "payload": ...}`.
//! Inserts and updates carry the whole model, deletes carry `{"id": ...}`.
//! `id` is read from the payload, and a model keeps its id only in the typed
//! field, so the payload holds exactly one `id` and the two always agree.

use std::fmt;
use std::marker::PhantomData;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::diff::{diff, ModelChange};
use crate::types::{CustomTypeModel, ModelId, SharedSliceModel, TransactionModels};

/// Wire name of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    CustomTypeInsert,
    CustomTypeUpdate,
    CustomTypeDelete,
    SliceInsert,
    SliceUpdate,
    SliceDelete,
}

impl OperationType {
    /// Must match the serde `rename_all` names; `operation_type_wire_names`
    /// checks both.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::CustomTypeInsert => "CUSTOM_TYPE_INSERT",
            OperationType::CustomTypeUpdate => "CUSTOM_TYPE_UPDATE",
            OperationType::CustomTypeDelete => "CUSTOM_TYPE_DELETE",
            OperationType::SliceInsert => "SLICE_INSERT",
            OperationType::SliceUpdate => "SLICE_UPDATE",
            OperationType::SliceDelete => "SLICE_DELETE",
        }
    }

    pub fn is_delete(self) -> bool {
        matches!(self, OperationType::CustomTypeDelete | OperationType::SliceDelete)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    CustomTypeInsert(CustomTypeModel),
    CustomTypeUpdate(CustomTypeModel),
    CustomTypeDelete(ModelId),
    SliceInsert(SharedSliceModel),
    SliceUpdate(SharedSliceModel),
    SliceDelete(ModelId),
}

impl Change {
    pub fn kind(&self) -> OperationType {
        match self {
            Change::CustomTypeInsert(_) => OperationType::CustomTypeInsert,
            Change::CustomTypeUpdate(_) => OperationType::CustomTypeUpdate,
            Change::CustomTypeDelete(_) => OperationType::CustomTypeDelete,
            Change::SliceInsert(_) => OperationType::SliceInsert,
            Change::SliceUpdate(_) => OperationType::SliceUpdate,
            Change::SliceDelete(_) => OperationType::SliceDelete,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Change::CustomTypeInsert(model) | Change::CustomTypeUpdate(model) => &model.id,
            Change::SliceInsert(model) | Change::SliceUpdate(model) => &model.id,
            Change::CustomTypeDelete(target) | Change::SliceDelete(target) => &target.id,
        }
    }

    fn from_wire(wire: WireOperation) -> Result<Self, String> {
        let payload = wire.payload;
        let change = match wire.kind {
            OperationType::CustomTypeInsert => Change::CustomTypeInsert(decode(payload)?),
            OperationType::CustomTypeUpdate => Change::CustomTypeUpdate(decode(payload)?),
            OperationType::CustomTypeDelete => Change::CustomTypeDelete(decode(payload)?),
            OperationType::SliceInsert => Change::SliceInsert(decode(payload)?),
            OperationType::SliceUpdate => Change::SliceUpdate(decode(payload)?),
            OperationType::SliceDelete => Change::SliceDelete(decode(payload)?),
        };
        if change.id() != wire.id {
            return Err(format!(
                "operation id `{}` does not match payload id `{}`",
                wire.id,
                change.id()
            ));
        }
        Ok(change)
    }
}

fn decode<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, String> {
    serde_json::from_value(payload).map_err(|e| format!("invalid operation payload: {e}"))
}

/// A remote endpoint accepting changesets.
pub trait BulkEndpoint {
    /// Resource path relative to the API endpoint.
    const PATH: &'static str;
    /// Whether the endpoint answers 202 until document deletion is confirmed.
    const CONFIRMS_DOCUMENT_DELETION: bool;
}

/// The `bulk` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bulk;

/// The `bulk-update` endpoint. Deletions are never held for confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkUpdate;

impl BulkEndpoint for Bulk {
    const PATH: &'static str = "bulk";
    const CONFIRMS_DOCUMENT_DELETION: bool = true;
}

impl BulkEndpoint for BulkUpdate {
    const PATH: &'static str = "bulk-update";
    const CONFIRMS_DOCUMENT_DELETION: bool = false;
}

/// One operation of a changeset bound for endpoint `E`.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation<E> {
    change: Change,
    endpoint: PhantomData<E>,
}

pub type BulkOperation = Operation<Bulk>;
pub type BulkUpdateOperation = Operation<BulkUpdate>;

impl<E> Operation<E> {
    pub fn new(change: Change) -> Self {
        Self {
            change,
            endpoint: PhantomData,
        }
    }

    pub fn change(&self) -> &Change {
        &self.change
    }

    pub fn into_change(self) -> Change {
        self.change
    }

    pub fn kind(&self) -> OperationType {
        self.change.kind()
    }

    pub fn id(&self) -> &str {
        self.change.id()
    }
}

impl<E> From<Change> for Operation<E> {
    fn from(change: Change) -> Self {
        Self::new(change)
    }
}

#[derive(Serialize)]
struct WireOperationRef<'a> {
    #[serde(rename = "type")]
    kind: OperationType,
    id: &'a str,
    payload: PayloadRef<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum PayloadRef<'a> {
    CustomType(&'a CustomTypeModel),
    Slice(&'a SharedSliceModel),
    Id(&'a ModelId),
}

#[derive(Deserialize)]
struct WireOperation {
    #[serde(rename = "type")]
    kind: OperationType,
    id: String,
    payload: Value,
}

impl<E> Serialize for Operation<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let payload = match &self.change {
            Change::CustomTypeInsert(model) | Change::CustomTypeUpdate(model) => {
                PayloadRef::CustomType(model)
            }
            Change::SliceInsert(model) | Change::SliceUpdate(model) => PayloadRef::Slice(model),
            Change::CustomTypeDelete(target) | Change::SliceDelete(target) => PayloadRef::Id(target),
        };
        WireOperationRef {
            kind: self.kind(),
            id: self.id(),
            payload,
        }
        .serialize(serializer)
    }
}

impl<'de, E> Deserialize<'de> for Operation<E> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireOperation::deserialize(deserializer)?;
        Change::from_wire(wire).map(Operation::new).map_err(D::Error::custom)
    }
}

/// An ordered changeset for endpoint `E`.
///
/// Operations are applied by the API in the order they were added.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction<E> {
    operations: Vec<Operation<E>>,
}

pub type BulkTransaction = Transaction<Bulk>;
pub type BulkUpdateTransaction = Transaction<BulkUpdate>;

impl<E> Transaction<E> {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    pub fn operations(&self) -> &[Operation<E>] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<Operation<E>> {
        self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn push(&mut self, operation: impl Into<Operation<E>>) {
        self.operations.push(operation.into());
    }

    pub fn insert_custom_type(&mut self, custom_type: CustomTypeModel) {
        self.push(Change::CustomTypeInsert(custom_type));
    }

    pub fn update_custom_type(&mut self, custom_type: CustomTypeModel) {
        self.push(Change::CustomTypeUpdate(custom_type));
    }

    /// Only the id of `custom_type` is recorded.
    pub fn delete_custom_type(&mut self, custom_type: &CustomTypeModel) {
        self.push(Change::CustomTypeDelete(ModelId::from(custom_type)));
    }

    pub fn insert_slice(&mut self, slice: SharedSliceModel) {
        self.push(Change::SliceInsert(slice));
    }

    pub fn update_slice(&mut self, slice: SharedSliceModel) {
        self.push(Change::SliceUpdate(slice));
    }

    /// Only the id of `slice` is recorded.
    pub fn delete_slice(&mut self, slice: &SharedSliceModel) {
        self.push(Change::SliceDelete(ModelId::from(slice)));
    }

    /// Append the operations turning `before` into `after`: custom types
    /// first, then slices. Existing operations are kept.
    pub fn from_diff(&mut self, before: &TransactionModels, after: &TransactionModels) {
        for change in diff(&before.custom_types, &after.custom_types) {
            match change {
                ModelChange::Insert(model) => self.insert_custom_type(model),
                ModelChange::Update(model) => self.update_custom_type(model),
                ModelChange::Delete(model) => self.delete_custom_type(&model),
            }
        }
        for change in diff(&before.slices, &after.slices) {
            match change {
                ModelChange::Insert(model) => self.insert_slice(model),
                ModelChange::Update(model) => self.update_slice(model),
                ModelChange::Delete(model) => self.delete_slice(&model),
            }
        }
    }
}

impl<E> Default for Transaction<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> From<Vec<Operation<E>>> for Transaction<E> {
    fn from(operations: Vec<Operation<E>>) -> Self {
        Self { operations }
    }
}

/// Start a new transaction from a copy of `other`'s operations.
impl<E: Clone> From<&Transaction<E>> for Transaction<E> {
    fn from(other: &Transaction<E>) -> Self {
        other.clone()
    }
}

impl<E> FromIterator<Operation<E>> for Transaction<E> {
    fn from_iter<I: IntoIterator<Item = Operation<E>>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

impl<E> AsRef<[Operation<E>]> for Transaction<E> {
    fn as_ref(&self) -> &[Operation<E>] {
        &self.operations
    }
}

impl<E> IntoIterator for Transaction<E> {
    type Item = Operation<E>;
    type IntoIter = std::vec::IntoIter<Operation<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn custom_type(id: &str, label: &str) -> CustomTypeModel {
        CustomTypeModel::new(id).with("label", label)
    }

    fn slice(id: &str, name: &str) -> SharedSliceModel {
        SharedSliceModel::new(id).with("name", name)
    }

    #[test]
    fn operation_type_wire_names() {
        let names: Vec<Value> = [
            OperationType::CustomTypeInsert,
            OperationType::CustomTypeUpdate,
            OperationType::CustomTypeDelete,
            OperationType::SliceInsert,
            OperationType::SliceUpdate,
            OperationType::SliceDelete,
        ]
        .into_iter()
        .map(|kind| {
            let value = serde_json::to_value(kind).unwrap();
            assert_eq!(value, kind.as_str());
            value
        })
        .collect();
        assert_eq!(
            names,
            [
                "CUSTOM_TYPE_INSERT",
                "CUSTOM_TYPE_UPDATE",
                "CUSTOM_TYPE_DELETE",
                "SLICE_INSERT",
                "SLICE_UPDATE",
                "SLICE_DELETE"
            ]
        );
    }

    #[test]
    fn insert_records_the_whole_model() {
        let mut transaction = BulkTransaction::new();
        transaction.insert_custom_type(custom_type("page", "Page"));

        let wire = serde_json::to_value(transaction.operations()).unwrap();
        assert_eq!(
            wire,
            json!([{
                "type": "CUSTOM_TYPE_INSERT",
                "id": "page",
                "payload": { "id": "page", "label": "Page" }
            }])
        );
    }

    #[test]
    fn operation_id_matches_payload_id_after_id_override() {
        let mut transaction = BulkTransaction::new();
        transaction.insert_custom_type(CustomTypeModel::new("page").with("id", "blog"));
        transaction.update_slice(SharedSliceModel::new("hero").with("id", "cta"));

        let wire = serde_json::to_value(transaction.operations()).unwrap();
        for operation in wire.as_array().unwrap() {
            assert_eq!(operation["id"], operation["payload"]["id"]);
        }
        assert_eq!(wire[0]["id"], "blog");
        assert_eq!(wire[1]["id"], "cta");

        let raw = serde_json::to_string(&transaction.operations()[0]).unwrap();
        assert_eq!(raw.matches("\"id\"").count(), 2);
    }

    #[test]
    fn delete_strips_the_payload_to_its_id() {
        let mut transaction = BulkTransaction::new();
        transaction.delete_custom_type(&custom_type("page", "Page"));
        transaction.delete_slice(&slice("hero", "Hero"));

        assert_eq!(transaction.operations()[0].kind(), OperationType::CustomTypeDelete);
        let wire = serde_json::to_value(transaction.operations()).unwrap();
        assert_eq!(
            wire,
            json!([
                { "type": "CUSTOM_TYPE_DELETE", "id": "page", "payload": { "id": "page" } },
                { "type": "SLICE_DELETE", "id": "hero", "payload": { "id": "hero" } }
            ])
        );
    }

    #[test]
    fn mutators_append_in_call_order() {
        let mut transaction = BulkUpdateTransaction::new();
        transaction.insert_custom_type(custom_type("a", "A"));
        transaction.update_custom_type(custom_type("b", "B"));
        transaction.delete_custom_type(&custom_type("c", "C"));
        transaction.insert_slice(slice("d", "D"));
        transaction.update_slice(slice("e", "E"));
        transaction.delete_slice(&slice("f", "F"));

        let kinds: Vec<OperationType> = transaction.operations().iter().map(Operation::kind).collect();
        assert_eq!(
            kinds,
            [
                OperationType::CustomTypeInsert,
                OperationType::CustomTypeUpdate,
                OperationType::CustomTypeDelete,
                OperationType::SliceInsert,
                OperationType::SliceUpdate,
                OperationType::SliceDelete,
            ]
        );
        let ids: Vec<&str> = transaction.operations().iter().map(Operation::id).collect();
        assert_eq!(ids, ["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn copy_does_not_alias_the_original() {
        let mut original = BulkTransaction::new();
        original.insert_slice(slice("hero", "Hero"));

        let mut copy = BulkTransaction::from(&original);
        copy.delete_slice(&slice("hero", "Hero"));

        assert_eq!(original.len(), 1);
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.operations()[0], original.operations()[0]);
    }

    #[test]
    fn adopts_raw_operations() {
        let operations = vec![
            BulkOperation::new(Change::CustomTypeInsert(custom_type("page", "Page"))),
            BulkOperation::new(Change::SliceDelete(ModelId { id: "hero".to_string() })),
        ];
        let transaction = BulkTransaction::from(operations.clone());
        assert_eq!(transaction.operations(), operations.as_slice());
        assert_eq!(transaction.into_operations(), operations);
    }

    #[test]
    fn from_diff_orders_custom_types_before_slices() {
        let before = TransactionModels::new()
            .with_custom_types(vec![custom_type("a", "A"), custom_type("b", "B")])
            .with_slices(vec![slice("x", "X")]);
        let after = TransactionModels::new()
            .with_custom_types(vec![custom_type("a", "A changed"), custom_type("c", "C")])
            .with_slices(vec![slice("y", "Y")]);

        let mut transaction = BulkTransaction::new();
        transaction.from_diff(&before, &after);

        let summary: Vec<(OperationType, &str)> = transaction
            .operations()
            .iter()
            .map(|op| (op.kind(), op.id()))
            .collect();
        assert_eq!(
            summary,
            [
                (OperationType::CustomTypeUpdate, "a"),
                (OperationType::CustomTypeInsert, "c"),
                (OperationType::CustomTypeDelete, "b"),
                (OperationType::SliceInsert, "y"),
                (OperationType::SliceDelete, "x"),
            ]
        );
    }

    #[test]
    fn from_diff_appends_to_existing_operations() {
        let mut transaction = BulkTransaction::new();
        transaction.insert_slice(slice("hero", "Hero"));

        let after = TransactionModels::new().with_custom_types(vec![custom_type("page", "Page")]);
        transaction.from_diff(&TransactionModels::new(), &after);

        assert_eq!(transaction.len(), 2);
        assert_eq!(transaction.operations()[0].kind(), OperationType::SliceInsert);
        assert_eq!(transaction.operations()[1].kind(), OperationType::CustomTypeInsert);
    }

    #[test]
    fn from_diff_of_identical_snapshots_is_empty() {
        let models = TransactionModels::new()
            .with_custom_types(vec![custom_type("page", "Page")])
            .with_slices(vec![slice("hero", "Hero")]);
        let mut transaction = BulkTransaction::new();
        transaction.from_diff(&models, &models.clone());
        assert!(transaction.is_empty());
    }

    #[test]
    fn operation_deserializes_from_wire() {
        let operation: BulkOperation = serde_json::from_value(json!({
            "type": "SLICE_UPDATE",
            "id": "hero",
            "payload": { "id": "hero", "name": "Hero" }
        }))
        .unwrap();
        assert_eq!(operation.change(), &Change::SliceUpdate(slice("hero", "Hero")));
    }

    #[test]
    fn operation_rejects_mismatched_ids() {
        let result: Result<BulkOperation, _> = serde_json::from_value(json!({
            "type": "CUSTOM_TYPE_DELETE",
            "id": "page",
            "payload": { "id": "blog" }
        }));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("does not match"), "{err}");
    }

    #[test]
    fn operation_rejects_unknown_type() {
        let result: Result<BulkOperation, _> = serde_json::from_value(json!({
            "type": "DOCUMENT_DELETE",
            "id": "page",
            "payload": { "id": "page" }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn endpoints_differ_only_in_constants() {
        assert_eq!(Bulk::PATH, "bulk");
        assert_eq!(BulkUpdate::PATH, "bulk-update");
        assert!(Bulk::CONFIRMS_DOCUMENT_DELETION);
        assert!(!BulkUpdate::CONFIRMS_DOCUMENT_DELETION);
    }
}
