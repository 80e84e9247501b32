//! JSON patch primitives
//!
//! RFC 6902 cannot append to an array (or add a key to a map) that does not
//! exist yet. Every helper here therefore decides between creating the
//! collection with its first element and appending to it with the `-` marker.

use std::collections::BTreeMap;

use json_patch::{AddOperation, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Base path of the pod volume list
pub const VOLUMES_PATH: [&str; 2] = ["spec", "volumes"];

/// Base path of the pod init container list
pub const INIT_CONTAINERS_PATH: [&str; 2] = ["spec", "initContainers"];

/// Base path of the pod container list
pub const CONTAINERS_PATH: [&str; 2] = ["spec", "containers"];

/// Base path of the pod annotation map
pub const ANNOTATIONS_PATH: [&str; 2] = ["metadata", "annotations"];

/// JSON pointer token meaning "after the last array element"
pub const APPEND_MARKER: &str = "-";

/// Value carried by a patch operation
///
/// The shape follows the target: a whole collection when the target is being
/// created, a single value otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    /// One value stored at the path: a string or a single object element
    Scalar(Value),
    /// A sequence replacing (or creating) an array
    Collection(Vec<Value>),
    /// A string map creating an object such as `metadata.annotations`
    Map(BTreeMap<String, String>),
}

impl From<PatchValue> for Value {
    fn from(value: PatchValue) -> Self {
        match value {
            PatchValue::Scalar(v) => v,
            PatchValue::Collection(items) => Value::Array(items),
            PatchValue::Map(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            ),
        }
    }
}

/// A single patch operation; the injector never removes anything
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    /// Create a member or append an array element
    Add {
        /// Target location
        path: PointerBuf,
        /// Value to insert
        value: PatchValue,
    },
    /// Overwrite an existing member
    Replace {
        /// Target location
        path: PointerBuf,
        /// New value
        value: PatchValue,
    },
}

impl PatchOp {
    /// Build an `add` operation
    pub fn add(path: PointerBuf, value: PatchValue) -> Self {
        Self::Add { path, value }
    }

    /// Build a `replace` operation
    pub fn replace(path: PointerBuf, value: PatchValue) -> Self {
        Self::Replace { path, value }
    }

    /// Target location of this operation
    pub fn path(&self) -> &PointerBuf {
        match self {
            Self::Add { path, .. } | Self::Replace { path, .. } => path,
        }
    }

    /// Value carried by this operation
    pub fn value(&self) -> &PatchValue {
        match self {
            Self::Add { value, .. } | Self::Replace { value, .. } => value,
        }
    }

    /// RFC 6902 operation name
    pub fn op(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Replace { .. } => "replace",
        }
    }
}

impl From<PatchOp> for PatchOperation {
    fn from(op: PatchOp) -> Self {
        match op {
            PatchOp::Add { path, value } => PatchOperation::Add(AddOperation {
                path,
                value: value.into(),
            }),
            PatchOp::Replace { path, value } => PatchOperation::Replace(ReplaceOperation {
                path,
                value: value.into(),
            }),
        }
    }
}

/// Collect operations into a `json_patch::Patch` document
pub fn into_patch(ops: Vec<PatchOp>) -> json_patch::Patch {
    json_patch::Patch(ops.into_iter().map(PatchOperation::from).collect())
}

/// Serialize a Kubernetes object into a patch value
pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// `base` with the append marker pushed on the end
pub fn append_path(base: &PointerBuf) -> PointerBuf {
    let mut path = base.clone();
    path.push_back(APPEND_MARKER);
    path
}

/// Add one element in front of the collection at `base`
///
/// An empty (or absent) target is created as a one-element array; otherwise
/// the element is inserted at `base/0`, shifting existing elements down.
pub fn add_or_prepend(target_is_empty: bool, base: &PointerBuf, element: Value) -> PatchOp {
    if target_is_empty {
        PatchOp::add(base.clone(), PatchValue::Collection(vec![element]))
    } else {
        let mut path = base.clone();
        path.push_back("0");
        PatchOp::add(path, PatchValue::Scalar(element))
    }
}

/// Add one element to the collection at `base`
///
/// An empty (or absent) target is created as a one-element array; otherwise
/// the element is appended at `base/-`.
pub fn add_or_append(target_is_empty: bool, base: &PointerBuf, element: Value) -> PatchOp {
    if target_is_empty {
        PatchOp::add(base.clone(), PatchValue::Collection(vec![element]))
    } else {
        PatchOp::add(append_path(base), PatchValue::Scalar(element))
    }
}

/// Add every element to the collection at `base`, preserving order
///
/// Only the first element can see an empty target.
pub fn add_all(
    existing_len: usize,
    base: &PointerBuf,
    elements: impl IntoIterator<Item = Value>,
) -> Vec<PatchOp> {
    let mut empty = existing_len == 0;
    elements
        .into_iter()
        .map(|element| {
            let op = add_or_append(empty, base, element);
            empty = false;
            op
        })
        .collect()
}

/// Set `key` to `value` in `metadata.annotations`
///
/// Creates the map when it is absent, adds the key when the map lacks it and
/// replaces the value otherwise.
pub fn upsert_annotation(
    existing: Option<&BTreeMap<String, String>>,
    key: &str,
    value: &str,
) -> PatchOp {
    let value_path = || {
        let mut path = PointerBuf::from_tokens(ANNOTATIONS_PATH);
        path.push_back(key);
        path
    };

    let scalar = || PatchValue::Scalar(Value::String(value.to_string()));

    match existing {
        None => PatchOp::add(
            PointerBuf::from_tokens(ANNOTATIONS_PATH),
            PatchValue::Map(BTreeMap::from([(key.to_string(), value.to_string())])),
        ),
        Some(annotations) if !annotations.contains_key(key) => PatchOp::add(value_path(), scalar()),
        Some(_) => PatchOp::replace(value_path(), scalar()),
    }
}
