//! Capabilities the synchronizer needs from a host form framework.
//!
//! A host exposes its field tree through opaque [`FieldId`] handles. Each
//! capability is a separate trait so a host only has to describe what it
//! actually supports; [`FormHost`] bundles the full set.

mod locator;
mod semantics;
mod tree;

use std::fmt;

use serde_json::Value;

use crate::error::FieldError;

pub use locator::{FieldPath, PARENT_ESCAPE, locate};
pub use semantics::{FieldType, Semantics};
pub use tree::{FieldTree, METADATA_FORM};

/// Stable handle to a node in a host field tree. Never reused for another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub usize);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Notifications emitted by a host in response to edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
    /// `index` is the item's position in `list` at the time it was added.
    AddedItem {
        list: FieldId,
        index: usize,
        item: FieldId,
    },
    RemovedItem {
        list: FieldId,
        index: usize,
        item: FieldId,
    },
    Changed {
        field: FieldId,
    },
    /// Global pointer release. Carries no payload; only used as a trigger.
    PointerReleased,
}

/// What a list renderer has to refresh after a programmatic mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redraw {
    Order,
    Labels,
}

/// Navigation over a hierarchical field tree.
pub trait FieldNode {
    fn parent(&self, id: FieldId) -> Option<FieldId>;

    /// Named children in declaration order, or `None` when the node has no
    /// children collection. List items are not reachable through here.
    fn children(&self, id: FieldId) -> Option<&[FieldId]>;

    fn field_name(&self, id: FieldId) -> Option<&str>;

    /// Collection identity of a list node.
    fn list_name(&self, _id: FieldId) -> Option<&str> {
        None
    }
}

/// List-type fields whose items are interchangeable instances.
pub trait Listable: FieldNode {
    /// Items of `list`, or `None` when `list` is not a list.
    fn items(&self, list: FieldId) -> Option<&[FieldId]>;

    fn add_item(&mut self, list: FieldId) -> Result<FieldId, FieldError>;

    /// Removes the item at `index` and returns its handle.
    fn remove_item(&mut self, list: FieldId, index: usize) -> Result<FieldId, FieldError>;

    fn move_item(&mut self, list: FieldId, from: usize, to: usize) -> Result<(), FieldError>;

    /// Transient caption rendered next to a list item. Never persisted.
    fn set_caption(&mut self, item: FieldId, caption: Option<String>);

    fn caption(&self, item: FieldId) -> Option<&str>;

    fn redraw(&mut self, list: FieldId, redraw: Redraw);
}

pub trait ValueHolder: FieldNode {
    fn value(&self, id: FieldId) -> Option<Value>;

    fn set_value(&mut self, id: FieldId, value: Value) -> Result<(), FieldError>;

    fn text(&self, id: FieldId) -> Option<String> {
        match self.value(id)? {
            Value::String(text) => Some(text),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

pub trait Changeable {
    fn signal_change(&mut self, id: FieldId);
}

pub trait EventSource {
    fn drain_events(&mut self) -> Vec<FormEvent>;
}

pub trait Validate {
    fn validate(&self, id: FieldId) -> Result<(), Vec<String>>;
}

/// Everything a synchronizer needs from its host.
pub trait FormHost: Listable + ValueHolder + Changeable + EventSource + Validate {}

impl<T> FormHost for T where T: Listable + ValueHolder + Changeable + EventSource + Validate {}
