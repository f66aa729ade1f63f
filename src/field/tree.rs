use std::mem;

use serde_json::{Map, Value};

use super::{
    Changeable, EventSource, FieldId, FieldNode, FieldType, FormEvent, Listable, Redraw,
    Semantics, Validate, ValueHolder,
};
use crate::error::FieldError;

/// Name under which an image mounts its metadata sub-form.
pub const METADATA_FORM: &str = "metadataForm";
const METADATA_TITLE: &str = "title";

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<FieldId>,
    caption: Option<String>,
    semantics: Semantics,
    kind: NodeKind,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Text {
        value: String,
    },
    Group {
        children: Vec<FieldId>,
    },
    List {
        items: Vec<FieldId>,
    },
    Image {
        children: Vec<FieldId>,
        file: Map<String, Value>,
    },
}

/// In-memory field tree built from [`Semantics`] and a params document.
///
/// Nodes live in an arena; removed items keep their slot (detached from
/// their parent) so handles held elsewhere never point at a different node.
#[derive(Debug, Clone)]
pub struct FieldTree {
    nodes: Vec<Node>,
    root: FieldId,
    events: Vec<FormEvent>,
    redraws: Vec<(FieldId, Redraw)>,
}

impl FieldTree {
    pub fn new(semantics: Semantics) -> Self {
        Self::from_params(semantics, &Value::Null)
    }

    pub fn from_params(semantics: Semantics, params: &Value) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: FieldId(0),
            events: Vec::new(),
            redraws: Vec::new(),
        };
        let params = (!params.is_null()).then_some(params);
        tree.root = tree.instantiate(&semantics, params, None);
        tree
    }

    pub fn root(&self) -> FieldId {
        self.root
    }

    /// Params document for the whole tree.
    pub fn to_value(&self) -> Value {
        self.value(self.root).unwrap_or(Value::Null)
    }

    pub fn semantics(&self, id: FieldId) -> Option<&Semantics> {
        self.node(id).map(|node| &node.semantics)
    }

    /// Whether `id` is still reachable from the root.
    pub fn is_attached(&self, id: FieldId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.node(current).and_then(|node| node.parent) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// A user edit of a text field: stores the value and emits a change.
    pub fn edit_text(&mut self, id: FieldId, text: impl Into<String>) -> Result<(), FieldError> {
        self.set_value(id, Value::String(text.into()))?;
        self.signal_change(id);
        Ok(())
    }

    /// Mounts the metadata sub-form of an image, seeded from the file's
    /// `metadata.title`. Returns the existing form when already mounted.
    pub fn attach_metadata_form(&mut self, image: FieldId) -> Result<FieldId, FieldError> {
        let seed = match &self.node(image).ok_or(FieldError::UnknownField(image))?.kind {
            NodeKind::Image { children, file } => {
                if let Some(&existing) = children
                    .iter()
                    .find(|&&child| self.field_name(child) == Some(METADATA_FORM))
                {
                    return Ok(existing);
                }
                file.get("metadata")
                    .and_then(|metadata| metadata.get(METADATA_TITLE))
                    .cloned()
            }
            _ => {
                return Err(FieldError::InvalidValue {
                    field: image,
                    expected: "an image field",
                });
            }
        };
        let mut params = Map::new();
        params.insert(METADATA_TITLE.to_string(), seed.unwrap_or(Value::Null));
        let form = self.instantiate(
            &metadata_form_semantics(),
            Some(&Value::Object(params)),
            Some(image),
        );
        if let Some(NodeKind::Image { children, .. }) =
            self.nodes.get_mut(image.0).map(|node| &mut node.kind)
        {
            children.push(form);
        }
        Ok(form)
    }

    /// Mounts the metadata sub-form of every image still in the tree.
    pub fn attach_metadata_forms(&mut self) -> Vec<FieldId> {
        let images: Vec<FieldId> = (0..self.nodes.len())
            .map(FieldId)
            .filter(|&id| matches!(self.nodes[id.0].kind, NodeKind::Image { .. }))
            .filter(|&id| self.is_attached(id))
            .collect();
        images
            .into_iter()
            .filter_map(|image| self.attach_metadata_form(image).ok())
            .collect()
    }

    /// Adds a fresh item at `index`, shifting later items down. `index` may
    /// equal the list length.
    pub fn insert_item(&mut self, list: FieldId, index: usize) -> Result<FieldId, FieldError> {
        let node = self.node(list).ok_or(FieldError::UnknownField(list))?;
        let FieldType::List { field, max, .. } = &node.semantics.kind else {
            return Err(FieldError::NotAList(list));
        };
        let template = (**field).clone();
        let max = *max;
        let len = self.items(list).map_or(0, <[FieldId]>::len);
        if index > len {
            return Err(FieldError::IndexOutOfBounds { list, index, len });
        }
        if let Some(max) = max
            && len >= max
        {
            return Err(FieldError::ListFull { list, max });
        }
        let item = self.instantiate(&template, None, Some(list));
        self.list_items_mut(list)?.insert(index, item);
        self.events.push(FormEvent::AddedItem { list, index, item });
        Ok(item)
    }

    /// Redraw requests recorded since the last call, oldest first.
    pub fn take_redraws(&mut self) -> Vec<(FieldId, Redraw)> {
        mem::take(&mut self.redraws)
    }

    fn node(&self, id: FieldId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn list_items_mut(&mut self, list: FieldId) -> Result<&mut Vec<FieldId>, FieldError> {
        match self.nodes.get_mut(list.0).map(|node| &mut node.kind) {
            Some(NodeKind::List { items }) => Ok(items),
            Some(_) => Err(FieldError::NotAList(list)),
            None => Err(FieldError::UnknownField(list)),
        }
    }

    fn instantiate(
        &mut self,
        semantics: &Semantics,
        params: Option<&Value>,
        parent: Option<FieldId>,
    ) -> FieldId {
        let id = FieldId(self.nodes.len());
        self.nodes.push(Node {
            name: semantics.name.clone(),
            parent,
            caption: None,
            semantics: semantics.clone(),
            kind: NodeKind::Group {
                children: Vec::new(),
            },
        });

        let kind = match &semantics.kind {
            FieldType::Text { .. } => NodeKind::Text {
                value: params
                    .and_then(text_of)
                    .or_else(|| semantics.default.as_ref().and_then(text_of))
                    .unwrap_or_default(),
            },
            FieldType::Group { fields } => NodeKind::Group {
                children: fields
                    .iter()
                    .map(|field| {
                        let sub = params.and_then(|params| params.get(&field.name));
                        self.instantiate(field, sub, Some(id))
                    })
                    .collect(),
            },
            FieldType::List { field, .. } => {
                let items = match params.and_then(Value::as_array) {
                    Some(values) => values
                        .iter()
                        .map(|value| self.instantiate(field, Some(value), Some(id)))
                        .collect(),
                    None => (0..semantics.initial_items())
                        .map(|_| self.instantiate(field, None, Some(id)))
                        .collect(),
                };
                NodeKind::List { items }
            }
            FieldType::Image { fields } => {
                let mut file = params
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let children = fields
                    .iter()
                    .map(|field| {
                        let sub = file.remove(&field.name);
                        self.instantiate(field, sub.as_ref(), Some(id))
                    })
                    .collect();
                NodeKind::Image { children, file }
            }
        };
        self.nodes[id.0].kind = kind;
        id
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn metadata_form_semantics() -> Semantics {
    Semantics {
        name: METADATA_FORM.to_string(),
        label: None,
        optional: true,
        default: None,
        widget: None,
        kind: FieldType::Group {
            fields: vec![Semantics {
                name: METADATA_TITLE.to_string(),
                label: Some("Title".to_string()),
                optional: true,
                default: None,
                widget: None,
                kind: FieldType::Text { max_length: None },
            }],
        },
    }
}

impl FieldNode for FieldTree {
    fn parent(&self, id: FieldId) -> Option<FieldId> {
        self.node(id)?.parent
    }

    fn children(&self, id: FieldId) -> Option<&[FieldId]> {
        match &self.node(id)?.kind {
            NodeKind::Group { children } | NodeKind::Image { children, .. } => Some(children),
            _ => None,
        }
    }

    fn field_name(&self, id: FieldId) -> Option<&str> {
        self.node(id).map(|node| node.name.as_str())
    }

    fn list_name(&self, id: FieldId) -> Option<&str> {
        let node = self.node(id)?;
        matches!(node.kind, NodeKind::List { .. }).then_some(node.name.as_str())
    }
}

impl Listable for FieldTree {
    fn items(&self, list: FieldId) -> Option<&[FieldId]> {
        match &self.node(list)?.kind {
            NodeKind::List { items } => Some(items),
            _ => None,
        }
    }

    fn add_item(&mut self, list: FieldId) -> Result<FieldId, FieldError> {
        let len = self.items(list).map_or(0, <[FieldId]>::len);
        self.insert_item(list, len)
    }

    fn remove_item(&mut self, list: FieldId, index: usize) -> Result<FieldId, FieldError> {
        let items = self.list_items_mut(list)?;
        if index >= items.len() {
            return Err(FieldError::IndexOutOfBounds {
                list,
                index,
                len: items.len(),
            });
        }
        let item = items.remove(index);
        self.nodes[item.0].parent = None;
        self.events.push(FormEvent::RemovedItem { list, index, item });
        Ok(item)
    }

    fn move_item(&mut self, list: FieldId, from: usize, to: usize) -> Result<(), FieldError> {
        let items = self.list_items_mut(list)?;
        let len = items.len();
        for index in [from, to] {
            if index >= len {
                return Err(FieldError::IndexOutOfBounds { list, index, len });
            }
        }
        let item = items.remove(from);
        items.insert(to, item);
        Ok(())
    }

    fn set_caption(&mut self, item: FieldId, caption: Option<String>) {
        if let Some(node) = self.nodes.get_mut(item.0) {
            node.caption = caption;
        }
    }

    fn caption(&self, item: FieldId) -> Option<&str> {
        self.node(item)?.caption.as_deref()
    }

    fn redraw(&mut self, list: FieldId, redraw: Redraw) {
        self.redraws.push((list, redraw));
    }
}

impl ValueHolder for FieldTree {
    fn value(&self, id: FieldId) -> Option<Value> {
        let node = self.node(id)?;
        let value = match &node.kind {
            NodeKind::Text { value } => Value::String(value.clone()),
            NodeKind::Group { children } => Value::Object(
                children
                    .iter()
                    .filter_map(|&child| {
                        Some((self.field_name(child)?.to_string(), self.value(child)?))
                    })
                    .collect(),
            ),
            NodeKind::List { items } => {
                Value::Array(items.iter().filter_map(|&item| self.value(item)).collect())
            }
            NodeKind::Image { children, file } => {
                let mut file = file.clone();
                for &child in children {
                    let Some(name) = self.field_name(child) else {
                        continue;
                    };
                    if name == METADATA_FORM {
                        let title = self
                            .children(child)
                            .and_then(|fields| fields.first().copied())
                            .and_then(|title| self.value(title));
                        if let Some(title) = title {
                            let metadata = file
                                .entry("metadata")
                                .or_insert_with(|| Value::Object(Map::new()));
                            if !metadata.is_object() {
                                *metadata = Value::Object(Map::new());
                            }
                            metadata[METADATA_TITLE] = title;
                        }
                    } else if let Some(value) = self.value(child) {
                        file.insert(name.to_string(), value);
                    }
                }
                Value::Object(file)
            }
        };
        Some(value)
    }

    fn set_value(&mut self, id: FieldId, value: Value) -> Result<(), FieldError> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or(FieldError::UnknownField(id))?;
        let NodeKind::Text { value: current } = &mut node.kind else {
            return Err(FieldError::NotAValue(id));
        };
        *current = text_of(&value).ok_or(FieldError::InvalidValue {
            field: id,
            expected: "a string",
        })?;
        Ok(())
    }
}

impl Changeable for FieldTree {
    fn signal_change(&mut self, id: FieldId) {
        self.events.push(FormEvent::Changed { field: id });
    }
}

impl EventSource for FieldTree {
    fn drain_events(&mut self) -> Vec<FormEvent> {
        mem::take(&mut self.events)
    }
}

impl Validate for FieldTree {
    fn validate(&self, id: FieldId) -> Result<(), Vec<String>> {
        let node = self
            .node(id)
            .ok_or_else(|| vec![FieldError::UnknownField(id).to_string()])?;
        let schema = node.semantics.json_schema();
        let validator = jsonschema::validator_for(&schema)
            .map_err(|err| vec![format!("invalid semantics for '{}': {err}", node.name)])?;
        let value = self.value(id).unwrap_or(Value::Null);
        let issues: Vec<String> = validator
            .iter_errors(&value)
            .map(|error| {
                let pointer = error.instance_path.to_string();
                let prefix = if pointer.is_empty() {
                    "<root>".to_string()
                } else {
                    pointer
                };
                format!("{prefix}: {error}")
            })
            .collect();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}
