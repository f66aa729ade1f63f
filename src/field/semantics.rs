use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

const INFO_WALL_SEMANTICS: &str = include_str!("info_wall.json");

/// Declarative description of a field, in the shape authoring tools ship
/// alongside their content types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Semantics {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<String>,
    #[serde(flatten)]
    pub kind: FieldType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    Text {
        #[serde(default, rename = "maxLength", skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
    },
    Group {
        fields: Vec<Semantics>,
    },
    List {
        field: Box<Semantics>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<usize>,
    },
    Image {
        #[serde(default)]
        fields: Vec<Semantics>,
    },
}

impl Semantics {
    /// The semantics of the info wall content type.
    pub fn info_wall() -> Self {
        serde_json::from_str(INFO_WALL_SEMANTICS)
            .expect("bundled info wall semantics are valid")
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn is_hidden(&self) -> bool {
        self.widget.as_deref() == Some("hidden")
    }

    /// Number of items a list starts with when no params are present.
    pub(crate) fn initial_items(&self) -> usize {
        match &self.kind {
            FieldType::List { min, .. } => min.unwrap_or(0).max(1),
            _ => 0,
        }
    }

    /// JSON Schema describing the params this field produces.
    pub fn json_schema(&self) -> Value {
        match &self.kind {
            FieldType::Text { max_length } => {
                let mut schema = json!({"type": "string"});
                if !self.optional {
                    schema["minLength"] = json!(1);
                }
                if let Some(max) = max_length {
                    schema["maxLength"] = json!(max);
                }
                schema
            }
            FieldType::Group { fields } => object_schema(fields, &[]),
            FieldType::Image { fields } => {
                let extra: &[&str] = if self.optional { &[] } else { &["path"] };
                object_schema(fields, extra)
            }
            FieldType::List { field, min, max } => {
                let mut schema = json!({
                    "type": "array",
                    "items": field.json_schema(),
                });
                if let Some(min) = min {
                    schema["minItems"] = json!(min);
                }
                if let Some(max) = max {
                    schema["maxItems"] = json!(max);
                }
                schema
            }
        }
    }
}

fn object_schema(fields: &[Semantics], extra_required: &[&str]) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<Value> = extra_required.iter().map(|name| json!(name)).collect();
    for field in fields {
        properties.insert(field.name.clone(), field.json_schema());
        if !field.optional {
            required.push(Value::String(field.name.clone()));
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
