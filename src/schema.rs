//! Schema handles and schema introspection.
//!
//! The engine consumes schemas through the [`Schema`] trait: something that
//! can validate a value and, optionally, expose a JSON representation of
//! its own structure. Schema libraries disagree on how that structure is
//! laid out, and the layout shifts between versions, so [`describe`] and
//! [`is_union`] run an ordered list of probes over the representation and
//! use the first that recognizes it. An unrecognized schema is opaque: it
//! still validates, it just yields no metadata.

use crate::path;
use crate::validate::ValidationResult;
use crate::value::Value;
use serde::Serialize;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ─── Schema trait ───────────────────────────────────────────────────────────

/// One segment of a schema issue path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IssueKey {
    Key(String),
    Index(usize),
}

/// A single problem reported by a schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaIssue {
    pub path: Vec<IssueKey>,
    pub message: String,
}

impl SchemaIssue {
    pub fn new(path: Vec<IssueKey>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }

    /// An issue at a dotted path (`""` for the validated value itself).
    pub fn at(dotted: &str, message: impl Into<String>) -> Self {
        let path = path::segments(dotted)
            .into_iter()
            .map(|s| match s.parse::<usize>() {
                Ok(i) => IssueKey::Index(i),
                Err(_) => IssueKey::Key(s.to_string()),
            })
            .collect();
        Self::new(path, message)
    }

    pub fn field_path(&self) -> String {
        self.path
            .iter()
            .map(|k| match k {
                IssueKey::Key(s) => s.clone(),
                IssueKey::Index(i) => i.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// A caller-supplied validation schema.
pub trait Schema: Send + Sync {
    /// Validates `value`, returning every issue found.
    fn validate(&self, value: &Value) -> Result<(), Vec<SchemaIssue>>;

    /// The schema's structural representation, if it can expose one.
    fn representation(&self) -> Option<Json> {
        None
    }
}

/// Shared handle to a [`Schema`].
#[derive(Clone)]
pub struct SchemaHandle(Arc<dyn Schema>);

impl SchemaHandle {
    pub fn new(schema: impl Schema + 'static) -> Self {
        Self(Arc::new(schema))
    }

    /// Runs the schema; the first issue reported for a path wins.
    pub fn validate(&self, value: &Value) -> ValidationResult {
        match self.0.validate(value) {
            Ok(()) => ValidationResult::Valid,
            Err(issues) => {
                let mut errors = BTreeMap::new();
                for issue in issues {
                    errors.entry(issue.field_path()).or_insert(issue.message);
                }
                ValidationResult::from_errors(errors)
            }
        }
    }

    pub fn representation(&self) -> Option<Json> {
        self.0.representation()
    }

    pub fn describe(&self) -> Vec<FieldMeta> {
        self.representation()
            .map(|repr| describe(&repr))
            .unwrap_or_default()
    }

    pub fn is_union(&self) -> Option<UnionInfo> {
        self.representation().and_then(|repr| is_union(&repr))
    }
}

impl fmt::Debug for SchemaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SchemaHandle(..)")
    }
}

// ─── Field metadata ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Enum,
    Literal,
    Array,
    Object,
    Union,
    File,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldOption {
    pub value: Json,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnionVariant {
    pub discriminator_value: Json,
    pub fields: Vec<FieldMeta>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnionInfo {
    pub discriminator: String,
    pub variants: Vec<UnionVariant>,
}

/// Metadata for one field, consumed by form-rendering collaborators.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    pub path: String,
    pub inferred_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FieldOption>>,
    /// Item fields with paths relative to an item; a scalar item is a
    /// single entry with the empty path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_item_shape: Option<Vec<FieldMeta>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub union_variants: Option<Vec<UnionVariant>>,
}

// ─── Normalized shape ───────────────────────────────────────────────────────

#[derive(Clone, Debug)]
enum Node {
    Scalar(FieldType),
    Enum(Vec<Json>),
    Literal(Json),
    Array(Box<Shape>),
    Object(Vec<(String, Shape)>),
    Union {
        discriminator: Option<String>,
        options: Vec<Shape>,
    },
    Unknown,
}

#[derive(Clone, Debug)]
struct Shape {
    node: Node,
    required: bool,
}

impl Shape {
    fn new(node: Node) -> Self {
        Self {
            node,
            required: true,
        }
    }

    fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn unknown() -> Self {
        Self::new(Node::Unknown)
    }
}

// ─── Probes ─────────────────────────────────────────────────────────────────

type Probe = fn(&Json) -> Option<Shape>;

/// Tried in order; the first probe that recognizes a representation wins.
const PROBES: &[(&str, Probe)] = &[
    ("zod-v4", probe_zod_v4),
    ("zod-v3", probe_zod_v3),
    ("json-schema", probe_json_schema),
];

fn shape_of(repr: &Json) -> Option<Shape> {
    PROBES.iter().find_map(|(name, probe)| {
        let shape = probe(repr);
        if shape.is_some() {
            tracing::trace!(probe = *name, "schema representation recognized");
        }
        shape
    })
}

/// Shape of a nested schema; unrecognized children are unknown, not fatal.
fn child_shape(repr: Option<&Json>) -> Shape {
    repr.and_then(shape_of).unwrap_or_else(Shape::unknown)
}

fn object_fields(shape: Option<&Json>) -> Option<Vec<(String, Shape)>> {
    let map = shape?.as_object()?;
    Some(
        map.iter()
            .map(|(k, v)| (k.clone(), child_shape(Some(v))))
            .collect(),
    )
}

/// Representations with a `_zod.def.type` tag.
fn probe_zod_v4(repr: &Json) -> Option<Shape> {
    let def = repr.get("_zod")?.get("def")?;
    let kind = def.get("type")?.as_str()?;

    let shape = match kind {
        "string" => Shape::new(Node::Scalar(FieldType::String)),
        "number" | "bigint" | "int" => Shape::new(Node::Scalar(FieldType::Number)),
        "boolean" => Shape::new(Node::Scalar(FieldType::Boolean)),
        "date" => Shape::new(Node::Scalar(FieldType::Date)),
        "file" => Shape::new(Node::Scalar(FieldType::File)),
        "enum" => {
            let values = match def.get("entries") {
                Some(Json::Object(entries)) => entries.values().cloned().collect(),
                Some(Json::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            Shape::new(Node::Enum(values))
        }
        "literal" => {
            let value = def
                .get("values")
                .and_then(Json::as_array)
                .and_then(|v| v.first())
                .cloned()
                .or_else(|| def.get("value").cloned())?;
            Shape::new(Node::Literal(value))
        }
        "array" => Shape::new(Node::Array(Box::new(child_shape(def.get("element"))))),
        "object" => Shape::new(Node::Object(object_fields(def.get("shape"))?)),
        "optional" | "nullable" | "default" | "prefault" | "catch" | "nonoptional" => {
            let inner = child_shape(def.get("innerType"));
            if kind == "nonoptional" {
                Shape { required: true, ..inner }
            } else if matches!(kind, "catch") {
                inner
            } else {
                inner.optional()
            }
        }
        "readonly" => child_shape(def.get("innerType")),
        "pipe" => child_shape(def.get("in")),
        "union" => Shape::new(Node::Union {
            discriminator: def
                .get("discriminator")
                .and_then(Json::as_str)
                .map(str::to_string),
            options: def
                .get("options")
                .and_then(Json::as_array)
                .map(|opts| opts.iter().map(|o| child_shape(Some(o))).collect())
                .unwrap_or_default(),
        }),
        _ => Shape::unknown(),
    };
    Some(shape)
}

/// Representations with a `_def.typeName` tag.
fn probe_zod_v3(repr: &Json) -> Option<Shape> {
    let def = repr.get("_def")?;
    let type_name = def.get("typeName")?.as_str()?;

    let shape = match type_name {
        "ZodString" => Shape::new(Node::Scalar(FieldType::String)),
        "ZodNumber" | "ZodBigInt" => Shape::new(Node::Scalar(FieldType::Number)),
        "ZodBoolean" => Shape::new(Node::Scalar(FieldType::Boolean)),
        "ZodDate" => Shape::new(Node::Scalar(FieldType::Date)),
        "ZodEnum" => Shape::new(Node::Enum(
            def.get("values")
                .and_then(Json::as_array)
                .cloned()
                .unwrap_or_default(),
        )),
        "ZodNativeEnum" => {
            let values = match def.get("values") {
                Some(Json::Object(map)) => map
                    .iter()
                    // Numeric native enums carry reverse mappings; keep the
                    // forward entries only.
                    .filter(|(k, _)| k.parse::<f64>().is_err())
                    .map(|(_, v)| v.clone())
                    .collect(),
                Some(Json::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            Shape::new(Node::Enum(values))
        }
        "ZodLiteral" => Shape::new(Node::Literal(def.get("value")?.clone())),
        "ZodArray" => Shape::new(Node::Array(Box::new(child_shape(def.get("type"))))),
        "ZodObject" => {
            let fields =
                object_fields(def.get("shape")).or_else(|| object_fields(repr.get("shape")))?;
            Shape::new(Node::Object(fields))
        }
        "ZodOptional" | "ZodNullable" | "ZodDefault" => {
            child_shape(def.get("innerType")).optional()
        }
        "ZodCatch" | "ZodReadonly" | "ZodBranded" => {
            child_shape(def.get("innerType").or_else(|| def.get("type")))
        }
        "ZodEffects" => child_shape(def.get("schema")),
        "ZodPipeline" => child_shape(def.get("in")),
        "ZodUnion" | "ZodDiscriminatedUnion" => {
            let options = match def.get("options") {
                Some(Json::Array(opts)) => opts.iter().map(|o| child_shape(Some(o))).collect(),
                Some(Json::Object(map)) => map.values().map(|o| child_shape(Some(o))).collect(),
                _ => Vec::new(),
            };
            Shape::new(Node::Union {
                discriminator: def
                    .get("discriminator")
                    .and_then(Json::as_str)
                    .map(str::to_string),
                options,
            })
        }
        _ => Shape::unknown(),
    };
    Some(shape)
}

/// JSON Schema documents.
fn probe_json_schema(repr: &Json) -> Option<Shape> {
    let obj = repr.as_object()?;

    if let Some(value) = obj.get("const") {
        return Some(Shape::new(Node::Literal(value.clone())));
    }
    if let Some(Json::Array(values)) = obj.get("enum") {
        return Some(Shape::new(Node::Enum(values.clone())));
    }
    if let Some(Json::Array(options)) = obj.get("oneOf").or_else(|| obj.get("anyOf")) {
        // `anyOf: [X, {type: null}]` is how nullable fields are spelled.
        let non_null: Vec<&Json> = options
            .iter()
            .filter(|o| o.get("type").and_then(Json::as_str) != Some("null"))
            .collect();
        if non_null.len() == 1 && options.len() == 2 {
            return Some(child_shape(non_null.first().copied()).optional());
        }
        return Some(Shape::new(Node::Union {
            discriminator: obj
                .get("discriminator")
                .and_then(|d| d.get("propertyName"))
                .and_then(Json::as_str)
                .map(str::to_string),
            options: options.iter().map(|o| child_shape(Some(o))).collect(),
        }));
    }

    let (kind, nullable) = match obj.get("type") {
        Some(Json::String(t)) => (Some(t.as_str()), false),
        Some(Json::Array(types)) => {
            let names: Vec<&str> = types.iter().filter_map(Json::as_str).collect();
            let nullable = names.contains(&"null");
            (names.into_iter().find(|t| *t != "null"), nullable)
        }
        _ => (None, false),
    };
    let kind = match kind {
        Some(k) => k,
        None if obj.contains_key("properties") => "object",
        None if obj.contains_key("items") => "array",
        None => return None,
    };

    let shape = match kind {
        "string" => match obj.get("format").and_then(Json::as_str) {
            Some("date") | Some("date-time") => Shape::new(Node::Scalar(FieldType::Date)),
            Some("binary") => Shape::new(Node::Scalar(FieldType::File)),
            _ => Shape::new(Node::Scalar(FieldType::String)),
        },
        "number" | "integer" => Shape::new(Node::Scalar(FieldType::Number)),
        "boolean" => Shape::new(Node::Scalar(FieldType::Boolean)),
        "array" => Shape::new(Node::Array(Box::new(child_shape(obj.get("items"))))),
        "object" => {
            let required: Vec<&str> = obj
                .get("required")
                .and_then(Json::as_array)
                .map(|r| r.iter().filter_map(Json::as_str).collect())
                .unwrap_or_default();
            let fields = obj
                .get("properties")
                .and_then(Json::as_object)
                .map(|props| {
                    props
                        .iter()
                        .map(|(k, v)| {
                            let mut shape = child_shape(Some(v));
                            shape.required = shape.required && required.contains(&k.as_str());
                            (k.clone(), shape)
                        })
                        .collect()
                })
                .unwrap_or_default();
            Shape::new(Node::Object(fields))
        }
        _ => Shape::unknown(),
    };
    Some(if nullable { shape.optional() } else { shape })
}

// ─── describe / is_union ────────────────────────────────────────────────────

/// Field metadata for a schema representation.
///
/// Object schemas flatten into one entry per leaf field (nested objects use
/// dotted paths). Any other recognized schema yields a single root entry.
/// Unrecognized representations yield nothing.
pub fn describe(repr: &Json) -> Vec<FieldMeta> {
    match shape_of(repr) {
        Some(Shape {
            node: Node::Object(fields),
            ..
        }) => {
            let mut out = Vec::new();
            flatten("", &fields, true, &mut out);
            out
        }
        Some(Shape {
            node: Node::Unknown,
            ..
        })
        | None => Vec::new(),
        Some(shape) => vec![meta("", &shape)],
    }
}

/// Discriminated-union information, if the representation is a union whose
/// options are objects sharing a literal-valued key.
pub fn is_union(repr: &Json) -> Option<UnionInfo> {
    match shape_of(repr)?.node {
        Node::Union {
            discriminator,
            options,
        } => union_info(discriminator.as_deref(), &options),
        _ => None,
    }
}

fn flatten(prefix: &str, fields: &[(String, Shape)], parent_required: bool, out: &mut Vec<FieldMeta>) {
    for (key, shape) in fields {
        let field_path = path::join(prefix, key);
        let required = parent_required && shape.required;
        match &shape.node {
            Node::Object(children) if !children.is_empty() => {
                flatten(&field_path, children, required, out);
            }
            _ => {
                let mut m = meta(&field_path, shape);
                m.required = required;
                out.push(m);
            }
        }
    }
}

fn meta(field_path: &str, shape: &Shape) -> FieldMeta {
    let mut m = FieldMeta {
        path: field_path.to_string(),
        inferred_type: FieldType::Unknown,
        required: shape.required,
        options: None,
        array_item_shape: None,
        discriminator: None,
        union_variants: None,
    };
    match &shape.node {
        Node::Scalar(t) => m.inferred_type = *t,
        Node::Enum(values) => {
            m.inferred_type = FieldType::Enum;
            m.options = Some(values.iter().map(option_for).collect());
        }
        Node::Literal(value) => {
            m.inferred_type = FieldType::Literal;
            m.options = Some(vec![option_for(value)]);
        }
        Node::Array(item) => {
            m.inferred_type = FieldType::Array;
            let mut items = Vec::new();
            match &item.node {
                Node::Object(children) => flatten("", children, true, &mut items),
                _ => items.push(meta("", item)),
            }
            m.array_item_shape = Some(items);
        }
        Node::Object(_) => m.inferred_type = FieldType::Object,
        Node::Union {
            discriminator,
            options,
        } => {
            m.inferred_type = FieldType::Union;
            if let Some(info) = union_info(discriminator.as_deref(), options) {
                m.discriminator = Some(info.discriminator);
                m.union_variants = Some(info.variants);
            }
        }
        Node::Unknown => {}
    }
    m
}

fn option_for(value: &Json) -> FieldOption {
    let label = match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    };
    FieldOption {
        value: value.clone(),
        label,
    }
}

fn literal_of(shape: &Shape) -> Option<&Json> {
    match &shape.node {
        Node::Literal(v) => Some(v),
        Node::Enum(values) if values.len() == 1 => values.first(),
        _ => None,
    }
}

fn union_info(discriminator: Option<&str>, options: &[Shape]) -> Option<UnionInfo> {
    let objects: Vec<&Vec<(String, Shape)>> = options
        .iter()
        .filter_map(|o| match &o.node {
            Node::Object(fields) => Some(fields),
            _ => None,
        })
        .collect();
    if objects.is_empty() || objects.len() != options.len() {
        return None;
    }

    let key = match discriminator {
        Some(k) => k.to_string(),
        None => objects[0]
            .iter()
            .map(|(k, _)| k)
            .find(|k| {
                objects.iter().all(|fields| {
                    fields
                        .iter()
                        .any(|(fk, fs)| fk == *k && literal_of(fs).is_some())
                })
            })?
            .clone(),
    };

    let variants = objects
        .iter()
        .map(|fields| {
            let discriminator_value = fields
                .iter()
                .find(|(k, _)| *k == key)
                .and_then(|(_, s)| literal_of(s))
                .cloned()
                .unwrap_or(Json::Null);
            let rest: Vec<(String, Shape)> = fields
                .iter()
                .filter(|(k, _)| *k != key)
                .cloned()
                .collect();
            let mut metas = Vec::new();
            flatten("", &rest, true, &mut metas);
            UnionVariant {
                discriminator_value,
                fields: metas,
            }
        })
        .collect();

    Some(UnionInfo {
        discriminator: key,
        variants,
    })
}
