//! Reference dereferencing
//!
//! Inlines `$ref` markers so a schema can be published as one self-contained
//! document. A marker is an object holding the marker key (default `$ref`)
//! with a string value of the form `[location][#pointer]`:
//!
//! - `#/definitions/name` points into the document currently being walked
//! - `common.yaml` is the whole of a sibling document
//! - `../common.yaml#/definitions/name` points into a sibling document
//!
//! Locations are relative to the document holding the marker and may not be
//! absolute. Fragments are percent-decoded before use. Loading a
//! location is delegated to a [`ReferenceResolver`].

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::content_type::ContentType;
use crate::error::{Result, SchemaError};
use crate::schema::{type_name, SchemaDocument};

/// Default key identifying a reference marker
pub const DEFAULT_MARKER_KEY: &str = "$ref";

/// Loads referenced documents by location
pub trait ReferenceResolver {
    /// Load the document at `location`, a normalized `/`-separated path
    /// relative to the document being dereferenced.
    ///
    /// A missing document should be reported as
    /// [`SchemaError::UnresolvedReference`].
    fn load(&self, location: &str) -> Result<Value>;
}

/// Resolves locations against a directory on disk
#[derive(Debug, Clone)]
pub struct FileResolver {
    root: PathBuf,
}

impl FileResolver {
    /// Resolve locations relative to `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve locations relative to the directory containing `schema_path`
    pub fn for_schema(schema_path: impl AsRef<Path>) -> Self {
        let parent = schema_path.as_ref().parent().unwrap_or(Path::new("."));
        Self::new(parent)
    }

    /// Directory locations are resolved against
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ReferenceResolver for FileResolver {
    fn load(&self, location: &str) -> Result<Value> {
        let path = self.root.join(location);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SchemaError::UnresolvedReference {
                    reference: location.to_string(),
                    reason: format!("{} does not exist", path.display()),
                });
            }
            Err(e) => return Err(SchemaError::io(path, e)),
        };

        // YAML is a superset of JSON, so it is the fallback codec
        let content_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ContentType::from_extension)
            .unwrap_or(ContentType::Yaml);
        tracing::debug!(path = %path.display(), %content_type, "loading referenced document");
        content_type.decode(&content)
    }
}

/// Resolves locations from documents held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    documents: HashMap<String, Value>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under a location
    pub fn with_document(mut self, location: impl Into<String>, document: Value) -> Self {
        self.documents.insert(location.into(), document);
        self
    }
}

impl ReferenceResolver for MemoryResolver {
    fn load(&self, location: &str) -> Result<Value> {
        self.documents
            .get(location)
            .cloned()
            .ok_or_else(|| SchemaError::UnresolvedReference {
                reference: location.to_string(),
                reason: "no such document".to_string(),
            })
    }
}

/// Dereferencing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DereferenceOptions {
    /// Key marking an object as a reference
    pub marker_key: String,
}

impl Default for DereferenceOptions {
    fn default() -> Self {
        Self {
            marker_key: DEFAULT_MARKER_KEY.to_string(),
        }
    }
}

/// Canonical identity of a reference target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceId {
    /// Normalized document location; `None` is the document being dereferenced
    pub location: Option<String>,
    /// JSON pointer into that document; empty for the whole document
    pub pointer: String,
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.location.as_deref().unwrap_or(""), self.pointer)
    }
}

/// Dereference `schema`, loading sibling documents through `resolver`
pub fn dereference_schema(
    schema: &SchemaDocument,
    resolver: &dyn ReferenceResolver,
) -> Result<SchemaDocument> {
    Dereferencer::new(resolver).dereference(schema)
}

/// Inlines reference markers.
///
/// Every call to [`Dereferencer::dereference`] starts from an empty cache, so
/// a dereferencer can be reused across schemas.
pub struct Dereferencer<'r> {
    resolver: &'r dyn ReferenceResolver,
    options: DereferenceOptions,
}

impl<'r> Dereferencer<'r> {
    pub fn new(resolver: &'r dyn ReferenceResolver) -> Self {
        Self::with_options(resolver, DereferenceOptions::default())
    }

    pub fn with_options(resolver: &'r dyn ReferenceResolver, options: DereferenceOptions) -> Self {
        Self { resolver, options }
    }

    /// Return a copy of `schema` with every reference marker inlined
    pub fn dereference(&self, schema: &SchemaDocument) -> Result<SchemaDocument> {
        let root = schema.to_value();
        let mut resolution = Resolution {
            resolver: self.resolver,
            marker_key: &self.options.marker_key,
            root: &root,
            documents: HashMap::new(),
            resolved: HashMap::new(),
            in_progress: Vec::new(),
        };
        let inlined = resolution.walk(&root, &None)?;
        tracing::debug!(
            references = resolution.resolved.len(),
            documents = resolution.documents.len(),
            "dereferenced schema"
        );
        SchemaDocument::new(inlined)
    }
}

/// State of a single dereferencing call
struct Resolution<'a> {
    resolver: &'a dyn ReferenceResolver,
    marker_key: &'a str,
    root: &'a Value,
    /// Loaded sibling documents by location
    documents: HashMap<String, Value>,
    /// Fully inlined targets
    resolved: HashMap<ReferenceId, Value>,
    /// References currently being resolved, outermost first
    in_progress: Vec<ReferenceId>,
}

impl Resolution<'_> {
    fn walk(&mut self, value: &Value, base: &Option<String>) -> Result<Value> {
        match value {
            Value::Object(map) => match map.get(self.marker_key) {
                Some(marker) => self.inline(map, marker, base),
                None => {
                    let mut out = Map::with_capacity(map.len());
                    for (key, child) in map {
                        out.insert(key.clone(), self.walk(child, base)?);
                    }
                    Ok(Value::Object(out))
                }
            },
            Value::Array(items) => items
                .iter()
                .map(|item| self.walk(item, base))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    /// Replace a marker object with its target; sibling keys override the
    /// target's own keys.
    fn inline(
        &mut self,
        map: &Map<String, Value>,
        marker: &Value,
        base: &Option<String>,
    ) -> Result<Value> {
        let Value::String(reference) = marker else {
            return Err(SchemaError::config(format!(
                "'{}' must be a string, got {}",
                self.marker_key,
                type_name(marker)
            )));
        };

        let target = self.resolve(reference, base)?;
        let marker_key = self.marker_key;
        let mut siblings = map.iter().filter(|(key, _)| key.as_str() != marker_key).peekable();
        if siblings.peek().is_none() {
            return Ok(target);
        }

        match target {
            Value::Object(mut merged) => {
                for (key, child) in siblings {
                    merged.insert(key.clone(), self.walk(child, base)?);
                }
                Ok(Value::Object(merged))
            }
            other => Err(SchemaError::config(format!(
                "reference '{}' has sibling keys but resolves to {}",
                reference,
                type_name(&other)
            ))),
        }
    }

    fn resolve(&mut self, reference: &str, base: &Option<String>) -> Result<Value> {
        let id = identify(reference, base)?;

        if let Some(done) = self.resolved.get(&id) {
            return Ok(done.clone());
        }

        if let Some(start) = self.in_progress.iter().position(|open| *open == id) {
            let mut chain: Vec<String> = self.in_progress[start..].iter().map(ToString::to_string).collect();
            chain.push(id.to_string());
            return Err(SchemaError::CyclicReference { chain });
        }

        tracing::trace!(reference = %id, "resolving reference");
        self.in_progress.push(id.clone());
        let result = self.resolve_target(reference, &id);
        self.in_progress.pop();

        let value = result?;
        self.resolved.insert(id, value.clone());
        Ok(value)
    }

    /// Follow the pointer of `id`, inlining any marker met along the way
    fn resolve_target(&mut self, reference: &str, id: &ReferenceId) -> Result<Value> {
        let missing = || SchemaError::UnresolvedReference {
            reference: reference.to_string(),
            reason: format!("nothing at '{}'", id),
        };
        let tokens = pointer_tokens(&id.pointer);
        let marker_key = self.marker_key;

        let (node, consumed) = {
            let mut node = self.document(&id.location)?;
            let mut consumed = 0;
            for token in &tokens {
                if node.get(marker_key).is_some() {
                    break;
                }
                node = child(node, token).ok_or_else(missing)?;
                consumed += 1;
            }
            (node.clone(), consumed)
        };

        // Either the full target, or a marker to inline before descending further
        let mut current = self.walk(&node, &id.location)?;
        for token in &tokens[consumed..] {
            current = child(&current, token).cloned().ok_or_else(missing)?;
        }
        Ok(current)
    }

    fn document(&mut self, location: &Option<String>) -> Result<&Value> {
        let Some(location) = location else {
            return Ok(self.root);
        };
        if !self.documents.contains_key(location) {
            let loaded = self.resolver.load(location)?;
            self.documents.insert(location.clone(), loaded);
        }
        Ok(&self.documents[location])
    }
}

/// Split a reference into its canonical identity, relative to `base`
fn identify(reference: &str, base: &Option<String>) -> Result<ReferenceId> {
    if reference.trim().is_empty() {
        return Err(SchemaError::config("empty reference"));
    }

    let (location, fragment) = reference.split_once('#').unwrap_or((reference, ""));
    let pointer = percent_decode_str(fragment).decode_utf8().map_err(|e| {
        SchemaError::config(format!(
            "reference '{}' is not valid UTF-8 once decoded: {}",
            reference, e
        ))
    })?;

    if location.starts_with("http://") || location.starts_with("https://") {
        return Err(SchemaError::UnresolvedReference {
            reference: reference.to_string(),
            reason: "remote references are not supported".to_string(),
        });
    }

    if !pointer.is_empty() && !pointer.starts_with('/') {
        return Err(SchemaError::config(format!(
            "reference '{}' has a malformed pointer; expected '#/...'",
            reference
        )));
    }

    if location.starts_with('/') {
        return Err(SchemaError::config(format!(
            "reference '{}' uses an absolute location; locations are relative to the referring document",
            reference
        )));
    }

    let location = if location.is_empty() {
        base.clone()
    } else {
        Some(normalize_location(location, base.as_deref()))
    };

    Ok(ReferenceId {
        location,
        pointer: pointer.to_string(),
    })
}

/// Split a JSON pointer into unescaped reference tokens
fn pointer_tokens(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect()
}

fn child<'v>(node: &'v Value, token: &str) -> Option<&'v Value> {
    match node {
        Value::Object(map) => map.get(token),
        Value::Array(items) => token.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Join `location` onto the directory of `base` and collapse `.`/`..`.
///
/// Leading `..` that climb above the starting directory are kept.
fn normalize_location(location: &str, base: Option<&str>) -> String {
    let parent = base
        .map(Path::new)
        .and_then(Path::parent)
        .unwrap_or(Path::new(""));
    let joined = parent.join(location);

    let mut components: Vec<String> = Vec::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => match components.last() {
                Some(last) if last != ".." => {
                    components.pop();
                }
                _ => components.push("..".to_string()),
            },
            Component::Normal(s) => components.push(s.to_string_lossy().to_string()),
            _ => {}
        }
    }

    components.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn doc(value: Value) -> SchemaDocument {
        SchemaDocument::new(value).unwrap()
    }

    struct CountingResolver {
        inner: MemoryResolver,
        loads: Cell<usize>,
    }

    impl ReferenceResolver for CountingResolver {
        fn load(&self, location: &str) -> Result<Value> {
            self.loads.set(self.loads.get() + 1);
            self.inner.load(location)
        }
    }

    #[test]
    fn test_no_references_is_identity() {
        let schema = doc(json!({
            "version": "1.2.0",
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"],
        }));
        let out = dereference_schema(&schema, &MemoryResolver::new()).unwrap();
        assert_eq!(out, schema);
    }

    #[test]
    fn test_internal_reference() {
        let schema = doc(json!({
            "version": "1.0.0",
            "definitions": {"id": {"type": "string"}},
            "properties": {"user_id": {"$ref": "#/definitions/id"}},
        }));
        let out = dereference_schema(&schema, &MemoryResolver::new()).unwrap();
        assert_eq!(out.get("properties").unwrap()["user_id"], json!({"type": "string"}));
        assert_eq!(schema.get("properties").unwrap()["user_id"], json!({"$ref": "#/definitions/id"}));
    }

    #[test]
    fn test_reference_inside_referenced_target() {
        let schema = doc(json!({
            "version": "1.0.0",
            "definitions": {
                "id": {"type": "string"},
                "user": {"properties": {"id": {"$ref": "#/definitions/id"}}},
            },
            "items": [{"$ref": "#/definitions/user"}],
        }));
        let out = dereference_schema(&schema, &MemoryResolver::new()).unwrap();
        assert_eq!(
            out.get("items").unwrap(),
            &json!([{"properties": {"id": {"type": "string"}}}])
        );
    }

    #[test]
    fn test_sibling_documents_resolve_relative_to_their_own_location() {
        let resolver = MemoryResolver::new()
            .with_document("common/user.yaml", json!({
                "type": "object",
                "properties": {"address": {"$ref": "address.yaml#/definitions/address"}},
            }))
            .with_document("common/address.yaml", json!({
                "definitions": {"address": {"type": "string"}},
            }));
        let schema = doc(json!({
            "version": "1.0.0",
            "properties": {"user": {"$ref": "common/user.yaml"}},
        }));

        let out = dereference_schema(&schema, &resolver).unwrap();
        assert_eq!(
            out.get("properties").unwrap()["user"],
            json!({"type": "object", "properties": {"address": {"type": "string"}}})
        );
    }

    #[test]
    fn test_repeated_references_load_once() {
        let resolver = CountingResolver {
            inner: MemoryResolver::new().with_document("defs.json", json!({"id": {"type": "integer"}})),
            loads: Cell::new(0),
        };
        let schema = doc(json!({
            "version": "1.0.0",
            "a": {"$ref": "defs.json#/id"},
            "b": {"$ref": "./defs.json#/id"},
            "c": [{"$ref": "defs.json#/id"}],
        }));

        let out = dereference_schema(&schema, &resolver).unwrap();
        assert_eq!(resolver.loads.get(), 1);
        assert_eq!(out.get("a"), out.get("b"));
        assert_eq!(out.get("c").unwrap()[0], json!({"type": "integer"}));
    }

    #[test]
    fn test_direct_cycle() {
        let schema = doc(json!({
            "version": "1.0.0",
            "definitions": {"node": {"children": {"items": {"$ref": "#/definitions/node"}}}},
            "root": {"$ref": "#/definitions/node"},
        }));
        let err = dereference_schema(&schema, &MemoryResolver::new()).unwrap_err();
        match err {
            SchemaError::CyclicReference { chain } => {
                assert_eq!(chain.first().unwrap(), "#/definitions/node");
                assert_eq!(chain.last().unwrap(), "#/definitions/node");
            }
            other => panic!("expected CyclicReference, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_across_documents() {
        let resolver = MemoryResolver::new()
            .with_document("a.yaml", json!({"next": {"$ref": "b.yaml"}}))
            .with_document("b.yaml", json!({"next": {"$ref": "a.yaml"}}));
        let schema = doc(json!({"version": "1.0.0", "start": {"$ref": "a.yaml"}}));

        let err = dereference_schema(&schema, &resolver).unwrap_err();
        match err {
            SchemaError::CyclicReference { chain } => {
                assert_eq!(chain, vec!["a.yaml#", "b.yaml#", "a.yaml#"]);
            }
            other => panic!("expected CyclicReference, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_pointer_target() {
        let schema = doc(json!({"version": "1.0.0", "a": {"$ref": "#/definitions/missing"}}));
        let err = dereference_schema(&schema, &MemoryResolver::new()).unwrap_err();
        assert!(matches!(err, SchemaError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_missing_document() {
        let schema = doc(json!({"version": "1.0.0", "a": {"$ref": "nope.yaml"}}));
        let err = dereference_schema(&schema, &MemoryResolver::new()).unwrap_err();
        assert!(matches!(err, SchemaError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_remote_reference_is_unresolved() {
        let schema = doc(json!({"version": "1.0.0", "a": {"$ref": "https://example.com/s.json"}}));
        let err = dereference_schema(&schema, &MemoryResolver::new()).unwrap_err();
        assert!(matches!(err, SchemaError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_malformed_markers() {
        for marker in [json!(42), json!(""), json!("#definitions/x")] {
            let schema = doc(json!({"version": "1.0.0", "a": {"$ref": marker.clone()}}));
            let err = dereference_schema(&schema, &MemoryResolver::new()).unwrap_err();
            assert!(matches!(err, SchemaError::Configuration(_)), "{marker}");
        }
    }

    #[test]
    fn test_sibling_keys_override_target() {
        let schema = doc(json!({
            "version": "1.0.0",
            "definitions": {"name": {"type": "string", "description": "a name"}},
            "a": {"$ref": "#/definitions/name", "description": "the user's name"},
        }));
        let out = dereference_schema(&schema, &MemoryResolver::new()).unwrap();
        assert_eq!(out.get("a").unwrap(), &json!({"type": "string", "description": "the user's name"}));
    }

    #[test]
    fn test_sibling_keys_on_scalar_target() {
        let schema = doc(json!({
            "version": "1.0.0",
            "definitions": {"max": 10},
            "a": {"$ref": "#/definitions/max", "description": "limit"},
        }));
        let err = dereference_schema(&schema, &MemoryResolver::new()).unwrap_err();
        assert!(matches!(err, SchemaError::Configuration(_)));
    }

    #[test]
    fn test_custom_marker_key() {
        let resolver = MemoryResolver::new();
        let options = DereferenceOptions {
            marker_key: "$include".to_string(),
        };
        let schema = doc(json!({
            "version": "1.0.0",
            "definitions": {"id": {"type": "string"}},
            "a": {"$include": "#/definitions/id"},
            "b": {"$ref": "#/definitions/id"},
        }));
        let out = Dereferencer::with_options(&resolver, options).dereference(&schema).unwrap();
        assert_eq!(out.get("a").unwrap(), &json!({"type": "string"}));
        assert_eq!(out.get("b").unwrap(), &json!({"$ref": "#/definitions/id"}));
    }

    #[test]
    fn test_percent_encoded_pointer() {
        let schema = doc(json!({
            "version": "1.0.0",
            "definitions": {"a b": {"type": "string"}, "c/d": {"type": "integer"}},
            "spaced": {"$ref": "#/definitions/a%20b"},
            "escaped": {"$ref": "#/definitions/c~1d"},
        }));
        let out = dereference_schema(&schema, &MemoryResolver::new()).unwrap();
        assert_eq!(out.get("spaced").unwrap(), &json!({"type": "string"}));
        assert_eq!(out.get("escaped").unwrap(), &json!({"type": "integer"}));
    }

    #[test]
    fn test_pointer_through_intermediate_reference() {
        let schema = doc(json!({
            "version": "1.0.0",
            "definitions": {
                "base": {"properties": {"id": {"type": "string"}}},
                "user": {"$ref": "#/definitions/base"},
            },
            "items": [{"type": "integer"}],
            "id": {"$ref": "#/definitions/user/properties/id"},
            "first": {"$ref": "#/items/0"},
        }));
        let out = dereference_schema(&schema, &MemoryResolver::new()).unwrap();
        assert_eq!(out.get("id").unwrap(), &json!({"type": "string"}));
        assert_eq!(out.get("first").unwrap(), &json!({"type": "integer"}));
    }

    #[test]
    fn test_pointer_through_its_own_reference_is_cyclic() {
        let schema = doc(json!({
            "version": "1.0.0",
            "definitions": {"loop": {"$ref": "#/definitions/loop/inner"}},
            "a": {"$ref": "#/definitions/loop"},
        }));
        let err = dereference_schema(&schema, &MemoryResolver::new()).unwrap_err();
        assert!(matches!(err, SchemaError::CyclicReference { .. }), "{:?}", err);
    }

    #[test]
    fn test_absolute_location_is_rejected() {
        let schema = doc(json!({"version": "1.0.0", "a": {"$ref": "/etc/defs.yaml#/id"}}));
        let resolver = MemoryResolver::new().with_document("etc/defs.yaml", json!({"id": {}}));
        let err = dereference_schema(&schema, &resolver).unwrap_err();
        assert!(matches!(err, SchemaError::Configuration(_)));
    }

    #[test]
    fn test_normalize_location() {
        assert_eq!(normalize_location("defs.yaml", None), "defs.yaml");
        assert_eq!(normalize_location("./defs.yaml", Some("a/b.yaml")), "a/defs.yaml");
        assert_eq!(normalize_location("../defs.yaml", Some("a/b.yaml")), "defs.yaml");
        assert_eq!(normalize_location("../common/defs.yaml", None), "../common/defs.yaml");
    }
}
