//! Dereferencing schemas that reference sibling files on disk

use std::fs;

use schema_materializer::{
    dereference_schema, materialize_schema_version, ContentType, FileResolver,
    MaterializeOptions, SchemaDocument, SchemaError,
};
use serde_json::json;
use tempfile::tempdir;

#[test]
fn test_dereference_sibling_files() {
    let dir = tempdir().unwrap();
    let basic = dir.path().join("schemas/basic");
    let common = dir.path().join("schemas/common");
    fs::create_dir_all(&basic).unwrap();
    fs::create_dir_all(&common).unwrap();

    fs::write(
        basic.join("current.yaml"),
        "\
version: 1.2.0
properties:
  owner:
    $ref: ../common/person.yaml
  tags:
    type: array
    items:
      $ref: '#/definitions/tag'
definitions:
  tag:
    type: string
",
    )
    .unwrap();
    fs::write(
        common.join("person.yaml"),
        "\
type: object
properties:
  email:
    $ref: 'defs.json#/email'
",
    )
    .unwrap();
    fs::write(common.join("defs.json"), r#"{"email": {"type": "string", "format": "email"}}"#).unwrap();

    let schema_path = basic.join("current.yaml");
    let schema = SchemaDocument::load(&schema_path).unwrap();
    let inlined = dereference_schema(&schema, &FileResolver::for_schema(&schema_path)).unwrap();

    assert_eq!(
        inlined.get("properties").unwrap(),
        &json!({
            "owner": {
                "type": "object",
                "properties": {"email": {"type": "string", "format": "email"}},
            },
            "tags": {"type": "array", "items": {"type": "string"}},
        })
    );

    // The inlined copy materializes like any other schema
    let paths = materialize_schema_version(
        &basic,
        &inlined,
        &MaterializeOptions::new([ContentType::Json]),
    )
    .unwrap();
    let written = fs::read_to_string(&paths[0]).unwrap();
    assert!(!written.contains("$ref"));
}

#[test]
fn test_missing_sibling_file_is_unresolved() {
    let dir = tempdir().unwrap();
    let schema_path = dir.path().join("current.yaml");
    fs::write(&schema_path, "version: 1.0.0\nitem:\n  $ref: missing.yaml\n").unwrap();

    let schema = SchemaDocument::load(&schema_path).unwrap();
    let err = dereference_schema(&schema, &FileResolver::for_schema(&schema_path)).unwrap_err();

    match err {
        SchemaError::UnresolvedReference { reference, .. } => assert_eq!(reference, "missing.yaml"),
        other => panic!("expected UnresolvedReference, got {:?}", other),
    }
}

#[test]
fn test_self_referencing_file_is_cyclic() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("tree.yaml"),
        "type: object\nproperties:\n  child:\n    $ref: tree.yaml\n",
    )
    .unwrap();
    let schema_path = dir.path().join("current.yaml");
    fs::write(&schema_path, "version: 1.0.0\nroot:\n  $ref: tree.yaml\n").unwrap();

    let schema = SchemaDocument::load(&schema_path).unwrap();
    let before = schema.clone();
    let err = dereference_schema(&schema, &FileResolver::for_schema(&schema_path)).unwrap_err();

    assert!(matches!(err, SchemaError::CyclicReference { .. }));
    assert_eq!(schema, before);
}
