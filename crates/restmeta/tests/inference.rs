//! OpenAPI inference against realistic documents.

use indoc::indoc;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use restmeta::{
    compact_inferred_metadata_defaults, has_openapi_path, infer_from_openapi, render_resource_metadata,
    ErrorKind, Operation, ResourceMetadata, REQUEST_BODY_SCHEMA_REF,
};

fn keycloak_document() -> Value {
    serde_yaml_ng::from_str(indoc! {r##"
        openapi: 3.0.3
        info: {title: Keycloak Admin, version: "26"}
        paths:
          /admin/realms/{realm}/clients:
            get:
              responses:
                "200":
                  content:
                    application/json:
                      schema:
                        type: array
                        items: {$ref: "#/components/schemas/ClientRepresentation"}
            post:
              requestBody:
                content:
                  application/json:
                    schema: {$ref: "#/components/schemas/ClientRepresentation"}
              responses:
                "201": {description: Created}
          /admin/realms/{realm}/clients/{client-uuid}:
            get:
              responses:
                "200":
                  content:
                    application/json:
                      schema: {$ref: "#/components/schemas/ClientRepresentation"}
            put:
              requestBody:
                content:
                  application/json:
                    schema: {$ref: "#/components/schemas/ClientRepresentation"}
            delete: {}
        components:
          schemas:
            ClientRepresentation:
              type: object
              required: [clientId]
              properties:
                id: {type: string}
                clientId: {type: string}
                secret: {type: string}
    "##})
    .unwrap()
}

fn path_of(metadata: &ResourceMetadata, operation: Operation) -> &str {
    &metadata.operation(operation).unwrap().path
}

#[test]
fn keycloak_clients_from_templated_paths() {
    let document = json!({"paths": {
        "/admin/realms/{realm}/clients": {"get": {}, "post": {}},
        "/admin/realms/{realm}/clients/{clientId}": {"get": {}, "put": {}, "delete": {}},
    }});

    let metadata = infer_from_openapi("/admin/realms/_/clients/", &document).unwrap();
    assert_eq!(metadata.id_from_attribute, "id");
    assert_eq!(metadata.alias_from_attribute, "clientId");
    assert_eq!(metadata.secrets_from_attributes, Some(vec!["secret".to_string()]));
    assert_eq!(metadata.collection_path, "/admin/realms/{{.realm}}/clients");
    assert_eq!(path_of(&metadata, Operation::List), "/admin/realms/{{.realm}}/clients");
    assert_eq!(
        path_of(&metadata, Operation::Get),
        "/admin/realms/{{.realm}}/clients/{{.clientId}}"
    );
    assert_eq!(metadata.operation(Operation::Update).unwrap().method, "PUT");
    assert_eq!(metadata.operation(Operation::Delete).unwrap().method, "DELETE");

    let compact =
        compact_inferred_metadata_defaults("/admin/realms/_/clients/", &metadata, &document).unwrap();
    assert_eq!(compact.operations, None);
    assert_eq!(compact.collection_path, "");
    assert_eq!(compact.alias_from_attribute, "clientId");
}

#[test]
fn schema_properties_drive_identity_and_validation() {
    let document = keycloak_document();
    let metadata = infer_from_openapi("/admin/realms/_/clients/_", &document).unwrap();

    // `client-uuid` is not a template identifier, so the item path keeps the
    // fallback placeholder and the alias comes from the schema.
    assert_eq!(
        path_of(&metadata, Operation::Get),
        "/admin/realms/{{.realm}}/clients/{{.id}}"
    );
    assert_eq!(metadata.alias_from_attribute, "clientId");
    assert_eq!(metadata.id_from_attribute, "id");

    for operation in [Operation::Create, Operation::Update] {
        let validate = metadata.operation(operation).unwrap().validate.as_ref().unwrap();
        assert_eq!(validate.required_attributes, Some(vec!["clientId".to_string()]));
        assert_eq!(validate.schema_ref, REQUEST_BODY_SCHEMA_REF);
    }
    assert_eq!(metadata.operation(Operation::Get).unwrap().validate, None);
}

#[test]
fn inferred_metadata_renders_for_a_concrete_client() {
    let document = keycloak_document();
    let metadata = infer_from_openapi("/admin/realms/_/clients/_", &document).unwrap();

    let rendered = render_resource_metadata(
        "/admin/realms/master/clients/admin-cli",
        &metadata,
        &json!({"id": "6f1c", "clientId": "admin-cli"}),
        "json",
    )
    .unwrap();
    assert_eq!(rendered.collection_path, "/admin/realms/master/clients");
    assert_eq!(path_of(&rendered, Operation::Get), "/admin/realms/master/clients/6f1c");
    assert_eq!(path_of(&rendered, Operation::List), "/admin/realms/master/clients");
}

#[test]
fn inferred_metadata_survives_the_wire_format() {
    let metadata = infer_from_openapi("/admin/realms/_/clients/_", &keycloak_document()).unwrap();
    let yaml = metadata.to_yaml().unwrap();
    assert!(yaml.contains("resourceInfo:"), "{yaml}");
    assert!(yaml.contains("createResource:"), "{yaml}");
    assert_eq!(ResourceMetadata::from_yaml(&yaml).unwrap(), metadata);
}

#[test]
fn cyclic_schemas_terminate() {
    let document = json!({
        "paths": {
            "/nodes": {"get": {"responses": {"200": {"content": {"application/json": {
                "schema": {"$ref": "#/components/schemas/Node"}
            }}}}}},
            "/nodes/{node}": {
                "get": {"responses": {"200": {"content": {"application/json": {
                    "schema": {"$ref": "#/components/schemas/Node"}
                }}}}},
                "put": {"requestBody": {"content": {"application/json": {
                    "schema": {"$ref": "#/components/schemas/Node"}
                }}}},
            },
        },
        "components": {"schemas": {
            "Node": {"allOf": [{"$ref": "#/components/schemas/Tree"}]},
            "Tree": {"oneOf": [{"$ref": "#/components/schemas/Node"}], "items": {"$ref": "#/components/schemas/Node"}},
        }},
    });

    let metadata = infer_from_openapi("/nodes/_", &document).unwrap();
    assert_eq!(metadata.alias_from_attribute, "node");
    assert_eq!(metadata.id_from_attribute, "node");
    assert_eq!(metadata.operation(Operation::Update).unwrap().validate, None);
}

#[test]
fn path_existence_gates_inference() {
    let document = keycloak_document();
    assert!(has_openapi_path("/admin/realms/_/clients/", &document).unwrap());
    assert!(has_openapi_path("/admin/realms/master/clients/app", &document).unwrap());
    assert!(!has_openapi_path("/admin/realms/_/groups/", &document).unwrap());

    let err = infer_from_openapi("admin/realms", &document).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
