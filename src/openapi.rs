//! OpenAPI description of the generated routes. Built from the same route table the
//! router uses, so unexposed operations never appear.

use crate::config::{AppInfo, Operation};
use crate::error::ConfigError;
use crate::filter::{FilterSpec, LIMIT_PARAM, SKIP_PARAM};
use crate::model::{ModelField, ResourceModel};
use crate::routes::resource::{route_table, RouteSpec};
use crate::schema::FieldType;
use axum::http::Method;
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::openapi::path::{
    HttpMethod, Operation as ApiOperation, OperationBuilder, ParameterBuilder, ParameterIn, PathItemBuilder,
};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::schema::{ArrayBuilder, ObjectBuilder, Type};
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityRequirement, SecurityScheme};
use utoipa::openapi::{
    ComponentsBuilder, ContentBuilder, InfoBuilder, OpenApi, OpenApiBuilder, PathsBuilder, Ref, RefOr, Required,
    Response, ResponseBuilder, Schema,
};

const JSON: &str = "application/json";
const BASIC_AUTH: &str = "basic";

fn schema_type(ty: FieldType) -> Type {
    match ty {
        FieldType::Integer => Type::Integer,
        FieldType::Number => Type::Number,
        FieldType::Boolean => Type::Boolean,
        FieldType::String | FieldType::Complex | FieldType::Any => Type::String,
    }
}

fn scalar(ty: FieldType) -> RefOr<Schema> {
    RefOr::T(Schema::Object(ObjectBuilder::new().schema_type(schema_type(ty)).build()))
}

fn field_schema(f: &ModelField) -> RefOr<Schema> {
    let mut b = ObjectBuilder::new()
        .schema_type(schema_type(f.ty))
        .description(f.description.clone());
    if let Some(example) = &f.example {
        b = b.examples([example.clone()]);
    }
    RefOr::T(Schema::Object(b.build()))
}

fn model_ref(model: &ResourceModel) -> RefOr<Schema> {
    RefOr::Ref(Ref::from_schema_name(model.title.clone()))
}

/// Component schema of one resource instance.
pub fn model_schema(model: &ResourceModel) -> Schema {
    let mut b = ObjectBuilder::new().schema_type(Type::Object).title(Some(model.title.clone()));
    for f in &model.fields {
        b = b.property(f.name.clone(), field_schema(f));
        if !f.nullable {
            b = b.required(f.name.clone());
        }
    }
    Schema::Object(b.build())
}

/// Component schema of the collection wrapper: one field holding all instances.
pub fn collection_schema(model: &ResourceModel) -> Schema {
    let items = Schema::Array(ArrayBuilder::new().items(model_ref(model)).build());
    Schema::Object(
        ObjectBuilder::new()
            .schema_type(Type::Object)
            .title(Some(model.collection_title()))
            .property(model.name.clone(), RefOr::T(items))
            .required(model.name.clone())
            .build(),
    )
}

fn list_of(model: &ResourceModel) -> RefOr<Schema> {
    RefOr::T(Schema::Array(ArrayBuilder::new().items(model_ref(model)).build()))
}

fn json_response(description: &str, schema: RefOr<Schema>) -> Response {
    ResponseBuilder::new()
        .description(description)
        .content(JSON, ContentBuilder::new().schema(Some(schema)).build())
        .build()
}

fn query_param(name: &str, schema: RefOr<Schema>, description: &str) -> utoipa::openapi::path::Parameter {
    ParameterBuilder::new()
        .name(name)
        .parameter_in(ParameterIn::Query)
        .required(Required::False)
        .description(Some(description))
        .schema(Some(schema))
        .build()
}

fn operation(model: &ResourceModel, route: &RouteSpec, filters: &FilterSpec, auth: bool) -> ApiOperation {
    let mut b = OperationBuilder::new()
        .tags(Some(vec![model.name.clone()]))
        .operation_id(Some(format!("{}_{}", route.operation, model.name)));
    if route.path.ends_with("{id}") {
        let pk_ty = model.pk_field().map(|f| f.ty).unwrap_or_default();
        b = b.parameter(
            ParameterBuilder::new()
                .name("id")
                .parameter_in(ParameterIn::Path)
                .required(Required::True)
                .schema(Some(scalar(pk_ty)))
                .build(),
        );
    }
    b = match route.operation {
        Operation::GetAll => {
            b = b
                .summary(Some(format!("List {}", model.name)))
                .parameter(query_param(SKIP_PARAM, scalar(FieldType::Integer), "Rows to skip"))
                .parameter(query_param(
                    LIMIT_PARAM,
                    scalar(FieldType::Integer),
                    &format!("Maximum rows to return (at most {})", model.paginate),
                ));
            for p in &filters.params {
                let values = Schema::Array(ArrayBuilder::new().items(scalar(p.ty)).build());
                b = b.parameter(query_param(&p.name, RefOr::T(values), "Match any of the given values"));
            }
            b.response("200", json_response("Successful Response", list_of(model)))
        }
        Operation::GetOne => b
            .summary(Some(format!("Read one {}", model.name)))
            .response("200", json_response("Successful Response", model_ref(model)))
            .response("404", ResponseBuilder::new().description("Not Found").build()),
        Operation::Create => b
            .summary(Some(format!("Create {}", model.name)))
            .request_body(Some(
                RequestBodyBuilder::new()
                    .content(JSON, ContentBuilder::new().schema(Some(model_ref(model))).build())
                    .required(Some(Required::True))
                    .build(),
            ))
            .response("201", json_response("Created", model_ref(model)))
            .response("409", ResponseBuilder::new().description("Conflict").build()),
        Operation::Update => b
            .summary(Some(format!("Update {}", model.name)))
            .request_body(Some(
                RequestBodyBuilder::new()
                    .content(JSON, ContentBuilder::new().schema(Some(model_ref(model))).build())
                    .required(Some(Required::True))
                    .build(),
            ))
            .response("200", json_response("Successful Response", model_ref(model)))
            .response("404", ResponseBuilder::new().description("Not Found").build()),
        Operation::DeleteOne => b
            .summary(Some(format!("Delete one {}", model.name)))
            .response("200", json_response("Successful Response", model_ref(model)))
            .response("404", ResponseBuilder::new().description("Not Found").build()),
        Operation::DeleteAll => b
            .summary(Some(format!("Delete all {}", model.name)))
            .response("200", json_response("Successful Response", list_of(model))),
    };
    if route.operation != Operation::DeleteAll {
        b = b.response("422", ResponseBuilder::new().description("Validation Error").build());
    }
    if auth {
        b = b
            .security(SecurityRequirement::new(BASIC_AUTH, Vec::<String>::new()))
            .response("401", ResponseBuilder::new().description("Unauthorized").build());
    }
    b.build()
}

fn http_method(m: &Method) -> HttpMethod {
    match *m {
        Method::POST => HttpMethod::Post,
        Method::PUT => HttpMethod::Put,
        Method::DELETE => HttpMethod::Delete,
        _ => HttpMethod::Get,
    }
}

pub fn build_openapi(
    info: &AppInfo,
    description: &str,
    prefix: Option<&str>,
    models: &[Arc<ResourceModel>],
    auth: bool,
) -> OpenApi {
    let prefix = prefix.unwrap_or("");
    let mut by_path: BTreeMap<String, Vec<(HttpMethod, ApiOperation)>> = BTreeMap::new();
    let mut components = ComponentsBuilder::new();
    for model in models {
        let filters = FilterSpec::for_model(model);
        for route in route_table(model) {
            by_path
                .entry(format!("{}{}", prefix, route.path))
                .or_default()
                .push((http_method(&route.method), operation(model, &route, &filters, auth)));
        }
        components = components
            .schema(model.title.clone(), model_schema(model))
            .schema(model.collection_title(), collection_schema(model));
    }
    if auth {
        components = components.security_scheme(BASIC_AUTH, SecurityScheme::Http(Http::new(HttpAuthScheme::Basic)));
    }
    let mut paths = PathsBuilder::new();
    for (path, ops) in by_path {
        let mut item = PathItemBuilder::new();
        for (method, op) in ops {
            item = item.operation(method, op);
        }
        paths = paths.path(path, item.build());
    }
    let description = (!description.is_empty()).then(|| description.to_string());
    OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title(info.title.clone())
                .version(info.version.clone())
                .description(description)
                .build(),
        )
        .paths(paths.build())
        .components(Some(components.build()))
        .build()
}

pub fn openapi_json(openapi: &OpenApi) -> Result<serde_json::Value, ConfigError> {
    serde_json::to_value(openapi).map_err(|e| ConfigError::Validation(format!("openapi: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::ids::{IdRegistry, IdType};
    use crate::model::build_model;
    use crate::schema::{Field, IdentityInfo, Schema};

    fn model(ops: &[Operation], query_params: &[&str]) -> Arc<ResourceModel> {
        let mut s = Schema::new(vec![
            Field::new("id_", FieldType::String),
            Field::new("name", FieldType::String),
            Field::new("age", FieldType::Integer),
        ]);
        s.primary_key = vec!["id_".into()];
        s.identity = Some(IdentityInfo::new(IdType::Uuid4Base64, vec![]));
        let mut t = TableConfig::data_resource("people", "people.yaml");
        t.expose_routes = ops.to_vec();
        t.query_params = query_params.iter().map(|s| s.to_string()).collect();
        Arc::new(build_model("people", &t, &s, &IdRegistry::standard(), true).unwrap())
    }

    fn info() -> AppInfo {
        AppInfo {
            title: "People".into(),
            version: "0.1.0".into(),
            prefix: None,
            description: String::new(),
        }
    }

    fn doc(models: &[Arc<ResourceModel>], prefix: Option<&str>, auth: bool) -> serde_json::Value {
        openapi_json(&build_openapi(&info(), "", prefix, models, auth)).unwrap()
    }

    #[test]
    fn only_exposed_operations_are_described() {
        let v = doc(&[model(&[Operation::GetOne], &[])], None, false);
        let paths = v["paths"].as_object().unwrap();
        assert_eq!(paths.len(), 1);
        let item = paths["/people/{id}"].as_object().unwrap();
        assert!(item.contains_key("get"));
        assert!(!item.contains_key("put") && !item.contains_key("delete"));
        assert!(v["components"]["schemas"]["PeopleCollectionModel"].is_object());
    }

    #[test]
    fn filter_params_only_when_configured() {
        let names = |v: &serde_json::Value| -> Vec<String> {
            v["paths"]["/api/people"]["get"]["parameters"]
                .as_array()
                .unwrap()
                .iter()
                .map(|p| p["name"].as_str().unwrap().to_string())
                .collect()
        };
        let v = doc(&[model(&[Operation::GetAll], &[])], Some("/api"), false);
        assert_eq!(names(&v), vec!["skip", "limit"]);
        let v = doc(&[model(&[Operation::GetAll], &["name", "age"])], Some("/api"), false);
        assert_eq!(names(&v), vec!["skip", "limit", "name", "age"]);
    }

    #[test]
    fn auth_adds_unauthorized_response() {
        let v = doc(&[model(&[Operation::Create], &[])], None, true);
        let responses = &v["paths"]["/people"]["post"]["responses"];
        assert!(responses["201"].is_object());
        assert!(responses["401"].is_object());
        assert!(v["components"]["securitySchemes"]["basic"].is_object());
    }
}
