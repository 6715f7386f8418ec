// Copyright (c) 2025 Amqp Rpc Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! The validator adapter: wraps a JSON-Schema validator, compiled once per
//! bound method, over the handler's named-parameter view of the request
//! (spec.md §4.3).

use jsonschema::JSONSchema;
use serde_json::{Map, Value};

use crate::error::protocol::{BindError, ProtocolError};

use super::wire::Params;

/// A compiled schema bound to one method's `params`.
///
/// Compilation happens once, at `bind()` time; dispatch only ever runs the
/// already-compiled schema against the named-parameter view of the request.
pub struct ParamValidator {
    schema: JSONSchema,
}

impl std::fmt::Debug for ParamValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamValidator").finish_non_exhaustive()
    }
}

impl ParamValidator {
    /// Compiles `schema` against `param_names`, rejecting schemas that are
    /// not object-typed or that reference properties the handler did not
    /// declare (spec.md §4.2: "a `params` schema must be an object-typed
    /// JSON-Schema whose `properties` keys are all members of the handler's
    /// parameter-name list").
    pub fn compile(schema: &Value, param_names: &[String]) -> Result<Self, BindError> {
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                BindError::InvalidValidationDefinition(
                    "params schema must be an object schema with a `properties` map".to_string(),
                )
            })?;

        for key in properties.keys() {
            if !param_names.iter().any(|name| name == key) {
                return Err(BindError::InvalidValidationDefinition(format!(
                    "schema property `{key}` is not a declared parameter"
                )));
            }
        }

        let compiled = JSONSchema::options()
            .with_draft(jsonschema::Draft::Draft202012)
            .compile(schema)
            .map_err(|e| BindError::InvalidValidationDefinition(e.to_string()))?;

        Ok(Self { schema: compiled })
    }

    /// Validates `params` (converted to the handler's named-parameter view)
    /// against the compiled schema. On failure, returns `InvalidParams` with
    /// `data.messages` set to one entry per violation (all-errors mode).
    pub fn validate(
        &self,
        params: Option<Params>,
        param_names: &[String],
    ) -> Result<(), ProtocolError> {
        let named: Map<String, Value> = params
            .map(|p| p.into_named(param_names))
            .unwrap_or_default();
        let value = Value::Object(named);

        let result = self.schema.validate(&value);
        if let Err(errors) = result {
            let messages: Vec<Value> = errors.map(|e| Value::String(e.to_string())).collect();
            return Err(ProtocolError::InvalidParams {
                message: "parameter validation failed".to_string(),
                data: Some(Value::Object({
                    let mut data = Map::new();
                    data.insert("messages".to_string(), Value::Array(messages));
                    data
                })),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn compiles_and_accepts_valid_named_params() {
        let schema = json!({
            "type": "object",
            "properties": { "one": { "type": "integer" } },
            "required": ["one"],
        });
        let param_names = names(&["one"]);
        let validator = ParamValidator::compile(&schema, &param_names).unwrap();

        let mut map = Map::new();
        map.insert("one".to_string(), json!(1));
        assert!(validator
            .validate(Some(Params::Named(map)), &param_names)
            .is_ok());
    }

    #[test]
    fn reports_all_violations_in_data_messages() {
        let schema = json!({
            "type": "object",
            "properties": {
                "one": { "type": "integer" },
                "two": { "type": "string" },
            },
            "required": ["one", "two"],
        });
        let param_names = names(&["one", "two"]);
        let validator = ParamValidator::compile(&schema, &param_names).unwrap();

        let mut map = Map::new();
        map.insert("one".to_string(), json!("not an integer"));
        map.insert("two".to_string(), json!(42));
        let err = validator
            .validate(Some(Params::Named(map)), &param_names)
            .unwrap_err();

        assert_eq!(err.code(), -32602);
        let messages = err.data().unwrap().get("messages").unwrap().as_array().unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn rejects_schema_referencing_undeclared_property() {
        let schema = json!({
            "type": "object",
            "properties": { "ghost": { "type": "integer" } },
        });
        let param_names = names(&["one"]);
        assert!(ParamValidator::compile(&schema, &param_names).is_err());
    }

    #[test]
    fn rejects_non_object_schema() {
        let schema = json!({ "type": "string" });
        let param_names = names(&["one"]);
        assert!(ParamValidator::compile(&schema, &param_names).is_err());
    }

    #[test]
    fn missing_positions_become_null_before_validation() {
        let schema = json!({
            "type": "object",
            "properties": { "one": { "type": ["integer", "null"] } },
        });
        let param_names = names(&["one"]);
        let validator = ParamValidator::compile(&schema, &param_names).unwrap();
        assert!(validator
            .validate(Some(Params::Positional(vec![])), &param_names)
            .is_ok());
    }
}
