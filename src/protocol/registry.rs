// Copyright (c) 2025 Amqp Rpc Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! Method registration (spec.md §3 `MethodRegistration`, §4.2 `bind`).
//!
//! Rust has no runtime handler-signature introspection, so shape 1 of the
//! source `bind` contract (an invocable whose name/arity is reflected) is
//! not offered here; every binding carries its method name and parameter
//! names explicitly (spec.md §9, "Handler parameter-name extraction").

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::protocol::{BindError, ProtocolError};
use crate::transport::{DeliveryHandle, Message};

use super::validator::ParamValidator;

/// A bound method's async implementation. Receives arguments positionally,
/// in declared parameter order (spec.md §3 invariant 5).
pub type HandlerFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, ProtocolError>> + Send + Sync>;

/// A per-method or global interceptor hook. Receives the raw message, a
/// handle that can settle it (for short-circuiting), and the positional
/// argument view of the request; `false` suppresses the rest of the
/// pipeline (spec.md §4.2 step 3/5b).
///
/// The `for<'a>` bound ties the returned future's lifetime to the borrows
/// it closes over, rather than claiming (incorrectly) that it is `'static`.
pub type InterceptorFn = Arc<
    dyn for<'a> Fn(&'a Message, &'a DeliveryHandle, &'a [Value]) -> BoxFuture<'a, bool>
        + Send
        + Sync,
>;

/// A post-dispatch, pre-reply hook. `false` suppresses the reply
/// (spec.md §4.2 step 5f/6).
pub type CompletionInterceptorFn = Arc<
    dyn for<'a> Fn(&'a Message, &'a DeliveryHandle, &'a Value, &'a Value) -> BoxFuture<'a, bool>
        + Send
        + Sync,
>;

/// Wraps an async function of positional `Vec<Value>` arguments into a
/// [`HandlerFn`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ProtocolError>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)) as Pin<Box<dyn Future<Output = _> + Send>>)
}

/// A bound method: immutable once registered (spec.md §3).
pub struct MethodRegistration {
    /// Method name, unique within the owning registry.
    pub name: String,
    /// Declared parameter names, in positional order.
    pub param_names: Vec<String>,
    /// The handler implementation.
    pub handler: HandlerFn,
    /// Compiled `params` schema, if a validation definition was supplied.
    pub validator: Option<ParamValidator>,
    /// Per-method interceptor, if any.
    pub interceptor: Option<InterceptorFn>,
}

impl std::fmt::Debug for MethodRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistration")
            .field("name", &self.name)
            .field("param_names", &self.param_names)
            .field("has_validator", &self.validator.is_some())
            .field("has_interceptor", &self.interceptor.is_some())
            .finish()
    }
}

/// The definition-mapping shape of `bind` (spec.md §4.2 shape 3): a method
/// name plus optional params schema and per-method interceptor.
///
/// Unlike the source shape this mirrors, `method` is not a field here — every
/// `bind_with` call already takes the name as a separate, mandatory argument,
/// so there is no representable definition missing one.
/// `BindError::InvalidMethodDefinition` from the source taxonomy has no
/// constructor in this API and was dropped rather than kept dead.
#[derive(Default)]
pub struct MethodDefinition {
    /// Declared parameter names, in positional order.
    pub param_names: Vec<String>,
    /// JSON-Schema for `params`, validated and compiled at bind time.
    pub params_schema: Option<Value>,
    /// Per-method interceptor.
    pub interceptor: Option<InterceptorFn>,
}

impl MethodDefinition {
    /// Starts a definition with the given declared parameter names.
    pub fn new(param_names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            param_names: param_names.into_iter().map(Into::into).collect(),
            params_schema: None,
            interceptor: None,
        }
    }

    /// Attaches a `params` JSON-Schema.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.params_schema = Some(schema);
        self
    }

    /// Attaches a per-method interceptor.
    pub fn with_interceptor(mut self, interceptor: InterceptorFn) -> Self {
        self.interceptor = Some(interceptor);
        self
    }
}

/// The server's method table: write-once at bind, read-many at dispatch
/// (spec.md §5, "Shared state").
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Arc<MethodRegistration>>,
}

impl MethodRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `handler` with no schema or interceptor (spec.md
    /// §4.2 shape 2).
    pub fn bind(
        &mut self,
        name: impl Into<String>,
        param_names: impl IntoIterator<Item = impl Into<String>>,
        handler: HandlerFn,
    ) -> Result<(), BindError> {
        self.bind_with(name, MethodDefinition::new(param_names), handler)
    }

    /// Binds `name` to `handler` using a full [`MethodDefinition`]
    /// (spec.md §4.2 shape 3).
    pub fn bind_with(
        &mut self,
        name: impl Into<String>,
        definition: MethodDefinition,
        handler: HandlerFn,
    ) -> Result<(), BindError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BindError::InvalidMethodName(
                "method name cannot be empty".to_string(),
            ));
        }
        if self.methods.contains_key(&name) {
            return Err(BindError::DuplicateMethod(name));
        }

        let validator = definition
            .params_schema
            .as_ref()
            .map(|schema| ParamValidator::compile(schema, &definition.param_names))
            .transpose()?;

        self.methods.insert(
            name.clone(),
            Arc::new(MethodRegistration {
                name,
                param_names: definition.param_names,
                handler,
                validator,
                interceptor: definition.interceptor,
            }),
        );
        Ok(())
    }

    /// Looks up a bound method by name.
    pub fn get(&self, name: &str) -> Option<Arc<MethodRegistration>> {
        self.methods.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_handler() -> HandlerFn {
        handler_fn(|_args| async { Ok(Value::Null) })
    }

    #[test]
    fn binds_and_looks_up_a_method() {
        let mut registry = MethodRegistry::new();
        registry
            .bind("echo", ["one"], noop_handler())
            .unwrap();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn duplicate_binding_is_rejected() {
        let mut registry = MethodRegistry::new();
        registry.bind("echo", ["one"], noop_handler()).unwrap();
        let err = registry.bind("echo", ["one"], noop_handler()).unwrap_err();
        assert!(matches!(err, BindError::DuplicateMethod(name) if name == "echo"));
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut registry = MethodRegistry::new();
        let err = registry.bind("", [] as [&str; 0], noop_handler()).unwrap_err();
        assert!(matches!(err, BindError::InvalidMethodName(_)));
    }

    #[test]
    fn schema_referencing_undeclared_param_is_rejected() {
        let mut registry = MethodRegistry::new();
        let definition = MethodDefinition::new(["one"]).with_schema(json!({
            "type": "object",
            "properties": { "ghost": { "type": "integer" } },
        }));
        let err = registry
            .bind_with("echo", definition, noop_handler())
            .unwrap_err();
        assert!(matches!(err, BindError::InvalidValidationDefinition(_)));
    }
}
