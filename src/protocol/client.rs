// Copyright (c) 2025 Amqp Rpc Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! `RpcClient`: correlation table, deadline timers, and the `call`/`notify`
//! argument shapes (spec.md §4.5).
//!
//! The source models `call`/`notify` as variadic, tagged-by-arity overloads
//! (spec.md §9, "Dynamic argument shapes of `call`/`notify`"). Rust has no
//! variadic call syntax, so this adapts the same four shapes onto
//! [`CallParams`] plus the dedicated [`RpcClient::call_raw`] /
//! [`RpcClient::call_batch`] methods, rather than replicating rest-arg
//! dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::config::client::RpcClientOptions;
use crate::error::protocol::{ClientError, ProtocolError};
use crate::error::transport::TransportError;
use crate::error::{report_error, AmqpRpcError, ErrorContext};
use crate::transport::{
    Delivery, MessageBody, MessageHeader, MessageProperties, ReceiverOptions, TransportClient,
};

use super::wire::{Correlator, ErrorBody, Params, RequestEnvelope};

/// Errors a `call` can settle with.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// The server replied with `{ error }`.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// A local client-side error (bad request, timeout, link failure).
    #[error(transparent)]
    Client(#[from] ClientError),
    /// The underlying transport failed to send the request.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The parameter shape of a `call`/`notify` invocation.
#[derive(Debug, Clone)]
pub enum CallParams {
    /// No parameters.
    None,
    /// A positional argument list.
    Positional(Vec<Value>),
    /// A named argument mapping.
    Named(Map<String, Value>),
}

impl CallParams {
    /// Implements the `call(methodName, singleValue)` shape (spec.md §4.5):
    /// a plain mapping becomes named params, anything else becomes a
    /// single-element positional list.
    pub fn single(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Named(map),
            other => Self::Positional(vec![other]),
        }
    }

    fn into_wire(self) -> Option<Params> {
        match self {
            Self::None => None,
            Self::Positional(values) => Some(Params::Positional(values)),
            Self::Named(map) => Some(Params::Named(map)),
        }
    }
}

impl From<()> for CallParams {
    fn from(_: ()) -> Self {
        Self::None
    }
}

impl From<Vec<Value>> for CallParams {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl From<Map<String, Value>> for CallParams {
    fn from(map: Map<String, Value>) -> Self {
        Self::Named(map)
    }
}

/// The client-side pre-send interceptor (spec.md §4.5 step 2). Takes
/// ownership of the correlator, body, and properties and hands them back
/// alongside a continue/abort flag, sidestepping the borrow-lifetime
/// issues a `&mut`-based async callback would run into.
pub type ClientInterceptorFn = Arc<
    dyn Fn(Correlator, Value, MessageProperties) -> BoxFuture<'static, (bool, Value, MessageProperties)>
        + Send
        + Sync,
>;

struct ClientInner<T: TransportClient> {
    sender: T::Sender,
    response_address: String,
    pending: Mutex<HashMap<Correlator, oneshot::Sender<Result<Value, CallError>>>>,
    default_timeout_ms: u64,
    interceptor: Option<ClientInterceptorFn>,
    _transport: T,
}

/// `RpcClient<T>`: issues request/response and fire-and-forget invocations
/// over a sender/receiver pair attached to a [`TransportClient`] of type
/// `T`. Cheaply cloneable; clones share the same correlation table.
#[derive(Clone)]
pub struct RpcClient<T: TransportClient> {
    inner: Arc<ClientInner<T>>,
}

impl<T: TransportClient> RpcClient<T> {
    /// Connects a client: attaches a response receiver (dynamic unless
    /// `options.response_address` is set) and a sender bound to
    /// `options.address`, then spawns the task that feeds the correlation
    /// table from incoming responses (spec.md §4.5 `connect`).
    pub async fn connect(transport: T, options: RpcClientOptions) -> Result<Self, TransportError> {
        Self::connect_with_interceptor(transport, options, None).await
    }

    /// As [`Self::connect`], additionally installing a pre-send
    /// interceptor.
    pub async fn connect_with_interceptor(
        transport: T,
        options: RpcClientOptions,
        interceptor: Option<ClientInterceptorFn>,
    ) -> Result<Self, TransportError> {
        let dynamic = options.response_address.is_none();
        let mut receiver = transport
            .create_receiver(
                options.response_address.as_deref(),
                ReceiverOptions { dynamic },
            )
            .await?;
        let sender = transport.create_sender(&options.address).await?;
        let response_address = receiver.address().to_string();

        let inner = Arc::new(ClientInner {
            sender,
            response_address,
            pending: Mutex::new(HashMap::new()),
            default_timeout_ms: options.timeout_ms,
            interceptor,
            _transport: transport,
        });

        let response_loop_inner = inner.clone();
        tokio::spawn(async move {
            use crate::transport::Receiver;
            while let Some(delivery) = receiver.recv().await {
                response_loop_inner.handle_response(delivery).await;
            }
            response_loop_inner.reject_all_pending(ClientError::LinkError(
                "response receiver link closed".to_string(),
            ));
        });

        Ok(Self { inner })
    }

    /// Invokes `method` with `params`, awaiting the response.
    pub async fn call(
        &self,
        method: impl Into<String>,
        params: impl Into<CallParams>,
    ) -> Result<Value, CallError> {
        let envelope = RequestEnvelope {
            method: method.into(),
            params: params.into().into_wire(),
        };
        let body = serde_json::to_value(&envelope).expect("RequestEnvelope always serializes");
        self.inner.send_and_await(body).await
    }

    /// Sends a raw, pre-built envelope (a single request mapping or a batch
    /// array) verbatim, awaiting the response (spec.md §4.5
    /// `call(rawEnvelope)` / `call(batchArray)`).
    pub async fn call_raw(&self, envelope: Value) -> Result<Value, CallError> {
        self.inner.send_and_await(envelope).await
    }

    /// Sends `requests` as a batch, resolving with the ordered per-item
    /// response values (`result` or the whole error item; spec.md §4.5 and
    /// §9 open question 3 — no per-item type discrimination).
    pub async fn call_batch(&self, requests: Vec<RequestEnvelope>) -> Result<Vec<Value>, CallError> {
        let body = serde_json::to_value(&requests).expect("batch always serializes");
        match self.inner.send_and_await(body).await? {
            Value::Array(items) => Ok(items),
            other => Ok(vec![other]),
        }
    }

    /// Invokes `method` with `params` without expecting a reply. Completes
    /// as soon as the send completes (spec.md §4.5 `notify`).
    pub async fn notify(
        &self,
        method: impl Into<String>,
        params: impl Into<CallParams>,
    ) -> Result<(), CallError> {
        let envelope = RequestEnvelope {
            method: method.into(),
            params: params.into().into_wire(),
        };
        let body = serde_json::to_value(&envelope).expect("RequestEnvelope always serializes");
        self.inner.send_notification(body).await
    }

    /// Sends a raw, pre-built envelope (a single request mapping or a batch
    /// array) verbatim, without expecting a reply (spec.md §4.5 `notify`
    /// accepts "the same argument shapes as `call`").
    pub async fn notify_raw(&self, envelope: Value) -> Result<(), CallError> {
        self.inner.send_notification(envelope).await
    }

    /// Sends `requests` as a batch without expecting a reply.
    pub async fn notify_batch(&self, requests: Vec<RequestEnvelope>) -> Result<(), CallError> {
        let body = serde_json::to_value(&requests).expect("batch always serializes");
        self.inner.send_notification(body).await
    }
}

impl<T: TransportClient> ClientInner<T> {
    /// The `header.ttl` to attach to outgoing requests: the configured
    /// timeout, or none when disabled (spec.md §4.5 step 1, "header.ttl =
    /// configured timeout if any").
    fn header(&self) -> MessageHeader {
        MessageHeader {
            ttl_ms: (self.default_timeout_ms != 0).then_some(self.default_timeout_ms),
        }
    }

    async fn send_and_await(&self, body: Value) -> Result<Value, CallError> {
        let correlator = Correlator::generate();
        let mut body = body;
        let mut properties = MessageProperties {
            reply_to: Some(self.response_address.clone()),
            correlation_id: Some(correlator.clone()),
        };

        let mut proceed = true;
        if let Some(interceptor) = &self.interceptor {
            let (cont, mutated_body, mutated_properties) =
                interceptor(correlator.clone(), body, properties).await;
            body = mutated_body;
            properties = mutated_properties;
            proceed = cont;
        }

        let (tx, rx) = oneshot::channel();

        if proceed {
            self.sender
                .send(MessageBody::Value(body), properties, self.header())
                .await?;
            // Installed only after send succeeds, so the table never holds
            // an unsent request (spec.md §4.5 step 3).
            self.pending.lock().insert(correlator.clone(), tx);
        }
        // If the interceptor suppressed the send, the completion is left
        // unregistered (nothing will ever resolve it) and simply rides the
        // timeout below to a RequestTimeout rejection, per spec.md §4.5
        // step 2 ("the completion stays pending ... will eventually time
        // out if enabled").

        self.await_response(correlator, rx).await
    }

    async fn send_notification(&self, body: Value) -> Result<(), CallError> {
        let correlator = Correlator::generate();
        let mut body = body;
        let mut properties = MessageProperties::default();

        if let Some(interceptor) = &self.interceptor {
            let (cont, mutated_body, mutated_properties) =
                interceptor(correlator, body, properties).await;
            body = mutated_body;
            properties = mutated_properties;
            if !cont {
                return Ok(());
            }
        }

        if properties.reply_to.is_some() || properties.correlation_id.is_some() {
            return Err(CallError::Client(ClientError::BadRequest(
                "notify must not carry replyTo/correlationId".to_string(),
            )));
        }

        self.sender
            .send(MessageBody::Value(body), properties, self.header())
            .await?;
        Ok(())
    }

    async fn await_response(
        &self,
        correlator: Correlator,
        rx: oneshot::Receiver<Result<Value, CallError>>,
    ) -> Result<Value, CallError> {
        if self.default_timeout_ms == 0 {
            return rx
                .await
                .unwrap_or_else(|_| Err(CallError::Client(ClientError::LinkError(
                    "response channel dropped".to_string(),
                ))));
        }

        let deadline = Duration::from_millis(self.default_timeout_ms);
        tokio::select! {
            result = rx => result.unwrap_or_else(|_| {
                Err(CallError::Client(ClientError::LinkError(
                    "response channel dropped".to_string(),
                )))
            }),
            _ = tokio::time::sleep(deadline) => {
                self.pending.lock().remove(&correlator);
                Err(CallError::Client(ClientError::RequestTimeout))
            }
        }
    }

    async fn handle_response(&self, delivery: Delivery) {
        let Delivery { message, handle } = delivery;
        handle.accept();

        let Some(correlator) = message.properties.correlation_id.clone() else {
            report_error(ErrorContext::new(
                AmqpRpcError::Custom("response message carries no correlationId".to_string()),
                "rpc_client::handle_response",
            ));
            return;
        };

        let sender = self.pending.lock().remove(&correlator);
        let Some(sender) = sender else {
            report_error(ErrorContext::new(
                AmqpRpcError::Custom(format!("response for unknown correlator: {correlator}")),
                "rpc_client::handle_response",
            ));
            return;
        };

        let body = match message.body {
            Some(MessageBody::Value(v)) => v,
            Some(MessageBody::Text(text)) => {
                serde_json::from_str(&text).unwrap_or(Value::Null)
            }
            None => Value::Null,
        };

        let _ = sender.send(Self::interpret_response_body(body));
    }

    fn interpret_response_body(body: Value) -> Result<Value, CallError> {
        match body {
            Value::Array(items) => Ok(Value::Array(
                items.into_iter().map(Self::extract_batch_item).collect(),
            )),
            Value::Object(ref obj) if obj.contains_key("result") => {
                Ok(obj.get("result").cloned().unwrap_or(Value::Null))
            }
            Value::Object(ref obj) if obj.contains_key("error") => {
                let error_value = obj.get("error").cloned().unwrap_or(Value::Null);
                let error_body: ErrorBody = serde_json::from_value(error_value).unwrap_or(ErrorBody {
                    code: -32603,
                    message: "malformed error body".to_string(),
                    data: None,
                });
                Err(CallError::Protocol(error_body.into()))
            }
            _ => Err(CallError::Client(ClientError::BadRequest(
                "malformed response body".to_string(),
            ))),
        }
    }

    fn extract_batch_item(item: Value) -> Value {
        match item.as_object() {
            Some(obj) if obj.contains_key("result") || obj.contains_key("error") => item,
            _ => Value::Null,
        }
    }

    fn reject_all_pending(&self, error: ClientError) {
        let mut pending = self.pending.lock();
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(CallError::Client(error.clone())));
        }
    }
}

/// Wraps an async function of `(Correlator, Value, MessageProperties)` into
/// a [`ClientInterceptorFn`].
pub fn client_interceptor_fn<F, Fut>(f: F) -> ClientInterceptorFn
where
    F: Fn(Correlator, Value, MessageProperties) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (bool, Value, MessageProperties)> + Send + 'static,
{
    Arc::new(move |correlator, body, properties| {
        Box::pin(f(correlator, body, properties)) as Pin<Box<dyn Future<Output = _> + Send>>
    })
}
