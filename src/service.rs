//! Service stubs driven by an explicit service definition.
//!
//! A [`ServiceDef`] names a package, a service and its methods. From it:
//!
//! - [`ServiceClient`] issues one request per call on the method topic
//! - [`ServiceServer`] binds one typed handler per method and serves them
//!   until a shutdown future resolves
//!
//! Method topics are `{subject_prefix}{package}.{method}`. Servers join the
//! queue group `{package}.svc` unless told otherwise, so several instances of
//! one service share the load.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::transport::HandlerPtr;
use crate::{
    // ---
    log_info,
    log_warn,
    typed,
    CallContext,
    Envelope,
    RequestOptions,
    Result,
    RpcError,
    SubscribeOptions,
    SubscriptionHandle,
    Transport,
};

/// One RPC method of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    pub name: String,
    pub request_type: String,
    pub response_type: String,
}

/// Description of a service and its methods.
///
/// # Example
///
/// ```
/// use subject_rpc::ServiceDef;
///
/// let def = ServiceDef::new("example", "Service")
///     .with_method("Add", "Req", "Rep");
///
/// assert_eq!(def.topic("Add"), "example.Add");
/// assert_eq!(def.queue_group(), "example.svc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDef {
    // ---
    pub package: String,
    pub name: String,
    pub methods: Vec<MethodDef>,

    /// Prepended verbatim to every method topic. Default: empty.
    pub subject_prefix: String,

    /// Queue group override. Default: `{package}.svc`.
    pub queue_group: Option<String>,
}

impl ServiceDef {
    // ---
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
            methods: Vec::new(),
            subject_prefix: String::new(),
            queue_group: None,
        }
    }

    pub fn with_method(
        mut self,
        name: impl Into<String>,
        request_type: impl Into<String>,
        response_type: impl Into<String>,
    ) -> Self {
        self.methods.push(MethodDef {
            name: name.into(),
            request_type: request_type.into(),
            response_type: response_type.into(),
        });
        self
    }

    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }

    pub fn with_queue_group(mut self, group: impl Into<String>) -> Self {
        self.queue_group = Some(group.into());
        self
    }

    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Subject a method is served on.
    pub fn topic(&self, method: &str) -> String {
        format!("{}{}.{}", self.subject_prefix, self.package, method)
    }

    /// Queue group servers join by default.
    pub fn queue_group(&self) -> String {
        self.queue_group
            .clone()
            .unwrap_or_else(|| format!("{}.svc", self.package))
    }

    fn require(&self, method: &str) -> Result<&MethodDef> {
        self.method(method).ok_or_else(|| {
            RpcError::unimplemented(format!(
                "{}.{} has no method {method}",
                self.package, self.name
            ))
        })
    }
}

/// Client side of a service.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    transport: Transport,
    def: Arc<ServiceDef>,
}

impl ServiceClient {
    // ---
    pub fn new(transport: Transport, def: ServiceDef) -> Self {
        Self {
            transport,
            def: Arc::new(def),
        }
    }

    pub fn def(&self) -> &ServiceDef {
        &self.def
    }

    /// Call `method` with the transport's default request options.
    pub async fn call<Req, Resp>(&self, method: &str, req: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        self.call_with(method, req, self.transport.request_options())
            .await
    }

    /// Call `method` with explicit request options.
    ///
    /// # Errors
    ///
    /// [`Code::Unimplemented`](crate::Code::Unimplemented) without sending
    /// anything if the definition has no such method; otherwise any error of
    /// [`Transport::request`].
    pub async fn call_with<Req, Resp>(
        &self,
        method: &str,
        req: &Req,
        opts: RequestOptions,
    ) -> Result<Resp>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        // ---
        let method = self.def.require(method)?;
        let topic = self.def.topic(&method.name);
        self.transport.request(&topic, req, opts).await
    }
}

/// Server side of a service.
pub struct ServiceServer {
    transport: Transport,
    def: ServiceDef,
    handlers: Vec<(String, HandlerPtr)>,
}

impl ServiceServer {
    // ---
    pub fn new(transport: Transport, def: ServiceDef) -> Self {
        Self {
            transport,
            def,
            handlers: Vec::new(),
        }
    }

    pub fn def(&self) -> &ServiceDef {
        &self.def
    }

    /// Register the implementation of `method`.
    ///
    /// Registering a method twice replaces the earlier handler.
    ///
    /// # Errors
    ///
    /// [`Code::Unimplemented`](crate::Code::Unimplemented) if the definition
    /// has no such method.
    pub fn handle<F, Fut, Req, Resp>(&mut self, method: &str, f: F) -> Result<&mut Self>
    where
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
    {
        // ---
        let name = self.def.require(method)?.name.clone();
        let handler: HandlerPtr = Arc::new(typed(f));

        self.handlers.retain(|(n, _)| *n != name);
        self.handlers.push((name, handler));
        Ok(self)
    }

    /// Subscribe every method, wait for `shutdown`, then unsubscribe.
    ///
    /// Methods declared in the definition without a registered handler answer
    /// with [`Code::Unimplemented`](crate::Code::Unimplemented). The queue
    /// group comes from `opts` when set, otherwise from the definition.
    ///
    /// # Errors
    ///
    /// Fails if any subscription cannot be made; subscriptions made before the
    /// failure are removed again.
    pub async fn serve<S>(&self, opts: SubscribeOptions, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        // ---
        let opts = SubscribeOptions {
            queue_group: opts.queue_group.or_else(|| Some(self.def.queue_group())),
        };

        let mut handles = Vec::with_capacity(self.def.methods.len());
        for method in &self.def.methods {
            let handler = self.handler_for(&method.name);
            let topic = self.def.topic(&method.name);

            match self
                .transport
                .subscribe_shared(&topic, handler, opts.clone())
                .await
            {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    self.release(&handles).await;
                    return Err(err);
                }
            }
        }

        log_info!(
            "{}: serving {}.{} methods={} queue={:?}",
            self.transport.name(),
            self.def.package,
            self.def.name,
            handles.len(),
            opts.queue_group
        );

        shutdown.await;

        self.release(&handles).await;
        log_info!(
            "{}: stopped serving {}.{}",
            self.transport.name(),
            self.def.package,
            self.def.name
        );
        Ok(())
    }

    fn handler_for(&self, method: &str) -> HandlerPtr {
        // ---
        if let Some((_, handler)) = self.handlers.iter().find(|(n, _)| n == method) {
            return handler.clone();
        }

        let message = format!("{}.{}/{method} is not implemented", self.def.package, self.def.name);
        Arc::new(move |_ctx: CallContext, _env: Envelope| {
            let message = message.clone();
            async move { Err::<Option<Bytes>, _>(RpcError::unimplemented(message)) }
        })
    }

    async fn release(&self, handles: &[SubscriptionHandle]) {
        for handle in handles {
            if let Err(_err) = self.transport.unsubscribe(handle).await {
                log_warn!("unsubscribe {} subject={} failed: {_err}", handle.id, handle.subject);
            }
        }
    }
}

/// Resolve on Ctrl-C. Suitable as the `shutdown` argument of
/// [`ServiceServer::serve`].
pub async fn shutdown_signal() {
    // ---
    if let Err(_err) = tokio::signal::ctrl_c().await {
        log_warn!("cannot listen for shutdown signal: {_err}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::Code;

    #[test]
    fn test_topics_and_groups() {
        // ---
        let def = ServiceDef::new("math", "Calculator")
            .with_method("Add", "AddReq", "AddRep")
            .with_subject_prefix("rpc.");

        assert_eq!(def.topic("Add"), "rpc.math.Add");
        assert_eq!(def.queue_group(), "math.svc");
        assert_eq!(def.clone().with_queue_group("calc").queue_group(), "calc");
        assert_eq!(def.method("Add").map(|m| m.request_type.as_str()), Some("AddReq"));
    }

    #[test]
    fn test_require_unknown_method() {
        // ---
        let def = ServiceDef::new("math", "Calculator");
        let err = def.require("Div").unwrap_err();
        assert_eq!(err.code(), Some(Code::Unimplemented));
    }
}
