//!
//! Parameter servers.
//!
//! A `ParameterServer` owns the parameters of one node and answers the
//! requests addressed to that node on a bus.  The owning process can read
//! and write the same parameters directly; local writes go through the same
//! validation and produce the same events as remote ones.
//!

use std::{
    path::Path,
    sync::Arc,
    thread::{self, JoinHandle},
};

use parking_lot::Mutex;
use tracing::{info, info_span, Span};

use pcomm_core::Interrupt;

use crate::bus::ParameterBus;
use crate::config::ServerConfig;
use crate::dispatcher::{RequestHandler, ServerDispatcher};
use crate::error::{LoadError, ParameterError, Result};
use crate::events::ChangeEventPublisher;
use crate::router::RequestRouter;
use crate::store::ParameterStore;
use crate::types::{Parameter, ParameterValue, SetParametersResult};
use crate::yaml;

/// Serves the parameters of one node on a bus
pub struct ParameterServer {
    node_id: String,
    handler: Arc<RequestHandler>,
    stop: Interrupt,
    worker: Mutex<Option<JoinHandle<()>>>,
    span: Span,
}

impl ParameterServer {
    /// Start answering requests addressed to `node_id` on `bus`.
    ///
    /// Fails with `NodeIdInUse` when another live server on the bus already
    /// answers for `node_id`.
    pub fn serve(bus: &ParameterBus, node_id: impl Into<String>, config: ServerConfig) -> Result<Self> {
        Self::serve_with(bus, node_id.into(), config, Vec::new())
    }

    /// Start a server whose initial parameters are loaded from a YAML file.
    ///
    /// The file is read and every parameter in it validated before the node
    /// id is claimed.  A bad file or a rejected parameter fails with
    /// `ParameterError::Load` and leaves the bus untouched.
    pub fn serve_from_yaml(
        bus: &ParameterBus,
        node_id: impl Into<String>,
        config: ServerConfig,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let parameters = yaml::load_from_yaml(path)?;
        Self::serve_with(bus, node_id.into(), config, parameters)
    }

    fn serve_with(
        bus: &ParameterBus,
        node_id: String,
        config: ServerConfig,
        initial: Vec<Parameter>,
    ) -> Result<Self> {
        for parameter in initial.iter() {
            config
                .validate_entry(parameter)
                .map_err(|reason| LoadError::Rejected {
                    name: parameter.name.clone(),
                    reason,
                })?;
        }

        let claim = bus.claim_node(&node_id)?;
        let span = config
            .span
            .clone()
            .unwrap_or_else(|| info_span!("parameter_server", node_id = %node_id));

        let store = Arc::new(ParameterStore::new(node_id.clone()));
        let events = ChangeEventPublisher::new(bus.events().clone(), span.clone());
        let worker_threads = config.worker_threads;
        let handler = Arc::new(RequestHandler::new(store, config, events, span.clone()));
        if !initial.is_empty() {
            handler.apply_validated(initial);
        }

        let requests = RequestRouter::new(node_id.clone()).route(bus.requests());
        let dispatcher = ServerDispatcher::new(
            handler.clone(),
            bus.responses().clone(),
            worker_threads,
            span.clone(),
        );

        let stop = Interrupt::new();
        let shutdown = [bus.interrupt().receiver(), stop.receiver()];
        let worker = thread::Builder::new()
            .name(format!("{}-parameters", node_id))
            .spawn(move || {
                dispatcher.run(requests, &shutdown);
                // The node id stays claimed until every in-flight request
                // has been answered.
                drop(claim);
            })
            .map_err(ParameterError::Thread)?;

        info!(parent: &span, worker_threads, "parameter server started");

        Ok(Self {
            node_id,
            handler,
            stop,
            worker: Mutex::new(Some(worker)),
            span,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Set parameters from the owning process.
    ///
    /// Validation, event publication, and per-entry results are identical
    /// to a remote set.
    pub fn set_parameters(&self, parameters: Vec<Parameter>) -> Vec<SetParametersResult> {
        self.handler.apply_set(parameters).results
    }

    /// Set a single parameter from the owning process
    pub fn set_parameter(&self, name: impl Into<String>, value: impl Into<ParameterValue>) -> SetParametersResult {
        self.set_parameters(vec![Parameter::new(name, value)])
            .pop()
            .unwrap_or_else(|| SetParametersResult::failure("no result"))
    }

    /// Read the named parameters.  Missing names are omitted.
    pub fn get_parameters(&self, names: &[String]) -> Vec<Parameter> {
        self.handler.store().get_parameters(names)
    }

    pub fn get_parameter(&self, name: &str) -> Option<ParameterValue> {
        self.handler.store().get(name)
    }

    /// List parameter names under `prefixes` up to `depth`
    pub fn list_parameters(&self, prefixes: &[String], depth: u32) -> Vec<String> {
        self.handler.store().list_parameters(prefixes, depth)
    }

    /// Every parameter currently held by this node
    pub fn parameters(&self) -> Vec<Parameter> {
        self.handler.store().snapshot()
    }

    /// Delete parameters from the owning process
    pub fn delete_parameters(&self, names: Vec<String>) -> Vec<SetParametersResult> {
        self.handler.apply_delete(names).results
    }

    /// Load parameters from a YAML file into the running server.
    ///
    /// Nothing is applied if the file fails to load.
    pub fn load_from_yaml(&self, path: impl AsRef<Path>) -> Result<Vec<SetParametersResult>> {
        let parameters = yaml::load_from_yaml(path)?;
        Ok(self.set_parameters(parameters))
    }

    /// Whether the server is still answering requests
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|worker| !worker.is_finished())
            .unwrap_or(false)
    }

    /// Stop answering requests.
    ///
    /// Requests already being handled are answered before this returns,
    /// after which the node id may be served again.
    pub fn shutdown(&self) {
        self.stop.trigger();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                tracing::error!(parent: &self.span, "parameter dispatcher panicked");
            }
            info!(parent: &self.span, "parameter server stopped");
        }
    }
}

impl Drop for ParameterServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
