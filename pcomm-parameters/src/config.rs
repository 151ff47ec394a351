//!
//! Configuration for parameter servers and clients.
//!
//! Both configurations come with defaults and a builder.  Logging is
//! injected through a `tracing::Span` so the owning process decides where
//! a component's events go.
//!

use std::{fmt, sync::Arc, time::Duration};

use tracing::Span;

use crate::types::Parameter;

/// Default size of the server worker pool
pub const DEFAULT_WORKER_THREADS: usize = 5;

/// Default time a client waits for a response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// User validation run on every parameter before it is applied.
///
/// Returning an error rejects that parameter with the error as its reason.
pub type SetCallback = Arc<dyn Fn(&Parameter) -> Result<(), String> + Send + Sync>;

/// Size limits enforced on incoming parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterLimits {
    /// Parameters past this position in a single request are rejected
    pub max_batch_len: usize,
    /// Maximum number of elements in an array value
    pub max_array_len: usize,
    /// Maximum length in bytes of any string in a value
    pub max_string_len: usize,
}

impl Default for ParameterLimits {
    fn default() -> Self {
        Self {
            max_batch_len: 256,
            max_array_len: 4096,
            max_string_len: 64 * 1024, // 64 KiB
        }
    }
}

impl ParameterLimits {
    /// Check the parameter at `index` of a batch against the limits
    pub fn check(&self, index: usize, parameter: &Parameter) -> Result<(), String> {
        if index >= self.max_batch_len {
            return Err(format!(
                "request exceeds the limit of {} parameters",
                self.max_batch_len
            ));
        }

        self.check_entry(parameter)
    }

    /// Check a single parameter regardless of its position in a batch
    pub fn check_entry(&self, parameter: &Parameter) -> Result<(), String> {
        if parameter.name.is_empty() {
            return Err(String::from("parameter name must not be empty"));
        }

        if let Some(len) = parameter.value.array_len() {
            if len > self.max_array_len {
                return Err(format!(
                    "parameter '{}': array of {} elements exceeds the limit of {}",
                    parameter.name, len, self.max_array_len
                ));
            }
        }

        if let Some(len) = parameter.value.longest_string() {
            if len > self.max_string_len {
                return Err(format!(
                    "parameter '{}': string of {} bytes exceeds the limit of {}",
                    parameter.name, len, self.max_string_len
                ));
            }
        }

        Ok(())
    }
}

/// Configuration for a parameter server
#[derive(Clone)]
pub struct ServerConfig {
    /// Number of threads handling requests concurrently
    pub worker_threads: usize,

    /// Size limits on incoming parameters
    pub limits: ParameterLimits,

    /// Optional user validation, run after the size limits
    pub on_set: Option<SetCallback>,

    /// Span all server events are recorded under.  Defaults to a
    /// `parameter_server` span carrying the node id.
    pub span: Option<Span>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            limits: ParameterLimits::default(),
            on_set: None,
            span: None,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("worker_threads", &self.worker_threads)
            .field("limits", &self.limits)
            .field("on_set", &self.on_set.is_some())
            .field("span", &self.span)
            .finish()
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Validate the parameter at `index` of a batch
    pub fn validate(&self, index: usize, parameter: &Parameter) -> Result<(), String> {
        self.limits.check(index, parameter)?;
        self.validate_entry(parameter)
    }

    /// Validate a parameter that is not part of a request, such as one
    /// loaded from a parameter file.  The batch length limit does not apply.
    pub fn validate_entry(&self, parameter: &Parameter) -> Result<(), String> {
        self.limits.check_entry(parameter)?;
        match &self.on_set {
            Some(on_set) => on_set(parameter),
            None => Ok(()),
        }
    }
}

/// Builder for ServerConfig
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Size of the worker pool (at least one thread is always used)
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads.max(1);
        self
    }

    pub fn limits(mut self, limits: ParameterLimits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Install a validation callback run on every incoming parameter
    pub fn on_set<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Parameter) -> Result<(), String> + Send + Sync + 'static,
    {
        self.config.on_set = Some(Arc::new(callback));
        self
    }

    pub fn span(mut self, span: Span) -> Self {
        self.config.span = Some(span);
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

/// Configuration for a parameter client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout used by calls that do not specify one
    pub default_timeout: Duration,

    /// Span all client events are recorded under.  Defaults to a
    /// `parameter_client` span carrying the client id.
    pub span: Option<Span>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            span: None,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    pub fn span(mut self, span: Span) -> Self {
        self.config.span = Some(span);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
