//! Common types for the secret injector: constants, configuration, errors and logging

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::InjectorConfig;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default port for the webhook HTTPS server
pub const DEFAULT_WEBHOOK_PORT: u16 = 8443;

/// Annotation recording whether the injector already mutated a pod
pub const STATUS_ANNOTATION: &str = "operator.1password.io/status";

/// Annotation listing (comma-separated) the containers to wrap with the op CLI
pub const INJECT_ANNOTATION: &str = "operator.1password.io/inject";

/// Annotation selecting the op CLI image tag for the bootstrap init container
pub const VERSION_ANNOTATION: &str = "operator.1password.io/version";

/// Status annotation value written once a pod has been mutated
pub const STATUS_INJECTED: &str = "injected";

/// Image tag used when the version annotation is absent
pub const DEFAULT_VERSION: &str = "latest";

/// Environment variable carrying the Connect server address
pub const CONNECT_HOST_ENV: &str = "OP_CONNECT_HOST";

/// Environment variable carrying the Connect access token
pub const CONNECT_TOKEN_ENV: &str = "OP_CONNECT_TOKEN";

/// Namespaces the injector never mutates
pub const DEFAULT_IGNORED_NAMESPACES: [&str; 2] = ["kube-system", "kube-public"];
