//! Client side of the cluster API: transport, authentication, request
//! templates, blocking polls and the worker pool that runs them.

pub mod auth;
pub mod error;
pub mod gateway;
pub mod mock;
pub mod monitor;
pub mod poll;
pub mod pool;
pub mod route;
pub mod status;
pub mod template;
pub mod transport;
pub mod version;

pub use auth::{Authenticator, Tokens};
pub use error::{ClientError, ClientResult};
pub use gateway::{
    CompletedResponse, FailureKind, Gateway, GatewaySettings, PendingRequest, ProvisionNotifier,
    RetryMode,
};
pub use mock::{MockReply, MockTransport};
pub use monitor::{monitor_line, MonitorEvent};
pub use poll::{poll_master, poll_workers, PollSettings};
pub use pool::{JobQueue, RequestExecutor, WorkerPool};
pub use route::ApiCall;
pub use status::{classify_master_status, MasterStatus};
pub use template::{RequestTemplates, TemplateParams, FREE_MACHINE_TYPE};
pub use transport::{HttpTransport, RawResponse, Transport};
pub use version::{trim_openshift, upgrade_step, KubeVersions};
