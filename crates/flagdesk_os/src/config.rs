#![forbid(unsafe_code)]

use flagdesk_engines::pagination::PaginationConfig;
use flagdesk_engines::workflow::WorkflowConfig;

use crate::authz::RootIdentity;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsConfig {
    pub pagination: PaginationConfig,
    pub workflow: WorkflowConfig,
    pub retry: RetryPolicy,
    pub root: RootIdentity,
}

impl OsConfig {
    pub fn mvp_v1() -> Self {
        Self {
            pagination: PaginationConfig::mvp_v1(),
            workflow: WorkflowConfig::mvp_v1(),
            retry: RetryPolicy::mvp_v1(),
            root: RootIdentity::none(),
        }
    }

    pub fn with_root(mut self, root: RootIdentity) -> Self {
        self.root = root;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
