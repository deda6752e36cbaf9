//! Organisation sub-resources: the factory/line/team tree and department managers

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::TtlCache;
use crate::client::models::UserProfile;
use crate::client::{ApiRequest, Transport, decode};
use crate::error::Result;

const TREE_KEY: &str = "organization:tree";

/// Node of `GET /organization/tree`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgNode {
    pub id: String,
    pub code: String,
    pub name: String,

    /// `factory`, `department`, `line` or `team`
    #[serde(rename = "type")]
    pub node_type: String,

    #[serde(default)]
    pub children: Vec<OrgNode>,
}

impl OrgNode {
    /// Depth-first walk yielding `(depth, node)`
    pub fn walk(&self) -> Vec<(usize, &OrgNode)> {
        let mut out = Vec::new();
        let mut stack = vec![(0usize, self)];
        while let Some((depth, node)) = stack.pop() {
            out.push((depth, node));
            for child in node.children.iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }
}

/// Read-only organisation endpoints, cached like entity lists
#[derive(Clone)]
pub struct OrganizationService {
    transport: Arc<dyn Transport>,
    tree_cache: TtlCache<Vec<OrgNode>>,
    managers_cache: TtlCache<Vec<UserProfile>>,
    ttl: Duration,
}

impl OrganizationService {
    pub fn new(transport: Arc<dyn Transport>, ttl: Duration) -> Self {
        Self {
            transport,
            tree_cache: TtlCache::new("organization"),
            managers_cache: TtlCache::new("managers"),
            ttl,
        }
    }

    /// Factory → department/line → team hierarchy
    pub async fn tree(&self, refresh: bool) -> Result<Vec<OrgNode>> {
        if refresh {
            self.tree_cache.invalidate(TREE_KEY);
        }
        let transport = Arc::clone(&self.transport);
        self.tree_cache
            .fetch(
                TREE_KEY,
                move || async move {
                    let data = transport
                        .request(ApiRequest::get("/organization/tree"))
                        .await?;
                    decode(data)
                },
                self.ttl,
            )
            .await
    }

    /// Managers assigned to a department
    pub async fn department_managers(&self, department_id: &str) -> Result<Vec<UserProfile>> {
        let transport = Arc::clone(&self.transport);
        let path = format!("/departments/{}/managers", department_id);
        let key = path.clone();
        self.managers_cache
            .fetch(
                &key,
                move || async move {
                    let data = transport.request(ApiRequest::get(path)).await?;
                    decode(data)
                },
                self.ttl,
            )
            .await
    }

    /// Drop everything cached here
    pub fn invalidate_all(&self) {
        self.tree_cache.invalidate_all();
        self.managers_cache.invalidate_all();
    }
}
