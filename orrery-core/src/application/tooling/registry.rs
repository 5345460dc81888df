use crate::domain::types::{CapabilityDescriptor, CapabilityKind};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-kind totals for one server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityCounts {
    pub tools: usize,
    pub prompts: usize,
    pub resources: usize,
}

/// Discovered capabilities keyed by owning server.
///
/// Each server's slice is swapped as a whole, so writers only hold the lock
/// for a map insert or remove.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    entries: RwLock<HashMap<String, Arc<[CapabilityDescriptor]>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_server(&self, server: &str, descriptors: Vec<CapabilityDescriptor>) {
        self.entries
            .write()
            .await
            .insert(server.to_string(), descriptors.into());
    }

    /// Drop every descriptor owned by `server`, handing back what was removed.
    pub async fn remove_server(&self, server: &str) -> Option<Arc<[CapabilityDescriptor]>> {
        self.entries.write().await.remove(server)
    }

    pub async fn descriptors(&self, server: &str) -> Option<Arc<[CapabilityDescriptor]>> {
        self.entries.read().await.get(server).cloned()
    }

    /// Swap in a fresh listing of one kind. Ignored when the server is gone.
    pub async fn replace_kind(
        &self,
        server: &str,
        kind: CapabilityKind,
        fresh: Vec<CapabilityDescriptor>,
    ) -> bool {
        let mut entries = self.entries.write().await;
        let Some(current) = entries.get(server) else {
            return false;
        };
        let merged: Vec<CapabilityDescriptor> = current
            .iter()
            .filter(|descriptor| descriptor.kind != kind)
            .cloned()
            .chain(fresh)
            .collect();
        entries.insert(server.to_string(), merged.into());
        true
    }

    /// Every descriptor of `kind` answering to `name`, across servers.
    pub async fn lookup(&self, kind: CapabilityKind, name: &str) -> Vec<CapabilityDescriptor> {
        let entries = self.entries.read().await;
        let mut found: Vec<CapabilityDescriptor> = entries
            .values()
            .flat_map(|descriptors| descriptors.iter())
            .filter(|descriptor| descriptor.answers_to(kind, name))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.server.cmp(&b.server));
        found
    }

    /// Snapshot of all servers' slices, ordered by server name.
    pub async fn all(&self) -> Vec<(String, Arc<[CapabilityDescriptor]>)> {
        let entries = self.entries.read().await;
        let mut snapshot: Vec<_> = entries
            .iter()
            .map(|(server, descriptors)| (server.clone(), Arc::clone(descriptors)))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    pub async fn counts(&self, server: &str) -> CapabilityCounts {
        let entries = self.entries.read().await;
        let mut counts = CapabilityCounts::default();
        for descriptor in entries.get(server).into_iter().flat_map(|d| d.iter()) {
            match descriptor.kind {
                CapabilityKind::Tool => counts.tools += 1,
                CapabilityKind::Prompt => counts.prompts += 1,
                CapabilityKind::Resource => counts.resources += 1,
            }
        }
        counts
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.values().map(|d| d.len()).sum()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
