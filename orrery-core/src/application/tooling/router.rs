use super::error::HostError;
use super::filter::CallerContext;
use crate::domain::types::{CapabilityDescriptor, CapabilityKind};

/// Picks the one server that should serve a call among visible candidates.
///
/// Never falls back to registration order: several owners with nothing to
/// choose between them is an [`HostError::Ambiguous`] error.
pub struct MessageRouter;

impl MessageRouter {
    pub fn select(
        kind: CapabilityKind,
        name: &str,
        mut candidates: Vec<CapabilityDescriptor>,
        caller: &CallerContext,
    ) -> Result<CapabilityDescriptor, HostError> {
        if let Some(server) = caller.pinned_server(name) {
            return candidates
                .into_iter()
                .find(|candidate| candidate.server == server)
                .ok_or_else(|| HostError::NotFound {
                    kind,
                    name: name.to_string(),
                });
        }

        match candidates.len() {
            0 => Err(HostError::NotFound {
                kind,
                name: name.to_string(),
            }),
            1 => Ok(candidates.remove(0)),
            _ => {
                let mut servers: Vec<String> =
                    candidates.into_iter().map(|candidate| candidate.server).collect();
                servers.sort();
                servers.dedup();
                Err(HostError::Ambiguous {
                    kind,
                    name: name.to_string(),
                    servers,
                })
            }
        }
    }
}
