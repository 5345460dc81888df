use super::error::HostError;
use super::filter::CallerContext;
use crate::config::RootScope;

/// Resource-root boundary checks, applied independently of filtering.
pub struct AccessGuard;

impl AccessGuard {
    pub fn check_resource(uri: &str, caller: &CallerContext) -> Result<(), HostError> {
        if has_parent_segment(uri) {
            return Err(HostError::SecurityViolation {
                reason: format!("'{uri}' contains a parent-directory segment"),
            });
        }
        match &caller.roots {
            RootScope::Unrestricted => Ok(()),
            RootScope::Roots(roots) => {
                if roots.iter().any(|root| within_root(uri, root)) {
                    Ok(())
                } else {
                    Err(HostError::SecurityViolation {
                        reason: format!("'{uri}' is outside the granted resource roots"),
                    })
                }
            }
        }
    }
}

fn has_parent_segment(uri: &str) -> bool {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    path.split(['/', '\\'])
        .any(|segment| segment == ".." || segment.eq_ignore_ascii_case("%2e%2e"))
}

/// `uri` equals `root` or continues it at a `/` boundary.
fn within_root(uri: &str, root: &str) -> bool {
    let Some(rest) = uri.strip_prefix(root) else {
        return false;
    };
    rest.is_empty() || root.ends_with('/') || rest.starts_with('/')
}
