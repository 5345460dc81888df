//! Tool-server connections and the host facade built on them.
//!
//! Transports speak JSON-RPC to one server each; [`ToolHost`] owns the
//! sessions, keeps the [`CapabilityRegistry`] in sync with them and routes
//! calls through filtering and the access guard.

mod error;
mod filter;
mod guard;
mod host;
mod http;
mod interface;
mod process;
mod registry;
mod router;
mod session;

pub use error::{HostError, ToolInvokeError};
pub use filter::{CallerContext, FilterPolicy};
pub use guard::AccessGuard;
pub use host::{HostOptions, HostStatus, ServerStatus, ToolHost};
pub use http::HttpStreamTransport;
pub use interface::{ClientResponder, ToolServerInterface, Transport, TransportEvent, TransportEvents};
pub use process::ProcessTransport;
pub use registry::{CapabilityCounts, CapabilityRegistry};
pub use router::MessageRouter;
pub use session::ServerSession;
