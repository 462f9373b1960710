//! Request/response correlation across the page/extension realm boundary.

pub mod bus;
pub mod endpoint;
pub mod message;
pub mod pending;

pub use bus::{MessageBus, PostedMessage, WindowId};
pub use endpoint::BridgeEndpoint;
pub use message::{create_request_id, Direction, Envelope, BRIDGE_SOURCE};
pub use pending::{PendingReceiver, PendingRequests, ProgressCallback};
