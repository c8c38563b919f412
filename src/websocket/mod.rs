//! WebSocket Real-Time Streaming
//!
//! Pushes strikes to subscribers as they are ingested.
//!
//! ## Architecture
//!
//! - **RelayHub**: Owns the strike history and all live subscribers
//! - **Handler**: Handles WebSocket upgrade and the per-connection writer
//! - **Messages**: Defines the outgoing message formats
//!
//! ## Usage
//!
//! Clients connect to `/` or `/ws` and start receiving immediately:
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:3001/');
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'initial') {
//!     msg.strikes.forEach(plot);
//!   } else {
//!     plot(msg);
//!   }
//! };
//! ```

mod handler;
mod hub;
mod messages;

pub(crate) use handler::upgrade;
pub use handler::websocket_handler;
pub use hub::{ConnectionId, HubConfig, HubError, RelayHub};
pub use messages::{Backlog, ServerMessage};
