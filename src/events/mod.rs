//! Event vocabulary and dispatch.

mod message;
mod router;

pub use message::{ClientEvent, OutboundEvent, ServerEvent, TransientMessage};
pub use router::EventRouter;
