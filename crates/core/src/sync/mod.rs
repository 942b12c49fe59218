//! Client-side sync domain: state container, pending queue, session and the
//! shared blob naming contract.

mod engine;
mod log_blob;
mod pending_queue;
mod scheduler;
mod session;
mod state;

pub use engine::*;
pub use log_blob::*;
pub use pending_queue::*;
pub use scheduler::*;
pub use session::*;
pub use state::*;
