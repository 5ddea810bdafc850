//! Core Components
//!
//! Transport, proxy resolution, request execution and exchange guards.

pub mod executor;
pub mod guard;
pub mod proxy;
pub mod state;
pub mod transport;

pub use executor::*;
pub use guard::*;
pub use proxy::*;
pub use state::*;
pub use transport::*;
