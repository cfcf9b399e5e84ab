//! Live feed viewer session.
//!
//! Ties the annotation channel, the overlay renderer, and the capture
//! pipeline together behind one [`ViewerSession`]:
//!
//! - [`config`] — environment-driven session settings.
//! - [`session`] — task orchestration, the active-set query, and clip
//!   export.
//! - [`compositor`] — frame source adapter that bakes the overlay into
//!   captured frames.
//! - [`surface`] — headless playback-clock and frame-surface
//!   implementations for embedding and tests.

pub mod compositor;
pub mod config;
pub mod session;
pub mod surface;

pub use compositor::CompositingFrameSource;
pub use config::SessionConfig;
pub use session::{SessionError, ViewerSession};
pub use surface::{SharedClock, SharedSurface};
