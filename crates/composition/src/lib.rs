//! Framecast Composition Model
//!
//! Defines the contracts between the export core and the animation it
//! records:
//! - **Timeline:** any composition that can be seeked to a progress fraction
//! - **Surface:** the render target whose pixels are captured, and the
//!   off-screen frame buffer they are copied into
//! - **Request:** immutable parameters of one export
//! - **Artifact:** the finished, encoded video
//!
//! Progress fractions are always in `[0.0, 1.0]` relative to the timeline's
//! total duration, so sampling is independent of how the composition keeps
//! time internally.

pub mod artifact;
pub mod request;
pub mod surface;
pub mod timeline;

pub use artifact::*;
pub use request::*;
pub use surface::*;
pub use timeline::*;
