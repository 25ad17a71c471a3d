pub mod compositor;
#[cfg(feature = "desktop")]
pub mod skeleton;
#[cfg(feature = "desktop")]
pub mod window;

pub use compositor::{Canvas, Compositor, PixelCanvas, RenderOutcome, STAND_BACK_HINT};
#[cfg(feature = "desktop")]
pub use minifb::Key;
#[cfg(feature = "desktop")]
pub use window::MinifbRenderer;
