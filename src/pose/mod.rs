#[cfg(feature = "desktop")]
pub mod detector;
pub mod keypoint;
#[cfg(feature = "desktop")]
pub mod preprocess;
pub mod provider;
pub mod segmentation;

#[cfg(feature = "desktop")]
pub use detector::{MoveNetProvider, PoseDetector};
pub use keypoint::{Keypoint, KeypointIndex, Pose};
#[cfg(feature = "desktop")]
pub use preprocess::preprocess_for_movenet;
pub use provider::{estimate_in_place, PoseProvider, PoseSample};
pub use segmentation::SegmentationMask;
