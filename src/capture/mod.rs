pub mod consumer;
pub mod decoder;
pub mod driver;
pub mod frame;
pub mod mock;
pub mod session;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use consumer::{FrameConsumer, FrameTextures};
pub use driver::{CameraDriver, DriverFrame};
pub use frame::{CameraFormat, FrameSample, PixelFormat, TextureType, UniversalFrame};
pub use session::{CameraCaptureSession, ConsumerId, Delivery, FrameSink, SessionState};
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Driver;
