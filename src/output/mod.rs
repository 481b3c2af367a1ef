//! Encode handoff: photo and video capture of composited frames.

pub mod behaviour;
pub mod encoder;
pub mod gallery;
pub mod photo;
pub mod y4m;

pub use behaviour::{CaptureBehaviour, CaptureTask, GalleryInsert, PhotoCallback};
pub use encoder::{AudioChannel, MediaGallery, PhotoEncoder, PhotoFormat, VideoEncoder};
pub use gallery::DirectoryGallery;
pub use photo::ImagePhotoEncoder;
pub use y4m::Y4mWriter;
