mod gallery;

pub use self::gallery::{
    CropAspect, Gallery, GalleryError, GalleryOperation, GalleryOutput, GalleryPickConfig,
    GalleryResult, ImageFormat, PermissionStatus, PickedImage, MAX_PICKED_IMAGE_BYTES,
};

// Crux's built-in Render capability covers view updates; HTTP goes through
// crux_http. Only the gallery needs a capability of its own.
pub use crux_core::render::Render;
pub use crux_http::Http;

use crate::event::Event;
use crate::App;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub render: Render<Event>,
    pub gallery: Gallery<Event>,
}
