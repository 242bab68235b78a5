use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_PICKED_IMAGE_BYTES: usize = 20 * 1024 * 1024;
pub const DEFAULT_PICK_QUALITY: u8 = 100;

/// Media-library access: the permission prompt and the image picker.
///
/// Both requests are resolved by the shell; the core never touches the
/// platform photo APIs directly.
#[derive(Capability)]
pub struct Gallery<Ev> {
    context: CapabilityContext<GalleryOperation, Ev>,
}

impl<Ev> Gallery<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<GalleryOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn request_permission<F>(&self, callback: F)
    where
        F: FnOnce(GalleryResult) -> Ev + Send + 'static,
    {
        self.request(GalleryOperation::RequestPermission, callback);
    }

    pub fn pick_image<F>(&self, config: GalleryPickConfig, callback: F)
    where
        F: FnOnce(GalleryResult) -> Ev + Send + 'static,
    {
        let config = config.validated();
        self.request(GalleryOperation::PickImage { config }, callback);
    }

    fn request<F>(&self, operation: GalleryOperation, callback: F)
    where
        F: FnOnce(GalleryResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context.request_from_shell(operation).await;
            context.update_app(callback(result));
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum GalleryOperation {
    RequestPermission,
    PickImage { config: GalleryPickConfig },
}

impl Operation for GalleryOperation {
    type Output = GalleryResult;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
    Heic,
    WebP,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Heic => "image/heic",
            ImageFormat::WebP => "image/webp",
        }
    }

    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageFormat::Jpeg);
        }

        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(ImageFormat::Png);
        }

        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(ImageFormat::WebP);
        }

        if &data[4..8] == b"ftyp" {
            let brand = &data[8..12];
            if brand == b"heic" || brand == b"heix" || brand == b"mif1" {
                return Some(ImageFormat::Heic);
            }
        }

        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CropAspect {
    Square,
    Free,
}

/// Picker options. The defaults match what the screen asks for: a single
/// image, cropped square by the user, at full quality.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GalleryPickConfig {
    pub allow_editing: bool,
    pub aspect: CropAspect,
    pub quality: u8,
    pub max_file_size: usize,
}

impl Default for GalleryPickConfig {
    fn default() -> Self {
        Self {
            allow_editing: true,
            aspect: CropAspect::Square,
            quality: DEFAULT_PICK_QUALITY,
            max_file_size: MAX_PICKED_IMAGE_BYTES,
        }
    }
}

impl GalleryPickConfig {
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.min(100);
        self
    }

    pub fn without_editing(mut self) -> Self {
        self.allow_editing = false;
        self.aspect = CropAspect::Free;
        self
    }

    pub fn validated(mut self) -> Self {
        self.quality = self.quality.min(100);
        self.max_file_size = self.max_file_size.min(MAX_PICKED_IMAGE_BYTES);
        if !self.allow_editing {
            self.aspect = CropAspect::Free;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
    DeniedPermanently,
    Restricted,
    NotDetermined,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }

    pub fn should_show_settings_prompt(&self) -> bool {
        matches!(
            self,
            PermissionStatus::DeniedPermanently | PermissionStatus::Restricted
        )
    }
}

/// An image returned by the picker, already validated against its declared
/// format and the size limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RawPickedImage")]
pub struct PickedImage {
    uri: String,
    #[serde(with = "serde_bytes")]
    data: Vec<u8>,
    format: ImageFormat,
}

// Wire form of `PickedImage`; deserialization goes through `PickedImage::new`.
#[derive(Deserialize)]
struct RawPickedImage {
    uri: String,
    #[serde(with = "serde_bytes")]
    data: Vec<u8>,
    format: ImageFormat,
}

impl TryFrom<RawPickedImage> for PickedImage {
    type Error = GalleryError;

    fn try_from(raw: RawPickedImage) -> Result<Self, Self::Error> {
        PickedImage::new(raw.uri, raw.data, raw.format)
    }
}

impl PickedImage {
    pub fn new(
        uri: impl Into<String>,
        data: Vec<u8>,
        format: ImageFormat,
    ) -> Result<Self, GalleryError> {
        if data.is_empty() {
            return Err(GalleryError::InvalidImage {
                reason: "image data is empty".to_string(),
            });
        }

        if data.len() > MAX_PICKED_IMAGE_BYTES {
            return Err(GalleryError::ImageTooLarge {
                size: data.len(),
                max: MAX_PICKED_IMAGE_BYTES,
            });
        }

        if let Some(detected) = ImageFormat::from_magic_bytes(&data) {
            if detected != format {
                return Err(GalleryError::InvalidImage {
                    reason: format!(
                        "format mismatch: declared {:?} but detected {:?}",
                        format, detected
                    ),
                });
            }
        }

        Ok(Self {
            uri: uri.into(),
            data,
            format,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn file_size(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum GalleryOutput {
    Permission(PermissionStatus),
    Picked(PickedImage),
    Cancelled,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum GalleryError {
    #[error("photo library permission denied")]
    PermissionDenied,

    #[error("photo library unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("image too large: {size} bytes exceeds maximum of {max} bytes")]
    ImageTooLarge { size: usize, max: usize },

    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl GalleryError {
    pub fn is_permission_error(&self) -> bool {
        matches!(self, GalleryError::PermissionDenied)
    }
}

pub type GalleryResult = Result<GalleryOutput, GalleryError>;

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_HEADER: [u8; 12] = [
        0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01,
    ];

    #[test]
    fn test_image_format_detection_jpeg() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&JPEG_HEADER),
            Some(ImageFormat::Jpeg)
        );
    }

    #[test]
    fn test_image_format_detection_png() {
        let png_header = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D];
        assert_eq!(
            ImageFormat::from_magic_bytes(&png_header),
            Some(ImageFormat::Png)
        );
    }

    #[test]
    fn test_image_format_detection_heic() {
        let heic_header = *b"\x00\x00\x00\x18ftypheic";
        assert_eq!(
            ImageFormat::from_magic_bytes(&heic_header),
            Some(ImageFormat::Heic)
        );
    }

    #[test]
    fn test_image_format_detection_too_short() {
        assert_eq!(ImageFormat::from_magic_bytes(&[0xFF, 0xD8]), None);
    }

    #[test]
    fn test_pick_config_defaults_match_screen() {
        let config = GalleryPickConfig::default();
        assert!(config.allow_editing);
        assert_eq!(config.aspect, CropAspect::Square);
        assert_eq!(config.quality, 100);
    }

    #[test]
    fn test_pick_config_validation() {
        let config = GalleryPickConfig {
            quality: 250,
            max_file_size: usize::MAX,
            allow_editing: false,
            aspect: CropAspect::Square,
        }
        .validated();

        assert_eq!(config.quality, 100);
        assert_eq!(config.max_file_size, MAX_PICKED_IMAGE_BYTES);
        assert_eq!(config.aspect, CropAspect::Free);
    }

    #[test]
    fn test_permission_status() {
        assert!(PermissionStatus::Granted.is_granted());
        assert!(!PermissionStatus::Denied.is_granted());
        assert!(!PermissionStatus::NotDetermined.is_granted());
        assert!(PermissionStatus::Restricted.should_show_settings_prompt());
        assert!(!PermissionStatus::Denied.should_show_settings_prompt());
    }

    #[test]
    fn test_picked_image_valid() {
        let image = PickedImage::new("file:///dcim/1.jpg", JPEG_HEADER.to_vec(), ImageFormat::Jpeg)
            .unwrap();
        assert_eq!(image.uri(), "file:///dcim/1.jpg");
        assert_eq!(image.file_size(), JPEG_HEADER.len());
        assert_eq!(image.format().mime_type(), "image/jpeg");
    }

    #[test]
    fn test_picked_image_empty_data() {
        let result = PickedImage::new("file:///x.jpg", vec![], ImageFormat::Jpeg);
        assert!(matches!(result, Err(GalleryError::InvalidImage { .. })));
    }

    #[test]
    fn test_picked_image_format_mismatch() {
        let result = PickedImage::new("file:///x.png", JPEG_HEADER.to_vec(), ImageFormat::Png);
        assert!(matches!(result, Err(GalleryError::InvalidImage { .. })));
    }

    #[test]
    fn test_picked_image_too_large() {
        let result = PickedImage::new(
            "file:///x.jpg",
            vec![0xFF; MAX_PICKED_IMAGE_BYTES + 1],
            ImageFormat::Jpeg,
        );
        assert!(matches!(result, Err(GalleryError::ImageTooLarge { .. })));
    }

    #[test]
    fn test_shell_output_with_empty_data_is_rejected() {
        let json = r#"{"Picked":{"uri":"x","data":[],"format":"Png"}}"#;
        assert!(serde_json::from_str::<GalleryOutput>(json).is_err());
    }

    #[test]
    fn test_shell_output_with_mismatched_format_is_rejected() {
        let json = serde_json::json!({
            "Picked": { "uri": "x", "data": JPEG_HEADER.to_vec(), "format": "Png" }
        });
        let err = serde_json::from_value::<GalleryOutput>(json).unwrap_err();
        assert!(err.to_string().contains("format mismatch"));
    }

    #[test]
    fn test_shell_output_within_limits_is_accepted() {
        let json = serde_json::json!({
            "Picked": { "uri": "x", "data": JPEG_HEADER.to_vec(), "format": "Jpeg" }
        });
        let output: GalleryOutput = serde_json::from_value(json).unwrap();
        assert_matches::assert_matches!(output, GalleryOutput::Picked(image) if image.file_size() == 12);
    }

    #[test]
    fn test_output_survives_shell_round_trip() {
        let image = PickedImage::new("content://media/7", JPEG_HEADER.to_vec(), ImageFormat::Jpeg)
            .unwrap();
        let json = serde_json::to_string(&GalleryOutput::Picked(image.clone())).unwrap();
        let back: GalleryOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, GalleryOutput::Picked(image));
    }
}
