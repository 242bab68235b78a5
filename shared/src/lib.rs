#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod capabilities;
pub mod classifier;
pub mod config;
pub mod event;
pub mod image_processing;
pub mod model;
pub mod nutrition;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use event::{Event, RequestToken};
pub use model::{Model, ScreenState, ViewModel};

use crate::capabilities::{GalleryError, PermissionStatus};
use crate::classifier::ClassifyError;
use crate::config::ConfigError;
use crate::image_processing::ImageProcessingError;

pub const SELECT_PROMPT: &str = "Select a photo of your plate to analyze.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotConfigured,
    Configuration,
    PermissionDenied,
    Gallery,
    ImageProcessing,
    Network,
    InvalidResponse,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotConfigured => "NOT_CONFIGURED",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Gallery => "GALLERY_ERROR",
            Self::ImageProcessing => "IMAGE_PROCESSING_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::InvalidResponse => "INVALID_RESPONSE",
        }
    }
}

/// The error shown to the user as an alert. `message` keeps the technical
/// detail for logs; `user_facing_message` is what the shell displays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub show_settings: bool,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            show_settings: false,
        }
    }

    #[must_use]
    pub fn not_configured() -> Self {
        Self::new(ErrorKind::NotConfigured, "classifier has not been configured")
    }

    #[must_use]
    pub fn permission_denied(status: PermissionStatus) -> Self {
        Self {
            show_settings: status.should_show_settings_prompt(),
            ..Self::new(
                ErrorKind::PermissionDenied,
                format!("photo library permission {status:?}"),
            )
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::NotConfigured | ErrorKind::Configuration => {
                "Food recognition is not set up. Please contact support.".into()
            }
            ErrorKind::PermissionDenied => {
                "Photo library access is required to analyze your plate.".into()
            }
            ErrorKind::Gallery => "Unable to open your photo library. Please try again.".into(),
            ErrorKind::ImageProcessing => {
                "Unable to process the image. Please try a different photo.".into()
            }
            ErrorKind::Network => {
                "Unable to reach the food recognition service. Please try again.".into()
            }
            ErrorKind::InvalidResponse => {
                "The food recognition service returned an unexpected answer.".into()
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)
    }
}

impl std::error::Error for AppError {}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::Configuration, e.to_string())
    }
}

impl From<GalleryError> for AppError {
    fn from(e: GalleryError) -> Self {
        if e.is_permission_error() {
            return AppError::permission_denied(PermissionStatus::Denied);
        }
        AppError::new(ErrorKind::Gallery, e.to_string())
    }
}

impl From<ImageProcessingError> for AppError {
    fn from(e: ImageProcessingError) -> Self {
        AppError::new(ErrorKind::ImageProcessing, e.to_string())
    }
}

impl From<ClassifyError> for AppError {
    fn from(e: ClassifyError) -> Self {
        let kind = match e {
            ClassifyError::Request { .. } | ClassifyError::Http { .. } => ErrorKind::Network,
            ClassifyError::HttpStatus { status } if status >= 500 => ErrorKind::Network,
            ClassifyError::HttpStatus { .. }
            | ClassifyError::ApiStatus { .. }
            | ClassifyError::InvalidResponse { .. } => ErrorKind::InvalidResponse,
        };
        AppError::new(kind, e.to_string())
    }
}

pub mod app {
    use tracing::{debug, error, info, warn};

    use super::*;
    use crate::capabilities::{GalleryOutput, GalleryResult};
    use crate::classifier::{ClassificationClient, ClassifyResponse};
    use crate::config::ClassifierConfig;
    use crate::image_processing::prepare;
    use crate::model::{AlertView, Analysis, ImageAsset, Transition};
    use crate::nutrition::tip_for;

    #[derive(Default)]
    pub struct App;

    impl App {
        fn abort(token: RequestToken, model: &mut Model) {
            if model.state.apply(Transition::Abort(token)) {
                debug!(%token, "selection ended without results");
            }
        }

        fn fail(token: RequestToken, error: AppError, model: &mut Model) {
            model.set_alert(error);
            Self::abort(token, model);
        }

        fn configure(client: Result<ClassificationClient, ConfigError>, model: &mut Model) {
            match client {
                Ok(client) => {
                    info!(endpoint = %client.endpoint(), "classifier configured");
                    model.client = Some(client);
                    if model.alert.as_ref().is_some_and(|a| {
                        matches!(a.kind, ErrorKind::NotConfigured | ErrorKind::Configuration)
                    }) {
                        model.alert = None;
                    }
                }
                Err(e) => {
                    error!(error = %e, "rejected classifier configuration");
                    model.client = None;
                    model.set_alert(e.into());
                }
            }
        }

        fn on_permission(
            token: RequestToken,
            result: GalleryResult,
            model: &mut Model,
            caps: &Capabilities,
        ) {
            match result {
                Ok(GalleryOutput::Permission(status)) if status.is_granted() => {
                    caps.gallery
                        .pick_image(model.pick_config.clone(), move |result| {
                            Event::ImagePicked {
                                token,
                                result: Box::new(result),
                            }
                        });
                }
                Ok(GalleryOutput::Permission(status)) => {
                    warn!(%token, ?status, "photo library permission not granted");
                    Self::fail(token, AppError::permission_denied(status), model);
                }
                Ok(other) => {
                    error!(%token, ?other, "unexpected gallery output for permission request");
                    Self::fail(
                        token,
                        AppError::new(ErrorKind::Gallery, "unexpected permission response"),
                        model,
                    );
                }
                Err(e) => {
                    warn!(%token, error = %e, "permission request failed");
                    Self::fail(token, e.into(), model);
                }
            }
        }

        fn on_picked(
            token: RequestToken,
            result: GalleryResult,
            model: &mut Model,
            caps: &Capabilities,
        ) {
            let image = match result {
                Ok(GalleryOutput::Picked(image)) => image,
                Ok(GalleryOutput::Cancelled) => {
                    debug!(%token, "picker cancelled");
                    Self::abort(token, model);
                    return;
                }
                Ok(GalleryOutput::Permission(_)) => {
                    error!(%token, "unexpected permission output for pick request");
                    Self::fail(
                        token,
                        AppError::new(ErrorKind::Gallery, "unexpected picker response"),
                        model,
                    );
                    return;
                }
                Err(e) => {
                    warn!(%token, error = %e, "image picker failed");
                    Self::fail(token, e.into(), model);
                    return;
                }
            };

            debug!(%token, format = ?image.format(), size = image.file_size(), "image picked");

            let prepared = match prepare(&model.prepare_config, image.data()) {
                Ok(prepared) => prepared,
                Err(e) => {
                    error!(%token, uri = image.uri(), error = %e, "image preparation failed");
                    Self::fail(token, e.into(), model);
                    return;
                }
            };

            let sent = match model.client.as_ref() {
                Some(client) => client
                    .classify(&caps.http, &prepared.base64, move |result| {
                        Event::Classified {
                            token,
                            result: Box::new(result),
                        }
                    })
                    .map_err(AppError::from),
                None => Err(AppError::not_configured()),
            };

            model.image = Some(ImageAsset::new(prepared.display_uri, Some(prepared.base64)));

            if let Err(e) = sent {
                error!(%token, error = %e, "classification request not sent");
                Self::fail(token, e, model);
            }
        }

        fn on_classified(token: RequestToken, result: ClassifyResponse, model: &mut Model) {
            match ClassificationClient::interpret(result) {
                Ok(items) => {
                    let tip = tip_for(&items).to_string();
                    info!(%token, concepts = items.len(), "classification complete");
                    model
                        .state
                        .apply(Transition::Complete(token, Analysis { items, tip }));
                }
                Err(e) => {
                    error!(%token, error = %e, "classification failed");
                    Self::fail(token, e.into(), model);
                }
            }
        }
    }

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            if let Some(token) = event.token() {
                if !model.is_current(token) {
                    debug!(%token, event = event.name(), "discarding superseded callback");
                    return;
                }
            }

            if event.is_user_initiated() {
                debug!(event = event.name(), "user action");
            }

            match event {
                Event::Configure(config) => {
                    Self::configure(ClassificationClient::new(*config), model);
                }

                Event::ConfigureFromValues(values) => {
                    let client = ClassifierConfig::from_lookup(|key| values.get(key).cloned())
                        .and_then(ClassificationClient::new);
                    Self::configure(client, model);
                }

                Event::SelectImage => {
                    if model.client.is_none() {
                        warn!("image selection before the classifier was configured");
                        model.set_alert(AppError::not_configured());
                    } else {
                        model.alert = None;
                        let token = model.issue_token();
                        model.state.apply(Transition::Begin(token));
                        caps.gallery.request_permission(move |result| {
                            Event::PermissionResolved {
                                token,
                                result: Box::new(result),
                            }
                        });
                    }
                }

                Event::DismissAlert => {
                    model.alert = None;
                }

                Event::PermissionResolved { token, result } => {
                    Self::on_permission(token, *result, model, caps);
                }

                Event::ImagePicked { token, result } => {
                    Self::on_picked(token, *result, model, caps);
                }

                Event::Classified { token, result } => {
                    Self::on_classified(token, *result, model);
                }
            }

            caps.render.render();
        }

        fn view(&self, model: &Model) -> ViewModel {
            let analysis = model.state.analysis();

            ViewModel {
                image_uri: model.image.as_ref().map(|image| image.uri.clone()),
                prompt: model.image.is_none().then(|| SELECT_PROMPT.to_string()),
                is_loading: model.is_loading(),
                tip: analysis.map(|a| a.tip.clone()),
                items: analysis.map(|a| a.items.clone()).unwrap_or_default(),
                alert: model.alert.as_ref().map(AlertView::from),
                is_configured: model.client.is_some(),
            }
        }
    }
}
