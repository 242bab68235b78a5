use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capabilities::GalleryPickConfig;
use crate::classifier::{ClassificationClient, ClassificationItem};
use crate::event::RequestToken;
use crate::image_processing::PrepareConfig;
use crate::AppError;

/// The photo currently on screen.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub uri: String,
    pub base64: Option<String>,
}

impl ImageAsset {
    pub fn new(uri: impl Into<String>, base64: Option<String>) -> Self {
        Self {
            uri: uri.into(),
            base64,
        }
    }
}

// The payload is large; keep it out of debug output.
impl fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAsset")
            .field("uri_len", &self.uri.len())
            .field("base64_len", &self.base64.as_ref().map(String::len))
            .finish()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Analysis {
    pub items: Vec<ClassificationItem>,
    pub tip: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub enum ScreenState {
    #[default]
    Idle,
    Loading {
        token: RequestToken,
        /// Results that were on screen when loading began.
        previous: Option<Analysis>,
    },
    Results(Analysis),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Begin(RequestToken),
    Complete(RequestToken, Analysis),
    /// Cancellation, permission denial or failure.
    Abort(RequestToken),
}

impl ScreenState {
    pub fn is_loading(&self) -> bool {
        matches!(self, ScreenState::Loading { .. })
    }

    pub fn loading_token(&self) -> Option<RequestToken> {
        match self {
            ScreenState::Loading { token, .. } => Some(*token),
            _ => None,
        }
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        match self {
            ScreenState::Results(analysis) => Some(analysis),
            _ => None,
        }
    }

    /// The only way the screen state changes. Returns `false` when the
    /// transition does not apply (a stale token), leaving the state as is.
    pub fn apply(&mut self, transition: Transition) -> bool {
        let current = std::mem::take(self);

        let (next, applied) = match (current, transition) {
            (ScreenState::Idle, Transition::Begin(token)) => (
                ScreenState::Loading {
                    token,
                    previous: None,
                },
                true,
            ),
            (ScreenState::Results(analysis), Transition::Begin(token)) => (
                ScreenState::Loading {
                    token,
                    previous: Some(analysis),
                },
                true,
            ),
            (ScreenState::Loading { previous, .. }, Transition::Begin(token)) => {
                (ScreenState::Loading { token, previous }, true)
            }
            (ScreenState::Loading { token, .. }, Transition::Complete(expected, analysis))
                if token == expected =>
            {
                (ScreenState::Results(analysis), true)
            }
            (ScreenState::Loading { token, previous }, Transition::Abort(expected))
                if token == expected =>
            {
                (previous.map_or(ScreenState::Idle, ScreenState::Results), true)
            }
            (state, _) => (state, false),
        };

        *self = next;
        applied
    }
}

#[derive(Debug, Default)]
pub struct Model {
    pub image: Option<ImageAsset>,
    pub state: ScreenState,
    pub client: Option<ClassificationClient>,
    pub alert: Option<AppError>,
    pub latest_token: RequestToken,
    pub prepare_config: PrepareConfig,
    pub pick_config: GalleryPickConfig,
}

impl Model {
    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    /// Issues the token for a new selection, superseding any chain in flight.
    pub fn issue_token(&mut self) -> RequestToken {
        self.latest_token = self.latest_token.next();
        self.latest_token
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.state.loading_token() == Some(token)
    }

    pub fn set_alert(&mut self, error: AppError) {
        self.alert = Some(error);
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AlertView {
    pub code: String,
    pub message: String,
    pub show_settings: bool,
}

impl From<&AppError> for AlertView {
    fn from(error: &AppError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.user_facing_message(),
            show_settings: error.show_settings,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewModel {
    pub image_uri: Option<String>,
    /// Shown in place of the image until one is selected.
    pub prompt: Option<String>,
    pub is_loading: bool,
    pub tip: Option<String>,
    pub items: Vec<ClassificationItem>,
    pub alert: Option<AlertView>,
    pub is_configured: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(names: &[&str]) -> Analysis {
        Analysis {
            items: names
                .iter()
                .map(|name| ClassificationItem {
                    name: (*name).to_string(),
                    percentage: "90%".to_string(),
                })
                .collect(),
            tip: "tip".to_string(),
        }
    }

    #[test]
    fn begin_from_idle_loads_without_previous() {
        let mut state = ScreenState::Idle;
        assert!(state.apply(Transition::Begin(RequestToken(1))));
        assert_eq!(
            state,
            ScreenState::Loading {
                token: RequestToken(1),
                previous: None
            }
        );
        assert!(state.is_loading());
    }

    #[test]
    fn abort_restores_previous_results() {
        let mut state = ScreenState::Results(analysis(&["rice"]));
        state.apply(Transition::Begin(RequestToken(2)));
        assert!(state.apply(Transition::Abort(RequestToken(2))));
        assert_eq!(state, ScreenState::Results(analysis(&["rice"])));
    }

    #[test]
    fn abort_without_previous_returns_to_idle() {
        let mut state = ScreenState::Idle;
        state.apply(Transition::Begin(RequestToken(1)));
        state.apply(Transition::Abort(RequestToken(1)));
        assert_eq!(state, ScreenState::Idle);
    }

    #[test]
    fn complete_replaces_results() {
        let mut state = ScreenState::Results(analysis(&["rice"]));
        state.apply(Transition::Begin(RequestToken(3)));
        assert!(state.apply(Transition::Complete(RequestToken(3), analysis(&["beans"]))));
        assert_eq!(state.analysis(), Some(&analysis(&["beans"])));
        assert!(!state.is_loading());
    }

    #[test]
    fn stale_tokens_are_ignored() {
        let mut state = ScreenState::Idle;
        state.apply(Transition::Begin(RequestToken(1)));
        state.apply(Transition::Begin(RequestToken(2)));

        assert!(!state.apply(Transition::Complete(RequestToken(1), analysis(&["late"]))));
        assert!(!state.apply(Transition::Abort(RequestToken(1))));
        assert_eq!(state.loading_token(), Some(RequestToken(2)));
    }

    #[test]
    fn superseding_keeps_the_first_previous_results() {
        let mut state = ScreenState::Results(analysis(&["rice"]));
        state.apply(Transition::Begin(RequestToken(1)));
        state.apply(Transition::Begin(RequestToken(2)));
        state.apply(Transition::Abort(RequestToken(2)));
        assert_eq!(state, ScreenState::Results(analysis(&["rice"])));
    }

    #[test]
    fn completion_outside_loading_is_rejected() {
        let mut state = ScreenState::Results(analysis(&["rice"]));
        assert!(!state.apply(Transition::Complete(RequestToken(9), analysis(&["x"]))));
        assert_eq!(state, ScreenState::Results(analysis(&["rice"])));
    }

    #[test]
    fn model_issues_increasing_tokens() {
        let mut model = Model::default();
        let first = model.issue_token();
        let second = model.issue_token();
        assert!(second > first);
        assert_eq!(model.latest_token, second);
        assert!(!model.is_current(second));

        model.state.apply(Transition::Begin(second));
        assert!(model.is_current(second));
        assert!(!model.is_current(first));
    }

    #[test]
    fn image_asset_debug_hides_payload() {
        let asset = ImageAsset::new("data:image/jpeg;base64,AAAA", Some("AAAA".into()));
        let rendered = format!("{asset:?}");
        assert!(!rendered.contains("AAAA"));
    }
}
