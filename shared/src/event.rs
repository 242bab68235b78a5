use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::capabilities::GalleryResult;
use crate::classifier::ClassifyResponse;
use crate::config::ClassifierConfig;

/// Identifies one selection chain (permission → pick → upload). A new
/// selection issues a new token; callbacks tagged with an older one are
/// stale.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestToken(pub u64);

impl RequestToken {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// --- Event enum: capability callbacks are never sent by the shell ---

#[derive(Serialize, Deserialize)]
pub enum Event {
    Configure(Box<ClassifierConfig>),
    /// Key/value settings bundled with the shell, read with the
    /// `MEALSCAN_API_*` keys.
    ConfigureFromValues(Box<HashMap<String, String>>),
    SelectImage,
    DismissAlert,

    #[serde(skip)]
    PermissionResolved {
        token: RequestToken,
        result: Box<GalleryResult>,
    },
    #[serde(skip)]
    ImagePicked {
        token: RequestToken,
        result: Box<GalleryResult>,
    },
    #[serde(skip)]
    Classified {
        token: RequestToken,
        result: Box<ClassifyResponse>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Configure(_) => "configure",
            Event::ConfigureFromValues(_) => "configure_from_values",
            Event::SelectImage => "select_image",
            Event::DismissAlert => "dismiss_alert",
            Event::PermissionResolved { .. } => "permission_resolved",
            Event::ImagePicked { .. } => "image_picked",
            Event::Classified { .. } => "classified",
        }
    }

    pub fn is_user_initiated(&self) -> bool {
        matches!(self, Event::SelectImage | Event::DismissAlert)
    }

    pub fn token(&self) -> Option<RequestToken> {
        match self {
            Event::PermissionResolved { token, .. }
            | Event::ImagePicked { token, .. }
            | Event::Classified { token, .. } => Some(*token),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_increase() {
        let first = RequestToken::default().next();
        assert_eq!(first, RequestToken(1));
        assert!(first.next() > first);
        assert_eq!(first.to_string(), "#1");
    }

    #[test]
    fn shell_events_deserialize() {
        let event: Event = serde_json::from_str("\"SelectImage\"").unwrap();
        assert!(event.is_user_initiated());
        assert_eq!(event.name(), "select_image");
        assert_eq!(event.token(), None);
    }

    #[test]
    fn callbacks_carry_their_token() {
        let event = Event::ImagePicked {
            token: RequestToken(7),
            result: Box::new(Ok(crate::capabilities::GalleryOutput::Cancelled)),
        };
        assert_eq!(event.token(), Some(RequestToken(7)));
        assert!(!event.is_user_initiated());
    }

    #[test]
    fn event_size_is_reasonable() {
        let size = std::mem::size_of::<Event>();
        assert!(
            size <= 32,
            "Event enum is {} bytes, box more variants",
            size
        );
    }
}
