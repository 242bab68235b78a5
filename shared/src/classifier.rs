use crux_http::{Error as HttpError, Http, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{ClassifierConfig, ConfigError};

/// Clarifai's status code for a fully successful call.
pub const API_STATUS_SUCCESS: u32 = 10_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("failed to build request: {reason}")]
    Request { reason: String },

    #[error("HTTP request failed: {message}")]
    Http { message: String },

    #[error("HTTP error {status}")]
    HttpStatus { status: u16 },

    #[error("API returned status {code}: {description}")]
    ApiStatus { code: u32, description: String },

    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },
}

// crux_http reports every non-2xx status as an error, so the status code
// has to be recovered here.
impl From<HttpError> for ClassifyError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Http(e) => ClassifyError::HttpStatus {
                status: e.code.into(),
            },
            other => ClassifyError::Http {
                message: other.to_string(),
            },
        }
    }
}

/// One row of the result list: a food label and its confidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationItem {
    pub name: String,
    pub percentage: String,
}

impl ClassificationItem {
    pub fn from_concept(concept: &Concept) -> Self {
        Self {
            name: concept.name.clone(),
            percentage: format_percentage(concept.value),
        }
    }
}

/// `round(score * 100)` followed by `%`. Scores outside `[0, 1]` are clamped.
pub fn format_percentage(score: f64) -> String {
    let score = if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    };
    format!("{}%", (score * 100.0).round() as u8)
}

#[derive(Debug, Serialize)]
pub struct OutputsRequest<'a> {
    pub user_app_id: UserAppId<'a>,
    pub inputs: Vec<Input<'a>>,
}

#[derive(Debug, Serialize)]
pub struct UserAppId<'a> {
    pub user_id: &'a str,
    pub app_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct Input<'a> {
    pub data: InputData<'a>,
}

#[derive(Debug, Serialize)]
pub struct InputData<'a> {
    pub image: InputImage<'a>,
}

#[derive(Debug, Serialize)]
pub struct InputImage<'a> {
    pub base64: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputsResponse {
    #[serde(default)]
    pub status: Option<ApiStatus>,
    #[serde(default)]
    pub outputs: Vec<Output>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiStatus {
    pub code: u32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    #[serde(default)]
    pub data: OutputData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputData {
    #[serde(default)]
    pub concepts: Vec<Concept>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub value: f64,
}

pub type ClassifyResponse = crux_http::Result<Response<OutputsResponse>>;

/// Client for the model `outputs` endpoint. Only constructible from a
/// validated [`ClassifierConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationClient {
    config: ClassifierConfig,
}

impl ClassificationClient {
    pub fn new(config: ClassifierConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/v2/models/{}/versions/{}/outputs",
            self.config.trimmed_base_url(),
            self.config.model_id,
            self.config.model_version_id
        )
    }

    pub fn request_body<'a>(&'a self, image_base64: &'a str) -> OutputsRequest<'a> {
        OutputsRequest {
            user_app_id: UserAppId {
                user_id: &self.config.user_id,
                app_id: &self.config.app_id,
            },
            inputs: vec![Input {
                data: InputData {
                    image: InputImage {
                        base64: image_base64,
                    },
                },
            }],
        }
    }

    /// Sends the single POST. The response arrives as the event built by
    /// `make_event`; nothing is retried.
    pub fn classify<Ev, F>(
        &self,
        http: &Http<Ev>,
        image_base64: &str,
        make_event: F,
    ) -> Result<(), ClassifyError>
    where
        Ev: 'static,
        F: FnOnce(ClassifyResponse) -> Ev + Send + 'static,
    {
        let endpoint = self.endpoint();
        debug!(%endpoint, payload_size = image_base64.len(), "sending classification request");

        let mut builder = http.post(&endpoint).header("Accept", "application/json");
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Key {key}"));
        }

        builder
            .body_json(&self.request_body(image_base64))
            .map_err(|e| ClassifyError::Request {
                reason: e.to_string(),
            })?
            .expect_json::<OutputsResponse>()
            .send(make_event);

        Ok(())
    }

    pub fn interpret(result: ClassifyResponse) -> Result<Vec<ClassificationItem>, ClassifyError> {
        let mut response = result.map_err(ClassifyError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifyError::HttpStatus {
                status: status as u16,
            });
        }

        let body = response
            .take_body()
            .ok_or_else(|| ClassifyError::InvalidResponse {
                reason: "response has no body".to_string(),
            })?;

        items_from_response(body)
    }
}

/// Maps `outputs[0].data.concepts` to display rows, keeping the API order.
pub fn items_from_response(
    response: OutputsResponse,
) -> Result<Vec<ClassificationItem>, ClassifyError> {
    if let Some(status) = &response.status {
        if status.code != API_STATUS_SUCCESS {
            return Err(ClassifyError::ApiStatus {
                code: status.code,
                description: status.description.clone(),
            });
        }
    }

    let output = response
        .outputs
        .into_iter()
        .next()
        .ok_or_else(|| ClassifyError::InvalidResponse {
            reason: "no outputs in response".to_string(),
        })?;

    Ok(output
        .data
        .concepts
        .iter()
        .map(ClassificationItem::from_concept)
        .collect())
}
