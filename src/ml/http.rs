use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

use crate::config::{GnnModelConfig, InputFormat};
use crate::error::{InferenceError, InferenceResult};
use crate::ml::predictor::{PredictRequest, PredictResponse, Predictor};

/// Header announcing the envelope format
pub const INPUT_FORMAT_HEADER: &str = "X-Input-Format";
/// Header carrying the graph content digest
pub const INPUT_DIGEST_HEADER: &str = "X-Input-Digest";

/// Response body of the predict endpoint
#[derive(Debug, Deserialize)]
struct PredictBody {
    /// Output name to hex-encoded bytes
    outputs: HashMap<String, String>,
    #[serde(default)]
    inference_time_ms: i64,
}

/// Remote model server reached over HTTP
pub struct HttpPredictor {
    client: Client,
    predict_url: String,
    model_url: String,
}

impl HttpPredictor {
    /// Create a predictor for `config.endpoint`, bounded by the inference timeout
    pub fn new(config: &GnnModelConfig) -> InferenceResult<Self> {
        let client = Client::builder()
            .timeout(config.inference_timeout())
            .build()
            .map_err(|e| InferenceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base = config.endpoint.trim_end_matches('/');
        let model_url = format!("{}/v1/models/{}", base, config.model_name);
        Ok(Self {
            client,
            predict_url: format!("{}:predict", model_url),
            model_url,
        })
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }

    pub fn model_url(&self) -> &str {
        &self.model_url
    }
}

fn content_type(format: InputFormat) -> &'static str {
    match format {
        InputFormat::Json => "application/json",
        InputFormat::PackedF32 => "application/octet-stream",
    }
}

/// Classify a transport failure
fn map_transport_error(e: reqwest::Error) -> InferenceError {
    if e.is_timeout() {
        InferenceError::InferenceTimeout(format!("model server timed out: {}", e))
    } else if e.is_connect() {
        InferenceError::ServingUnavailable(format!("cannot reach model server: {}", e))
    } else {
        InferenceError::Backend(format!("model server request failed: {}", e))
    }
}

/// Classify a non-success status
pub(crate) fn map_status(status: StatusCode, body: &str) -> InferenceError {
    let detail = format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>());
    match status {
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => InferenceError::ServingUnavailable(detail),
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => InferenceError::InferenceTimeout(detail),
        _ => InferenceError::Backend(detail),
    }
}

fn decode_body(body: &[u8]) -> InferenceResult<PredictResponse> {
    let parsed: PredictBody = serde_json::from_slice(body)
        .map_err(|e| InferenceError::InvalidOutput(format!("malformed predict response: {}", e)))?;

    let mut outputs = HashMap::with_capacity(parsed.outputs.len());
    for (name, encoded) in parsed.outputs {
        let bytes = hex::decode(&encoded)
            .map_err(|e| InferenceError::InvalidOutput(format!("output '{}' is not valid hex: {}", name, e)))?;
        outputs.insert(name, bytes);
    }
    Ok(PredictResponse {
        outputs,
        inference_time_ms: parsed.inference_time_ms,
    })
}

#[async_trait]
impl Predictor for HttpPredictor {
    #[instrument(skip(self, request), fields(model = %request.model_name, bytes = request.input.len()))]
    async fn predict(&self, request: &PredictRequest) -> InferenceResult<PredictResponse> {
        let response = self
            .client
            .post(&self.predict_url)
            .header(reqwest::header::CONTENT_TYPE, content_type(request.input_format))
            .header(INPUT_FORMAT_HEADER, request.input_format.as_str())
            .header(INPUT_DIGEST_HEADER, request.input_digest.as_str())
            .body(request.input.clone())
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            let error = map_status(status, &String::from_utf8_lossy(&body));
            warn!("Predict call failed: {}", error);
            return Err(error);
        }

        let decoded = decode_body(&body)?;
        debug!(
            outputs = decoded.outputs.len(),
            inference_time_ms = decoded.inference_time_ms,
            "Predict call succeeded"
        );
        Ok(decoded)
    }

    async fn health_check(&self) -> InferenceResult<()> {
        let response = self
            .client
            .get(&self.model_url)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, &body))
    }

    async fn close(&self) -> InferenceResult<()> {
        debug!("HTTP predictor closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_from_endpoint() {
        let config = GnnModelConfig {
            endpoint: "http://models.internal:8501/".to_string(),
            ..GnnModelConfig::default()
        };
        let predictor = HttpPredictor::new(&config).unwrap();
        assert_eq!(predictor.model_url(), "http://models.internal:8501/v1/models/molgraph-gnn");
        assert_eq!(
            predictor.predict_url(),
            "http://models.internal:8501/v1/models/molgraph-gnn:predict"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::SERVICE_UNAVAILABLE, "warming up"),
            InferenceError::ServingUnavailable(_)
        ));
        assert!(matches!(
            map_status(StatusCode::GATEWAY_TIMEOUT, ""),
            InferenceError::InferenceTimeout(_)
        ));
        let fatal = map_status(StatusCode::BAD_REQUEST, "bad tensor");
        assert!(matches!(fatal, InferenceError::Backend(_)));
        assert!(!fatal.is_transient());
    }

    #[test]
    fn test_decode_body_hex_outputs() {
        let body = br#"{"outputs":{"embedding":"0000803f"},"inference_time_ms":7}"#;
        let response = decode_body(body).unwrap();
        assert_eq!(response.outputs["embedding"], vec![0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(response.inference_time_ms, 7);
    }

    #[test]
    fn test_decode_body_rejects_bad_payloads() {
        assert!(matches!(decode_body(b"not json"), Err(InferenceError::InvalidOutput(_))));
        assert!(matches!(
            decode_body(br#"{"outputs":{"embedding":"zz"}}"#),
            Err(InferenceError::InvalidOutput(_))
        ));
    }
}
