use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{AnalysisInput, AnalysisModel, AnalysisOutput, InferenceError, NamedFile};

const API_NAME: &str = "predict";
const GENERIC_REMOTE_ERROR: &str = "The analysis model reported an error";

#[derive(Debug, Serialize)]
struct CallRequest {
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CallResponse {
    event_id: String,
}

#[derive(Debug, Deserialize)]
struct GradioErrorBody {
    #[serde(alias = "error")]
    detail: String,
}

/// Client for a Gradio Space exposing a `/predict` endpoint with inputs
/// `(file_input, zip_file, target_tier)` and outputs `(text, report file)`.
#[derive(Clone)]
pub struct GradioClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    max_report_bytes: usize,
}

impl GradioClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
        max_report_bytes: usize,
    ) -> Result<Self, InferenceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            max_report_bytes,
        })
    }

    /// The token only goes to the Space itself, never to a URL the model named
    /// somewhere else.
    fn is_own_url(&self, url: &str) -> bool {
        url.strip_prefix(&self.base_url)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Uploads one file to the Space and returns the server-side path.
    async fn upload(&self, file: &NamedFile, mime: &str) -> Result<String, InferenceError> {
        let part = Part::bytes(file.data.to_vec())
            .file_name(file.name.clone())
            .mime_str(mime)?;
        let form = Form::new().part("files", part);

        let response = self
            .authorized(
                self.client
                    .post(format!("{}/gradio_api/upload", self.base_url)),
            )
            .multipart(form)
            .send()
            .await?;

        let paths: Vec<String> = checked(response).await?.json().await?;
        paths
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::Malformed("upload returned no paths".to_string()))
    }
}

/// Turns a non-2xx response into `InferenceError::Api`, preferring Gradio's error detail.
async fn checked(response: Response) -> Result<Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<GradioErrorBody>(&body)
        .map(|e| e.detail)
        .unwrap_or(body);
    Err(InferenceError::Api {
        status: status.as_u16(),
        message,
    })
}

fn file_data(path: String, orig_name: &str) -> Value {
    json!({
        "path": path,
        "orig_name": orig_name,
        "meta": { "_type": "gradio.FileData" }
    })
}

/// Extracts the payload of the `complete` event from a Gradio SSE stream.
///
/// An `error` event becomes `InferenceError::Remote` with the remote message.
pub(crate) fn parse_event_stream(body: &str) -> Result<Vec<Value>, InferenceError> {
    let mut event = "";
    for line in body.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim();
            continue;
        }
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        match event {
            "complete" => {
                let value: Value = serde_json::from_str(data)?;
                return match value {
                    Value::Array(items) => Ok(items),
                    other => Err(InferenceError::Malformed(format!(
                        "expected an array of outputs, got {other}"
                    ))),
                };
            }
            "error" => {
                let message = match serde_json::from_str::<Value>(data) {
                    Ok(Value::String(s)) => s,
                    Ok(Value::Null) => GENERIC_REMOTE_ERROR.to_string(),
                    _ if data.is_empty() => GENERIC_REMOTE_ERROR.to_string(),
                    _ => data.to_string(),
                };
                return Err(InferenceError::Remote(message));
            }
            _ => {}
        }
    }
    Err(InferenceError::Malformed(
        "stream ended without a result".to_string(),
    ))
}

/// Maps the `(text, report)` output pair onto `AnalysisOutput`.
pub(crate) fn parse_outputs(outputs: Vec<Value>) -> Result<AnalysisOutput, InferenceError> {
    let mut outputs = outputs.into_iter();
    let analysis_text = match outputs.next() {
        Some(Value::String(text)) => text,
        other => {
            return Err(InferenceError::Malformed(format!(
                "expected analysis text, got {other:?}"
            )))
        }
    };

    let report_url = match outputs.next() {
        Some(Value::String(url)) if !url.is_empty() => Some(url),
        Some(Value::Object(file)) => file
            .get("url")
            .and_then(Value::as_str)
            .map(String::from),
        _ => None,
    };

    Ok(AnalysisOutput {
        analysis_text,
        report_url,
    })
}

#[async_trait]
impl AnalysisModel for GradioClient {
    async fn analyze(&self, input: AnalysisInput) -> Result<AnalysisOutput, InferenceError> {
        info!(
            "Sending files to model for analysis: pdf={} ({} bytes), zip={}, tier={}",
            input.pdf.name,
            input.pdf.data.len(),
            input
                .zip
                .as_ref()
                .map(|z| format!("{} ({} bytes)", z.name, z.data.len()))
                .unwrap_or_else(|| "none".to_string()),
            input.tier
        );

        let pdf_path = self.upload(&input.pdf, "application/pdf").await?;
        let zip_value = match &input.zip {
            Some(zip) => file_data(self.upload(zip, "application/zip").await?, &zip.name),
            None => Value::Null,
        };

        let request = CallRequest {
            data: vec![
                file_data(pdf_path, &input.pdf.name),
                zip_value,
                Value::String(input.tier.as_str().to_string()),
            ],
        };
        let call_url = format!("{}/gradio_api/call/{API_NAME}", self.base_url);
        let response = self
            .authorized(self.client.post(&call_url))
            .json(&request)
            .send()
            .await?;
        let CallResponse { event_id } = checked(response).await?.json().await?;
        debug!("Model job queued: event_id={event_id}");

        let response = self
            .authorized(self.client.get(format!("{call_url}/{event_id}")))
            .send()
            .await?;
        let body = checked(response).await?.text().await?;

        let output = parse_outputs(parse_event_stream(&body)?)?;
        info!(
            "Analysis completed: {} chars, report={}",
            output.analysis_text.len(),
            output.report_url.is_some()
        );
        Ok(output)
    }

    async fn fetch_report(&self, url: &str) -> Result<Bytes, InferenceError> {
        let request = self.client.get(url);
        let request = if self.is_own_url(url) {
            self.authorized(request)
        } else {
            request
        };
        let mut response = checked(request.send().await?).await?;

        let limit = self.max_report_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(InferenceError::ReportTooLarge { limit });
        }
        let mut buffer = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if buffer.len() + chunk.len() > limit {
                return Err(InferenceError::ReportTooLarge { limit });
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_complete_event() {
        let body = "event: generating\ndata: null\n\n\
                    event: complete\ndata: [\"Looks good\", {\"path\": \"/tmp/r.pdf\", \"url\": \"https://space/file=r.pdf\"}]\n\n";
        let outputs = parse_event_stream(body).unwrap();
        let output = parse_outputs(outputs).unwrap();
        assert_eq!(output.analysis_text, "Looks good");
        assert_eq!(output.report_url.as_deref(), Some("https://space/file=r.pdf"));
    }

    #[test]
    fn test_parse_error_event_carries_message() {
        let body = "event: error\ndata: \"GPU quota exceeded\"\n\n";
        let err = parse_event_stream(body).unwrap_err();
        assert_eq!(err.to_string(), "GPU quota exceeded");
    }

    #[test]
    fn test_parse_null_error_event() {
        let body = "event: error\ndata: null\n\n";
        let err = parse_event_stream(body).unwrap_err();
        assert!(matches!(err, InferenceError::Remote(_)));
    }

    #[test]
    fn test_stream_without_result_is_malformed() {
        let body = "event: heartbeat\ndata: null\n\n";
        assert!(matches!(
            parse_event_stream(body),
            Err(InferenceError::Malformed(_))
        ));
    }

    #[test]
    fn test_outputs_without_report() {
        let output = parse_outputs(vec![json!("text only"), Value::Null]).unwrap();
        assert_eq!(output.analysis_text, "text only");
        assert!(output.report_url.is_none());
    }

    #[test]
    fn test_outputs_require_text() {
        assert!(parse_outputs(vec![json!(42)]).is_err());
        assert!(parse_outputs(vec![]).is_err());
    }

    fn client() -> GradioClient {
        GradioClient::new(
            "https://space.hf.space/",
            Some("hf_token".into()),
            Duration::from_secs(5),
            1024,
        )
        .unwrap()
    }

    #[test]
    fn test_token_only_sent_to_own_space() {
        let client = client();
        assert!(client.is_own_url("https://space.hf.space/gradio_api/file=/tmp/r.pdf"));
        assert!(!client.is_own_url("https://space.hf.space.evil.net/r.pdf"));
        assert!(!client.is_own_url("https://elsewhere.example/r.pdf"));
    }
}
