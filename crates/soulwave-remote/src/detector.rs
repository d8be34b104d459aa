use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use soulwave_types::{chat::EmotionLabel, vision::EncodedImage, Result};

use crate::{ensure_success, remote_error, DetectEmotionResponse, Detection, EmotionDetector};

const UPLOAD_FIELD: &str = "file";
const UPLOAD_FILENAME: &str = "screenshot.jpg";

/// Uploads grayscale stills to the detection service as multipart form data.
#[derive(Clone)]
pub struct HttpEmotionDetector {
    client: reqwest::Client,
    url: String,
}

impl HttpEmotionDetector {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl EmotionDetector for HttpEmotionDetector {
    async fn detect(&self, image: &EncodedImage) -> Result<Detection> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(UPLOAD_FILENAME)
            .mime_str(image.mime_type)
            .map_err(|e| remote_error(format!("invalid upload mime type: {e}")))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        tracing::debug!(
            url = %self.url,
            bytes = image.len(),
            width = image.width,
            height = image.height,
            "Uploading still for emotion detection"
        );

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| remote_error(format!("failed to reach emotion detector: {e}")))?;
        let response = ensure_success("emotion detector", response).await?;

        let parsed: DetectEmotionResponse = response
            .json()
            .await
            .map_err(|e| remote_error(format!("failed to parse detector response: {e}")))?;

        let label = parsed
            .detected_emotion
            .filter(|label| !label.trim().is_empty())
            .map(EmotionLabel::new);
        Ok(Detection {
            label,
            confidence: parsed.confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockito::{Matcher, Server};

    fn still() -> EncodedImage {
        EncodedImage::jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9], 2, 2, Utc::now())
    }

    #[tokio::test]
    async fn uploads_file_field_and_reads_label() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/detect_emotion/")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data; boundary=.*".into()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="file""#.into()),
                Matcher::Regex(r#"filename="screenshot.jpg""#.into()),
                Matcher::Regex("image/jpeg".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"detected_emotion":"happy","confidence":0.82}"#)
            .create_async()
            .await;

        let detector = HttpEmotionDetector::new(
            reqwest::Client::new(),
            format!("{}/detect_emotion/", server.url()),
        );
        let detection = detector.detect(&still()).await.expect("detect");

        mock.assert_async().await;
        assert_eq!(detection.label, Some(EmotionLabel::new("happy")));
        assert_eq!(detection.confidence, Some(0.82));
    }

    #[tokio::test]
    async fn missing_label_is_reported_as_none() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/detect_emotion/")
            .with_status(200)
            .with_body(r#"{"detected_emotion":""}"#)
            .create_async()
            .await;

        let detector = HttpEmotionDetector::new(
            reqwest::Client::new(),
            format!("{}/detect_emotion/", server.url()),
        );
        let detection = detector.detect(&still()).await.expect("detect");
        assert!(detection.label.is_none());
    }

    #[tokio::test]
    async fn error_status_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/detect_emotion/")
            .with_status(500)
            .with_body("model not loaded")
            .create_async()
            .await;

        let detector = HttpEmotionDetector::new(
            reqwest::Client::new(),
            format!("{}/detect_emotion/", server.url()),
        );
        let err = detector.detect(&still()).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
