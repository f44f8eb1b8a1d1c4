use super::{DownloadResponse, FilePart, HttpResponse, Transport};
use crate::{ClientConfig, Result, WeedError};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_ENCODING, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};

/// `Transport` over a pooled reqwest client.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::new(client))
    }

    async fn into_response(response: Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_form(&self, url: &str, form: Vec<(String, String)>) -> Result<HttpResponse> {
        let response = self.client.post(url).form(&form).send().await?;
        Self::into_response(response).await
    }

    async fn post_multipart(&self, url: &str, part: FilePart) -> Result<HttpResponse> {
        let FilePart {
            file_name,
            mime_type,
            gzipped,
            content,
        } = part;

        let length = content.len() as u64;
        let mut file = Part::stream_with_length(content, length).file_name(file_name);
        if let Some(mime_type) = mime_type.filter(|m| !m.is_empty()) {
            file = file.mime_str(&mime_type)?;
        }
        if gzipped {
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            file = file.headers(headers);
        }

        let form = Form::new().part("file", file);
        let response = self.client.post(url).multipart(form).send().await?;
        Self::into_response(response).await
    }

    async fn get(&self, url: &str) -> Result<DownloadResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(WeedError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(WeedError::from))
            .boxed();

        Ok(DownloadResponse {
            status: status.as_u16(),
            content_disposition,
            body,
        })
    }

    async fn delete(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.delete(url).send().await?;
        Self::into_response(response).await
    }
}
