// HTTP transport - One task per sub-request, replies go back to the connector's channel
use crate::application::importer::{FetchRequest, ReplyRecord, Transport, TransportReply};
use crate::infrastructure::xml_records::parse_records;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed reply document: {0}")]
    Document(#[from] quick_xml::Error),
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    replies: UnboundedSender<TransportReply>,
}

impl HttpTransport {
    pub fn new(replies: UnboundedSender<TransportReply>) -> Self {
        Self {
            client: reqwest::Client::new(),
            replies,
        }
    }
}

async fn download(
    client: &reqwest::Client,
    request: &FetchRequest,
) -> Result<Vec<ReplyRecord>, TransportError> {
    let mut builder = client.get(&request.url).header("Accept", "application/xml");
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder.send().await?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::Status { status, body });
    }

    let body = response.text().await?;
    Ok(parse_records(&body, request.format)?)
}

impl Transport for HttpTransport {
    /// A failed download is reported as an empty reply so the fetch it
    /// belongs to can still complete.
    fn issue_fetch(&self, request: FetchRequest) {
        let client = self.client.clone();
        let replies = self.replies.clone();

        tokio::spawn(async move {
            let records = match download(&client, &request).await {
                Ok(records) => {
                    tracing::debug!("Fetched {} records from {}", records.len(), request.url);
                    records
                }
                Err(e) => {
                    tracing::warn!("Fetching {} failed: {}", request.url, e);
                    Vec::new()
                }
            };

            let reply = TransportReply {
                importer_index: request.importer_index,
                url: request.url,
                records,
            };
            if replies.send(reply).is_err() {
                tracing::debug!("Connector stopped, dropping reply");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::importer::ReplyFormat;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;
    use tokio::sync::mpsc::unbounded_channel;

    const EVENTS: &str = "<events><event><value>1500</value>\
        <start_time>2021-01-01T00:00:00+0000</start_time></event></events>";

    async fn serve() -> String {
        let app = Router::new()
            .route(
                "/variable/181/events/xml",
                get(|headers: HeaderMap| async move {
                    match headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
                        Some("key") => (StatusCode::OK, EVENTS),
                        _ => (StatusCode::FORBIDDEN, "missing key"),
                    }
                }),
            )
            .route("/variable/188/events/xml", get(|| async { "<events><event>" }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn request(url: String, key: &str) -> FetchRequest {
        FetchRequest {
            importer_index: 1,
            url,
            headers: HashMap::from([("x-api-key".to_string(), key.to_string())]),
            format: ReplyFormat::Fingrid,
        }
    }

    #[tokio::test]
    async fn test_successful_download_carries_records() {
        let base = serve().await;
        let (tx, mut rx) = unbounded_channel();
        let transport = HttpTransport::new(tx);

        let url = format!("{}/variable/181/events/xml", base);
        transport.issue_fetch(request(url.clone(), "key"));

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.url, url);
        assert_eq!(reply.importer_index, 1);
        assert_eq!(reply.records.len(), 1);
        assert_eq!(reply.records[0].value, "1500");
    }

    #[tokio::test]
    async fn test_failures_become_empty_replies() {
        let base = serve().await;
        let (tx, mut rx) = unbounded_channel();
        let transport = HttpTransport::new(tx);

        transport.issue_fetch(request(format!("{}/variable/181/events/xml", base), "wrong"));
        let reply = rx.recv().await.unwrap();
        assert!(reply.records.is_empty());

        transport.issue_fetch(request(format!("{}/variable/188/events/xml", base), "key"));
        let reply = rx.recv().await.unwrap();
        assert!(reply.records.is_empty());
    }
}
