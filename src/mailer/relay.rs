use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Delivery, MailTransport, Notice};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest<'a> {
    to: &'a str,
    subject: &'a str,
    message: &'a str,
    from_email: &'a str,
}

/// POST a `/send-email` body and turn whatever comes back into a
/// [`Delivery`].
pub(super) async fn post_send_email(http: &Client, url: &str, body: &impl Serialize) -> Delivery {
    let response = match http.post(url).json(body).send().await {
        Ok(r) => r,
        Err(e) => return Delivery::failed(e.to_string()),
    };
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    // The service answers `{success, error?}` on most paths, including failures.
    match serde_json::from_str::<Delivery>(&text) {
        Ok(delivery) if status.is_success() || !delivery.success => delivery,
        _ if status.is_success() => Delivery::sent(),
        _ if text.is_empty() => Delivery::failed(format!("mail service returned {status}")),
        _ => Delivery::failed(format!("mail service returned {status}: {text}")),
    }
}

/// The internal relay: unauthenticated submit naming the sender address.
#[derive(Clone, Debug)]
pub struct RelayTransport {
    http: Client,
    endpoint: String,
}

impl RelayTransport {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/send-email", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl MailTransport for RelayTransport {
    fn name(&self) -> &'static str {
        "relay"
    }

    async fn send(&self, notice: &Notice) -> Delivery {
        let body = RelayRequest {
            to: &notice.to,
            subject: &notice.subject,
            message: &notice.body,
            from_email: &notice.sender,
        };
        post_send_email(&self.http, &self.endpoint, &body).await
    }
}
