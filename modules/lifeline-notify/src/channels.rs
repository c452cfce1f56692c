//! External delivery channels. Every channel is best-effort: a failure is
//! returned to the dispatcher, which records it as report data.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use lifeline_common::Notification;

use crate::directory::ResponderContact;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Sms,
    Push,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Email => write!(f, "email"),
            ChannelKind::Sms => write!(f, "sms"),
            ChannelKind::Push => write!(f, "push"),
        }
    }
}

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Whether this target has the contact means this channel needs.
    fn configured_for(&self, contact: &ResponderContact) -> bool;

    async fn deliver(&self, contact: &ResponderContact, notification: &Notification) -> Result<()>;
}

/// SMS over a Twilio-compatible Messages API: basic auth + form body.
pub struct SmsChannel {
    http: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl SmsChannel {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
        }
    }
}

#[async_trait]
impl DeliveryChannel for SmsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    fn configured_for(&self, contact: &ResponderContact) -> bool {
        contact.phone.is_some()
    }

    async fn deliver(&self, contact: &ResponderContact, notification: &Notification) -> Result<()> {
        let to = contact
            .phone
            .as_deref()
            .ok_or_else(|| anyhow!("no phone number on contact"))?;

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );

        let body = format!("[{}] {}: {}", notification.priority, notification.title, notification.message);
        let mut form: HashMap<&str, &str> = HashMap::new();
        form.insert("To", to);
        form.insert("From", &self.from_number);
        form.insert("Body", &body);

        let response = self
            .http
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(anyhow!("SMS gateway error ({status}): {error_body}"));
        }
        Ok(())
    }
}

/// Email over an HTTP mail API (JSON body, bearer key).
pub struct EmailChannel {
    http: Client,
    api_url: String,
    api_key: String,
}

impl EmailChannel {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn configured_for(&self, contact: &ResponderContact) -> bool {
        contact.email.is_some()
    }

    async fn deliver(&self, contact: &ResponderContact, notification: &Notification) -> Result<()> {
        let to = contact
            .email
            .as_deref()
            .ok_or_else(|| anyhow!("no email address on contact"))?;

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "to": to,
                "subject": notification.title,
                "body": notification.message,
                "metadata": {
                    "sos_id": notification.sos_id,
                    "kind": notification.kind,
                    "priority": notification.priority,
                },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(anyhow!("email gateway error ({status}): {error_body}"));
        }
        Ok(())
    }
}

/// Push over an HTTP push gateway keyed by device token.
pub struct PushChannel {
    http: Client,
    api_url: String,
    api_key: String,
}

impl PushChannel {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl DeliveryChannel for PushChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Push
    }

    fn configured_for(&self, contact: &ResponderContact) -> bool {
        contact.push_token.is_some()
    }

    async fn deliver(&self, contact: &ResponderContact, notification: &Notification) -> Result<()> {
        let token = contact
            .push_token
            .as_deref()
            .ok_or_else(|| anyhow!("no push token on contact"))?;

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "token": token,
                "title": notification.title,
                "body": notification.message,
                "data": notification.payload,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(anyhow!("push gateway error ({status}): {error_body}"));
        }
        Ok(())
    }
}
