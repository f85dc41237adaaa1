// notifier/telegram.rs

use crate::config::TelegramConfig;
use crate::model::{Alert, NotifyError, Severity};
use reqwest::Client;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TelegramNotifier {
    bot_token: String,
    chat_id: i64,
    client: Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: i64) -> Self {
        Self {
            bot_token,
            chat_id,
            client: Client::new(),
        }
    }

    /// Builds a notifier from the optional config section.
    pub fn from_config(cfg: Option<&TelegramConfig>) -> Result<Self, NotifyError> {
        match cfg {
            Some(c) if !c.bot_token.is_empty() => Ok(Self::new(c.bot_token.clone(), c.chat_id)),
            _ => Err(NotifyError::NotConfigured),
        }
    }

    fn endpoint(&self) -> String {
        format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token)
    }

    /// Sends a plain text message.
    pub async fn notify_text(&self, text: &str) -> Result<(), NotifyError> {
        let params = [
            ("chat_id", self.chat_id.to_string()),
            ("text", text.to_string()),
        ];
        let response = match timeout(SEND_TIMEOUT, self.client.post(self.endpoint()).form(&params).send()).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                warn!("❌ Telegram send() failed: {:?}", e);
                return Err(NotifyError::ApiError(format!("Send failed: {}", e)));
            }
            Err(_) => {
                warn!("⏳ Telegram send() timed out");
                return Err(NotifyError::Unreachable);
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_else(|_| "unknown".into());
        if !status.is_success() {
            warn!("❌ Telegram API responded [{}]: {}", status, body);
            return Err(NotifyError::ApiError(format!("{}: {}", status, body)));
        }
        info!("✅ Telegram message sent [{}]", status);
        Ok(())
    }

    pub async fn notify_alert(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.notify_text(&format_alert(alert)).await
    }
}

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::High => "🔴",
        Severity::Medium => "🟠",
        Severity::Low => "🟢",
    }
}

/// Renders an alert as a chat message.
pub fn format_alert(alert: &Alert) -> String {
    let mut message = format!(
        "{} {} [{:?}]\n\n🃏 {}\n{}",
        severity_icon(alert.severity),
        alert.alert_type,
        alert.severity,
        alert.card_name,
        alert.message
    );
    if !alert.action_items.is_empty() {
        message.push('\n');
        for item in &alert.action_items {
            message.push_str(&format!("\n• {}", item));
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AlertType, CardKey};
    use chrono::Utc;

    #[test]
    fn missing_config_is_not_configured() {
        assert!(matches!(
            TelegramNotifier::from_config(None),
            Err(NotifyError::NotConfigured)
        ));
        let empty = TelegramConfig { bot_token: String::new(), chat_id: 1 };
        assert!(TelegramNotifier::from_config(Some(&empty)).is_err());
    }

    #[test]
    fn alert_message_lists_action_items() {
        let alert = Alert {
            alert_type: AlertType::PriceDrop,
            severity: Severity::High,
            card_key: CardKey::new("4", "Charizard"),
            card_name: "Charizard #4".into(),
            message: "Raw price dropped 35.0%".into(),
            details: Default::default(),
            timestamp: Utc::now(),
            action_items: vec!["Consider buying raw copies".into()],
        };
        let text = format_alert(&alert);
        assert!(text.starts_with("🔴 PRICE_DROP [High]"));
        assert!(text.contains("Charizard #4"));
        assert!(text.ends_with("• Consider buying raw copies"));
    }
}
