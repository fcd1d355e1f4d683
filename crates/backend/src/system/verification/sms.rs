use async_trait::async_trait;

/// Outbound SMS delivery
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, phone_number: &str, message: &str) -> anyhow::Result<()>;
}

/// Writes messages to the log instead of a carrier. Used until a provider is
/// configured.
#[derive(Debug, Default, Clone)]
pub struct LoggingSmsSender;

#[async_trait]
impl SmsSender for LoggingSmsSender {
    async fn send(&self, phone_number: &str, message: &str) -> anyhow::Result<()> {
        tracing::info!("SMS to {}: {}", mask_phone(phone_number), message);
        Ok(())
    }
}

/// Keep the country prefix and the last two digits
pub fn mask_phone(phone_number: &str) -> String {
    let chars: Vec<char> = phone_number.chars().collect();
    if chars.len() <= 5 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 5), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_middle_digits() {
        assert_eq!(mask_phone("+15551234567"), "+15*******67");
        assert_eq!(mask_phone("+123"), "****");
    }
}
