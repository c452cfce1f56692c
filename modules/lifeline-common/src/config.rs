use anyhow::Result;

/// Application configuration loaded from environment variables.
/// Contains only secrets and env-specific values; escalation thresholds,
/// cluster radius, and channel toggles live in the TOML FileConfig.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Server
    pub api_host: String,
    pub api_port: u16,

    // SMS gateway (Twilio-compatible)
    pub sms_account_sid: Option<String>,
    pub sms_auth_token: Option<String>,
    pub sms_from_number: Option<String>,

    // Email gateway (HTTP API)
    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,

    // Push gateway
    pub push_api_url: Option<String>,
    pub push_api_key: Option<String>,

    // Path to the TOML policy file; falls back to built-in defaults.
    pub triage_config_path: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            api_host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            sms_account_sid: std::env::var("SMS_ACCOUNT_SID").ok(),
            sms_auth_token: std::env::var("SMS_AUTH_TOKEN").ok(),
            sms_from_number: std::env::var("SMS_FROM_NUMBER").ok(),
            email_api_url: std::env::var("EMAIL_API_URL").ok(),
            email_api_key: std::env::var("EMAIL_API_KEY").ok(),
            push_api_url: std::env::var("PUSH_API_URL").ok(),
            push_api_key: std::env::var("PUSH_API_KEY").ok(),
            triage_config_path: std::env::var("TRIAGE_CONFIG_PATH").ok(),
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => {
                    let n = v.len().min(5);
                    format!("{}...({} chars)", &v[..n], v.len())
                }
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  SMS_ACCOUNT_SID: {}", preview_opt(&self.sms_account_sid));
        tracing::info!("  EMAIL_API_URL: {}", preview_opt(&self.email_api_url));
        tracing::info!("  PUSH_API_URL: {}", preview_opt(&self.push_api_url));
        tracing::info!(
            "  TRIAGE_CONFIG_PATH: {}",
            self.triage_config_path.as_deref().unwrap_or("<defaults>")
        );
    }
}
