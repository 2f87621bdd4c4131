use serde_derive::Deserialize;

pub const GLASS_HOST: &str = "api.vitalenergiglass.co.uk";
pub const DIRECTORY_ID: &str = "951cffa7-863f-4ae7-8f7e-ed682e690f91";
pub const APPLICATION_ID: &str = "3c85d8bb-5cc7-4f17-a68b-8c52a90a6634";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the Glass metering API.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    /// Scheme and host, e.g. `https://api.vitalenergiglass.co.uk`.
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub directory_id: String,
    pub application_id: String,
    /// Per request timeout in seconds.
    pub timeout: u64,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            base_url: format!("https://{GLASS_HOST}"),
            username: String::new(),
            password: String::new(),
            directory_id: DIRECTORY_ID.to_string(),
            application_id: APPLICATION_ID.to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl VendorConfig {
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}
