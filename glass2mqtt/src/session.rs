use std::time::Duration;

use log::{debug, info, warn};
use reqwest::{
    blocking::{Client, Response},
    StatusCode,
};
use serde_derive::{Deserialize, Serialize};

use crate::{error::VendorError, vendor_config::VendorConfig};

const AUTH_PATH: &str = "/api/v0-1/auth/";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    directory_id: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    valid: bool,
    #[serde(default)]
    token: Option<String>,
}

/// Authentication state against the Glass API.
///
/// The token lives in memory only. An empty token means "not logged in".
pub struct Session {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    directory_id: String,
    application_id: String,
    token: String,
}

impl Session {
    pub fn new(config: &VendorConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            directory_id: config.directory_id.clone(),
            application_id: config.application_id.clone(),
            token: String::new(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Asks the token introspection endpoint whether the held token is still
    /// accepted. An empty token is never valid and costs no request.
    pub fn is_valid(&self) -> bool {
        if self.token.is_empty() {
            return false;
        }
        let response = match self.get(AUTH_PATH) {
            Ok(response) => response,
            Err(e) => {
                debug!("token check failed: {e}");
                return false;
            }
        };
        if response.status() != StatusCode::OK {
            debug!("token check returned {}", response.status());
            return false;
        }
        response
            .json::<AuthResponse>()
            .map(|auth| auth.valid)
            .unwrap_or(false)
    }

    /// Exchanges the credentials for a fresh token. The stored token is not
    /// touched, see [`Session::refresh`].
    pub fn login(&self) -> Result<String, VendorError> {
        let body = LoginRequest {
            username: &self.username,
            password: &self.password,
            directory_id: &self.directory_id,
        };
        let response = self
            .client
            .post(self.url(AUTH_PATH))
            .header("Applicationid", &self.application_id)
            .header("Accept", "application/json, text/plain, */*")
            .json(&body)
            .send()?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!("Could not log in to glass: {status}");
            return Err(VendorError::Status(status));
        }

        let text = response.text()?;
        let auth: AuthResponse =
            serde_json::from_str(&text).map_err(|e| VendorError::Malformed(e.to_string()))?;
        match auth {
            AuthResponse { valid: false, .. } => {
                warn!("Login not accepted - please check credentials: {text}");
                Err(VendorError::Rejected(text))
            }
            AuthResponse {
                token: Some(token), ..
            } if !token.is_empty() => Ok(token),
            _ => Err(VendorError::Malformed("login accepted without a token".into())),
        }
    }

    /// Logs in again when the current token is no longer accepted.
    ///
    /// On failure the previous token is kept and the next cycle retries.
    /// Returns whether the session holds a token the vendor accepted.
    pub fn refresh(&mut self) -> bool {
        if self.is_valid() {
            return true;
        }
        info!("Token invalid - will try to get a new one");
        match self.login() {
            Ok(token) => {
                info!("logged in to glass");
                self.token = token;
                true
            }
            Err(e) => {
                warn!("login failed, keeping previous token: {e}");
                false
            }
        }
    }

    pub(crate) fn get(&self, path: &str) -> Result<Response, VendorError> {
        Ok(self
            .client
            .get(self.url(path))
            .header("Token", &self.token)
            .header("Applicationid", &self.application_id)
            .header("Content-Type", "application/json")
            .send()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    #[cfg(test)]
    pub(crate) fn with_token(mut self, token: &str) -> Self {
        self.token = token.to_string();
        self
    }
}
