//! Token acquisition for the cluster API.

use armada_perf_core::PerfConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

const TOKEN_ATTEMPTS: u32 = 5;
const TOKEN_RETRY_DELAY: Duration = Duration::from_secs(5);
const RESPONSE_TYPE: &str = "cloud_iam,uaa";
const APIKEY_GRANT: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Tokens attached to every API request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokens {
    pub iam_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// Where tokens come from.
#[derive(Debug, Clone)]
pub enum Authenticator {
    /// Two-step IAM exchange: API key for a refresh token, then the refresh
    /// token (scoped to the account) for an access token.
    Iam {
        token_url: String,
        api_key: String,
        account_id: String,
    },
    /// A static token read from disk.
    Dummy { token_file: PathBuf },
}

impl Authenticator {
    pub fn from_config(config: &PerfConfig) -> Self {
        if config.auth.dummy {
            Authenticator::Dummy {
                token_file: config.request.resolve(&config.auth.token_file),
            }
        } else {
            Authenticator::Iam {
                token_url: format!(
                    "{}/identity/token",
                    config.auth.iam_url.trim_end_matches('/')
                ),
                api_key: config.auth.api_key.clone(),
                account_id: config.auth.account_id.clone(),
            }
        }
    }

    pub async fn fetch(&self, client: &reqwest::Client) -> ClientResult<Tokens> {
        match self {
            Authenticator::Dummy { token_file } => {
                tracing::debug!(path = %token_file.display(), "Authenticating via dummy IAM token");
                let contents = tokio::fs::read_to_string(token_file).await.map_err(|e| {
                    ClientError::Auth(format!(
                        "unable to read token file {}: {}",
                        token_file.display(),
                        e
                    ))
                })?;
                Ok(Tokens {
                    iam_token: contents.trim().to_string(),
                    refresh_token: String::new(),
                })
            }
            Authenticator::Iam {
                token_url,
                api_key,
                account_id,
            } => {
                tracing::debug!("Authenticating via IAM api key");
                let first = exchange(
                    client,
                    token_url,
                    &[
                        ("apikey", api_key.as_str()),
                        ("grant_type", APIKEY_GRANT),
                        ("response_type", RESPONSE_TYPE),
                        ("uaa_client_id", "cf"),
                        ("uaa_client_secret", ""),
                    ],
                )
                .await?;
                let refresh = first
                    .refresh_token
                    .ok_or_else(|| ClientError::Auth("no refresh_token in IAM response".to_string()))?;

                let second = exchange(
                    client,
                    token_url,
                    &[
                        ("bss_account", account_id.as_str()),
                        ("grant_type", "refresh_token"),
                        ("ims_account", ""),
                        ("refresh_token", refresh.as_str()),
                        ("response_type", RESPONSE_TYPE),
                        ("uaa_client_id", "cf"),
                        ("uaa_client_secret", ""),
                    ],
                )
                .await?;

                let iam_token = second
                    .access_token
                    .ok_or_else(|| ClientError::Auth("no access_token in IAM response".to_string()))?;
                Ok(Tokens {
                    iam_token,
                    refresh_token: second.refresh_token.unwrap_or(refresh),
                })
            }
        }
    }
}

async fn exchange(
    client: &reqwest::Client,
    token_url: &str,
    form: &[(&str, &str)],
) -> ClientResult<TokenResponse> {
    let mut last_error = String::new();

    for attempt in 1..=TOKEN_ATTEMPTS {
        let result = client
            .post(token_url)
            .basic_auth("bx", Some("bx"))
            .header(reqwest::header::ACCEPT, "application/json;charset=utf-8")
            .form(form)
            .send()
            .await;

        match result {
            Ok(response) => match response.json::<TokenResponse>().await {
                Ok(body) => return Ok(body),
                Err(e) => last_error = format!("unreadable token response: {}", e),
            },
            Err(e) => last_error = format!("token request failed: {}", e),
        }

        tracing::warn!(
            attempt,
            max_attempts = TOKEN_ATTEMPTS,
            error = %last_error,
            "Failure while trying to get token"
        );
        if attempt < TOKEN_ATTEMPTS {
            tokio::time::sleep(TOKEN_RETRY_DELAY).await;
        }
    }

    Err(ClientError::Auth(last_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_dummy_token_is_trimmed_file_contents() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Bearer dummy-token").unwrap();

        let auth = Authenticator::Dummy {
            token_file: file.path().to_path_buf(),
        };
        let tokens = auth.fetch(&reqwest::Client::new()).await.unwrap();
        assert_eq!(tokens.iam_token, "Bearer dummy-token");
        assert!(tokens.refresh_token.is_empty());
    }

    #[tokio::test]
    async fn test_missing_dummy_token_file() {
        let auth = Authenticator::Dummy {
            token_file: PathBuf::from("/nonexistent/dummy_iam_token"),
        };
        assert!(matches!(
            auth.fetch(&reqwest::Client::new()).await,
            Err(ClientError::Auth(_))
        ));
    }

    #[test]
    fn test_from_config_resolves_token_file() {
        let mut config = PerfConfig::default();
        config.auth.dummy = true;
        match Authenticator::from_config(&config) {
            Authenticator::Dummy { token_file } => {
                assert_eq!(token_file, PathBuf::from("config/dummy_iam_token"))
            }
            other => panic!("unexpected authenticator {:?}", other),
        }
    }
}
