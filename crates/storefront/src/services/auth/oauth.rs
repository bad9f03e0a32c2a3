//! OAuth 2.0 authorization-code sign-in for Google and GitHub.

use std::str::FromStr;

use secrecy::ExposeSecret;
use serde::Deserialize;

use vendora_core::Email;

use super::{AuthError, OAuthProfile};
use crate::config::{OAuthClientConfig, OAuthConfig};

const USER_AGENT: &str = concat!("vendora/", env!("CARGO_PKG_VERSION"));

/// Supported identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    GitHub,
}

impl OAuthProvider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
        }
    }

    const fn authorize_endpoint(self) -> &'static str {
        match self {
            Self::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            Self::GitHub => "https://github.com/login/oauth/authorize",
        }
    }

    const fn token_endpoint(self) -> &'static str {
        match self {
            Self::Google => "https://oauth2.googleapis.com/token",
            Self::GitHub => "https://github.com/login/oauth/access_token",
        }
    }

    const fn scope(self) -> &'static str {
        match self {
            Self::Google => "openid email profile",
            Self::GitHub => "read:user user:email",
        }
    }

    /// Client credentials for this provider, if configured.
    #[must_use]
    pub const fn client(self, config: &OAuthConfig) -> Option<&OAuthClientConfig> {
        match self {
            Self::Google => config.google.as_ref(),
            Self::GitHub => config.github.as_ref(),
        }
    }
}

impl FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::GitHub),
            other => Err(AuthError::OAuth(format!("unknown provider: {other}"))),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// Runs the provider side of the authorization-code flow.
pub struct OAuthClient<'a> {
    http: &'a reqwest::Client,
    provider: OAuthProvider,
    client: &'a OAuthClientConfig,
}

impl<'a> OAuthClient<'a> {
    #[must_use]
    pub const fn new(
        http: &'a reqwest::Client,
        provider: OAuthProvider,
        client: &'a OAuthClientConfig,
    ) -> Self {
        Self {
            http,
            provider,
            client,
        }
    }

    /// URL to send the browser to.
    #[must_use]
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.provider.authorize_endpoint(),
            urlencoding::encode(&self.client.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(self.provider.scope()),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code and fetch the signed-in identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::OAuth` if the provider rejects the code or does
    /// not report a verified email address.
    pub async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<OAuthProfile, AuthError> {
        let access_token = self.exchange_code(code, redirect_uri).await?;
        match self.provider {
            OAuthProvider::Google => self.google_profile(&access_token).await,
            OAuthProvider::GitHub => self.github_profile(&access_token).await,
        }
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client.client_id.as_str()),
            ("client_secret", self.client.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http
            .post(self.provider.token_endpoint())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(oauth_error)?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::OAuth(format!("token exchange failed: {text}")));
        }

        let token: TokenResponse = response.json().await.map_err(oauth_error)?;
        Ok(token.access_token)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, AuthError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(oauth_error)?;

        if !response.status().is_success() {
            return Err(AuthError::OAuth(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        response.json().await.map_err(oauth_error)
    }

    async fn google_profile(&self, access_token: &str) -> Result<OAuthProfile, AuthError> {
        let info: GoogleUserInfo = self
            .get_json("https://openidconnect.googleapis.com/v1/userinfo", access_token)
            .await?;

        let email = info
            .email
            .filter(|_| info.email_verified)
            .ok_or_else(|| AuthError::OAuth("google account has no verified email".to_owned()))?;

        Ok(OAuthProfile {
            provider: OAuthProvider::Google.as_str(),
            account_id: info.sub,
            email: Email::parse(&email)?,
            name: info.name,
            image: info.picture,
        })
    }

    async fn github_profile(&self, access_token: &str) -> Result<OAuthProfile, AuthError> {
        let user: GitHubUser = self
            .get_json("https://api.github.com/user", access_token)
            .await?;
        let emails: Vec<GitHubEmail> = self
            .get_json("https://api.github.com/user/emails", access_token)
            .await?;

        let email = pick_github_email(&emails)
            .ok_or_else(|| AuthError::OAuth("github account has no verified email".to_owned()))?;

        Ok(OAuthProfile {
            provider: OAuthProvider::GitHub.as_str(),
            account_id: user.id.to_string(),
            email: Email::parse(email)?,
            name: user.name.or(Some(user.login)),
            image: user.avatar_url,
        })
    }
}

/// The primary verified address, else any verified one.
fn pick_github_email(emails: &[GitHubEmail]) -> Option<&str> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .map(|e| e.email.as_str())
}

fn oauth_error(err: reqwest::Error) -> AuthError {
    AuthError::OAuth(err.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("google".parse::<OAuthProvider>().unwrap(), OAuthProvider::Google);
        assert_eq!("github".parse::<OAuthProvider>().unwrap(), OAuthProvider::GitHub);
        assert!("gitlab".parse::<OAuthProvider>().is_err());
    }

    #[test]
    fn test_authorization_url_encodes_params() {
        let http = reqwest::Client::new();
        let config = OAuthClientConfig {
            client_id: "abc 123".to_owned(),
            client_secret: SecretString::from("s3cr3t"),
        };
        let client = OAuthClient::new(&http, OAuthProvider::Google, &config);
        let url = client.authorization_url("https://shop.test/auth/oauth/google/callback", "xyz");

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=abc%20123"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fshop.test%2Fauth%2Foauth%2Fgoogle%2Fcallback"));
        assert!(url.contains("scope=openid%20email%20profile"));
        assert!(url.contains("state=xyz"));
    }

    #[test]
    fn test_pick_github_email() {
        let emails = vec![
            GitHubEmail {
                email: "old@example.com".to_owned(),
                primary: false,
                verified: true,
            },
            GitHubEmail {
                email: "main@example.com".to_owned(),
                primary: true,
                verified: true,
            },
        ];
        assert_eq!(pick_github_email(&emails), Some("main@example.com"));

        let unverified = vec![GitHubEmail {
            email: "x@example.com".to_owned(),
            primary: true,
            verified: false,
        }];
        assert_eq!(pick_github_email(&unverified), None);
    }
}
