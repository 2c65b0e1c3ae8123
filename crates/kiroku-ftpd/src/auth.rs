//! Single-user authentication for the FTP front.

use async_trait::async_trait;
use libunftp::auth::{AuthenticationError, Authenticator, Credentials, DefaultUser};
use tracing::info;

/// Accepts exactly one username/password pair.
///
/// Blank passwords never authenticate, even if the configured password is
/// blank. Authorization beyond the login is out of scope: once in, a client
/// can do anything the driver can.
#[derive(Debug)]
pub struct SingleUserAuth {
    username: String,
    password: String,
}

impl SingleUserAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl Authenticator<DefaultUser> for SingleUserAuth {
    async fn authenticate(
        &self,
        username: &str,
        creds: &Credentials,
    ) -> Result<DefaultUser, AuthenticationError> {
        if username != self.username {
            info!(username, "login rejected: unknown user");
            return Err(AuthenticationError::BadUser);
        }
        match creds.password.as_deref() {
            Some(password) if !password.is_empty() && password == self.password => {
                info!(username, "login accepted");
                Ok(DefaultUser)
            }
            _ => {
                info!(username, "login rejected: bad password");
                Err(AuthenticationError::BadPassword)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn creds(password: Option<&str>) -> Credentials {
        Credentials {
            certificate_chain: None,
            password: password.map(str::to_string),
            source_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }

    #[tokio::test]
    async fn test_accepts_configured_pair() {
        let auth = SingleUserAuth::new("admin", "123456");
        let user: DefaultUser = auth
            .authenticate("admin", &creds(Some("123456")))
            .await
            .unwrap();
        let _ = user;
    }

    #[tokio::test]
    async fn test_rejects_unknown_user() {
        let auth = SingleUserAuth::new("admin", "123456");
        let err = auth
            .authenticate("intruder", &creds(Some("123456")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthenticationError::BadUser));
    }

    #[tokio::test]
    async fn test_rejects_wrong_password() {
        let auth = SingleUserAuth::new("admin", "123456");
        let err = auth
            .authenticate("admin", &creds(Some("wrong")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthenticationError::BadPassword));
    }

    #[tokio::test]
    async fn test_rejects_blank_password() {
        let auth = SingleUserAuth::new("admin", "");
        for password in [Some(""), None] {
            let err = auth
                .authenticate("admin", &creds(password))
                .await
                .unwrap_err();
            assert!(matches!(err, AuthenticationError::BadPassword));
        }
    }
}
