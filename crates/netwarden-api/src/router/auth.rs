// Router session authentication
//
// Cookie-based login/logout against `{endpoint}/login` and
// `{endpoint}/logout`. The session cookie lands in the client's jar and
// rides along on every later directive.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use crate::error::Error;
use crate::router::client::RouterClient;

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: String,
}

impl RouterClient {
    /// Authenticate with the router.
    ///
    /// Brands that expect it (Huawei) receive the password base64-encoded.
    /// A refused login (`success: false` or HTTP 401) is reported as
    /// [`Error::Authentication`].
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), Error> {
        let url = self.url("login")?;
        debug!(brand = %self.brand(), "logging in at {}", url);

        let password = if self.brand().encodes_password() {
            STANDARD.encode(password.expose_secret())
        } else {
            password.expose_secret().to_owned()
        };
        let body = LoginRequest { username, password };

        match self.post::<serde_json::Value>(url, &body).await {
            Ok(_) => {
                debug!("router login successful");
                Ok(())
            }
            Err(Error::SessionExpired) => Err(Error::Authentication {
                message: "router refused credentials (HTTP 401)".into(),
            }),
            Err(Error::Rejected { message }) => Err(Error::Authentication { message }),
            Err(Error::Http { status: 403, message }) => Err(Error::Authentication {
                message: format!("login forbidden (HTTP 403): {message}"),
            }),
            Err(e) => Err(e),
        }
    }

    /// End the current session. The response body is ignored.
    pub async fn logout(&self) -> Result<(), Error> {
        let url = self.url("logout")?;
        debug!("logging out at {}", url);
        self.post_empty(url).await
    }
}
