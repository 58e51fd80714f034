use crate::cert::IssuanceParams;
use crate::crypto::{AuthKey, IntegrityGuard, MAC_HEADER};
use crate::server::SigningRequest;
use crate::utils::errors::{Result, ZcertError};
use reqwest::{Client, Response};
use std::time::Duration;

/// Default server base URL
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

/// Create a standardized HTTP client
pub fn create_http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .use_rustls_tls()
        .build()?)
}

/// Talks to a zcert server, MACing every request and checking every response.
pub struct ZcertClient {
    client: Client,
    server: String,
    secret: AuthKey,
}

impl ZcertClient {
    pub fn new(server: impl Into<String>, secret: AuthKey, timeout: Duration) -> Result<Self> {
        let server = server.into().trim_end_matches('/').to_string();
        Ok(Self {
            client: create_http_client(timeout)?,
            server,
            secret,
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Ask the server to sign `csr_der`; returns the PEM certificate
    pub async fn sign(&self, csr_der: &[u8], params: IssuanceParams) -> Result<String> {
        let request = SigningRequest::new(csr_der, params);
        let body = serde_json::to_vec(&request)?;
        let mac = IntegrityGuard::encode_header(&self.secret, &body);

        let url = format!("{}/sign", self.server);
        tracing::debug!("POST {url} (nonce {})", request.security.nonce);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header(MAC_HEADER, mac)
            .body(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Fetch the authority certificate
    pub async fn ca(&self) -> Result<String> {
        let url = format!("{}/ca", self.server);
        tracing::debug!("GET {url}");
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    /// Return the body of a 200 response whose `Content-HMAC` checks out
    async fn handle_response(&self, response: Response) -> Result<String> {
        let status = response.status();
        let mac = response
            .headers()
            .get(MAC_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(ZcertError::ServerResponse {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }

        IntegrityGuard::verify_header(&self.secret, &body, mac.as_deref())
            .map_err(|e| ZcertError::Auth(format!("server response failed verification: {e}")))?;

        Ok(String::from_utf8(body.to_vec())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::csr::tests::generate_csr_der;
    use crate::cert::CertificateParser;
    use crate::server::router;
    use crate::server::service::tests::{secret, test_service};
    use axum::routing::get;
    use axum::Router;
    use std::sync::Arc;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client_for(server: &str, key: AuthKey) -> ZcertClient {
        ZcertClient::new(server, key, Duration::from_secs(10)).unwrap()
    }

    #[tokio::test]
    async fn test_sign_and_fetch_ca() {
        let (service, _store, _dir) = test_service();
        let server = spawn(router(Arc::new(service))).await;
        let client = client_for(&server, secret());

        let pem = client
            .sign(&generate_csr_der("roundtrip"), IssuanceParams::default())
            .await
            .unwrap();
        let leaf = CertificateParser::parse_pem(&pem).unwrap();
        assert_eq!(leaf.subject, "CN=roundtrip");

        let ca = CertificateParser::parse_pem(&client.ca().await.unwrap()).unwrap();
        assert!(ca.is_ca);
        assert_eq!(leaf.issuer, ca.subject);
    }

    #[tokio::test]
    async fn test_wrong_key_is_rejected_by_server() {
        let (service, _store, _dir) = test_service();
        let server = spawn(router(Arc::new(service))).await;
        let client = client_for(&server, AuthKey::new("a different shared secret").unwrap());

        let err = client
            .sign(&generate_csr_der("intruder"), IssuanceParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ZcertError::ServerResponse { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_wrong_key_fails_response_verification() {
        let (service, _store, _dir) = test_service();
        let server = spawn(router(Arc::new(service))).await;
        let client = client_for(&server, AuthKey::new("a different shared secret").unwrap());

        assert!(matches!(client.ca().await, Err(ZcertError::Auth(_))));
    }

    #[tokio::test]
    async fn test_unmaced_response_is_rejected() {
        let app = Router::new().route("/ca", get(|| async { "-----BEGIN CERTIFICATE-----" }));
        let server = spawn(app).await;
        let client = client_for(&server, secret());

        assert!(matches!(client.ca().await, Err(ZcertError::Auth(_))));
    }

    #[tokio::test]
    async fn test_validation_error_carries_body() {
        let (service, _store, _dir) = test_service();
        let server = spawn(router(Arc::new(service))).await;
        let client = client_for(&server, secret());

        let params = IssuanceParams {
            lifetime: Duration::ZERO,
            ..Default::default()
        };
        let err = client
            .sign(&generate_csr_der("zero"), params)
            .await
            .unwrap_err();
        match err {
            ZcertError::ServerResponse { status, body } => {
                assert_eq!(status, 400);
                assert!(!body.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
