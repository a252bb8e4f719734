//! TLS configuration and certificate loading.

use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

use crate::config::HttpConfig;
use crate::net::listener::ListenerError;

/// Load the rustls config when HTTPS is enabled, `None` for plain HTTP.
pub async fn load_tls_config(http: &HttpConfig) -> Result<Option<RustlsConfig>, ListenerError> {
    if !http.https {
        return Ok(None);
    }
    let cert = Path::new(&http.cert_path);
    let key = Path::new(&http.key_path);
    for (path, what) in [(cert, "certificate"), (key, "private key")] {
        if !path.exists() {
            return Err(ListenerError::Tls(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{what} file not found: {}", path.display()),
            )));
        }
    }

    let config = RustlsConfig::from_pem_file(cert, key)
        .await
        .map_err(ListenerError::Tls)?;
    tracing::info!(cert = %cert.display(), "TLS enabled");
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_http_needs_no_material() {
        assert!(load_tls_config(&HttpConfig::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_certificate_is_reported() {
        let http = HttpConfig {
            https: true,
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
            ..HttpConfig::default()
        };
        let err = load_tls_config(&http).await.unwrap_err();
        assert!(err.to_string().contains("certificate file not found"));
    }
}
