use monoio::net::TcpStream;
use monoio_rustls::{ClientTlsStream, TlsConnector};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::{Arc, OnceLock};

use crate::url::WsUrl;

#[derive(thiserror::Error, Debug)]
pub enum TlsErr {
    #[error("invalid server name {0:?}")]
    Dns(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Rustls(#[from] monoio_rustls::TlsError),
}

static GLOBAL_CONNECTOR: OnceLock<TlsConnector> = OnceLock::new();

/// Process-wide connector trusting the webpki root set.
pub fn default_connector() -> &'static TlsConnector {
    GLOBAL_CONNECTOR.get_or_init(|| {
        // Another crate may have installed a provider already.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let cfg = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        TlsConnector::from(Arc::new(cfg))
    })
}

/// Open TCP to `url` and run the TLS handshake, verifying its host name.
pub async fn connect_wss(
    url: &WsUrl,
    connector: &TlsConnector,
) -> Result<ClientTlsStream<TcpStream>, TlsErr> {
    let server_name =
        ServerName::try_from(url.host.clone()).map_err(|_| TlsErr::Dns(url.host.clone()))?;
    let tcp = TcpStream::connect((url.host.as_str(), url.port)).await?;
    tcp.set_nodelay(true)?;
    let tls = connector.connect(server_name, tcp).await?;
    tracing::debug!(host = %url.host, port = url.port, "tls established");
    Ok(tls)
}
