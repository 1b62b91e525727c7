//! Low-level SMTP stream handling.

use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::{
    rustls::{ClientConfig, RootCertStore},
    TlsConnector,
};

use super::SmtpError;

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(BufReader<TcpStream>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<tokio_rustls::client::TlsStream<TcpStream>>>),
}

impl SmtpStream {
    /// Reads one line without its line ending. A closed connection is an error.
    pub async fn read_line(&mut self) -> Result<String, SmtpError> {
        let mut line = String::new();
        let read = match self {
            Self::Tcp(reader) => reader.read_line(&mut line).await?,
            Self::Tls(reader) => reader.read_line(&mut line).await?,
        };
        if read == 0 {
            return Err(SmtpError::Protocol("Connection closed by server".into()));
        }
        Ok(line.trim_end().to_string())
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), SmtpError> {
        match self {
            Self::Tcp(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Upgrades a TCP stream to TLS after STARTTLS.
    pub async fn upgrade_to_tls(self, hostname: &str) -> Result<Self, SmtpError> {
        let tcp_stream = match self {
            Self::Tcp(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(SmtpError::Protocol("Already using TLS".into())),
        };
        let tls_stream = handshake(hostname, tcp_stream).await?;
        Ok(Self::Tls(Box::new(BufReader::new(tls_stream))))
    }
}

/// Resolves `hostname` and connects to the first address that accepts,
/// wrapping the socket in TLS when `implicit_tls` is set.
pub async fn connect(hostname: &str, port: u16, implicit_tls: bool) -> Result<SmtpStream, SmtpError> {
    let addrs: Vec<_> = tokio::net::lookup_host((hostname, port))
        .await
        .map_err(|source| SmtpError::Lookup {
            host: hostname.to_string(),
            source,
        })?
        .collect();

    let mut last_error = None;
    let mut tcp_stream = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                tcp_stream = Some(stream);
                break;
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "SMTP connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    let Some(tcp_stream) = tcp_stream else {
        return Err(SmtpError::Connect {
            addr: format!("{hostname}:{port}"),
            source: last_error
                .unwrap_or_else(|| std::io::Error::other("host resolved to no addresses")),
        });
    };

    if implicit_tls {
        let tls_stream = handshake(hostname, tcp_stream).await?;
        Ok(SmtpStream::Tls(Box::new(BufReader::new(tls_stream))))
    } else {
        Ok(SmtpStream::Tcp(BufReader::new(tcp_stream)))
    }
}

async fn handshake(
    hostname: &str,
    tcp_stream: TcpStream,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, SmtpError> {
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| SmtpError::Tls(format!("Invalid hostname: {hostname}")))?;

    create_tls_connector()
        .connect(server_name, tcp_stream)
        .await
        .map_err(|e| SmtpError::Tls(e.to_string()))
}

/// Creates a TLS connector with the webpki root certificates.
fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
