//! One SMTP submission session: greeting, EHLO, optional STARTTLS and AUTH,
//! then a single mail transaction.

use base64::Engine;
use std::future::Future;
use std::time::Duration;

use super::reply::{is_last_reply_line, parse_reply, Reply};
use super::stream::{self, SmtpStream};
use super::SmtpError;
use crate::config::{MailConfig, MailSecurity};

/// Reply code that ends AUTH successfully
const AUTH_SUCCESS: u16 = 235;
/// Reply code that invites message content after DATA
const START_DATA: u16 = 354;
/// Reply code for QUIT
const CLOSING: u16 = 221;

/// Authenticated (or anonymous) session ready for MAIL FROM
pub struct SmtpSession {
    stream: SmtpStream,
    socket_timeout: Duration,
    /// EHLO keyword lines, e.g. `AUTH PLAIN LOGIN`
    extensions: Vec<String>,
}

impl SmtpSession {
    /// Connects, reads the greeting and prepares the session.
    ///
    /// Connection setup (lookup, TCP, implicit TLS) is bounded by
    /// `connection_timeout_ms`, the greeting by `greeting_timeout_ms`, every
    /// later read or write by `socket_timeout_ms`.
    pub async fn open(config: &MailConfig) -> Result<Self, SmtpError> {
        let implicit_tls = config.security == MailSecurity::Tls;
        let stream = bounded(
            "connection",
            Duration::from_millis(config.connection_timeout_ms),
            stream::connect(&config.host, config.port, implicit_tls),
        )
        .await?;

        let mut session = Self {
            stream,
            socket_timeout: Duration::from_millis(config.socket_timeout_ms),
            extensions: Vec::new(),
        };

        let greeting = bounded(
            "greeting",
            Duration::from_millis(config.greeting_timeout_ms),
            read_reply(&mut session.stream),
        )
        .await?;
        if !greeting.is_positive() {
            return Err(SmtpError::rejected(&greeting));
        }
        tracing::debug!(greeting = %greeting, "SMTP greeting received");

        session.ehlo(&config.client_hostname).await?;

        if config.security == MailSecurity::Starttls {
            session = session.starttls(&config.host, &config.client_hostname).await?;
        }

        if !config.username.is_empty() {
            session.authenticate(&config.username, &config.password).await?;
        }

        Ok(session)
    }

    async fn ehlo(&mut self, client_hostname: &str) -> Result<(), SmtpError> {
        let reply = self.command(&format!("EHLO {client_hostname}")).await?;
        if !reply.is_positive() {
            return Err(SmtpError::rejected(&reply));
        }
        // First line is the server's own greeting
        self.extensions = reply.lines.iter().skip(1).cloned().collect();
        Ok(())
    }

    async fn starttls(mut self, hostname: &str, client_hostname: &str) -> Result<Self, SmtpError> {
        if !self.supports("STARTTLS") {
            return Err(SmtpError::Protocol(
                "Server does not support STARTTLS".into(),
            ));
        }

        let reply = self.command("STARTTLS").await?;
        if !reply.is_positive() {
            return Err(SmtpError::rejected(&reply));
        }

        let socket_timeout = self.socket_timeout;
        self.stream = bounded(
            "tls upgrade",
            socket_timeout,
            self.stream.upgrade_to_tls(hostname),
        )
        .await?;

        // Capabilities may change once the channel is encrypted
        self.ehlo(client_hostname).await?;
        Ok(self)
    }

    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), SmtpError> {
        let mechanisms = self.auth_mechanisms();
        if mechanisms.is_empty() {
            return Err(SmtpError::Auth {
                code: 0,
                message: "authentication required but server offers no AUTH mechanism".into(),
            });
        }

        let engine = base64::engine::general_purpose::STANDARD;
        let reply = if mechanisms.iter().any(|m| m == "PLAIN") || !mechanisms.iter().any(|m| m == "LOGIN") {
            let credentials = engine.encode(format!("\0{username}\0{password}"));
            self.command(&format!("AUTH PLAIN {credentials}")).await?
        } else {
            let reply = self.command("AUTH LOGIN").await?;
            if !reply.is_intermediate() {
                return Err(SmtpError::auth(&reply));
            }
            let reply = self.command(&engine.encode(username)).await?;
            if !reply.is_intermediate() {
                return Err(SmtpError::auth(&reply));
            }
            self.command(&engine.encode(password)).await?
        };

        if reply.code == AUTH_SUCCESS {
            Ok(())
        } else {
            Err(SmtpError::auth(&reply))
        }
    }

    /// Runs MAIL FROM, RCPT TO and DATA for one recipient.
    /// Returns the server's reply to the end of data.
    pub async fn send_mail(&mut self, from: &str, to: &str, message: &[u8]) -> Result<Reply, SmtpError> {
        let reply = self.command(&format!("MAIL FROM:<{from}>")).await?;
        if !reply.is_positive() {
            return Err(SmtpError::rejected(&reply));
        }

        let reply = self.command(&format!("RCPT TO:<{to}>")).await?;
        if !reply.is_positive() {
            return Err(SmtpError::rejected(&reply));
        }

        let reply = self.command("DATA").await?;
        if reply.code != START_DATA {
            return Err(SmtpError::rejected(&reply));
        }

        let payload = dot_stuff(message);
        bounded("socket", self.socket_timeout, self.stream.write_all(&payload)).await?;

        let reply = bounded("socket", self.socket_timeout, read_reply(&mut self.stream)).await?;
        if !reply.is_positive() {
            return Err(SmtpError::rejected(&reply));
        }
        Ok(reply)
    }

    /// Sends QUIT and drops the connection.
    pub async fn quit(mut self) -> Result<(), SmtpError> {
        let reply = self.command("QUIT").await?;
        if !reply.is_positive() && reply.code != CLOSING {
            return Err(SmtpError::rejected(&reply));
        }
        Ok(())
    }

    fn supports(&self, keyword: &str) -> bool {
        self.extensions.iter().any(|ext| {
            ext.split_whitespace()
                .next()
                .is_some_and(|k| k.eq_ignore_ascii_case(keyword))
        })
    }

    fn auth_mechanisms(&self) -> Vec<String> {
        self.extensions
            .iter()
            .filter_map(|ext| {
                let mut parts = ext.split_whitespace();
                let keyword = parts.next()?;
                keyword
                    .eq_ignore_ascii_case("AUTH")
                    .then(|| parts.map(str::to_ascii_uppercase).collect::<Vec<_>>())
            })
            .flatten()
            .collect()
    }

    async fn command(&mut self, line: &str) -> Result<Reply, SmtpError> {
        let data = format!("{line}\r\n");
        bounded("socket", self.socket_timeout, self.stream.write_all(data.as_bytes())).await?;
        bounded("socket", self.socket_timeout, read_reply(&mut self.stream)).await
    }
}

async fn read_reply(stream: &mut SmtpStream) -> Result<Reply, SmtpError> {
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line().await?;
        if line.is_empty() {
            continue;
        }

        let is_last = is_last_reply_line(&line);
        lines.push(line);

        if is_last {
            break;
        }
    }

    parse_reply(&lines)
}

/// Bounds one step; on expiry the future is dropped, which drops the socket
/// it was using.
async fn bounded<T, F>(stage: &'static str, budget: Duration, fut: F) -> Result<T, SmtpError>
where
    F: Future<Output = Result<T, SmtpError>>,
{
    tokio::time::timeout(budget, fut)
        .await
        .map_err(|_| SmtpError::Timeout {
            stage,
            after: budget,
        })?
}

/// CRLF-normalises the message, escapes lines starting with `.` and appends
/// the terminating `.` line.
fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 64);
    let body = message.strip_suffix(b"\r\n").unwrap_or(message);
    let body = body.strip_suffix(b"\n").unwrap_or(body);

    for line in body.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }

    out.extend_from_slice(b".\r\n");
    out
}
