//! SMTP reply parsing.

use std::fmt;

use super::SmtpError;

/// Reply code and text lines, e.g. `250-First` / `250 Last`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// 2xx
    pub const fn is_positive(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx, e.g. 334 during AUTH or 354 after DATA
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    pub fn text(&self) -> String {
        self.lines.join(" ")
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text())
    }
}

/// Parses reply lines already split on CRLF.
pub fn parse_reply(lines: &[String]) -> Result<Reply, SmtpError> {
    let first = lines
        .first()
        .ok_or_else(|| SmtpError::Protocol("Empty reply".into()))?;

    let code_str = first
        .get(0..3)
        .ok_or_else(|| SmtpError::Protocol(format!("Reply too short: {first}")))?;
    let code = code_str
        .parse::<u16>()
        .map_err(|_| SmtpError::Protocol(format!("Invalid reply code: {code_str}")))?;

    let mut text = Vec::with_capacity(lines.len());
    for line in lines {
        match line.len() {
            3 => text.push(String::new()),
            n if n > 3 => text.push(line.get(4..).unwrap_or_default().to_string()),
            _ => return Err(SmtpError::Protocol(format!("Malformed reply line: {line}"))),
        }
    }

    Ok(Reply { code, lines: text })
}

/// A `-` after the code marks a continuation line.
pub fn is_last_reply_line(line: &str) -> bool {
    line.len() == 3 || (line.len() >= 4 && line.as_bytes()[3] == b' ')
}
