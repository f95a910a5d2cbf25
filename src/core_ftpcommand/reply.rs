use std::fmt;

/// A single-line FTP reply, `<code> <text>\r\n` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    text: String,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}\r\n", self.code, self.text)
    }
}

/// Multi-line reply: `<code>-<first>`, one indented line per item, then
/// `<code> <last>`.
pub fn multiline(code: u16, first: &str, items: &[&str], last: &str) -> String {
    let mut response = format!("{}-{}\r\n", code, first);
    for item in items {
        response.push(' ');
        response.push_str(item);
        response.push_str("\r\n");
    }
    response.push_str(&format!("{} {}\r\n", code, last));
    response
}
