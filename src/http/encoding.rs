use serde::Deserialize;

/// Text encoding used for request/response lines, headers and bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    /// ISO-8859-1. Every byte maps to exactly one char.
    #[default]
    #[serde(alias = "iso-8859-1")]
    Latin1,
    #[serde(alias = "us-ascii")]
    Ascii,
    #[serde(alias = "utf-8")]
    Utf8,
}

impl TextEncoding {
    /// Name used for the `charset` parameter of `Content-Type`.
    pub fn charset(&self) -> &'static str {
        match self {
            TextEncoding::Latin1 => "iso-8859-1",
            TextEncoding::Ascii => "us-ascii",
            TextEncoding::Utf8 => "utf-8",
        }
    }

    /// Encodes `text`; characters the encoding cannot represent become `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            TextEncoding::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            TextEncoding::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { char::from(b) } else { '\u{FFFD}' })
                .collect(),
        }
    }
}
