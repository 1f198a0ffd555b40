/// Decoding of subprocess output streams
use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(target_os = "windows")]
use winreg::enums::HKEY_LOCAL_MACHINE;
#[cfg(target_os = "windows")]
use winreg::RegKey;

/// Which character encoding the external tool writes to its pipes.
///
/// Serialized as a plain string: `"system"`, `"utf-8"`, or any WHATWG label
/// such as `"cp936"` or `"shift_jis"`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OutputEncoding {
    /// The host's legacy ANSI code page on Windows, UTF-8 elsewhere.
    #[default]
    System,
    Utf8,
    Label(String),
}

impl From<String> for OutputEncoding {
    fn from(value: String) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "system" => OutputEncoding::System,
            "utf-8" | "utf8" => OutputEncoding::Utf8,
            _ => OutputEncoding::Label(normalized),
        }
    }
}

impl From<OutputEncoding> for String {
    fn from(value: OutputEncoding) -> Self {
        value.to_string()
    }
}

impl fmt::Display for OutputEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputEncoding::System => f.write_str("system"),
            OutputEncoding::Utf8 => f.write_str("utf-8"),
            OutputEncoding::Label(label) => f.write_str(label),
        }
    }
}

impl OutputEncoding {
    /// Resolve to a concrete encoding. Unknown labels fall back to UTF-8.
    pub fn resolve(&self) -> &'static Encoding {
        match self {
            OutputEncoding::Utf8 => UTF_8,
            OutputEncoding::Label(label) => match Encoding::for_label(label.as_bytes()) {
                Some(encoding) => encoding,
                None => {
                    warn!("unknown output encoding label '{}', using UTF-8", label);
                    UTF_8
                }
            },
            OutputEncoding::System => system_code_page()
                .and_then(code_page_label)
                .and_then(|label| Encoding::for_label(label.as_bytes()))
                .unwrap_or(UTF_8),
        }
    }

    pub fn new_decoder(&self) -> StreamDecoder {
        StreamDecoder::new(self.resolve())
    }
}

#[cfg(target_os = "windows")]
fn system_code_page() -> Option<u32> {
    let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
    let key = hklm
        .open_subkey(r"SYSTEM\CurrentControlSet\Control\Nls\CodePage")
        .ok()?;
    let acp: String = key.get_value("ACP").ok()?;
    acp.trim().parse().ok()
}

#[cfg(not(target_os = "windows"))]
fn system_code_page() -> Option<u32> {
    None
}

/// Map a Windows code page number to a WHATWG encoding label.
pub fn code_page_label(code_page: u32) -> Option<&'static str> {
    let label = match code_page {
        65001 => "utf-8",
        936 => "gbk",
        54936 => "gb18030",
        950 => "big5",
        932 => "shift_jis",
        949 => "euc-kr",
        866 => "ibm866",
        874 => "windows-874",
        1250 => "windows-1250",
        1251 => "windows-1251",
        1252 => "windows-1252",
        1253 => "windows-1253",
        1254 => "windows-1254",
        1255 => "windows-1255",
        1256 => "windows-1256",
        1257 => "windows-1257",
        1258 => "windows-1258",
        20866 => "koi8-r",
        _ => return None,
    };
    Some(label)
}

/// Incremental decoder for one byte stream.
///
/// Multi-byte sequences split across reads are held back until the rest of the
/// sequence arrives. Malformed input is replaced with U+FFFD.
pub struct StreamDecoder {
    decoder: Decoder,
}

impl StreamDecoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder_without_bom_handling(),
        }
    }

    pub fn encoding_name(&self) -> &'static str {
        self.decoder.encoding().name()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.decode_inner(bytes, false)
    }

    /// Flush any held-back bytes at end of stream.
    pub fn finish(&mut self) -> String {
        self.decode_inner(&[], true)
    }

    fn decode_inner(&mut self, bytes: &[u8], last: bool) -> String {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(bytes.len())
            .unwrap_or(bytes.len() * 3 + 16);
        let mut output = String::with_capacity(capacity);
        let mut input = bytes;
        loop {
            let (result, read, _had_errors) =
                self.decoder.decode_to_string(input, &mut output, last);
            input = &input[read..];
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => output.reserve(input.len() * 3 + 16),
            }
        }
        output
    }
}

/// Splits decoded text into lines.
///
/// Both `\n` and `\r` terminate a line so carriage-return progress bars are
/// seen one update at a time. Empty lines are dropped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str) -> Vec<String> {
        let mut lines = Vec::new();
        for ch in text.chars() {
            if ch == '\n' || ch == '\r' {
                if !self.pending.is_empty() {
                    lines.push(std::mem::take(&mut self.pending));
                }
            } else {
                self.pending.push(ch);
            }
        }
        lines
    }

    /// Return the trailing partial line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}
