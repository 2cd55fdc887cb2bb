//! Filename sanitization
//!
//! Client supplied filenames end up inside storage paths, so before they are used by the
//! path builder they go through a [`FilenameSanitizer`].

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

/// Everything except RFC 3986 unreserved characters
const URL_UNSAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// RFC 3986 gen-delims and sub-delims
const URI_RESERVED: &[char] = &[
    ':', '/', '?', '#', '[', ']', '@', '!', '$', '&', '\'', '(', ')', '*', '+', ',', ';', '=',
];

/// Characters most filesystems refuse in a filename
const FS_RESERVED: &[char] = &['/', '\\', '<', '>', ':', '"', '|', '?', '*'];

pub const DEFAULT_MAX_LENGTH: usize = 190;

pub trait FilenameSanitizer: Send + Sync {
    /// Remove or replace unsafe characters and bound the length
    fn sanitize(&self, filename: &str) -> String;

    /// Make a filename nicer to read without changing what it refers to
    fn beautify(&self, filename: &str) -> String {
        filename.to_string()
    }
}

/// Passes filenames through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSanitizer;

impl FilenameSanitizer for NoopSanitizer {
    fn sanitize(&self, filename: &str) -> String {
        filename.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerOptions {
    /// Percent-encode everything that is not an unreserved URL character
    pub url_safe: bool,
    pub remove_uri_reserved_chars: bool,
    /// Upper bound in bytes, extension included
    pub max_length: usize,
}

impl Default for SanitizerOptions {
    fn default() -> Self {
        Self {
            url_safe: true,
            remove_uri_reserved_chars: true,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UrlSafeSanitizer {
    options: SanitizerOptions,
}

impl UrlSafeSanitizer {
    pub fn new(options: SanitizerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SanitizerOptions {
        &self.options
    }

    fn strip(&self, filename: &str) -> String {
        filename
            .chars()
            .filter(|c| !c.is_control())
            .filter(|c| !FS_RESERVED.contains(c))
            .filter(|c| !(self.options.remove_uri_reserved_chars && URI_RESERVED.contains(c)))
            .map(|c| if c.is_whitespace() { '-' } else { c })
            .collect()
    }

    fn truncate(&self, name: String) -> String {
        let max = self.options.max_length.max(1);
        if name.len() <= max {
            return name;
        }

        let (stem, extension) = match name.rfind('.') {
            Some(i) if i > 0 && name.len() - i < max => name.split_at(i),
            _ => (name.as_str(), ""),
        };
        let budget = max - extension.len();
        let cut = safe_cut(stem, budget, self.options.url_safe);
        let stem = stem[..cut].trim_end_matches(['-', '.']);
        if stem.is_empty() {
            let fallback = format!("file{}", extension);
            if fallback.len() <= max {
                return fallback;
            }
            return "file"[..max.min(4)].to_string();
        }
        format!("{}{}", stem, extension)
    }
}

/// Largest cut position `<= budget` that sits on a char boundary and, for encoded
/// names, neither inside a `%XX` escape nor between the escapes of one character
fn safe_cut(s: &str, budget: usize, encoded: bool) -> usize {
    let mut cut = budget.min(s.len());
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    if !encoded {
        return cut;
    }
    let bytes = s.as_bytes();
    for back in 1..=2 {
        if cut >= back && bytes[cut - back] == b'%' {
            cut -= back;
            break;
        }
    }
    while cut >= 3
        && cut + 2 < bytes.len()
        && bytes[cut] == b'%'
        && is_continuation(&bytes[cut + 1..cut + 3])
    {
        cut -= 3;
    }
    cut
}

/// Whether a two-digit hex escape encodes a UTF-8 continuation byte
fn is_continuation(hex: &[u8]) -> bool {
    std::str::from_utf8(hex)
        .ok()
        .and_then(|h| u8::from_str_radix(h, 16).ok())
        .is_some_and(|b| b & 0xC0 == 0x80)
}

/// Collapse runs of `-` and `.` and trim them from both ends
fn collapse(filename: &str) -> String {
    let mut out = String::with_capacity(filename.len());
    let mut last: Option<char> = None;
    for c in filename.chars() {
        if (c == '-' || c == '.') && last == Some(c) {
            continue;
        }
        out.push(c);
        last = Some(c);
    }
    out.trim_matches(['-', '.']).to_string()
}

impl FilenameSanitizer for UrlSafeSanitizer {
    fn sanitize(&self, filename: &str) -> String {
        let mut name = self.beautify(&self.strip(filename));
        if self.options.url_safe {
            name = utf8_percent_encode(&name, URL_UNSAFE).to_string();
        }
        if name.is_empty() {
            name = "file".to_string();
        }
        self.truncate(name)
    }

    fn beautify(&self, filename: &str) -> String {
        collapse(filename)
    }
}
