//! PROPFIND multistatus parsing.
//!
//! Servers disagree on namespace prefixes (`d:`, `D:`, none at all) and pad
//! responses with vendor properties, so elements are matched on their local
//! name and anything unrecognised is skipped.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::RemoteEntry;

#[derive(Debug, Error)]
pub enum XmlParseError {
    #[error("XML syntax error at byte {position}: {source}")]
    Syntax {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("failed to decode text content: {0}")]
    Text(String),

    #[error("expected a multistatus root element, found <{found}>")]
    UnexpectedRoot { found: String },

    #[error("document has no root element")]
    EmptyDocument,
}

/// Body sent with every listing request
pub const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
    <d:prop>
        <d:displayname/>
        <d:resourcetype/>
    </d:prop>
</d:propfind>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Href,
    DisplayName,
}

#[derive(Debug, Default)]
struct PendingResponse {
    href: Option<String>,
    display_name: Option<String>,
    is_collection: bool,
    propstat_count: usize,
}

#[derive(Debug, Default)]
struct ParserState {
    stack: Vec<Vec<u8>>,
    current: Option<PendingResponse>,
    capture: Option<Capture>,
    saw_root: bool,
    entries: Vec<RemoteEntry>,
    dropped: usize,
}

impl ParserState {
    fn parent(&self) -> &[u8] {
        self.stack.last().map(Vec::as_slice).unwrap_or(b"")
    }

    /// Inside the `prop` of the first `propstat` of the current response
    fn in_primary_prop(&self) -> bool {
        let primary = self
            .current
            .as_ref()
            .map_or(false, |pending| pending.propstat_count == 1);
        primary && self.stack.windows(2).any(|w| w[0] == b"propstat" && w[1] == b"prop")
    }

    fn open(&mut self, name: &[u8], is_empty: bool) -> Result<(), XmlParseError> {
        if self.stack.is_empty() && !self.saw_root {
            if name != b"multistatus" {
                return Err(XmlParseError::UnexpectedRoot {
                    found: String::from_utf8_lossy(name).into_owned(),
                });
            }
            self.saw_root = true;
        }

        let parent = self.parent().to_vec();
        match name {
            b"response" if parent == b"multistatus" => {
                self.current = Some(PendingResponse::default());
            }
            b"href" if parent == b"response" => {
                if let Some(pending) = self.current.as_mut().filter(|p| p.href.is_none()) {
                    pending.href = Some(String::new());
                    if !is_empty {
                        self.capture = Some(Capture::Href);
                    }
                }
            }
            b"propstat" if parent == b"response" => {
                if let Some(pending) = self.current.as_mut() {
                    pending.propstat_count += 1;
                }
            }
            b"displayname" if parent == b"prop" && self.in_primary_prop() => {
                // First one wins; vendor namespaces may repeat the local name
                if let Some(pending) = self.current.as_mut().filter(|p| p.display_name.is_none()) {
                    pending.display_name = Some(String::new());
                    if !is_empty {
                        self.capture = Some(Capture::DisplayName);
                    }
                }
            }
            b"collection" if parent == b"resourcetype" && self.in_primary_prop() => {
                if let Some(pending) = self.current.as_mut() {
                    pending.is_collection = true;
                }
            }
            _ => {}
        }

        if !is_empty {
            self.stack.push(name.to_vec());
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let (Some(capture), Some(pending)) = (self.capture, self.current.as_mut()) else {
            return;
        };
        let target = match capture {
            Capture::Href => &mut pending.href,
            Capture::DisplayName => &mut pending.display_name,
        };
        target.get_or_insert_with(String::new).push_str(text);
    }

    fn close(&mut self, name: &[u8]) {
        self.stack.pop();

        match (self.capture, name) {
            (Some(Capture::Href), b"href") | (Some(Capture::DisplayName), b"displayname") => {
                self.capture = None;
            }
            _ => {}
        }

        if name == b"response" && self.parent() == b"multistatus" {
            if let Some(pending) = self.current.take() {
                self.finish_response(pending);
            }
        }
    }

    fn finish_response(&mut self, pending: PendingResponse) {
        // A URI reference has no raw whitespace, so padding around an href is layout
        let Some(href) = pending.href.map(|href| href.trim().to_string()) else {
            warn!("Dropping PROPFIND response without an href");
            self.dropped += 1;
            return;
        };
        let Some(display_name) = pending.display_name else {
            warn!("Dropping PROPFIND response for '{}': no displayname in primary propstat", href);
            self.dropped += 1;
            return;
        };

        let entry = if pending.is_collection {
            RemoteEntry::folder(href, display_name)
        } else {
            RemoteEntry::file(href, display_name)
        };
        self.entries.push(entry);
    }
}

/// Removes byte-order marks and whitespace that some servers emit before the
/// XML declaration, which would otherwise make the declaration invalid.
pub fn strip_leading_noise(xml: &str) -> &str {
    xml.trim_start_matches(|c: char| c == '\u{feff}' || c.is_whitespace())
}

/// Parses a WebDAV multistatus document into entries in document order.
///
/// The first entry is normally the queried directory itself. Responses that
/// lack an href or a displayname are skipped rather than failing the listing;
/// only a syntax error or a non-multistatus root fails the whole call.
pub fn parse_propfind_response(xml: &str) -> Result<Vec<RemoteEntry>, XmlParseError> {
    let xml = strip_leading_noise(xml);

    // Text is kept untrimmed: display names may carry significant whitespace,
    // and text outside href/displayname is never captured anyway
    let mut reader = Reader::from_str(xml);

    let mut state = ParserState::default();

    loop {
        let event = reader.read_event().map_err(|source| XmlParseError::Syntax {
            position: reader.error_position() as u64,
            source,
        })?;

        match event {
            Event::Start(ref e) => state.open(e.local_name().as_ref(), false)?,
            Event::Empty(ref e) => state.open(e.local_name().as_ref(), true)?,
            Event::End(ref e) => state.close(e.local_name().as_ref()),
            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map_err(|err| XmlParseError::Text(err.to_string()))?;
                state.text(&text);
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                state.text(&String::from_utf8_lossy(&raw));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !state.saw_root {
        return Err(XmlParseError::EmptyDocument);
    }

    debug!(
        "Parsed PROPFIND response: {} entries, {} dropped",
        state.entries.len(),
        state.dropped
    );
    Ok(state.entries)
}

/// Same as [`parse_propfind_response`] for a raw body, decoded as UTF-8
pub fn parse_propfind_bytes(body: &[u8]) -> Result<Vec<RemoteEntry>, XmlParseError> {
    parse_propfind_response(&String::from_utf8_lossy(body))
}
