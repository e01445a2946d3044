// crates/formstore-core/src/core/header.rs
// ============================================================================
// Module: Form Header Parser
// Description: Reads identifying metadata from an XForm definition header.
// Purpose: Extract formId, version, title and submission attributes without
//          evaluating the form.
// Dependencies: quick-xml
// ============================================================================

//! ## Overview
//! [`XmlFormHeaderParser`] streams the definition until the body starts and
//! collects only what reconciliation needs:
//! - the `h:title` text,
//! - the `id` and `version` attributes of the primary instance root,
//! - the `submission` element attributes.
//!
//! Element and attribute names are matched by local name so prefix choices in
//! the document do not matter. Secondary instances (`<instance id="...">`) are
//! skipped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quick_xml::Reader;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;

use crate::core::form::FormHeader;
use crate::interfaces::FormHeaderParser;
use crate::interfaces::HeaderError;

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Header parser for XForm definition documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlFormHeaderParser;

/// Parser position relative to the elements of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Outside any element of interest.
    Outside,
    /// Inside `title`; text is collected.
    Title,
    /// Inside the primary `instance`; the next element is its root.
    PrimaryInstance,
    /// Inside a secondary instance at the given nesting depth.
    SecondaryInstance(usize),
}

impl FormHeaderParser for XmlFormHeaderParser {
    fn parse_header(&self, definition: &[u8]) -> Result<FormHeader, HeaderError> {
        let text = std::str::from_utf8(definition)
            .map_err(|_| HeaderError::Malformed("definition must be utf-8".to_string()))?;
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut title: Option<String> = None;
        let mut root_seen = false;
        let mut form_id: Option<String> = None;
        let mut version: Option<String> = None;
        let mut header = FormHeader::default();
        let mut position = Position::Outside;

        loop {
            let event =
                reader.read_event().map_err(|err| HeaderError::Malformed(err.to_string()))?;
            match event {
                Event::Start(element) => {
                    let name = element.local_name();
                    match position {
                        Position::SecondaryInstance(depth) => {
                            position = Position::SecondaryInstance(depth + 1);
                        }
                        Position::PrimaryInstance => {
                            (form_id, version) = root_attributes(&element)?;
                            root_seen = true;
                            position = Position::Outside;
                            reader
                                .read_to_end(element.name())
                                .map_err(|err| HeaderError::Malformed(err.to_string()))?;
                        }
                        _ => match name.as_ref() {
                            b"title" if title.is_none() => position = Position::Title,
                            b"instance" => {
                                position = if root_seen || attribute(&element, b"id")?.is_some()
                                {
                                    Position::SecondaryInstance(0)
                                } else {
                                    Position::PrimaryInstance
                                };
                            }
                            b"submission" => read_submission(&element, &mut header)?,
                            b"body" => break,
                            _ => {}
                        },
                    }
                }
                Event::Empty(element) => match position {
                    Position::PrimaryInstance => {
                        (form_id, version) = root_attributes(&element)?;
                        root_seen = true;
                        position = Position::Outside;
                    }
                    Position::Outside => match element.local_name().as_ref() {
                        b"submission" => read_submission(&element, &mut header)?,
                        b"body" => break,
                        _ => {}
                    },
                    _ => {}
                },
                Event::Text(content) if position == Position::Title => {
                    let value =
                        content.unescape().map_err(|err| HeaderError::Malformed(err.to_string()))?;
                    title.get_or_insert_with(String::new).push_str(&value);
                }
                Event::End(element) => match position {
                    Position::Title if element.local_name().as_ref() == b"title" => {
                        title.get_or_insert_with(String::new);
                        position = Position::Outside;
                    }
                    Position::SecondaryInstance(0) => position = Position::Outside,
                    Position::SecondaryInstance(depth) => {
                        position = Position::SecondaryInstance(depth - 1);
                    }
                    _ => {
                        if element.local_name().as_ref() == b"head" {
                            break;
                        }
                    }
                },
                Event::Eof => break,
                _ => {}
            }
        }

        let form_id = form_id.filter(|value| !value.trim().is_empty()).ok_or_else(|| {
            HeaderError::MissingField("primary instance root has no id attribute".to_string())
        })?;
        header.form_id = form_id;
        header.version = version.filter(|value| !value.trim().is_empty());
        header.display_name = title.map(|value| value.trim().to_string()).filter(|v| !v.is_empty());
        Ok(header)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads the `id` and `version` attributes of the primary instance root.
fn root_attributes(
    element: &BytesStart<'_>,
) -> Result<(Option<String>, Option<String>), HeaderError> {
    Ok((attribute(element, b"id")?, attribute(element, b"version")?))
}

/// Copies submission attributes into the header.
fn read_submission(element: &BytesStart<'_>, header: &mut FormHeader) -> Result<(), HeaderError> {
    header.submission_uri = attribute(element, b"action")?;
    header.base64_rsa_public_key = attribute(element, b"base64RsaPublicKey")?;
    header.auto_send = attribute(element, b"auto-send")?;
    header.auto_delete = attribute(element, b"auto-delete")?;
    Ok(())
}

/// Returns the unescaped value of the attribute with the given local name.
fn attribute(element: &BytesStart<'_>, local_name: &[u8]) -> Result<Option<String>, HeaderError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|err| HeaderError::Malformed(err.to_string()))?;
        if attr.key.local_name().as_ref() == local_name {
            let value =
                attr.unescape_value().map_err(|err| HeaderError::Malformed(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
