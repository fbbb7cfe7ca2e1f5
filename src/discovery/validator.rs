//! Validation of candidate-host probe bodies.
//!
//! A candidate host is confirmed as a Hue Bridge from one of two probe
//! bodies: the JSON config at `/api/0/config` or the UPnP device
//! description XML at `/description.xml`. This module decides whether a
//! body describes a genuine bridge and extracts its identity (id + name).
//! It is pure parsing over provided bytes; the parsing technique is an
//! implementation detail behind [`validate`].
//!
//! Malformed or missing identity data signals "not a bridge" (`None`),
//! never an error, so callers can move on to the next candidate.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::Deserialize;

// ─────────────────────────────────────────────────────────────────────────────
// ASCII Case-Insensitive Helpers
// ─────────────────────────────────────────────────────────────────────────────
//
// These avoid allocations from to_lowercase() during marker scans and SSDP
// response parsing. The scanned content is ASCII, so byte-level comparison
// is safe and efficient.

/// Checks if `haystack` contains `needle` (ASCII case-insensitive, no allocation).
///
/// Complexity: O(n*m) where n=haystack.len(), m=needle.len().
/// Acceptable for small needles in probe-body scanning.
#[inline]
pub(crate) fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Checks if `s` starts with `prefix` (ASCII case-insensitive, no allocation).
#[inline]
pub(crate) fn starts_with_ignore_ascii_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

// ─────────────────────────────────────────────────────────────────────────────

/// Which probe body shape is being inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// `/api/0/config` response body.
    Json,
    /// `/description.xml` UPnP device description.
    Xml,
}

/// Vendor markers that identify a Hue Bridge descriptor.
///
/// "hue bridge" also catches model-name fields; manufacturer strings have
/// shifted between "Royal Philips Electronics" and "Signify" over firmware
/// generations, so both are accepted.
const HUE_MARKERS: &[&str] = &[
    "philips hue",
    "royal philips",
    "signify",
    "ipbridge",
    "hue bridge",
];

/// Identity extracted from a validated descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeIdentity {
    /// Raw bridge identifier (serial number or UUID tail).
    pub id: String,
    /// Display name, if the descriptor carried a usable one.
    pub name: Option<String>,
}

/// Returns true if the body carries a known Hue vendor marker.
///
/// Case-insensitive substring scan; tolerant of the marker appearing in any
/// field (manufacturer, model name, server token).
pub fn is_hue_descriptor(body: &str, _kind: DescriptorKind) -> bool {
    HUE_MARKERS
        .iter()
        .any(|marker| contains_ignore_ascii_case(body, marker))
}

/// Extracts the bridge identity from a probe body.
///
/// Returns `None` when the body does not describe a bridge:
/// - JSON: `bridgeid` absent or empty, or a `modelid` present that does not
///   contain "hue" or "bsb" (some non-bridge devices expose a compatible
///   config endpoint).
/// - XML: no `<serialNumber>` and no usable `<UDN>` uuid.
pub fn extract_identity(body: &str, kind: DescriptorKind) -> Option<BridgeIdentity> {
    match kind {
        DescriptorKind::Json => extract_from_config_json(body),
        DescriptorKind::Xml => extract_from_description_xml(body),
    }
}

/// Full validation: vendor check plus identity extraction.
///
/// For JSON the `bridgeid`/`modelid` rules are themselves the vendor check
/// (a minimal config body carries no marker strings). For XML any UPnP
/// device has a serial number, so the marker scan gates extraction.
pub fn validate(body: &str, kind: DescriptorKind) -> Option<BridgeIdentity> {
    match kind {
        DescriptorKind::Json => extract_identity(body, kind),
        DescriptorKind::Xml => {
            if !is_hue_descriptor(body, kind) {
                return None;
            }
            extract_identity(body, kind)
        }
    }
}

/// Subset of `/api/0/config` we care about.
#[derive(Debug, Deserialize)]
struct ConfigBody {
    bridgeid: Option<String>,
    name: Option<String>,
    modelid: Option<String>,
}

fn extract_from_config_json(body: &str) -> Option<BridgeIdentity> {
    let config: ConfigBody = serde_json::from_str(body).ok()?;

    let id = config.bridgeid.map(|b| b.trim().to_string())?;
    if id.is_empty() {
        return None;
    }

    // A present modelid must look like a bridge (BSB001/BSB002 family).
    if let Some(modelid) = &config.modelid {
        if !contains_ignore_ascii_case(modelid, "hue") && !contains_ignore_ascii_case(modelid, "bsb")
        {
            return None;
        }
    }

    Some(BridgeIdentity {
        id,
        name: non_empty(config.name),
    })
}

fn extract_from_description_xml(body: &str) -> Option<BridgeIdentity> {
    let mut reader = Reader::from_str(body);

    let mut serial: Option<String> = None;
    let mut udn: Option<String> = None;
    let mut friendly_name: Option<String> = None;
    let mut model_description: Option<String> = None;

    // Tag matching is case-insensitive and first-match-wins per field;
    // bridges have shipped both <serialNumber> and <serialnumber>.
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let local_name = e.local_name();
                let name = local_name.as_ref();

                let slot = if name.eq_ignore_ascii_case(b"serialNumber") {
                    Some(&mut serial)
                } else if name.eq_ignore_ascii_case(b"UDN") {
                    Some(&mut udn)
                } else if name.eq_ignore_ascii_case(b"friendlyName") {
                    Some(&mut friendly_name)
                } else if name.eq_ignore_ascii_case(b"modelDescription") {
                    Some(&mut model_description)
                } else {
                    None
                };

                if let Some(slot) = slot {
                    if slot.is_none() {
                        *slot = reader.read_text(e.name()).ok().map(|t| t.to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::trace!("[Validator] XML parse stopped: {:?}", e);
                break;
            }
            _ => {}
        }
    }

    let id = non_empty(serial).or_else(|| udn.as_deref().and_then(uuid_tail))?;
    let name = non_empty(friendly_name).or_else(|| non_empty(model_description));

    Some(BridgeIdentity { id, name })
}

/// Derives a bridge id from a UPnP `<UDN>uuid:...</UDN>` value.
///
/// Bridges embed the serial number as the last 12 characters of the uuid.
fn uuid_tail(udn: &str) -> Option<String> {
    let udn = udn.trim();
    let uuid = udn
        .strip_prefix("uuid:")
        .or_else(|| {
            starts_with_ignore_ascii_case(udn, "uuid:").then(|| &udn[5..])
        })
        .unwrap_or(udn);
    // Tail is taken char-wise: the UDN text comes off the wire and may
    // contain multibyte UTF-8, so byte slicing could split a char.
    let chars: Vec<char> = uuid.chars().collect();
    if chars.len() < 12 {
        return None;
    }
    Some(chars[chars.len() - 12..].iter().collect())
}

/// Trims a candidate text value, mapping empty results to absent.
fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
