// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Lenient ASN.1 node model.
//!
//! Some structures met in the wild do not follow a fixed schema closely
//! enough for typed `der` decoding: private certificate extensions that may
//! or may not be OCTET STRING wrapped, or `GeneralizedTime` values carrying
//! fractional seconds. Those are decoded eagerly into [`Node`] and matched
//! exhaustively instead.

use chrono::{DateTime, NaiveDateTime, Utc};
use const_oid::ObjectIdentifier;
use der::{Any, Decode, Reader, SliceReader, Tag, Tagged};

use crate::error::{Result, TrustError};

/// One decoded ASN.1 element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// `SEQUENCE` with its decoded children.
    Sequence(Vec<Node>),
    /// `SET` with its decoded children.
    Set(Vec<Node>),
    /// Context-specific, application or private tag. The content octets
    /// are kept raw because only the schema knows whether the tag is
    /// implicit or explicit.
    Tagged {
        /// Tag number.
        number: u8,
        /// Constructed bit of the identifier octet.
        constructed: bool,
        /// Content octets.
        value: Vec<u8>,
    },
    /// `OCTET STRING` contents.
    OctetString(Vec<u8>),
    /// `OBJECT IDENTIFIER`.
    ObjectIdentifier(ObjectIdentifier),
    /// `UTCTime` or `GeneralizedTime`.
    Time(DateTime<Utc>),
    /// Any other universal type, with its tag and content octets.
    Primitive {
        /// Universal tag.
        tag: Tag,
        /// Content octets.
        value: Vec<u8>,
    },
}

impl Node {
    /// Decode exactly one DER element.
    pub fn parse(der: &[u8]) -> Result<Self> {
        let any = Any::from_der(der)?;
        Self::from_any(&any)
    }

    /// Convert an already-decoded element.
    pub fn from_any(any: &Any) -> Result<Self> {
        let value = any.value();
        let node = match any.tag() {
            Tag::Sequence => Node::Sequence(parse_children(value)?),
            Tag::Set => Node::Set(parse_children(value)?),
            Tag::OctetString => Node::OctetString(value.to_vec()),
            Tag::ObjectIdentifier => Node::ObjectIdentifier(
                ObjectIdentifier::from_bytes(value)
                    .map_err(|e| TrustError::decode(format!("invalid OID: {e}")))?,
            ),
            Tag::UtcTime => Node::Time(parse_utc_time(value)?),
            Tag::GeneralizedTime => Node::Time(parse_generalized_time(value)?),
            Tag::ContextSpecific {
                constructed,
                number,
            }
            | Tag::Application {
                constructed,
                number,
            }
            | Tag::Private {
                constructed,
                number,
            } => Node::Tagged {
                number: number.value(),
                constructed,
                value: value.to_vec(),
            },
            tag => Node::Primitive {
                tag,
                value: value.to_vec(),
            },
        };
        Ok(node)
    }

    /// Children of a `SEQUENCE`.
    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(children) => Some(children),
            _ => None,
        }
    }

    /// Value of a time node.
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Node::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Peel one `OCTET STRING` wrapper if present, decoding its contents.
    /// Any other node is returned unchanged.
    pub fn unwrap_octets(self) -> Result<Node> {
        match self {
            Node::OctetString(bytes) => Node::parse(&bytes),
            other => Ok(other),
        }
    }
}

/// Convert a duration since the Unix epoch, as returned by the `der` time
/// types, into a `chrono` timestamp.
pub fn datetime_from_unix(since_epoch: std::time::Duration) -> Result<DateTime<Utc>> {
    let secs = i64::try_from(since_epoch.as_secs())
        .map_err(|_| TrustError::decode("time out of range"))?;
    DateTime::from_timestamp(secs, since_epoch.subsec_nanos())
        .ok_or_else(|| TrustError::decode("time out of range"))
}

fn parse_children(value: &[u8]) -> Result<Vec<Node>> {
    let mut reader = SliceReader::new(value)?;
    let mut children = Vec::new();
    while !reader.is_finished() {
        let any = Any::decode(&mut reader)?;
        children.push(Node::from_any(&any)?);
    }
    Ok(children)
}

fn time_text(value: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(value)
        .map_err(|_| TrustError::decode("time value is not ASCII"))?;
    text.strip_suffix('Z')
        .ok_or_else(|| TrustError::decode(format!("time '{text}' is not in UTC")))
}

/// Parse `YYMMDDHHMMSSZ`, mapping years 50..99 to the 20th century.
fn parse_utc_time(value: &[u8]) -> Result<DateTime<Utc>> {
    let text = time_text(value)?;
    let yy: i32 = text
        .get(..2)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| TrustError::decode(format!("malformed UTCTime '{text}'")))?;
    let century = if yy >= 50 { 1900 } else { 2000 };
    parse_datetime(&format!("{}{}", century + yy, &text[2..]), None)
}

/// Parse `YYYYMMDDHHMMSS[.fff]Z`. Fractional seconds are accepted even
/// though DER forbids trailing zeros in them.
fn parse_generalized_time(value: &[u8]) -> Result<DateTime<Utc>> {
    let text = time_text(value)?;
    match text.split_once('.') {
        Some((whole, fraction)) => parse_datetime(whole, Some(fraction)),
        None => parse_datetime(text, None),
    }
}

fn parse_datetime(whole: &str, fraction: Option<&str>) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S")
        .map_err(|e| TrustError::decode(format!("malformed time '{whole}': {e}")))?;
    let nanos = match fraction {
        None => 0,
        Some(digits) => {
            if digits.is_empty() || digits.len() > 9 || !digits.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(TrustError::decode(format!(
                    "malformed fractional seconds '{digits}'"
                )));
            }
            let padded = format!("{digits:0<9}");
            padded
                .parse::<u32>()
                .map_err(|e| TrustError::decode(e.to_string()))?
        }
    };
    let with_nanos = naive
        .checked_add_signed(chrono::Duration::nanoseconds(i64::from(nanos)))
        .ok_or_else(|| TrustError::decode("time out of range"))?;
    Ok(with_nanos.and_utc())
}
