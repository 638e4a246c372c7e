//! Chunk interpretation
//!
//! Engines yield loosely shaped items: a 3-tuple `(status, path, model)`, a 4-tuple that
//! also carries raw PCM bytes, or anything else. [`StreamChunk::interpret`] decodes these
//! once into a single record so nothing downstream inspects raw shapes again.

use crate::types::PcmAudio;
use std::fmt;
use std::path::PathBuf;

/// One slot of a raw engine tuple
#[derive(Clone, Debug, PartialEq)]
pub enum RawField {
    Null,
    Text(String),
    Bytes(Vec<u8>),
    /// Any other scalar, kept as its textual form
    Other(String),
}

/// Item as yielded by an inference engine, before interpretation
#[derive(Clone, Debug, PartialEq)]
pub enum RawChunk {
    Tuple(Vec<RawField>),
    /// Non-tuple item, kept as its textual form
    Value(String),
}

impl RawChunk {
    /// `(status, path, model)`
    pub fn triple(
        status: impl Into<String>,
        audio_path: Option<impl Into<String>>,
        model: Option<impl Into<String>>,
    ) -> Self {
        RawChunk::Tuple(vec![
            RawField::Text(status.into()),
            audio_path.map_or(RawField::Null, |p| RawField::Text(p.into())),
            model.map_or(RawField::Null, |m| RawField::Text(m.into())),
        ])
    }

    /// `(status, path, model, raw_samples)`
    pub fn quad(
        status: impl Into<String>,
        audio_path: Option<impl Into<String>>,
        model: Option<impl Into<String>>,
        raw_samples: Option<Vec<u8>>,
    ) -> Self {
        let mut chunk = Self::triple(status, audio_path, model);
        if let RawChunk::Tuple(fields) = &mut chunk {
            fields.push(raw_samples.map_or(RawField::Null, RawField::Bytes));
        }
        chunk
    }
}

impl fmt::Display for RawField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawField::Null => write!(f, "null"),
            RawField::Text(s) => write!(f, "{s:?}"),
            RawField::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            RawField::Other(s) => write!(f, "{s}"),
        }
    }
}

impl fmt::Display for RawChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawChunk::Tuple(fields) => {
                write!(f, "(")?;
                for (idx, field) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, ")")
            }
            RawChunk::Value(s) => write!(f, "{s}"),
        }
    }
}

/// Canonical chunk record
#[derive(Clone, Debug, PartialEq)]
pub struct StreamChunk {
    pub status: String,
    pub audio_path: Option<PathBuf>,
    /// Which model instance produced the chunk, diagnostic only
    pub model_identifier: Option<String>,
    pub raw_samples: Option<PcmAudio>,
}

impl StreamChunk {
    pub fn status_only(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            audio_path: None,
            model_identifier: None,
            raw_samples: None,
        }
    }

    /// Decode a raw engine item. Never fails: unexpected shapes collapse into a
    /// status-only chunk carrying the item's textual form.
    pub fn interpret(raw: RawChunk) -> Self {
        let fields = match raw {
            RawChunk::Tuple(fields) if fields.len() == 3 || fields.len() == 4 => fields,
            other => return Self::status_only(other.to_string()),
        };

        match decode_fields(&fields) {
            Some(chunk) => chunk,
            None => {
                log::debug!("Malformed chunk fields, keeping status only");
                Self::status_only(RawChunk::Tuple(fields).to_string())
            }
        }
    }

    pub fn has_audio(&self) -> bool {
        self.raw_samples.is_some() || self.audio_path.is_some()
    }
}

fn decode_fields(fields: &[RawField]) -> Option<StreamChunk> {
    let status = match &fields[0] {
        RawField::Text(s) | RawField::Other(s) => s.clone(),
        RawField::Null => String::new(),
        RawField::Bytes(_) => return None,
    };
    let audio_path = optional_text(&fields[1])?.map(PathBuf::from);
    let model_identifier = optional_text(&fields[2])?;
    let raw_samples = match fields.get(3) {
        None | Some(RawField::Null) => None,
        Some(RawField::Bytes(bytes)) => {
            let pcm = PcmAudio::new(bytes.clone());
            (!pcm.is_empty()).then_some(pcm)
        }
        // Undecodable samples only cost the in-memory route; path and status still count
        Some(other) => {
            log::debug!("Ignoring undecodable raw samples: {other}");
            None
        }
    };

    Some(StreamChunk {
        status,
        audio_path,
        model_identifier,
        raw_samples,
    })
}

/// `Some(None)` for an absent value, `None` for a field of the wrong kind
fn optional_text(field: &RawField) -> Option<Option<String>> {
    match field {
        RawField::Null => Some(None),
        RawField::Text(s) if s.is_empty() => Some(None),
        RawField::Text(s) => Some(Some(s.clone())),
        RawField::Bytes(_) | RawField::Other(_) => None,
    }
}
