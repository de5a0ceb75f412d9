use std::fmt;

use serde::{Deserialize, Serialize};

use super::{assemble, fragment_hex, parse_byte, parse_range, DecodeError, Dialect, Token};
use crate::model::{Fragment, Pattern, Qualifier};

/// One literal run of the generic form and the repeat marker that follows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericPiece {
    #[serde(with = "crate::regions::hex_bytes")]
    pub bytes: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masked_nibbles: Vec<usize>,
    /// `None` when the piece concatenates directly with the next one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<Qualifier>,
}

/// Dialect-neutral wildcarded byte form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericSignature {
    pub pieces: Vec<GenericPiece>,
}

pub fn encode(pattern: &Pattern) -> GenericSignature {
    let pieces = pattern
        .fragments
        .iter()
        .map(|fragment| GenericPiece {
            bytes: fragment.bytes.clone(),
            masked_nibbles: fragment.nibble_mask.iter().copied().collect(),
            repeat: if fragment.qualifier.is_none() && !fragment.has_mask() {
                None
            } else {
                Some(fragment.qualifier)
            },
        })
        .collect();
    GenericSignature { pieces }
}

impl GenericSignature {
    pub fn to_pattern(&self) -> Pattern {
        let fragments = self
            .pieces
            .iter()
            .map(|piece| {
                Fragment::new(piece.bytes.clone())
                    .with_mask(piece.masked_nibbles.iter().copied())
                    .with_qualifier(piece.repeat.unwrap_or(Qualifier::NONE))
            })
            .collect();
        Pattern::new(fragments)
    }
}

/// Lowercase hex, `?` per masked nibble, `{min,max}` markers with `-1` for unbounded.
impl fmt::Display for GenericSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for piece in &self.pieces {
            let fragment = Fragment::new(piece.bytes.clone()).with_mask(piece.masked_nibbles.iter().copied());
            f.write_str(&fragment_hex(&fragment, false, ""))?;
            if let Some(repeat) = &piece.repeat {
                write!(f, "{repeat}")?;
            }
        }
        Ok(())
    }
}

/// Parse the text form produced by [`GenericSignature`]'s `Display`.
pub fn decode_text(text: &str) -> Result<Pattern, DecodeError> {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    let mut tokens = Vec::new();
    let mut position = 0;
    while position < chars.len() {
        if chars[position] == '{' {
            let close = chars[position..]
                .iter()
                .position(|c| *c == '}')
                .map(|offset| position + offset)
                .ok_or_else(|| DecodeError::malformed(Dialect::Generic, position, "unclosed '{'"))?;
            let inner: String = chars[position + 1..close].iter().collect();
            let (min, max) = inner.split_once(',').ok_or_else(|| {
                DecodeError::malformed(Dialect::Generic, position, "repeat marker needs 'min,max'")
            })?;
            let range = if max.trim() == "-1" {
                format!("{min}-")
            } else {
                format!("{min}-{max}")
            };
            tokens.push((position, Token::Jump(parse_range(Dialect::Generic, position, &range)?)));
            position = close + 1;
        } else {
            let token = parse_byte(&chars[position..(position + 2).min(chars.len())])
                .ok_or_else(|| DecodeError::malformed(Dialect::Generic, position, "expected a hex byte"))?;
            tokens.push((position, token));
            position += 2;
        }
    }
    assemble(Dialect::Generic, &tokens)
}
