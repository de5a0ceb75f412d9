//! Encoder: renders a trimmed [`Pattern`] into a scan-engine dialect.
//!
//! Three dialects are supported:
//! - `generic`: structured pieces with `{min,max}` repeat markers
//! - `clamav`: extended hex signature body (`??`, `*`, `{n-m}`) inside a `Name:0:*:` line
//! - `yara`: a rule block whose hex string uses `?` nibbles and `[n-m]` jumps
//!
//! Each dialect also has a decoder that parses its text back into a `Pattern`
//! (masked nibbles come back as mask indices over zero nibbles).

pub mod clamav;
pub mod generic;
pub mod yara;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{GenerationError, GenerationResult};
use crate::model::{Fragment, Pattern, Qualifier};
use crate::policy::GenerationPolicy;

pub use generic::{GenericPiece, GenericSignature};

/// Target pattern language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Generic,
    #[serde(rename = "clamav")]
    ClamAv,
    Yara,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Generic, Dialect::ClamAv, Dialect::Yara];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Generic => "generic",
            Dialect::ClamAv => "clamav",
            Dialect::Yara => "yara",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" => Ok(Dialect::Generic),
            "clamav" | "ndb" => Ok(Dialect::ClamAv),
            "yara" => Ok(Dialect::Yara),
            other => Err(format!("Unknown dialect '{other}'. Allowed: generic, clamav, yara")),
        }
    }
}

/// Largest bounded jump each dialect will accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderLimits {
    pub clamav_max_jump: u32,
    pub yara_max_jump: u32,
}

impl Default for EncoderLimits {
    fn default() -> Self {
        Self { clamav_max_jump: 65_535, yara_max_jump: 32_767 }
    }
}

impl EncoderLimits {
    pub fn max_jump(&self, dialect: Dialect) -> Option<u32> {
        match dialect {
            Dialect::Generic => None,
            Dialect::ClamAv => Some(self.clamav_max_jump),
            Dialect::Yara => Some(self.yara_max_jump),
        }
    }
}

/// Encoded signature body; exactly one dialect per value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dialect", content = "body")]
pub enum SignatureBody {
    #[serde(rename = "generic")]
    Generic(GenericSignature),
    #[serde(rename = "clamav")]
    ClamAv(String),
    #[serde(rename = "yara")]
    Yara(String),
}

impl SignatureBody {
    pub fn dialect(&self) -> Dialect {
        match self {
            SignatureBody::Generic(_) => Dialect::Generic,
            SignatureBody::ClamAv(_) => Dialect::ClamAv,
            SignatureBody::Yara(_) => Dialect::Yara,
        }
    }

    /// Stable variant identifier, see `schema::SIGNATURE_VARIANTS`.
    pub fn variant_id(&self) -> u32 {
        match self {
            SignatureBody::Generic(_) => 1,
            SignatureBody::ClamAv(_) => 2,
            SignatureBody::Yara(_) => 3,
        }
    }

    /// Text form suitable for writing to a signature database.
    pub fn text(&self) -> String {
        match self {
            SignatureBody::Generic(sig) => sig.to_string(),
            SignatureBody::ClamAv(line) => line.clone(),
            SignatureBody::Yara(rule) => rule.clone(),
        }
    }
}

/// Renders patterns using configurable dialect limits.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    pub limits: EncoderLimits,
}

impl Encoder {
    pub fn new(limits: EncoderLimits) -> Self {
        Self { limits }
    }

    pub fn encode(
        &self,
        pattern: &Pattern,
        dialect: Dialect,
        policy: &GenerationPolicy,
    ) -> GenerationResult<SignatureBody> {
        match dialect {
            Dialect::Generic => Ok(SignatureBody::Generic(generic::encode(pattern))),
            Dialect::ClamAv => clamav::encode_line(pattern, policy, self.limits.clamav_max_jump)
                .map(SignatureBody::ClamAv),
            Dialect::Yara => {
                yara::encode_rule(pattern, policy, self.limits.yara_max_jump).map(SignatureBody::Yara)
            }
        }
    }
}

/// Failure to parse dialect text back into a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{dialect} text is malformed at position {position}: {reason}")]
    Malformed { dialect: Dialect, position: usize, reason: String },
}

impl DecodeError {
    pub(crate) fn malformed(dialect: Dialect, position: usize, reason: impl Into<String>) -> Self {
        DecodeError::Malformed { dialect, position, reason: reason.into() }
    }
}

/// Hex for one fragment; masked nibbles become `?`.
pub(crate) fn fragment_hex(fragment: &Fragment, uppercase: bool, separator: &str) -> String {
    let digits: &[u8; 16] = if uppercase { b"0123456789ABCDEF" } else { b"0123456789abcdef" };
    let mut out = String::with_capacity(fragment.len() * (2 + separator.len()));
    for index in 0..fragment.len() {
        if index > 0 {
            out.push_str(separator);
        }
        for nibble in [index * 2, index * 2 + 1] {
            if fragment.is_masked(nibble) {
                out.push('?');
            } else {
                out.push(digits[fragment.nibble(nibble) as usize] as char);
            }
        }
    }
    out
}

/// Reject a bounded jump the dialect cannot express.
pub(crate) fn check_jump(
    dialect: Dialect,
    fragment: usize,
    qualifier: &Qualifier,
    limit: u32,
) -> GenerationResult<()> {
    let largest = qualifier.max.unwrap_or(qualifier.min);
    if largest > limit {
        return Err(GenerationError::UnsupportedConstruct {
            dialect,
            fragment,
            reason: format!("jump {qualifier} exceeds the {dialect} maximum of {limit} bytes"),
        });
    }
    Ok(())
}

/// Decoded unit of dialect text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token {
    /// A byte with zeroed masked nibbles plus `(high_masked, low_masked)`.
    Byte(u8, bool, bool),
    Jump(Qualifier),
}

/// Parse a two-character hex byte where either character may be `?`.
pub(crate) fn parse_byte(pair: &[char]) -> Option<Token> {
    let nibble = |c: char| -> Option<(u8, bool)> {
        if c == '?' {
            Some((0, true))
        } else {
            c.to_digit(16).map(|d| (d as u8, false))
        }
    };
    let (high, high_masked) = nibble(*pair.first()?)?;
    let (low, low_masked) = nibble(*pair.get(1)?)?;
    Some(Token::Byte((high << 4) | low, high_masked, low_masked))
}

/// Fold a token stream into fragments. A leading jump is malformed.
pub(crate) fn assemble(dialect: Dialect, tokens: &[(usize, Token)]) -> Result<Pattern, DecodeError> {
    let mut fragments: Vec<Fragment> = Vec::new();
    let mut current: Option<Fragment> = None;
    for &(position, token) in tokens {
        match token {
            Token::Byte(byte, high_masked, low_masked) => {
                let fragment = current.get_or_insert_with(|| Fragment::new(Vec::new()));
                let base = fragment.bytes.len() * 2;
                fragment.bytes.push(byte);
                if high_masked {
                    fragment.nibble_mask.insert(base);
                }
                if low_masked {
                    fragment.nibble_mask.insert(base + 1);
                }
            }
            Token::Jump(gap) => match (current.take(), fragments.last_mut()) {
                (Some(fragment), _) => fragments.push(fragment.with_qualifier(gap)),
                (None, Some(last)) => last.qualifier = last.qualifier.merge(0, &gap),
                (None, None) => {
                    return Err(DecodeError::malformed(dialect, position, "pattern starts with a jump"))
                }
            },
        }
    }
    fragments.extend(current);
    if fragments.is_empty() {
        return Err(DecodeError::malformed(dialect, 0, "pattern has no bytes"));
    }
    Ok(Pattern::new(fragments))
}

/// Parse `n`, `n-m`, `n-`, `-m` or `-` (already stripped of brackets).
pub(crate) fn parse_range(
    dialect: Dialect,
    position: usize,
    text: &str,
) -> Result<Qualifier, DecodeError> {
    let number = |s: &str| -> Result<u32, DecodeError> {
        s.trim()
            .parse::<u32>()
            .map_err(|_| DecodeError::malformed(dialect, position, format!("bad jump bound '{s}'")))
    };
    let qualifier = match text.split_once('-') {
        None => Qualifier::exact(number(text)?),
        Some((lo, hi)) => {
            let min = if lo.trim().is_empty() { 0 } else { number(lo)? };
            let max = if hi.trim().is_empty() { None } else { Some(number(hi)?) };
            Qualifier { min, max }
        }
    };
    if !qualifier.is_well_formed() {
        return Err(DecodeError::malformed(dialect, position, format!("jump '{text}' has min above max")));
    }
    Ok(qualifier)
}
