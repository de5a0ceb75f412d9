//! ClamAV extended (`.ndb`) hex signatures.
//!
//! Body syntax: lowercase hex pairs, `?` for a wildcard nibble, `*` for any number
//! of bytes, `{n}`, `{n-m}`, `{-m}` and `{n-}` for bounded or half-open jumps.

use super::{assemble, check_jump, fragment_hex, parse_byte, parse_range, DecodeError, Dialect, Token};
use crate::error::GenerationResult;
use crate::model::{Pattern, Qualifier};
use crate::policy::GenerationPolicy;

/// Target type `0` (any file) and offset `*` (anywhere).
const TARGET_ANY: &str = "0";
const OFFSET_ANY: &str = "*";

pub fn jump_token(qualifier: &Qualifier) -> String {
    match (qualifier.min, qualifier.max) {
        (0, Some(0)) => String::new(),
        (0, None) => "*".to_string(),
        (min, None) => format!("{{{min}-}}"),
        (min, Some(max)) if min == max => format!("{{{min}}}"),
        (0, Some(max)) => format!("{{-{max}}}"),
        (min, Some(max)) => format!("{{{min}-{max}}}"),
    }
}

pub fn encode_body(pattern: &Pattern, max_jump: u32) -> GenerationResult<String> {
    let mut body = String::new();
    for (index, fragment) in pattern.fragments.iter().enumerate() {
        check_jump(Dialect::ClamAv, index, &fragment.qualifier, max_jump)?;
        body.push_str(&fragment_hex(fragment, false, ""));
        body.push_str(&jump_token(&fragment.qualifier));
    }
    Ok(body)
}

/// `Name:TargetType:Offset:HexSignature`.
pub fn encode_line(
    pattern: &Pattern,
    policy: &GenerationPolicy,
    max_jump: u32,
) -> GenerationResult<String> {
    let body = encode_body(pattern, max_jump)?;
    Ok(format!("{}:{TARGET_ANY}:{OFFSET_ANY}:{body}", signature_name(&policy.detection_name)))
}

/// Field separators and whitespace cannot appear in a signature name.
pub fn signature_name(detection_name: &str) -> String {
    detection_name
        .trim()
        .chars()
        .map(|c| if c == ':' || c.is_whitespace() { '_' } else { c })
        .collect()
}

pub fn decode_body(body: &str) -> Result<Pattern, DecodeError> {
    let chars: Vec<char> = body.trim().chars().collect();
    let mut tokens = Vec::new();
    let mut position = 0;
    while position < chars.len() {
        match chars[position] {
            '*' => {
                tokens.push((position, Token::Jump(Qualifier::UNBOUNDED)));
                position += 1;
            }
            '{' => {
                let close = chars[position..]
                    .iter()
                    .position(|c| *c == '}')
                    .map(|offset| position + offset)
                    .ok_or_else(|| DecodeError::malformed(Dialect::ClamAv, position, "unclosed '{'"))?;
                let inner: String = chars[position + 1..close].iter().collect();
                tokens.push((position, Token::Jump(parse_range(Dialect::ClamAv, position, &inner)?)));
                position = close + 1;
            }
            _ => {
                let token = parse_byte(&chars[position..(position + 2).min(chars.len())])
                    .ok_or_else(|| {
                        DecodeError::malformed(Dialect::ClamAv, position, "expected a hex byte")
                    })?;
                tokens.push((position, token));
                position += 2;
            }
        }
    }
    assemble(Dialect::ClamAv, &tokens)
}

/// Decode a full `Name:0:*:body` line, returning the name and the pattern.
pub fn decode_line(line: &str) -> Result<(String, Pattern), DecodeError> {
    let mut fields = line.trim().splitn(4, ':');
    let name = fields.next().unwrap_or_default().to_string();
    let body = fields.nth(2).ok_or_else(|| {
        DecodeError::malformed(Dialect::ClamAv, 0, "expected Name:TargetType:Offset:HexSignature")
    })?;
    Ok((name, decode_body(body)?))
}
