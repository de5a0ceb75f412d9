//! YARA rule text.
//!
//! The pattern becomes a single hex string `$sig`; the policy contributes the rule
//! name, tags and the `meta:` block.

use std::fmt::Write as _;

use super::{assemble, check_jump, fragment_hex, parse_byte, parse_range, DecodeError, Dialect, Token};
use crate::error::GenerationResult;
use crate::model::{Pattern, Qualifier};
use crate::policy::{GenerationPolicy, MetaValue};

const MAX_IDENTIFIER_LEN: usize = 128;
const STRING_ID: &str = "$sig";

pub fn jump_token(qualifier: &Qualifier) -> Option<String> {
    match (qualifier.min, qualifier.max) {
        (0, Some(0)) => None,
        (0, None) => Some("[-]".to_string()),
        (min, None) => Some(format!("[{min}-]")),
        (min, Some(max)) if min == max => Some(format!("[{min}]")),
        (min, Some(max)) => Some(format!("[{min}-{max}]")),
    }
}

/// Uppercase, space separated hex string contents (without braces).
pub fn encode_hex(pattern: &Pattern, max_jump: u32) -> GenerationResult<String> {
    let last = pattern.fragments.len().saturating_sub(1);
    let mut parts: Vec<String> = Vec::new();
    for (index, fragment) in pattern.fragments.iter().enumerate() {
        parts.push(fragment_hex(fragment, true, " "));
        // YARA rejects a hex string ending in a bounded jump.
        if index == last && !fragment.qualifier.is_unbounded() {
            continue;
        }
        check_jump(Dialect::Yara, index, &fragment.qualifier, max_jump)?;
        parts.extend(jump_token(&fragment.qualifier));
    }
    Ok(parts.join(" "))
}

pub fn encode_rule(
    pattern: &Pattern,
    policy: &GenerationPolicy,
    max_jump: u32,
) -> GenerationResult<String> {
    let hex = encode_hex(pattern, max_jump)?;
    let mut rule = String::new();

    let _ = write!(rule, "rule {}", identifier(&policy.detection_name));
    let mut tags: Vec<String> = Vec::new();
    for tag in policy.tags.iter().map(|t| identifier(t)) {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    if !tags.is_empty() {
        let _ = write!(rule, " : {}", tags.join(" "));
    }
    rule.push_str("\n{\n");

    if !policy.metadata.is_empty() {
        rule.push_str("    meta:\n");
        for entry in &policy.metadata {
            let _ = writeln!(rule, "        {} = {}", identifier(&entry.key), meta_value(&entry.value));
        }
    }
    rule.push_str("    strings:\n");
    let _ = writeln!(rule, "        {STRING_ID} = {{ {hex} }}");
    rule.push_str("    condition:\n");
    let _ = writeln!(rule, "        {STRING_ID}");
    rule.push_str("}\n");
    Ok(rule)
}

/// Rule, tag and meta identifiers: `[A-Za-z0-9_]`, not starting with a digit.
pub fn identifier(name: &str) -> String {
    let mut ident: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident.truncate(MAX_IDENTIFIER_LEN);
    ident
}

fn meta_value(value: &MetaValue) -> String {
    match value {
        MetaValue::String(text) => format!("\"{}\"", escape(text)),
        MetaValue::Int(number) => number.to_string(),
        MetaValue::Bool(flag) => flag.to_string(),
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Parse hex string contents such as `DE ?D [2-4] AD`.
pub fn decode_hex(hex: &str) -> Result<Pattern, DecodeError> {
    let chars: Vec<char> = hex.chars().collect();
    let mut tokens = Vec::new();
    let mut position = 0;
    while position < chars.len() {
        let c = chars[position];
        if c.is_whitespace() {
            position += 1;
        } else if c == '[' {
            let close = chars[position..]
                .iter()
                .position(|c| *c == ']')
                .map(|offset| position + offset)
                .ok_or_else(|| DecodeError::malformed(Dialect::Yara, position, "unclosed '['"))?;
            let inner: String = chars[position + 1..close].iter().collect();
            tokens.push((position, Token::Jump(parse_range(Dialect::Yara, position, &inner)?)));
            position = close + 1;
        } else {
            let token = parse_byte(&chars[position..(position + 2).min(chars.len())])
                .ok_or_else(|| DecodeError::malformed(Dialect::Yara, position, "expected a hex byte"))?;
            tokens.push((position, token));
            position += 2;
        }
    }
    assemble(Dialect::Yara, &tokens)
}

/// Extract and decode the `$sig` hex string of a rule produced by [`encode_rule`].
pub fn decode_rule(rule: &str) -> Result<Pattern, DecodeError> {
    let marker = format!("{STRING_ID} = {{");
    let start = rule
        .find(&marker)
        .map(|at| at + marker.len())
        .ok_or_else(|| DecodeError::malformed(Dialect::Yara, 0, "no $sig hex string"))?;
    let end = rule[start..]
        .find('}')
        .map(|close| start + close)
        .ok_or_else(|| DecodeError::malformed(Dialect::Yara, start, "unclosed hex string"))?;
    decode_hex(&rule[start..end])
}
