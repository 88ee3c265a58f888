//! Lexical spaces of the builtin primitives

use crate::component::Primitive;
use crate::error::SchemaError;
use crate::qname::NamespaceContext;
use crate::value::XmlValue;

/// Parse `text` as a literal of `primitive`.
///
/// Every primitive except `xs:string` collapses whitespace first. QName
/// literals resolve their prefix through `ns`; without a context only
/// unprefixed names are accepted.
pub fn parse(
    primitive: Primitive,
    text: &str,
    ns: Option<&NamespaceContext>,
) -> Result<XmlValue, SchemaError> {
    if primitive == Primitive::String {
        return Ok(XmlValue::String(text.to_string()));
    }

    let collapsed = collapse_whitespace(text);
    let invalid = |reason: &str| SchemaError::InvalidLexical {
        primitive,
        text: text.to_string(),
        reason: reason.to_string(),
    };

    match primitive {
        Primitive::String => Ok(XmlValue::String(text.to_string())),
        Primitive::Boolean => match collapsed.as_str() {
            "true" | "1" => Ok(XmlValue::Boolean(true)),
            "false" | "0" => Ok(XmlValue::Boolean(false)),
            _ => Err(invalid("expected true, false, 1 or 0")),
        },
        Primitive::Integer => {
            let digits = collapsed.strip_prefix(['+', '-']).unwrap_or(&collapsed);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("expected an optionally signed sequence of digits"));
            }
            collapsed
                .parse::<i64>()
                .map(XmlValue::Integer)
                .map_err(|_| invalid("out of range for a 64-bit integer"))
        }
        Primitive::Decimal => canonical_decimal(&collapsed)
            .map(XmlValue::Decimal)
            .ok_or_else(|| invalid("expected digits with an optional sign and fraction")),
        Primitive::Double => parse_double(&collapsed)
            .map(XmlValue::Double)
            .ok_or_else(|| invalid("expected a floating point literal, INF, -INF or NaN")),
        Primitive::AnyUri => Ok(XmlValue::AnyUri(collapsed)),
        Primitive::QName => {
            let name = match ns {
                Some(ctx) => ctx.resolve_qname(&collapsed)?,
                None => NamespaceContext::new().resolve_qname(&collapsed)?,
            };
            Ok(XmlValue::QName(name))
        }
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical form: no leading `+`, no redundant zeros, no `-0`
fn canonical_decimal(text: &str) -> Option<String> {
    let (negative, unsigned) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    let no_digits = int_part.is_empty() && frac_part.is_empty();
    if no_digits || !all_digits(int_part) || !all_digits(frac_part) {
        return None;
    }

    let int_part = match int_part.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    let frac_part = frac_part.trim_end_matches('0');

    let mut canonical = String::new();
    if negative && (int_part != "0" || !frac_part.is_empty()) {
        canonical.push('-');
    }
    canonical.push_str(int_part);
    if !frac_part.is_empty() {
        canonical.push('.');
        canonical.push_str(frac_part);
    }
    Some(canonical)
}

fn parse_double(text: &str) -> Option<f64> {
    match text {
        "INF" | "+INF" => return Some(f64::INFINITY),
        "-INF" => return Some(f64::NEG_INFINITY),
        "NaN" => return Some(f64::NAN),
        _ => {}
    }
    // Rust also accepts "inf" and "nan" spellings, which XML does not
    if text.is_empty()
        || !text
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
    {
        return None;
    }
    text.parse().ok()
}
