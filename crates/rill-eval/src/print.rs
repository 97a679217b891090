//! Value printing.
//!
//! Integers print in decimal with `~` for the negative sign. Reals print
//! as the shortest round-trip decimal, normalized to always carry a
//! fraction or an exponent, with `inf`/`~inf`/`nan` for the non-finite
//! values. Strings and characters use the ML escape set. Collections
//! wider than the wrap threshold break one element per line with
//! two-space indentation.

use crate::value::Value;

/// Collections whose one-line form exceeds this many characters wrap.
const WRAP_WIDTH: usize = 79;

/// Print a value in the REPL's value grammar.
pub fn print_value(value: &Value) -> String {
    let flat = flat_value(value, false);
    if flat.len() <= WRAP_WIDTH {
        return flat;
    }
    wrapped_value(value)
}

/// One-line form. `atom` requests parentheses around constructor
/// applications, as needed for constructor arguments.
fn flat_value(value: &Value, atom: bool) -> String {
    match value {
        Value::Int(n) => n.to_string().replace('-', "~"),
        Value::Real(r) => format_real(*r),
        Value::Bool(b) => b.to_string(),
        Value::Char(c) => format!("#\"{}\"", escape_char(*c)),
        Value::Str(s) => format!("\"{}\"", escape_string(s)),
        Value::Unit => "()".to_string(),
        Value::Record(fields) => {
            let is_tuple = fields.len() >= 2
                && fields
                    .iter()
                    .enumerate()
                    .all(|(i, (l, _))| l.as_str() == (i + 1).to_string());
            if is_tuple {
                let body = fields
                    .iter()
                    .map(|(_, v)| flat_value(v, false))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({body})")
            } else {
                let body = fields
                    .iter()
                    .map(|(l, v)| format!("{l} = {}", flat_value(v, false)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{body}}}")
            }
        }
        Value::List(items) => {
            let body = items
                .iter()
                .map(|v| flat_value(v, false))
                .collect::<Vec<_>>()
                .join(", ");
            format!("[{body}]")
        }
        Value::Bag(items) => {
            let body = items
                .iter()
                .map(|v| flat_value(v, false))
                .collect::<Vec<_>>()
                .join(", ");
            format!("[{body}]")
        }
        Value::Ctor { name, arg, .. } => match arg {
            None => name.to_string(),
            Some(payload) => {
                let text = format!("{name} {}", flat_value(payload, true));
                if atom {
                    format!("({text})")
                } else {
                    text
                }
            }
        },
        Value::Exn(exn) => match &exn.payload {
            None => exn.name.clone(),
            Some(payload) => format!("{} {}", exn.name, flat_value(payload, true)),
        },
        Value::Closure(_) | Value::Builtin(_) | Value::Overload(_) => "fn".to_string(),
    }
}

/// Multi-line form: elements one per line, two-space indented.
fn wrapped_value(value: &Value) -> String {
    let (open, close, items): (&str, &str, Vec<String>) = match value {
        Value::List(items) | Value::Bag(items) => (
            "[",
            "]",
            items.iter().map(|v| flat_value(v, false)).collect(),
        ),
        Value::Record(fields) => {
            let is_tuple = fields.len() >= 2
                && fields
                    .iter()
                    .enumerate()
                    .all(|(i, (l, _))| l.as_str() == (i + 1).to_string());
            if is_tuple {
                (
                    "(",
                    ")",
                    fields.iter().map(|(_, v)| flat_value(v, false)).collect(),
                )
            } else {
                (
                    "{",
                    "}",
                    fields
                        .iter()
                        .map(|(l, v)| format!("{l} = {}", flat_value(v, false)))
                        .collect(),
                )
            }
        }
        other => return flat_value(other, false),
    };
    let mut out = String::from(open);
    for (i, item) in items.iter().enumerate() {
        out.push('\n');
        out.push_str("  ");
        out.push_str(item);
        if i + 1 < items.len() {
            out.push(',');
        }
    }
    out.push('\n');
    out.push_str(close);
    out
}

/// Shortest round-trip decimal with ML spelling.
fn format_real(r: f64) -> String {
    if r.is_nan() {
        return "nan".to_string();
    }
    if r.is_infinite() {
        return if r < 0.0 { "~inf" } else { "inf" }.to_string();
    }
    // Magnitudes of 1e7 and up, or below 1e-3, switch to exponent form,
    // matching JDK shortest-decimal printing.
    let magnitude = r.abs();
    let text = if magnitude != 0.0 && (magnitude >= 1e7 || magnitude < 1e-3) {
        // Exponent form, with a fractional mantissa: 1.0E7, 2.5E~8.
        let exp = format!("{r:e}");
        let (mantissa, exponent) = exp
            .split_once('e')
            .expect("exponent format always contains e");
        let mantissa = if mantissa.contains('.') {
            mantissa.to_string()
        } else {
            format!("{mantissa}.0")
        };
        format!("{mantissa}E{exponent}")
    } else {
        let plain = format!("{r}");
        if plain.contains('.') {
            plain
        } else {
            format!("{plain}.0")
        }
    };
    text.replace('-', "~")
}

fn escape_char(c: char) -> String {
    match c {
        '\\' => "\\\\".to_string(),
        '"' => "\\\"".to_string(),
        '\n' => "\\n".to_string(),
        '\t' => "\\t".to_string(),
        '\r' => "\\r".to_string(),
        '\u{0007}' => "\\a".to_string(),
        '\u{0008}' => "\\b".to_string(),
        '\u{000B}' => "\\v".to_string(),
        '\u{000C}' => "\\f".to_string(),
        c if (c as u32) < 32 => format!("\\^{}", char::from(b'@' + c as u8)),
        c => c.to_string(),
    }
}

fn escape_string(s: &str) -> String {
    s.chars().map(escape_char).collect()
}
