//! Turns the loosely typed argument list of a hook call into the message string.
//!
//! The rules, in order:
//!
//! 1. No arguments give an empty message.
//! 2. A single [`Arg::List`] is unpacked and its items become the arguments.
//! 3. A single string is the message.
//! 4. A string followed by more arguments is a printf-style template, see [`sprintf`].
//! 5. Anything else is the concatenation of the arguments' default forms.

use std::fmt;

/// A single argument of a hook call.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Json(serde_json::Value),
    List(Vec<Arg>),
    Nil,
}

/// Builds a `&[Arg]` from anything that converts into an [`Arg`].
///
/// ```
/// use slog_gcplog::{args, format::log_string};
/// assert_eq!(log_string(args!("%s-%d", "a", 1)), "a-1");
/// ```
#[macro_export]
macro_rules! args {
    () => {{
        let empty: &[$crate::Arg] = &[];
        empty
    }};
    ($($arg:expr),+ $(,)?) => {
        &[$($crate::Arg::from($arg)),+][..]
    };
}

impl Arg {
    fn type_name(&self) -> &'static str {
        match self {
            Arg::Str(_) => "str",
            Arg::Int(_) => "i64",
            Arg::Uint(_) => "u64",
            Arg::Float(_) => "f64",
            Arg::Bool(_) => "bool",
            Arg::Json(_) => "json",
            Arg::List(_) => "list",
            Arg::Nil => "nil",
        }
    }

    // JSON scalars format like their native counterparts
    fn from_json_scalar(value: &serde_json::Value) -> Option<Arg> {
        use serde_json::Value;
        match value {
            Value::Null => Some(Arg::Nil),
            Value::Bool(b) => Some(Arg::Bool(*b)),
            Value::String(s) => Some(Arg::Str(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(Arg::Int)
                .or_else(|| n.as_u64().map(Arg::Uint))
                .or_else(|| n.as_f64().map(Arg::Float)),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Str(s) => f.write_str(s),
            Arg::Int(i) => write!(f, "{i}"),
            Arg::Uint(u) => write!(f, "{u}"),
            Arg::Float(v) => {
                let s = render_float('v', &Spec::default(), *v).unwrap_or_default();
                f.write_str(&s)
            }
            Arg::Bool(b) => write!(f, "{b}"),
            Arg::Json(v) => match v {
                serde_json::Value::String(s) => f.write_str(s),
                other => write!(f, "{other}"),
            },
            Arg::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Arg::Nil => f.write_str("<nil>"),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<&String> for Arg {
    fn from(s: &String) -> Self {
        Arg::Str(s.clone())
    }
}

impl From<char> for Arg {
    fn from(c: char) -> Self {
        Arg::Str(c.to_string())
    }
}

macro_rules! impl_from_int {
    ($variant:ident, $target:ty, $($t:ty),+) => {
        $(
            impl From<$t> for Arg {
                fn from(v: $t) -> Self {
                    Arg::$variant(v as $target)
                }
            }
        )+
    };
}

impl_from_int!(Int, i64, i8, i16, i32, i64, isize);
impl_from_int!(Uint, u64, u8, u16, u32, u64, usize);

impl From<f32> for Arg {
    fn from(v: f32) -> Self {
        Arg::Float(f64::from(v))
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Float(v)
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Bool(b)
    }
}

impl From<serde_json::Value> for Arg {
    fn from(v: serde_json::Value) -> Self {
        Arg::Json(v)
    }
}

impl From<Vec<Arg>> for Arg {
    fn from(items: Vec<Arg>) -> Self {
        Arg::List(items)
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(v: Option<T>) -> Self {
        v.map_or(Arg::Nil, Into::into)
    }
}

/// Flattens the arguments of a hook call into the message string.
pub fn log_string(args: &[Arg]) -> String {
    let args = match args {
        [Arg::List(inner)] => inner.as_slice(),
        _ => args,
    };

    match args {
        [] => String::new(),
        [Arg::Str(message)] => message.clone(),
        [Arg::Str(template), rest @ ..] => sprintf(template, rest),
        _ => args.iter().map(ToString::to_string).collect(),
    }
}

#[derive(Default)]
struct Spec {
    minus: bool,
    plus: bool,
    zero: bool,
    space: bool,
    sharp: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

// Widths and precisions above this are rejected instead of allocated
const MAX_WIDTH: usize = 1_000_000;

/// Formats `template` with positional arguments.
///
/// Supported: flags `-+0 #`, a width, a `.precision` and the verbs `v s q d b o x X c f F e E
/// g G t %`. Problems are written into the output instead of failing:
///
/// - `%!d(str=a)` an argument that does not fit the verb
/// - `%!d(MISSING)` no argument left for the verb
/// - `%!(NOVERB)` a template ending in `%`
/// - `%!(EXTRA i64=1, str=b)` arguments left over
/// - `%!(BADWIDTH)` / `%!(BADPREC)` a width or precision above 1000000, which is then ignored
pub fn sprintf(template: &str, args: &[Arg]) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut next = 0;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.minus = true,
                '+' => spec.plus = true,
                '0' => spec.zero = true,
                ' ' => spec.space = true,
                '#' => spec.sharp = true,
                _ => break,
            }
            chars.next();
        }
        spec.width = take_number(&mut chars);
        if spec.width.is_some_and(|width| width > MAX_WIDTH) {
            spec.width = None;
            out.push_str("%!(BADWIDTH)");
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(take_number(&mut chars).unwrap_or(0));
            if spec.precision.is_some_and(|precision| precision > MAX_WIDTH) {
                spec.precision = None;
                out.push_str("%!(BADPREC)");
            }
        }

        let verb = match chars.next() {
            Some(verb) => verb,
            None => {
                out.push_str("%!(NOVERB)");
                break;
            }
        };
        if verb == '%' {
            out.push('%');
            continue;
        }

        match args.get(next) {
            Some(arg) => {
                next += 1;
                out.push_str(&render(verb, &spec, arg));
            }
            None => {
                out.push_str("%!");
                out.push(verb);
                out.push_str("(MISSING)");
            }
        }
    }

    if next < args.len() {
        let extra: Vec<String> = args[next..]
            .iter()
            .map(|arg| match arg {
                Arg::Nil => "<nil>".to_string(),
                arg => format!("{}={}", arg.type_name(), arg),
            })
            .collect();
        out.push_str("%!(EXTRA ");
        out.push_str(&extra.join(", "));
        out.push(')');
    }
    out
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut n: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = Some(n.unwrap_or(0).saturating_mul(10).saturating_add(d as usize));
        chars.next();
    }
    n
}

fn render(verb: char, spec: &Spec, arg: &Arg) -> String {
    let formatted = match arg {
        Arg::Str(s) => render_str(verb, spec, s).map(|s| (s, false)),
        Arg::Int(i) => render_int(verb, spec, *i < 0, i.unsigned_abs()).map(|s| (s, true)),
        Arg::Uint(u) => render_int(verb, spec, false, *u).map(|s| (s, true)),
        Arg::Float(v) => render_float(verb, spec, *v).map(|s| (s, true)),
        Arg::Bool(b) => matches!(verb, 't' | 'v').then(|| (b.to_string(), false)),
        Arg::Json(value) => match Arg::from_json_scalar(value) {
            Some(scalar) => return render(verb, spec, &scalar),
            None => matches!(verb, 'v' | 's').then(|| (value.to_string(), false)),
        },
        Arg::List(items) => {
            let inner: Vec<String> = items.iter().map(|item| render(verb, spec, item)).collect();
            return format!("[{}]", inner.join(" "));
        }
        Arg::Nil => (verb == 'v').then(|| ("<nil>".to_string(), false)),
    };

    match formatted {
        Some((s, numeric)) => pad(s, spec, numeric),
        None => bad_verb(verb, arg),
    }
}

fn bad_verb(verb: char, arg: &Arg) -> String {
    match arg {
        Arg::Nil => format!("%!{verb}(<nil>)"),
        arg => format!("%!{verb}({}={})", arg.type_name(), arg),
    }
}

fn pad(s: String, spec: &Spec, numeric: bool) -> String {
    let len = s.chars().count();
    let fill = match spec.width {
        Some(width) if width > len => width - len,
        _ => return s,
    };

    if spec.minus {
        format!("{s}{}", " ".repeat(fill))
    } else if spec.zero && numeric {
        let sign_len = usize::from(s.starts_with(['+', '-', ' ']));
        let (sign, digits) = s.split_at(sign_len);
        format!("{sign}{}{digits}", "0".repeat(fill))
    } else {
        format!("{}{s}", " ".repeat(fill))
    }
}

fn sign(spec: &Spec, negative: bool) -> &'static str {
    if negative {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    }
}

fn render_str(verb: char, spec: &Spec, s: &str) -> Option<String> {
    let s: String = match spec.precision {
        Some(p) => s.chars().take(p).collect(),
        None => s.to_string(),
    };
    match verb {
        's' | 'v' => Some(s),
        'q' => Some(format!("{s:?}")),
        'x' => Some(s.bytes().map(|b| format!("{b:02x}")).collect()),
        'X' => Some(s.bytes().map(|b| format!("{b:02X}")).collect()),
        _ => None,
    }
}

fn render_int(verb: char, spec: &Spec, negative: bool, magnitude: u64) -> Option<String> {
    let (prefix, digits) = match verb {
        'd' | 'v' => ("", magnitude.to_string()),
        'b' => ("0b", format!("{magnitude:b}")),
        'o' => ("0", format!("{magnitude:o}")),
        'x' => ("0x", format!("{magnitude:x}")),
        'X' => ("0X", format!("{magnitude:X}")),
        'c' | 'q' => {
            let c = u32::try_from(magnitude)
                .ok()
                .filter(|_| !negative)
                .and_then(char::from_u32)
                .unwrap_or(char::REPLACEMENT_CHARACTER);
            return Some(if verb == 'q' { format!("{c:?}") } else { c.to_string() });
        }
        _ => return None,
    };

    let digits = match spec.precision {
        Some(p) if p > digits.len() => format!("{}{digits}", "0".repeat(p - digits.len())),
        _ => digits,
    };
    let prefix = if spec.sharp { prefix } else { "" };
    Some(format!("{}{prefix}{digits}", sign(spec, negative)))
}

fn render_float(verb: char, spec: &Spec, v: f64) -> Option<String> {
    if !matches!(verb, 'v' | 'f' | 'F' | 'e' | 'E' | 'g' | 'G') {
        return None;
    }
    if v.is_nan() {
        return Some("NaN".to_string());
    }
    if v.is_infinite() {
        return Some(if v < 0.0 { "-Inf" } else { "+Inf" }.to_string());
    }

    let negative = v.is_sign_negative() && v != 0.0;
    let abs = v.abs();
    let body = match verb {
        'f' | 'F' => format!("{:.*}", spec.precision.unwrap_or(6), abs),
        'e' => format_exponent(abs, spec.precision.unwrap_or(6), false),
        'E' => format_exponent(abs, spec.precision.unwrap_or(6), true),
        'G' => format_general(abs, spec.precision, spec.sharp, true),
        _ => format_general(abs, spec.precision, spec.sharp, false),
    };
    Some(format!("{}{body}", sign(spec, negative)))
}

// Rust writes `1.5e3`, the conventional printf form is `1.5e+03`
fn fix_exponent(sci: &str, upper: bool) -> String {
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci.to_string();
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    let e = if upper { 'E' } else { 'e' };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{e}{sign}{:02}", exp.abs())
}

fn format_exponent(v: f64, precision: usize, upper: bool) -> String {
    fix_exponent(&format!("{v:.precision$e}"), upper)
}

fn strip_trailing_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

// %g: shortest representation, switching to exponent form for very large or small values
fn format_general(v: f64, precision: Option<usize>, keep_zeros: bool, upper: bool) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    let sci = match precision {
        Some(p) => format!("{:.*e}", p.max(1) - 1, v),
        None => format!("{v:e}"),
    };
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    let threshold = precision.map_or(6, |p| p.max(1) as i32);

    if exp < -4 || exp >= threshold {
        let mantissa = if keep_zeros {
            mantissa
        } else {
            strip_trailing_zeros(mantissa)
        };
        fix_exponent(&format!("{mantissa}e{exp}"), upper)
    } else {
        let fixed = match precision {
            Some(p) => format!("{:.*}", (p.max(1) as i32 - 1 - exp).max(0) as usize, v),
            None => format!("{v}"),
        };
        if keep_zeros {
            fixed
        } else {
            strip_trailing_zeros(&fixed).to_string()
        }
    }
}
