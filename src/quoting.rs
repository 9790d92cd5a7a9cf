//! POSIX shell argument quoting for rendered launch scripts (spec.md §4.5,
//! testable property #6).
//!
//! An argument that is already quoted by the caller (wrapped in a matching
//! pair of single or double quotes) is passed through verbatim — the
//! caller presumably wants shell-special characters inside it interpreted.
//! Everything else is wrapped in double quotes with inner double quotes
//! and backslashes escaped, which a POSIX shell parses back to the exact
//! original string.

/// Quote a single argument for inclusion in a generated shell script.
pub fn quote_argument(arg: &str) -> String {
    if is_already_quoted(arg) {
        return arg.to_string();
    }
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' || c == '$' || c == '`' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn is_already_quoted(arg: &str) -> bool {
    let bytes = arg.as_bytes();
    bytes.len() >= 2
        && ((bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
            || (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"'))
}

/// Render a full argument vector as a space-separated command-line suffix.
pub fn render_argv(args: &[String]) -> String {
    args.iter().map(|a| quote_argument(a)).collect::<Vec<_>>().join(" ")
}
