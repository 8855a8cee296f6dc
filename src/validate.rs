//! Input validation for caller-supplied identifiers
//!
//! App names double as DNS labels, file path components, and script
//! arguments, so this is the sole defense against path traversal and
//! argument injection. Every caller-supplied name must pass through here
//! before it is used anywhere else.

/// DNS label length limit
pub const MAX_APP_NAME_LEN: usize = 63;

/// Check whether an app name is safe to use as a path component and argv token.
///
/// Accepts only strings matching `^[a-z][a-z0-9-]*$` of at most 63 bytes.
pub fn is_valid_app_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_APP_NAME_LEN {
        return false;
    }

    let mut bytes = name.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Check whether a port value consists solely of decimal digits.
///
/// No range is enforced; the deploy scripts own port policy.
pub fn is_valid_port(port: &str) -> bool {
    !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())
}
