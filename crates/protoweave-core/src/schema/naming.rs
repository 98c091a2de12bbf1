//! Name conversions between proto and JSON spellings.

/// Convert a snake_case name to lowerCamelCase.
///
/// This is the default JSON name of a field: underscores are dropped and
/// the character after each one is upper-cased. Other characters are kept
/// as written.
pub fn to_lower_camel_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = false;

    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }

    result
}

/// Convert a snake_case name to UpperCamelCase
pub fn to_upper_camel_case(s: &str) -> String {
    let lower = to_lower_camel_case(s);
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Convert a lowerCamelCase name back to snake_case.
///
/// Returns `None` if the input already contains an underscore, since such a
/// name could not have been produced by [`to_lower_camel_case`].
pub fn camel_to_snake_case(s: &str) -> Option<String> {
    if s.contains('_') {
        return None;
    }
    let mut result = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            result.push('_');
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    Some(result)
}

/// Returns true if `s` survives a snake -> camel -> snake round trip
pub fn is_reversible_snake_case(s: &str) -> bool {
    let mut prev_underscore = false;
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            return false;
        }
        if prev_underscore && !c.is_ascii_lowercase() {
            return false;
        }
        prev_underscore = c == '_';
    }
    !prev_underscore
}
