// src/core/access/names.rs

/// Canonicalizes a door or user name to snake_case.
///
/// Uppercase ASCII letters are lowered, and an underscore is inserted before an
/// uppercase letter only when the preceding character is a lowercase letter.
/// `NewDoor`, `newDoor` and `new_door` all map to `new_door`; `HTTPGate` maps
/// to `httpgate`. Applying it twice gives the same result as applying it once.
pub fn to_snake_case(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 4);
    let mut prev_lower = false;
    for c in input.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            result.push(c);
            prev_lower = c.is_ascii_lowercase();
        }
    }
    result
}
