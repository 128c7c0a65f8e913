pub const MASKED: &str = "••••••••";

const SENSITIVE_FIELDS: [&str; 7] = [
    "password",
    "secret",
    "token",
    "key",
    "cvv",
    "ssn",
    "card_number",
];

/// Whether a form-field name or type looks like it carries a credential
/// or payment value. Matched case-insensitively as a substring.
pub fn is_sensitive_field(field_name: &str) -> bool {
    let lower = field_name.to_lowercase();
    SENSITIVE_FIELDS.iter().any(|f| lower.contains(f))
}

/// Mask a value destined for logs or session events when the field it
/// targets looks sensitive.
pub fn mask_sensitive(value: &str, field_name: &str) -> String {
    if is_sensitive_field(field_name) {
        MASKED.to_string()
    } else {
        value.to_string()
    }
}
