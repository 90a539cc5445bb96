//! DNS-1035 label mangling
//!
//! Task and step names end up as Kubernetes object names, so they have to
//! match `[a-z]([-a-z0-9]*[a-z0-9])?` and fit in 63 characters.

/// Maximum length of a DNS-1035 label.
pub const MAX_LABEL_LENGTH: usize = 63;

/// Converts free-form text into a DNS-1035 compliant label, appending `-{suffix}`.
///
/// ASCII letters are lowercased, spaces, hyphens and periods collapse into a
/// single hyphen and everything else is dropped. Digits and hyphens are only
/// written once a letter has been written. The body is truncated so that the
/// suffix always fits; the suffix itself is never truncated.
#[must_use]
pub fn mangle_to_rfc1035_label(body: &str, suffix: &str) -> String {
    let max_body_length = MAX_LABEL_LENGTH.saturating_sub(suffix.len() + 1);

    let mut label = String::with_capacity(MAX_LABEL_LENGTH);
    let mut buffered_hyphen = false;

    for c in body.chars() {
        let mut to_write = 0;
        let mut out = c;

        if !label.is_empty() {
            if c == ' ' || c == '-' || c == '.' {
                buffered_hyphen = true;
            } else if c.is_ascii_digit() {
                to_write = 1;
            }
        }

        if c.is_ascii_uppercase() {
            out = c.to_ascii_lowercase();
            to_write = 1;
        } else if c.is_ascii_lowercase() {
            to_write = 1;
        }

        if to_write > 0 {
            if buffered_hyphen {
                to_write += 1;
            }
            if label.len() + to_write > max_body_length {
                break;
            }
            if buffered_hyphen {
                label.push('-');
                buffered_hyphen = false;
            }
            label.push(out);
        }
    }

    if !suffix.is_empty() {
        label.push('-');
        label.push_str(suffix);
    }

    label
}

/// Returns true if `name` contains at least one ASCII letter, which is what
/// guarantees a non-empty mangled body.
#[must_use]
pub fn contains_ascii_letter(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_alphabetic())
}
