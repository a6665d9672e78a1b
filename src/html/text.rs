//! Text cleanup for human-facing SEO fields.

/// Collapses runs of whitespace into single spaces and trims the ends.
///
/// Entity decoding has already happened by the time text reaches this
/// function: the HTML parser decodes entities in both element text and
/// attribute values.
pub(crate) fn clean_human_text(value: &str) -> String {
    collapse_whitespace(value).trim().to_string()
}

fn collapse_whitespace(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut previous_space = false;

    for ch in value.chars() {
        if ch.is_whitespace() {
            if !previous_space {
                out.push(' ');
                previous_space = true;
            }
            continue;
        }

        out.push(ch);
        previous_space = false;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_inner_whitespace() {
        assert_eq!(clean_human_text("a  b\t\nc"), "a b c");
    }

    #[test]
    fn test_trims_ends() {
        assert_eq!(clean_human_text("  hello world  "), "hello world");
    }

    #[test]
    fn test_empty_stays_empty() {
        assert_eq!(clean_human_text(""), "");
        assert_eq!(clean_human_text("   \n\t "), "");
    }

    #[test]
    fn test_unicode_whitespace() {
        assert_eq!(clean_human_text("a\u{00a0}b"), "a b");
    }
}
