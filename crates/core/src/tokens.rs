//! Token estimation shared by the Prompt Assembler and the Streaming Transport.

use unicode_segmentation::UnicodeSegmentation;

/// `ceil(len(text) / 4) + 1`, counted in Unicode grapheme clusters rather than
/// bytes so multi-byte sequences don't inflate the estimate.
pub fn estimate_tokens(text: &str) -> usize {
    let len = text.graphemes(true).count();
    len.div_ceil(4) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_one_token() {
        assert_eq!(estimate_tokens(""), 1);
    }

    #[test]
    fn rounds_up() {
        // 5 chars -> ceil(5/4) + 1 = 2 + 1 = 3
        assert_eq!(estimate_tokens("abcde"), 3);
    }

    #[test]
    fn four_chars_exact() {
        assert_eq!(estimate_tokens("abcd"), 2);
    }
}
