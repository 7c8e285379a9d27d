//! Split long messages on line boundaries.

/// Split `text` into chunks of at most `max_len` characters.
///
/// Lines are never broken: a single line longer than `max_len` becomes its
/// own oversized chunk. Joining the result with `'\n'` gives back `text`.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        if !buf.is_empty() && len + line_len + 1 > max_len {
            chunks.push(buf.join("\n"));
            buf.clear();
            len = 0;
        }
        buf.push(line);
        len += line_len + 1;
    }
    if !buf.is_empty() {
        chunks.push(buf.join("\n"));
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(split_message("a\nb", 10), vec!["a\nb".to_string()]);
        assert_eq!(split_message("", 10), vec![String::new()]);
    }

    #[test]
    fn splits_on_line_boundaries_within_limit() {
        let text = "aaaa\nbbbb\ncccc\ndddd";
        let chunks = split_message(text, 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb", "cccc\ndddd"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn oversized_line_stands_alone() {
        let long = "x".repeat(25);
        let text = format!("head\n{long}\ntail");
        let chunks = split_message(&text, 10);
        assert_eq!(chunks, vec!["head".to_string(), long, "tail".to_string()]);
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 5 Cyrillic chars = 10 bytes.
        let text = "абвгд\nежзий";
        assert_eq!(split_message(text, 11).len(), 1);
        assert_eq!(split_message(text, 10).len(), 2);
    }

    #[test]
    fn round_trip_preserves_blank_lines() {
        let line = "строка поручения";
        let text = (0..400)
            .map(|i| if i % 7 == 0 { String::new() } else { format!("{line} {i}") })
            .collect::<Vec<_>>()
            .join("\n");

        let chunks = split_message(&text, 4096);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 4096));
        assert_eq!(chunks.join("\n"), text);
    }
}
