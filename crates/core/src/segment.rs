//! Markdown segmentation into slide blocks.
//!
//! A document is split on lines consisting solely of `---`. Blank lines
//! around each section are dropped; sections that are entirely blank are
//! discarded.

use crate::{Error, Result, SlideBlock};
use regex::Regex;
use std::sync::LazyLock;

/// Matches a delimiter line, tolerating spaces or tabs around the dashes.
static DELIMITER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*---[ \t]*$").unwrap());

/// Split markdown into ordered slide blocks.
///
/// Fails with [`Error::EmptyDocument`] when no section has content.
pub fn segment(markdown: &str) -> Result<Vec<SlideBlock>> {
    let normalized = markdown.replace("\r\n", "\n").replace('\r', "\n");

    let blocks: Vec<SlideBlock> = DELIMITER_REGEX
        .split(&normalized)
        .map(trim_blank_lines)
        .filter(|text| !text.is_empty())
        .enumerate()
        .map(|(index, text)| SlideBlock::new(index, text))
        .collect();

    if blocks.is_empty() {
        return Err(Error::EmptyDocument);
    }

    log::debug!("Segmented markdown into {} blocks", blocks.len());
    Ok(blocks)
}

/// Remove leading and trailing whitespace-only lines, keeping inner text verbatim.
fn trim_blank_lines(section: &str) -> &str {
    let lines: Vec<&str> = section.split('\n').collect();

    let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return "";
    };
    // A non-blank line exists, so rposition finds one too.
    let last = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(first);

    // Byte offsets of the retained line range within `section`.
    let start: usize = lines[..first].iter().map(|l| l.len() + 1).sum();
    let end: usize = start
        + lines[first..=last].iter().map(|l| l.len() + 1).sum::<usize>()
        - 1;

    section[start..end].trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(blocks: &[SlideBlock]) -> Vec<&str> {
        blocks.iter().map(|b| b.raw_text.as_str()).collect()
    }

    #[test]
    fn test_three_sections() {
        let input = "# Title\n\n---\n\n# Body\n- a\n- b\n\n---\n\n# Thanks";
        let blocks = segment(input).unwrap();

        assert_eq!(blocks.len(), 3);
        assert_eq!(
            blocks.iter().map(|b| b.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(texts(&blocks), vec!["# Title", "# Body\n- a\n- b", "# Thanks"]);
    }

    #[test]
    fn test_join_round_trip() {
        let originals = vec![
            "# Intro",
            "## Agenda\n1. One\n2. Two",
            "Plain paragraph with --- inside the line",
            "    indented code\n\n  with a blank line",
        ];
        let blocks = segment(&originals.join("\n---\n")).unwrap();

        assert_eq!(texts(&blocks), originals);
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block.index, i);
        }
    }

    #[test]
    fn test_empty_sections_dropped_and_indices_contiguous() {
        let input = "---\n\n# A\n---\n   \n\t\n---\n# B\n---\n";
        let blocks = segment(input).unwrap();

        assert_eq!(texts(&blocks), vec!["# A", "# B"]);
        assert_eq!(blocks[1].index, 1);
    }

    #[test]
    fn test_delimiter_with_surrounding_spaces() {
        let blocks = segment("one\n  ---  \ntwo").unwrap();
        assert_eq!(texts(&blocks), vec!["one", "two"]);
    }

    #[test]
    fn test_longer_rules_are_not_delimiters() {
        let blocks = segment("one\n----\ntwo").unwrap();
        assert_eq!(texts(&blocks), vec!["one\n----\ntwo"]);
    }

    #[test]
    fn test_crlf_input() {
        let blocks = segment("# A\r\n\r\n---\r\n# B\r\n").unwrap();
        assert_eq!(texts(&blocks), vec!["# A", "# B"]);
    }

    #[test]
    fn test_no_delimiter_is_single_block() {
        let blocks = segment("\n\n# Only slide\ntext\n\n").unwrap();
        assert_eq!(texts(&blocks), vec!["# Only slide\ntext"]);
    }

    #[test]
    fn test_empty_document() {
        assert!(matches!(segment(""), Err(Error::EmptyDocument)));
        assert!(matches!(segment("  \n---\n\n---\n"), Err(Error::EmptyDocument)));
    }

    /// A block as the segmenter returns it: no delimiter lines and no
    /// blank or whitespace-padded edges.
    fn block_strategy() -> impl Strategy<Value = String> {
        let edge = "[a-z#*0-9]([ a-z#*0-9-]{0,10}[a-z#*0-9])?";
        let inner = "[ \t a-z#*0-9-]{0,12}"
            .prop_filter("delimiter line", |line| !DELIMITER_REGEX.is_match(line));

        (
            edge,
            prop::option::of((prop::collection::vec(inner, 0..4), edge)),
        )
            .prop_map(|(head, rest)| {
                let mut lines = vec![head];
                if let Some((inner, tail)) = rest {
                    lines.extend(inner);
                    lines.push(tail);
                }
                lines.join("\n")
            })
    }

    proptest! {
        #[test]
        fn test_join_round_trip_generated(
            originals in prop::collection::vec(block_strategy(), 1..6),
        ) {
            let blocks = segment(&originals.join("\n---\n")).unwrap();

            let expected: Vec<&str> = originals.iter().map(String::as_str).collect();
            prop_assert_eq!(texts(&blocks), expected);
            for (i, block) in blocks.iter().enumerate() {
                prop_assert_eq!(block.index, i);
            }
        }
    }
}
