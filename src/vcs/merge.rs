//! Line-based three-way merge used by the in-memory backend.
//!
//! Each side's change against the base is reduced to one replaced region
//! (common prefix and suffix trimmed). The merge is clean when the two regions
//! are disjoint and not adjacent; anything else is a conflict. This is more
//! conservative than diff3 but never silently drops an edit.

use super::TextMerge;

/// Replaced region of the base: `base[start..end]` became `lines`.
struct Hunk<'a> {
    start: usize,
    end: usize,
    lines: &'a [&'a str],
}

pub fn merge_lines(base: &str, ours: &str, theirs: &str) -> TextMerge {
    if ours == theirs || theirs == base {
        return TextMerge::Clean(ours.to_string());
    }
    if ours == base {
        return TextMerge::Clean(theirs.to_string());
    }

    let base_lines: Vec<&str> = base.split_inclusive('\n').collect();
    let our_lines: Vec<&str> = ours.split_inclusive('\n').collect();
    let their_lines: Vec<&str> = theirs.split_inclusive('\n').collect();

    let a = hunk(&base_lines, &our_lines);
    let b = hunk(&base_lines, &their_lines);
    let (first, second) = if a.start <= b.start { (a, b) } else { (b, a) };

    if first.end >= second.start {
        return TextMerge::Conflicted;
    }

    let mut out = String::with_capacity(ours.len().max(theirs.len()));
    out.extend(base_lines[..first.start].iter().copied());
    out.extend(first.lines.iter().copied());
    out.extend(base_lines[first.end..second.start].iter().copied());
    out.extend(second.lines.iter().copied());
    out.extend(base_lines[second.end..].iter().copied());
    TextMerge::Clean(out)
}

fn hunk<'a>(base: &[&str], side: &'a [&'a str]) -> Hunk<'a> {
    let prefix = base
        .iter()
        .zip(side.iter())
        .take_while(|(x, y)| x == y)
        .count();
    let max_suffix = base.len().min(side.len()) - prefix;
    let suffix = base
        .iter()
        .rev()
        .zip(side.iter().rev())
        .take(max_suffix)
        .take_while(|(x, y)| x == y)
        .count();

    Hunk {
        start: prefix,
        end: base.len() - suffix,
        lines: &side[prefix..side.len() - suffix],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "one\ntwo\nthree\nfour\nfive\nsix\n";

    #[test]
    fn disjoint_edits_merge() {
        let ours = "ONE\ntwo\nthree\nfour\nfive\nsix\n";
        let theirs = "one\ntwo\nthree\nfour\nFIVE\nsix\n";
        assert_eq!(
            merge_lines(BASE, ours, theirs),
            TextMerge::Clean("ONE\ntwo\nthree\nfour\nFIVE\nsix\n".into())
        );
    }

    #[test]
    fn overlapping_edits_conflict() {
        let ours = "one\nTWO\nthree\nfour\nfive\nsix\n";
        let theirs = "one\n2\nthree\nfour\nfive\nsix\n";
        assert_eq!(merge_lines(BASE, ours, theirs), TextMerge::Conflicted);
    }

    #[test]
    fn adjacent_edits_conflict() {
        let ours = "one\nTWO\nthree\nfour\nfive\nsix\n";
        let theirs = "one\ntwo\nTHREE\nfour\nfive\nsix\n";
        assert_eq!(merge_lines(BASE, ours, theirs), TextMerge::Conflicted);
    }

    #[test]
    fn append_and_prepend_merge() {
        let ours = "zero\none\ntwo\nthree\nfour\nfive\nsix\n";
        let theirs = "one\ntwo\nthree\nfour\nfive\nsix\nseven\n";
        assert_eq!(
            merge_lines(BASE, ours, theirs),
            TextMerge::Clean("zero\none\ntwo\nthree\nfour\nfive\nsix\nseven\n".into())
        );
    }

    #[test]
    fn identical_edits_are_clean() {
        let both = "one\nTWO\nthree\nfour\nfive\nsix\n";
        assert_eq!(merge_lines(BASE, both, both), TextMerge::Clean(both.into()));
    }
}
