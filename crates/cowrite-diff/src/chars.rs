//! Character-level diff (Myers, O((N+M)D)).
//!
//! Output is normalized: unchanged runs alternate with change groups, and
//! inside a group every removal comes before every addition.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Unchanged,
    Removed,
    Added,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub text: String,
}

impl Change {
    fn new(kind: ChangeKind, text: String) -> Self {
        Self { kind, text }
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Keep(char),
    Delete(char),
    Insert(char),
}

/// Diff `old` against `new` by characters.
pub fn diff_chars(old: &str, new: &str) -> Vec<Change> {
    let a: Vec<char> = old.chars().collect();
    let b: Vec<char> = new.chars().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mut ops: Vec<Op> = a[..prefix].iter().map(|&c| Op::Keep(c)).collect();
    ops.extend(myers(&a[prefix..a.len() - suffix], &b[prefix..b.len() - suffix]));
    ops.extend(a[a.len() - suffix..].iter().map(|&c| Op::Keep(c)));

    group(&ops)
}

fn myers(a: &[char], b: &[char]) -> Vec<Op> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = n + m;
    if max == 0 {
        return Vec::new();
    }
    let offset = max;
    let at = |k: isize| (k + offset) as usize;

    let mut v = vec![0isize; (2 * max + 1) as usize];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    'search: for d in 0..=max {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let mut x = if k == -d || (k != d && v[at(k - 1)] < v[at(k + 1)]) {
                v[at(k + 1)]
            } else {
                v[at(k - 1)] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[at(k)] = x;
            if x >= n && y >= m {
                break 'search;
            }
            k += 2;
        }
    }

    let mut ops = Vec::with_capacity((n.max(m)) as usize);
    let (mut x, mut y) = (n, m);
    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let prev_k = if k == -d || (k != d && v[at(k - 1)] < v[at(k + 1)]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[at(prev_k)];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            ops.push(Op::Keep(a[(x - 1) as usize]));
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            if x == prev_x {
                ops.push(Op::Insert(b[(y - 1) as usize]));
                y -= 1;
            } else {
                ops.push(Op::Delete(a[(x - 1) as usize]));
                x -= 1;
            }
        }
    }
    ops.reverse();
    ops
}

fn group(ops: &[Op]) -> Vec<Change> {
    let mut out = Vec::new();
    let mut kept = String::new();
    let mut removed = String::new();
    let mut added = String::new();

    let flush_changes = |out: &mut Vec<Change>, removed: &mut String, added: &mut String| {
        if !removed.is_empty() {
            out.push(Change::new(ChangeKind::Removed, std::mem::take(removed)));
        }
        if !added.is_empty() {
            out.push(Change::new(ChangeKind::Added, std::mem::take(added)));
        }
    };

    for op in ops {
        match *op {
            Op::Keep(c) => {
                flush_changes(&mut out, &mut removed, &mut added);
                kept.push(c);
            }
            Op::Delete(c) | Op::Insert(c) => {
                if !kept.is_empty() {
                    out.push(Change::new(ChangeKind::Unchanged, std::mem::take(&mut kept)));
                }
                if matches!(op, Op::Delete(_)) {
                    removed.push(c);
                } else {
                    added.push(c);
                }
            }
        }
    }
    flush_changes(&mut out, &mut removed, &mut added);
    if !kept.is_empty() {
        out.push(Change::new(ChangeKind::Unchanged, kept));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rebuild(changes: &[Change]) -> (String, String) {
        let mut old = String::new();
        let mut new = String::new();
        for c in changes {
            match c.kind {
                ChangeKind::Unchanged => {
                    old.push_str(&c.text);
                    new.push_str(&c.text);
                }
                ChangeKind::Removed => old.push_str(&c.text),
                ChangeKind::Added => new.push_str(&c.text),
            }
        }
        (old, new)
    }

    fn kinds(changes: &[Change]) -> Vec<(ChangeKind, &str)> {
        changes.iter().map(|c| (c.kind, c.text.as_str())).collect()
    }

    #[test]
    fn identical_and_empty_inputs() {
        assert!(diff_chars("", "").is_empty());
        assert_eq!(
            kinds(&diff_chars("same", "same")),
            vec![(ChangeKind::Unchanged, "same")]
        );
        assert_eq!(kinds(&diff_chars("", "new")), vec![(ChangeKind::Added, "new")]);
        assert_eq!(kinds(&diff_chars("old", "")), vec![(ChangeKind::Removed, "old")]);
    }

    #[test]
    fn single_word_replacement() {
        let changes = diff_chars("the cat sat", "the dog sat");
        assert_eq!(
            kinds(&changes),
            vec![
                (ChangeKind::Unchanged, "the "),
                (ChangeKind::Removed, "cat"),
                (ChangeKind::Added, "dog"),
                (ChangeKind::Unchanged, " sat"),
            ]
        );
    }

    #[test]
    fn removal_precedes_addition_in_each_group() {
        let changes = diff_chars("abcxyz", "aXbYcZ");
        for pair in changes.windows(2) {
            assert!(!(pair[0].kind == ChangeKind::Added && pair[1].kind == ChangeKind::Removed));
            assert!(!(pair[0].kind == ChangeKind::Unchanged && pair[1].kind == ChangeKind::Unchanged));
        }
        assert_eq!(rebuild(&changes), ("abcxyz".into(), "aXbYcZ".into()));
    }

    #[test]
    fn reconstructs_both_sides() {
        let cases = [
            ("kitten", "sitting"),
            ("The quick brown fox.", "A quick red fox jumped."),
            ("héllo wörld", "hello world!"),
            ("abc", "cba"),
            ("para one\n\npara two", "para one\n\npara 2\n\nthree"),
        ];
        for (old, new) in cases {
            assert_eq!(rebuild(&diff_chars(old, new)), (old.to_string(), new.to_string()));
        }
    }

    #[test]
    fn edit_is_minimal_for_simple_cases() {
        let changes = diff_chars("kitten", "sitting");
        let edited: usize = changes
            .iter()
            .filter(|c| c.kind != ChangeKind::Unchanged)
            .map(Change::len)
            .sum();
        // k->s, e->i, +g
        assert_eq!(edited, 5);
    }
}
