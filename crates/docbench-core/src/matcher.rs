//! Longest-matching-block sequence alignment.
//!
//! Ratcliff/Obershelp matching over arbitrary hashable tokens: find the
//! longest contiguous block common to both sequences, then recurse on the
//! pieces to its left and right. The similarity ratio is `2 * M / T` where `M`
//! is the total size of all matched blocks and `T` the combined length.
//!
//! ## Popular elements
//!
//! When the second sequence has [`AUTOJUNK_MIN_LEN`] or more elements, tokens
//! that occur in more than 1% of it (plus one) do not seed matches. They can
//! still be absorbed into a block when they sit right next to one.

// Clippy pedantic allows:
// - Ratio computation uses f64 from usize
// - Short variable names in the alignment loops (a, b, i, j, k)
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::many_single_char_names)]

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Length of `b` at which the popular-element heuristic kicks in.
pub const AUTOJUNK_MIN_LEN: usize = 200;

/// A matched block: `a[a..a + size] == b[b..b + size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Match {
    /// Start index in the first sequence
    pub a: usize,
    /// Start index in the second sequence
    pub b: usize,
    /// Block length
    pub size: usize,
}

/// Aligns two token sequences by recursive longest-block matching.
#[derive(Debug, Clone)]
pub struct SequenceMatcher<'a, T> {
    a: &'a [T],
    b: &'a [T],
    b2j: HashMap<&'a T, Vec<usize>>,
}

impl<'a, T: Eq + Hash> SequenceMatcher<'a, T> {
    /// Index `b` for matching against `a`.
    #[must_use = "creates a sequence matcher"]
    pub fn new(a: &'a [T], b: &'a [T]) -> Self {
        let mut b2j: HashMap<&'a T, Vec<usize>> = HashMap::new();
        for (j, elem) in b.iter().enumerate() {
            b2j.entry(elem).or_default().push(j);
        }

        let n = b.len();
        if n >= AUTOJUNK_MIN_LEN {
            let limit = n / 100 + 1;
            let popular: HashSet<&'a T> = b2j
                .iter()
                .filter(|(_, positions)| positions.len() > limit)
                .map(|(elem, _)| *elem)
                .collect();
            for elem in popular {
                b2j.remove(elem);
            }
        }

        Self { a, b, b2j }
    }

    /// Longest matching block in `a[alo..ahi]` and `b[blo..bhi]`.
    ///
    /// Among equally long blocks the one starting earliest in `a` wins, then
    /// the one starting earliest in `b`. Returns a zero-size match at
    /// `(alo, blo)` when nothing matches.
    #[must_use = "returns the longest match"]
    pub fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Match {
        let (a, b) = (self.a, self.b);
        let mut best = Match {
            a: alo,
            b: blo,
            size: 0,
        };

        // j2len[j] = length of the match ending at a[i - 1], b[j]
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for (i, elem) in a.iter().enumerate().take(ahi).skip(alo) {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(elem) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next.insert(j, k);
                    if k > best.size {
                        best = Match {
                            a: i + 1 - k,
                            b: j + 1 - k,
                            size: k,
                        };
                    }
                }
            }
            j2len = next;
        }

        // Absorb neighbouring equal elements that were excluded from seeding.
        while best.a > alo && best.b > blo && a[best.a - 1] == b[best.b - 1] {
            best.a -= 1;
            best.b -= 1;
            best.size += 1;
        }
        while best.a + best.size < ahi
            && best.b + best.size < bhi
            && a[best.a + best.size] == b[best.b + best.size]
        {
            best.size += 1;
        }

        best
    }

    /// All matching blocks in ascending order, adjacent blocks merged,
    /// followed by the sentinel `Match { a: a.len(), b: b.len(), size: 0 }`.
    #[must_use = "returns matching blocks"]
    pub fn matching_blocks(&self) -> Vec<Match> {
        let (la, lb) = (self.a.len(), self.b.len());
        let mut queue = vec![(0, la, 0, lb)];
        let mut blocks = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let m = self.find_longest_match(alo, ahi, blo, bhi);
            if m.size == 0 {
                continue;
            }
            blocks.push(m);
            if alo < m.a && blo < m.b {
                queue.push((alo, m.a, blo, m.b));
            }
            if m.a + m.size < ahi && m.b + m.size < bhi {
                queue.push((m.a + m.size, ahi, m.b + m.size, bhi));
            }
        }
        blocks.sort_unstable();

        let mut collapsed: Vec<Match> = Vec::with_capacity(blocks.len() + 1);
        for m in blocks {
            match collapsed.last_mut() {
                Some(last) if last.a + last.size == m.a && last.b + last.size == m.b => {
                    last.size += m.size;
                }
                _ => collapsed.push(m),
            }
        }
        collapsed.push(Match {
            a: la,
            b: lb,
            size: 0,
        });
        collapsed
    }

    /// Similarity in `[0, 1]`: `2 * matched / (len(a) + len(b))`.
    ///
    /// Two empty sequences are identical (`1.0`).
    #[must_use = "returns similarity ratio"]
    pub fn ratio(&self) -> f64 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 1.0;
        }
        let matched: usize = self.matching_blocks().iter().map(|m| m.size).sum();
        2.0 * matched as f64 / total as f64
    }
}
