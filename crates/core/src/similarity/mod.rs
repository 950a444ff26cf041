//! Function fingerprinting (context-triggered piecewise hashing).
//!
//! The default hasher emits spamsum-style digests `blockSize:part1:part2`: the
//! input is cut into pieces wherever a rolling hash over the last seven bytes hits
//! a block-size dependent trigger, and each piece contributes one base64 character.
//! `part2` is the same walk at twice the block size. Two digests are compared by
//! edit distance over compatible block sizes.

use std::collections::HashSet;

use crate::model::Fingerprint;

/// Produces and compares function fingerprints.
///
/// `compare` returns a score in `[0, 100]`. It need not be symmetric, but
/// `compare(x, x)` must be 100.
pub trait FingerprintHasher: Send + Sync {
    fn hash(&self, bytes: &[u8]) -> Fingerprint;
    fn compare(&self, a: &str, b: &str) -> u8;
}

const ROLLING_WINDOW: usize = 7;
const MIN_BLOCKSIZE: u32 = 3;
const SPAMSUM_LENGTH: usize = 64;
const HASH_PRIME: u32 = 0x0100_0193;
const HASH_INIT: u32 = 0x2802_1967;
/// Block size from which the small-block score cap no longer applies.
const UNCAPPED_BLOCKSIZE: u32 =
    (99 + ROLLING_WINDOW as u32) / ROLLING_WINDOW as u32 * MIN_BLOCKSIZE;
/// Runs of the same character longer than this are collapsed before comparison.
const MAX_RUN: usize = 3;

const B64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Spamsum-compatible fuzzy hasher.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpamsumHasher;

impl SpamsumHasher {
    pub fn new() -> Self {
        Self
    }
}

impl FingerprintHasher for SpamsumHasher {
    fn hash(&self, bytes: &[u8]) -> Fingerprint {
        Fingerprint::from_hasher_output(spamsum(bytes))
    }

    fn compare(&self, a: &str, b: &str) -> u8 {
        compare_digests(a, b)
    }
}

#[derive(Default)]
struct RollingState {
    window: [u8; ROLLING_WINDOW],
    h1: u32,
    h2: u32,
    h3: u32,
    n: usize,
}

impl RollingState {
    fn roll(&mut self, c: u8) -> u32 {
        let c32 = u32::from(c);
        self.h2 = self.h2.wrapping_sub(self.h1);
        self.h2 = self.h2.wrapping_add((ROLLING_WINDOW as u32).wrapping_mul(c32));

        self.h1 = self.h1.wrapping_add(c32);
        self.h1 = self.h1.wrapping_sub(u32::from(self.window[self.n % ROLLING_WINDOW]));

        self.window[self.n % ROLLING_WINDOW] = c;
        self.n += 1;

        self.h3 = (self.h3 << 5) ^ c32;
        self.sum()
    }

    fn sum(&self) -> u32 {
        self.h1.wrapping_add(self.h2).wrapping_add(self.h3)
    }
}

fn sum_hash(c: u8, h: u32) -> u32 {
    h.wrapping_mul(HASH_PRIME) ^ u32::from(c)
}

fn spamsum(data: &[u8]) -> String {
    let mut block_size = MIN_BLOCKSIZE;
    while (block_size as usize).saturating_mul(SPAMSUM_LENGTH) < data.len() {
        block_size = block_size.saturating_mul(2);
    }

    loop {
        let mut roll = RollingState::default();
        let mut part1 = [0u8; SPAMSUM_LENGTH];
        let mut part2 = [0u8; SPAMSUM_LENGTH / 2];
        let (mut j, mut k) = (0usize, 0usize);
        let (mut h, mut h2) = (HASH_INIT, HASH_INIT);

        for &c in data {
            h = sum_hash(c, h);
            h2 = sum_hash(c, h2);
            let r = roll.roll(c);

            if r % block_size == block_size - 1 {
                // The last slot keeps absorbing input instead of growing the digest.
                part1[j] = B64[(h % 64) as usize];
                if j < SPAMSUM_LENGTH - 1 {
                    h = HASH_INIT;
                    j += 1;
                }
            }
            let double = block_size.saturating_mul(2);
            if r % double == double - 1 {
                part2[k] = B64[(h2 % 64) as usize];
                if k < SPAMSUM_LENGTH / 2 - 1 {
                    h2 = HASH_INIT;
                    k += 1;
                }
            }
        }

        if roll.sum() != 0 {
            part1[j] = B64[(h % 64) as usize];
            part2[k] = B64[(h2 % 64) as usize];
            j += 1;
            k += 1;
        }

        if block_size > MIN_BLOCKSIZE && j < SPAMSUM_LENGTH / 2 {
            block_size /= 2;
            continue;
        }

        return format!(
            "{}:{}:{}",
            block_size,
            String::from_utf8_lossy(&part1[..j]),
            String::from_utf8_lossy(&part2[..k])
        );
    }
}

struct ParsedDigest<'a> {
    block_size: u32,
    part1: &'a str,
    part2: &'a str,
}

fn parse_digest(digest: &str) -> Option<ParsedDigest<'_>> {
    let mut parts = digest.trim().splitn(3, ':');
    let block_size = parts.next()?.parse().ok()?;
    let part1 = parts.next()?;
    let part2 = parts.next()?;
    Some(ParsedDigest { block_size, part1, part2 })
}

/// Score two digests in `[0, 100]`. Malformed input scores 0.
pub fn compare_digests(a: &str, b: &str) -> u8 {
    let (Some(a), Some(b)) = (parse_digest(a), parse_digest(b)) else {
        return 0;
    };

    let (bs1, bs2) = (a.block_size, b.block_size);
    if bs1 != bs2 && Some(bs1) != bs2.checked_mul(2) && Some(bs2) != bs1.checked_mul(2) {
        return 0;
    }

    let a1 = collapse_runs(a.part1);
    let a2 = collapse_runs(a.part2);
    let b1 = collapse_runs(b.part1);
    let b2 = collapse_runs(b.part2);

    if bs1 == bs2 && a1 == b1 && a2 == b2 {
        return 100;
    }

    let score = if bs1 == bs2 {
        score_strings(&a1, &b1, bs1).max(score_strings(&a2, &b2, bs1.saturating_mul(2)))
    } else if Some(bs1) == bs2.checked_mul(2) {
        score_strings(&a1, &b2, bs1)
    } else {
        score_strings(&a2, &b1, bs2)
    };
    score.min(100) as u8
}

fn collapse_runs(part: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(part.len());
    for &c in part.as_bytes() {
        let run = out.iter().rev().take_while(|&&prev| prev == c).count();
        if run < MAX_RUN {
            out.push(c);
        }
    }
    out
}

fn score_strings(s1: &[u8], s2: &[u8], block_size: u32) -> u32 {
    let (len1, len2) = (s1.len(), s2.len());
    if len1 > SPAMSUM_LENGTH || len2 > SPAMSUM_LENGTH {
        return 0;
    }
    if !has_common_substring(s1, s2) {
        return 0;
    }

    let distance = edit_distance(s1, s2);
    let scaled = distance * SPAMSUM_LENGTH / (len1 + len2);
    let scaled = 100 * scaled / SPAMSUM_LENGTH;
    if scaled >= 100 {
        return 0;
    }
    let score = (100 - scaled) as u32;

    if block_size >= UNCAPPED_BLOCKSIZE {
        return score;
    }
    let cap = (block_size / MIN_BLOCKSIZE).saturating_mul(len1.min(len2) as u32);
    score.min(cap)
}

/// Two parts are only comparable if they share a run of `ROLLING_WINDOW` characters.
fn has_common_substring(s1: &[u8], s2: &[u8]) -> bool {
    if s1.len() < ROLLING_WINDOW || s2.len() < ROLLING_WINDOW {
        return false;
    }
    let windows: HashSet<&[u8]> = s1.windows(ROLLING_WINDOW).collect();
    s2.windows(ROLLING_WINDOW).any(|w| windows.contains(w))
}

/// Levenshtein distance with unit insert/delete and a substitution cost of 2.
fn edit_distance(s1: &[u8], s2: &[u8]) -> usize {
    let mut prev: Vec<usize> = (0..=s2.len()).collect();
    let mut cur = vec![0usize; s2.len() + 1];

    for (i, &c1) in s1.iter().enumerate() {
        cur[0] = i + 1;
        for (j, &c2) in s2.iter().enumerate() {
            let substitution = prev[j] + if c1 == c2 { 0 } else { 2 };
            let deletion = prev[j + 1] + 1;
            let insertion = cur[j] + 1;
            cur[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[s2.len()]
}
