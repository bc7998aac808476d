//! BIO decoding of one chunk's token logits into entity fragments.
//!
//! The decoder is a two-state machine (no entity open / entity of type `T`
//! open) driven by the arg-max tag of every attended, non-special token:
//!
//! | tag                  | open fragment       | effect                         |
//! |----------------------|---------------------|--------------------------------|
//! | `B-T`                | any                 | emit open fragment, open `T`   |
//! | `I-T`                | same type `T`       | extend, update running mean    |
//! | `I-T`                | none / other type   | token dropped                  |
//! | `O`, unknown, absent | any                 | emit open fragment             |

use super::{EntityFragment, UNKNOWN_POSITION};
use crate::labels::LabelMap;
use crate::scoring::argmax;
use crate::traits::{Token, TokenLogits};

/// A parsed BIO tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BioTag<'a> {
    Begin(&'a str),
    Inside(&'a str),
    Outside,
}

impl<'a> BioTag<'a> {
    /// Parse `B-T` / `I-T`; everything else (including `O` and a bare `B-`)
    /// is [`Outside`](Self::Outside).
    pub fn parse(label: &'a str) -> Self {
        match label.split_at_checked(2) {
            Some(("B-", ty)) if !ty.is_empty() => Self::Begin(ty),
            Some(("I-", ty)) if !ty.is_empty() => Self::Inside(ty),
            _ => Self::Outside,
        }
    }
}

/// Decode `output` (tokens of `text`) into fragments with chunk-relative
/// character offsets. Never fails: malformed rows and unknown label indices
/// read as `O`, unmatched token text yields position `-1`.
pub fn decode(text: &str, output: &TokenLogits, labels: &LabelMap) -> Vec<EntityFragment> {
    let resolver = SpanResolver::new(text);
    let mut fragments = Vec::new();
    let mut open: Option<OpenFragment> = None;

    for (token, row) in output.tokens.iter().zip(&output.logits) {
        if token.is_skipped() {
            continue;
        }

        let prediction = argmax(row);
        let tag = prediction
            .and_then(|(index, _)| labels.get(index))
            .map(BioTag::parse)
            .unwrap_or(BioTag::Outside);
        let score = prediction.map(|(_, score)| score).unwrap_or_default();

        match tag {
            BioTag::Begin(entity_type) => {
                if let Some(fragment) = open.take() {
                    fragments.push(fragment.finish());
                }
                let (start, end) = resolver.resolve(token);
                open = Some(OpenFragment::begin(entity_type, token.surface(), score, start, end));
            }
            BioTag::Inside(entity_type) => {
                if let Some(fragment) = open.as_mut()
                    && fragment.entity_type == entity_type
                {
                    fragment.extend(token, score, resolver.resolve(token));
                }
            }
            BioTag::Outside => {
                if let Some(fragment) = open.take() {
                    fragments.push(fragment.finish());
                }
            }
        }
    }

    if let Some(fragment) = open {
        fragments.push(fragment.finish());
    }
    fragments
}

struct OpenFragment {
    entity_type: String,
    text: String,
    score_sum: f32,
    token_count: u32,
    start: i64,
    end: i64,
}

impl OpenFragment {
    fn begin(entity_type: &str, surface: &str, score: f32, start: i64, end: i64) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            text: surface.to_string(),
            score_sum: score,
            token_count: 1,
            start,
            end,
        }
    }

    fn extend(&mut self, token: &Token, score: f32, (start, end): (i64, i64)) {
        let visible_gap =
            start != UNKNOWN_POSITION && self.end != UNKNOWN_POSITION && start > self.end;
        if !token.is_subword && visible_gap {
            self.text.push(' ');
        }
        self.text.push_str(token.surface());
        self.score_sum += score;
        self.token_count += 1;
        if self.start == UNKNOWN_POSITION || end == UNKNOWN_POSITION {
            // A span that cannot cover every token is no span at all.
            self.start = UNKNOWN_POSITION;
            self.end = UNKNOWN_POSITION;
        } else {
            self.end = end;
        }
    }

    fn finish(self) -> EntityFragment {
        EntityFragment {
            entity_type: self.entity_type,
            text: self.text,
            score: self.score_sum / self.token_count as f32,
            start: self.start,
            end: self.end,
        }
    }
}

/// Maps tokens to character spans of the chunk text.
///
/// Tokenizer spans win. Without one, the token's surface text is searched
/// case-insensitively from the start of the chunk, so repeated words all
/// resolve to their first occurrence.
struct SpanResolver {
    folded: Vec<char>,
}

impl SpanResolver {
    fn new(text: &str) -> Self {
        Self {
            folded: text.chars().map(fold_char).collect(),
        }
    }

    fn resolve(&self, token: &Token) -> (i64, i64) {
        if let Some((start, end)) = token.span {
            return (start as i64, end as i64);
        }
        let needle: Vec<char> = token.surface().chars().map(fold_char).collect();
        match find_chars(&self.folded, &needle) {
            Some(start) => (start as i64, (start + needle.len()) as i64),
            None => (UNKNOWN_POSITION, UNKNOWN_POSITION),
        }
    }
}

/// Per-char lowercase folding that keeps one output char per input char, so
/// indices stay aligned with the original text.
fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
