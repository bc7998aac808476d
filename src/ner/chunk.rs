//! Paragraph chunking of long documents and offset reconciliation.
//!
//! Documents longer than the threshold are split on blank-line separators and
//! decoded chunk by chunk. Each chunk's fragments are shifted by the chunk's
//! character offset in the document. An entity that straddles a paragraph
//! boundary comes back as two fragments; chunks are never re-joined.

use super::{EntityFragment, UNKNOWN_POSITION, decoder};
use crate::error::Result;
use crate::traits::TokenClassifierModel;

/// Documents up to this many characters are decoded in one pass.
pub const DEFAULT_CHUNK_THRESHOLD: usize = 5000;

/// Separator used to split long documents.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

const SEPARATOR_CHARS: usize = 2;

/// A slice of the document and its character offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub text: &'a str,
    pub offset: usize,
}

/// Split `text` into the chunks that must be decoded.
///
/// Whitespace-only paragraphs are omitted but still advance the offset.
pub fn plan_chunks(text: &str, threshold: usize) -> Vec<Chunk<'_>> {
    if text.chars().count() <= threshold {
        return vec![Chunk { text, offset: 0 }];
    }

    let mut chunks = Vec::new();
    let mut offset = 0;
    for paragraph in text.split(PARAGRAPH_SEPARATOR) {
        if !paragraph.trim().is_empty() {
            chunks.push(Chunk {
                text: paragraph,
                offset,
            });
        }
        offset += paragraph.chars().count() + SEPARATOR_CHARS;
    }
    chunks
}

/// Move chunk-relative positions into document coordinates. Unknown
/// positions stay unknown.
pub fn shift_fragments(fragments: &mut [EntityFragment], offset: usize) {
    let offset = offset as i64;
    for fragment in fragments {
        if fragment.start != UNKNOWN_POSITION {
            fragment.start += offset;
        }
        if fragment.end != UNKNOWN_POSITION {
            fragment.end += offset;
        }
    }
}

/// Run the model over every chunk of `text`, in order, and return all
/// fragments in document coordinates. The first failing chunk aborts the
/// whole document.
pub async fn extract_fragments(
    model: &dyn TokenClassifierModel,
    text: &str,
    threshold: usize,
) -> Result<Vec<EntityFragment>> {
    let chunks = plan_chunks(text, threshold);
    let mut fragments = Vec::new();

    for (index, chunk) in chunks.iter().enumerate() {
        let output = model.classify_tokens(chunk.text).await?.into_probabilities();
        let mut decoded = decoder::decode(chunk.text, &output, model.labels());
        tracing::debug!(
            chunk = index,
            offset = chunk.offset,
            fragments = decoded.len(),
            "Decoded chunk"
        );
        shift_fragments(&mut decoded, chunk.offset);
        fragments.extend(decoded);
    }

    Ok(fragments)
}
