use anyhow::Result;

use crate::document::Document;

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// The actual text content of this chunk
    pub text: String,
    /// Estimated token count for this chunk
    pub token_count: usize,
    /// Unique identifier for the document this chunk belongs to
    pub document_id: String,
    /// Position of this chunk within its document
    pub chunk_index: usize,
    /// Byte offset of this chunk in the original document
    pub start_position: usize,
}

/// Splitter settings. Sizes are measured in characters.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Tried in order; the empty separator splits into characters
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: ["\n\n", "\n", " ", ""]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("Chunk size must be greater than zero");
        }
        if chunk_overlap >= chunk_size {
            anyhow::bail!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap,
                chunk_size
            );
        }

        Ok(ChunkingConfig {
            chunk_size,
            chunk_overlap,
            ..ChunkingConfig::default()
        })
    }
}

/// Recursive character text splitter
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkingConfig,
}

impl TextSplitter {
    pub fn new(config: ChunkingConfig) -> Self {
        TextSplitter { config }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split a document into chunks carrying their position in the source
    pub fn split_document(&self, document: &Document) -> Vec<TextChunk> {
        self.split_with_offsets(&document.content)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (start_position, chunk))| TextChunk {
                token_count: estimate_token_count(&chunk),
                text: chunk,
                document_id: document.document_id.clone(),
                chunk_index,
                start_position,
            })
            .collect()
    }

    /// Split text into chunks of at most `chunk_size` characters
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with_offsets(text)
            .into_iter()
            .map(|(_, chunk)| chunk)
            .collect()
    }

    /// Chunks paired with the byte offset of their first character in `text`
    fn split_with_offsets(&self, text: &str) -> Vec<(usize, String)> {
        self.split_recursive(text, 0, &self.config.separators)
    }

    fn split_recursive(
        &self,
        text: &str,
        base: usize,
        separators: &[String],
    ) -> Vec<(usize, String)> {
        // Use the first separator that actually occurs; "" always does
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).map(String::as_str).unwrap_or("");
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<Piece> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| (base + i, &text[i..i + c.len_utf8()]))
                .collect()
        } else {
            let mut offset = base;
            text.split(separator)
                .map(|piece| {
                    let start = offset;
                    offset += piece.len() + separator.len();
                    (start, piece)
                })
                .filter(|(_, piece)| !piece.is_empty())
                .collect()
        };

        let mut chunks = Vec::new();
        let mut small_pieces: Vec<Piece> = Vec::new();

        for (offset, piece) in pieces {
            if char_len(piece) < self.config.chunk_size {
                small_pieces.push((offset, piece));
                continue;
            }

            if !small_pieces.is_empty() {
                chunks.extend(self.merge_pieces(&small_pieces, separator));
                small_pieces.clear();
            }

            if remaining.is_empty() {
                push_trimmed(&mut chunks, offset, piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, offset, remaining));
            }
        }

        if !small_pieces.is_empty() {
            chunks.extend(self.merge_pieces(&small_pieces, separator));
        }

        chunks
    }

    /// Greedily join pieces into windows, carrying `chunk_overlap` characters forward
    fn merge_pieces(&self, pieces: &[Piece], separator: &str) -> Vec<(usize, String)> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: Vec<Piece> = Vec::new();
        let mut total = 0;

        for &(offset, piece) in pieces {
            let len = char_len(piece);

            if total + len + joining_cost(&window, separator_len) > self.config.chunk_size {
                if !window.is_empty() {
                    push_window(&mut chunks, &window, separator);

                    // Drop from the front until only the overlap is left and the piece fits
                    while total > self.config.chunk_overlap
                        || (total > 0
                            && total + len + joining_cost(&window, separator_len)
                                > self.config.chunk_size)
                    {
                        let (_, first) = window.remove(0);
                        total -= char_len(first) + if window.is_empty() { 0 } else { separator_len };
                    }
                }
            }

            total += len + joining_cost(&window, separator_len);
            window.push((offset, piece));
        }

        if !window.is_empty() {
            push_window(&mut chunks, &window, separator);
        }

        chunks
    }
}

/// A slice of the source text and its byte offset
type Piece<'a> = (usize, &'a str);

/// Characters added by appending one more piece to `window`
fn joining_cost(window: &[Piece], separator_len: usize) -> usize {
    if window.is_empty() {
        0
    } else {
        separator_len
    }
}

fn push_window(chunks: &mut Vec<(usize, String)>, window: &[Piece], separator: &str) {
    let joined = window
        .iter()
        .map(|(_, piece)| *piece)
        .collect::<Vec<&str>>()
        .join(separator);
    push_trimmed(chunks, window[0].0, joined);
}

/// Trim the chunk, moving its offset past any leading whitespace
fn push_trimmed(chunks: &mut Vec<(usize, String)>, offset: usize, chunk: String) {
    let leading = chunk.len() - chunk.trim_start().len();
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push((offset + leading, trimmed.to_string()));
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Calculate approximate token count for a text
/// This is a very simple estimation - words plus punctuation
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    words + punctuation
}
