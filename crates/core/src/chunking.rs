use crate::models::{Chunk, RagConfig};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            overlap: 200,
        }
    }
}

impl From<&RagConfig> for ChunkingConfig {
    fn from(value: &RagConfig) -> Self {
        Self {
            chunk_size: value.chunk_size,
            overlap: value.chunk_overlap,
        }
    }
}

/// Cuts back to the last period or newline when it lies past the middle of the window.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let chunk_size = config.chunk_size.max(1);
    let half_window = chunk_size as f64 * 0.5;

    let mut pieces = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());

        if end < chars.len() {
            let window = &chars[start..end];
            let last_period = window.iter().rposition(|c| *c == '.');
            let last_newline = window.iter().rposition(|c| *c == '\n');

            if let Some(break_point) = last_period.max(last_newline) {
                if break_point as f64 > half_window {
                    end = start + break_point + 1;
                }
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            pieces.push(trimmed.to_string());
        }

        if end == chars.len() {
            break;
        }

        let next = end.saturating_sub(config.overlap);
        start = if next > start { next } else { start + 1 };
    }

    pieces
}

pub fn build_chunks(
    file_name: &str,
    unit: Option<&str>,
    text: &str,
    config: ChunkingConfig,
) -> Vec<Chunk> {
    chunk_text(text, config)
        .into_iter()
        .enumerate()
        .map(|(index, content)| {
            let source = match unit {
                Some(label) => format!("{file_name} ({label}, Chunk {})", index + 1),
                None => format!("{file_name} (Chunk {})", index + 1),
            };
            Chunk { content, source }
        })
        .collect()
}
