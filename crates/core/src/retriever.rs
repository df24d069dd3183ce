use crate::embeddings::Embedder;
use crate::error::RagError;
use crate::index::FlatIndex;
use crate::models::RetrievedChunk;
use tracing::debug;

pub struct Retriever<'a> {
    embedder: &'a dyn Embedder,
    index: &'a FlatIndex,
}

impl<'a> Retriever<'a> {
    pub fn new(embedder: &'a dyn Embedder, index: &'a FlatIndex) -> Self {
        Self { embedder, index }
    }

    pub fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        let query_vector = self.embedder.embed_one(question)?;
        let neighbors = self.index.search(&query_vector, top_k)?;
        debug!(top_k, hits = neighbors.len(), "retrieved neighbours");

        Ok(neighbors
            .into_iter()
            .filter_map(|neighbor| {
                self.index.entry(neighbor.position).map(|entry| RetrievedChunk {
                    chunk: entry.chunk.clone(),
                    distance: neighbor.distance,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::Retriever;
    use crate::embeddings::{CharacterNgramEmbedder, Embedder};
    use crate::index::{FlatIndex, IndexedChunk};
    use crate::models::Chunk;

    fn build_index(embedder: &CharacterNgramEmbedder, contents: &[&str]) -> FlatIndex {
        let entries = contents
            .iter()
            .enumerate()
            .map(|(index, content)| IndexedChunk {
                chunk: Chunk::new(*content, format!("doc.txt (Chunk {})", index + 1)),
                embedding: embedder.embed_one(content).unwrap(),
            })
            .collect();
        FlatIndex::build(embedder.dimensions(), entries).unwrap()
    }

    #[test]
    fn closest_chunk_comes_first() {
        let embedder = CharacterNgramEmbedder::default();
        let index = build_index(
            &embedder,
            &[
                "The invoice total is due within thirty days.",
                "Hydraulic pumps must be serviced every six months.",
                "The cafeteria opens at eight in the morning.",
            ],
        );

        let hits = Retriever::new(&embedder, &index)
            .retrieve("How often are hydraulic pumps serviced?", 3)
            .unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk.source, "doc.txt (Chunk 2)");
        assert!(hits.windows(2).all(|pair| pair[0].distance <= pair[1].distance));
    }

    #[test]
    fn top_k_above_index_size_returns_all_chunks() {
        let embedder = CharacterNgramEmbedder::default();
        let index = build_index(&embedder, &["alpha", "beta"]);
        let hits = Retriever::new(&embedder, &index).retrieve("gamma", 5).unwrap();
        assert_eq!(hits.len(), 2);
    }
}
