use super::*;
use crate::testing::{DIMENSION, bag_of_words};
use tempfile::TempDir;

fn chunk(index: usize, text: &str) -> Chunk {
    Chunk {
        text: text.to_string(),
        source: "biology.pdf".to_string(),
        page: index as u32 + 1,
        chunk_index: index,
        start_offset: 0,
    }
}

fn sample_chunks() -> Vec<Chunk> {
    vec![
        chunk(0, "Cells divide by mitosis into two identical daughter cells."),
        chunk(1, "Photosynthesis converts light energy into chemical energy."),
        chunk(2, "Enzymes lower the activation energy of reactions."),
        chunk(3, "DNA is a double helix made of nucleotides."),
        chunk(4, "Osmosis moves water across a semipermeable membrane."),
    ]
}

fn vectors_for(chunks: &[Chunk]) -> Vec<Vec<f32>> {
    chunks.iter().map(|c| bag_of_words(&c.text)).collect()
}

#[tokio::test]
async fn create_then_search_ranks_by_similarity() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let chunks = sample_chunks();

    let index = VectorIndex::create(temp_dir.path(), &chunks, &vectors_for(&chunks))
        .await
        .expect("should create index");
    assert_eq!(index.len(), 5);
    assert_eq!(index.dimension(), Some(DIMENSION));

    let results = index
        .search(&bag_of_words("Photosynthesis converts light energy into what?"), 3)
        .await
        .expect("search should succeed");

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].chunk, chunks[1]);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn search_returns_fewer_than_k_for_small_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let chunks = sample_chunks()[..2].to_vec();

    let index = VectorIndex::create(temp_dir.path(), &chunks, &vectors_for(&chunks))
        .await
        .expect("should create index");

    let results = index
        .search(&bag_of_words("cells"), 4)
        .await
        .expect("search should succeed");
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn reopened_index_returns_same_results() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let chunks = sample_chunks();
    let query = bag_of_words("water membrane");

    let created = VectorIndex::create(temp_dir.path(), &chunks, &vectors_for(&chunks))
        .await
        .expect("should create index");
    let first = created.search(&query, 4).await.expect("search succeeds");
    drop(created);

    let reopened = VectorIndex::open(temp_dir.path())
        .await
        .expect("should open index");
    assert_eq!(reopened.len(), 5);
    let second = reopened.search(&query, 4).await.expect("search succeeds");

    let first_indices: Vec<usize> = first.iter().map(|r| r.chunk.chunk_index).collect();
    let second_indices: Vec<usize> = second.iter().map(|r| r.chunk.chunk_index).collect();
    assert_eq!(first_indices, second_indices);
    assert_eq!(second[0].chunk, chunks[4]);
}

#[tokio::test]
async fn empty_index_searches_to_nothing() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let index = VectorIndex::create(temp_dir.path(), &[], &[])
        .await
        .expect("should create empty index");
    assert!(index.is_empty());
    assert_eq!(index.dimension(), None);

    let results = index
        .search(&bag_of_words("anything"), 4)
        .await
        .expect("search should succeed");
    assert!(results.is_empty());

    let reopened = VectorIndex::open(temp_dir.path())
        .await
        .expect("should open empty index");
    assert!(reopened.is_empty());
}

#[tokio::test]
async fn mismatched_vector_count_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let chunks = sample_chunks();

    let result = VectorIndex::create(temp_dir.path(), &chunks, &vectors_for(&chunks[..2])).await;
    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test]
async fn query_with_wrong_dimension_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let chunks = sample_chunks();

    let index = VectorIndex::create(temp_dir.path(), &chunks, &vectors_for(&chunks))
        .await
        .expect("should create index");

    let result = index.search(&[1.0, 0.0, 0.0], 4).await;
    assert!(matches!(result, Err(RagError::Embedding(_))));
}
