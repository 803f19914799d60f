#[cfg(test)]
mod tests;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::RetrievedChunk;
use crate::ingestion::Chunk;
use crate::{RagError, Result};

const TABLE_NAME: &str = "chunks";

/// Chunk vectors persisted in a LanceDB directory
pub struct VectorIndex {
    connection: Connection,
    dimension: Option<usize>,
    len: usize,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("uri", &self.connection.uri())
            .field("dimension", &self.dimension)
            .field("len", &self.len)
            .finish()
    }
}

async fn connect(path: &Path) -> Result<Connection> {
    std::fs::create_dir_all(path).map_err(|e| {
        RagError::Store(format!(
            "Failed to create vector store directory {}: {}",
            path.display(),
            e
        ))
    })?;

    let uri = format!("file://{}", path.display());
    lancedb::connect(&uri)
        .execute()
        .await
        .map_err(|e| RagError::Store(format!("Failed to connect to LanceDB: {}", e)))
}

fn create_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                dimension as i32,
            ),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, false),
        Field::new("chunk_index", DataType::UInt64, false),
        Field::new("start_offset", DataType::UInt64, false),
    ]))
}

fn create_record_batch(
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    dimension: usize,
) -> Result<RecordBatch> {
    let mut flat_values = Vec::with_capacity(chunks.len() * dimension);
    for vector in vectors {
        if vector.len() != dimension {
            return Err(RagError::Embedding(format!(
                "Inconsistent embedding dimensions: expected {}, got {}",
                dimension,
                vector.len()
            )));
        }
        flat_values.extend_from_slice(vector);
    }

    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        dimension as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::Store(format!("Failed to create vector array: {}", e)))?;

    let ids: Vec<String> = chunks
        .iter()
        .map(|c| format!("{}#{}", c.source, c.chunk_index))
        .collect();

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.text.as_str()))),
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.source.as_str()))),
        Arc::new(UInt32Array::from_iter_values(chunks.iter().map(|c| c.page))),
        Arc::new(UInt64Array::from_iter_values(
            chunks.iter().map(|c| c.chunk_index as u64),
        )),
        Arc::new(UInt64Array::from_iter_values(
            chunks.iter().map(|c| c.start_offset as u64),
        )),
    ];

    RecordBatch::try_new(create_schema(dimension), arrays)
        .map_err(|e| RagError::Store(format!("Failed to create record batch: {}", e)))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RagError::Store(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<RetrievedChunk>> {
    let texts = column::<StringArray>(batch, "text")?;
    let sources = column::<StringArray>(batch, "source")?;
    let pages = column::<UInt32Array>(batch, "page")?;
    let chunk_indices = column::<UInt64Array>(batch, "chunk_index")?;
    let start_offsets = column::<UInt64Array>(batch, "start_offset")?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut results = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance =
            distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        results.push(RetrievedChunk {
            chunk: Chunk {
                text: texts.value(row).to_string(),
                source: sources.value(row).to_string(),
                page: pages.value(row),
                chunk_index: chunk_indices.value(row) as usize,
                start_offset: start_offsets.value(row) as usize,
            },
            // Cosine distance, so higher is more similar
            score: 1.0 - distance,
        });
    }

    Ok(results)
}

impl VectorIndex {
    /// Write `chunks` and their vectors into a fresh LanceDB directory.
    ///
    /// No table is created for an empty chunk list; such an index answers
    /// every search with no results.
    #[inline]
    pub async fn create(path: &Path, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(RagError::Embedding(format!(
                "Got {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let connection = connect(path).await?;

        let Some(dimension) = vectors.first().map(Vec::len) else {
            info!("Created empty vector index at {}", path.display());
            return Ok(Self {
                connection,
                dimension: None,
                len: 0,
            });
        };

        let record_batch = create_record_batch(chunks, vectors, dimension)?;

        connection
            .create_empty_table(TABLE_NAME, create_schema(dimension))
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to create table: {}", e)))?;

        let table = connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to open table: {}", e)))?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to insert chunks: {}", e)))?;

        info!(
            "Stored {} chunk vectors ({} dimensions) at {}",
            chunks.len(),
            dimension,
            path.display()
        );

        Ok(Self {
            connection,
            dimension: Some(dimension),
            len: chunks.len(),
        })
    }

    /// Open a previously created index
    #[inline]
    pub async fn open(path: &Path) -> Result<Self> {
        let connection = connect(path).await?;

        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to list tables: {}", e)))?;

        if !table_names.iter().any(|name| name == TABLE_NAME) {
            debug!("No chunk table at {}, opening as empty", path.display());
            return Ok(Self {
                connection,
                dimension: None,
                len: 0,
            });
        }

        let table = connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to open table: {}", e)))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Store(format!("Failed to get table schema: {}", e)))?;

        let dimension = schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => Some(*size as usize),
                _ => None,
            })
            .ok_or_else(|| {
                RagError::Store("Could not find vector column or determine dimension".to_string())
            })?;

        let len = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Store(format!("Failed to count rows: {}", e)))?;

        debug!(
            "Opened vector index at {} with {} chunks ({} dimensions)",
            path.display(),
            len,
            dimension
        );

        Ok(Self {
            connection,
            dimension: Some(dimension),
            len,
        })
    }

    /// Number of chunks held by the index
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Up to `k` chunks nearest to `query`, most similar first
    #[inline]
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };
        if k == 0 || self.len == 0 {
            return Ok(Vec::new());
        }

        if query.len() != dimension {
            return Err(RagError::Embedding(format!(
                "Query vector has {} dimensions but the index holds {}",
                query.len(),
                dimension
            )));
        }

        debug!("Searching for {} nearest chunks", k);

        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to open table: {}", e)))?;

        let mut stream = table
            .vector_search(query)
            .map_err(|e| RagError::Store(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to execute search: {}", e)))?;

        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::Store(format!("Failed to read result stream: {}", e)))?
        {
            results.extend(parse_search_batch(&batch)?);
        }

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        results.truncate(k);

        debug!("Search returned {} chunks", results.len());
        Ok(results)
    }
}
