//! Chunk vector store (C6 storage side), backed by LanceDB.
//!
//! Grounded on the teacher's `ferrumyx-db/src/{database,chunks}.rs`: the
//! empty-schema `create_table` bootstrap and the `vector_search`/`only_if`
//! query pattern are reused near-verbatim, retargeted at the Chunk model.

use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Fields, Schema};
use futures::StreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use medretrieve_common::{Chunk, MedretrieveError, Result, Section};
use serde_json::Value;

pub const TABLE_CHUNKS: &str = "chunks";
/// Dimensionality of the embedding vectors stored alongside each chunk.
/// Decided once here (spec §9 leaves the embedding model itself out of
/// scope); see DESIGN.md.
pub const EMBEDDING_DIM: i32 = 768;

fn lance_err(e: impl std::fmt::Display) -> MedretrieveError {
    MedretrieveError::Unavailable(format!("vector store: {e}"))
}

fn chunks_schema() -> Arc<Schema> {
    let fields: Fields = vec![
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("uuid", DataType::Utf8, false),
        Field::new("parent_uid", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("chunk_idx", DataType::Int64, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, true),
        Field::new("section", DataType::Utf8, false),
        Field::new("published_at", DataType::Utf8, true),
        Field::new("tokens", DataType::Int64, false),
        Field::new("n_sentences", DataType::Int64, false),
        Field::new("meta", DataType::Utf8, false),
        Field::new(
            "embedding",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), EMBEDDING_DIM),
            true,
        ),
    ]
    .into();
    Arc::new(Schema::new(fields))
}

fn section_from_str(s: &str) -> Section {
    match s {
        "Background" => Section::Background,
        "Methods" => Section::Methods,
        "Results" => Section::Results,
        "Conclusions" => Section::Conclusions,
        "Unstructured" => Section::Unstructured,
        _ => Section::Other,
    }
}

fn chunk_to_batch(chunk: &Chunk, embedding: Option<&[f32]>) -> Result<RecordBatch> {
    let schema = chunks_schema();
    let meta_json = serde_json::to_string(&chunk.meta)?;

    let embedding_array: FixedSizeListArray = {
        let values = Float32Array::from(embedding.map(|e| e.to_vec()).unwrap_or_else(|| vec![0.0; EMBEDDING_DIM as usize]));
        let inner_field = Arc::new(Field::new("item", DataType::Float32, true));
        FixedSizeListArray::try_new(inner_field, EMBEDDING_DIM, Arc::new(values), None).map_err(lance_err)?
    };

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(vec![chunk.chunk_id.clone()])),
            Arc::new(StringArray::from(vec![chunk.uuid.to_string()])),
            Arc::new(StringArray::from(vec![chunk.parent_uid.clone()])),
            Arc::new(StringArray::from(vec![chunk.source.clone()])),
            Arc::new(Int64Array::from(vec![chunk.chunk_idx as i64])),
            Arc::new(StringArray::from(vec![chunk.text.clone()])),
            Arc::new(StringArray::from(vec![chunk.title.clone()])),
            Arc::new(StringArray::from(vec![chunk.section.as_str().to_string()])),
            Arc::new(StringArray::from(vec![chunk.published_at.map(|t| t.to_rfc3339())])),
            Arc::new(Int64Array::from(vec![chunk.tokens as i64])),
            Arc::new(Int64Array::from(vec![chunk.n_sentences as i64])),
            Arc::new(StringArray::from(vec![meta_json])),
            Arc::new(embedding_array),
        ],
    )
    .map_err(lance_err)?;

    Ok(batch)
}

fn batch_to_chunk(batch: &RecordBatch, row: usize) -> Result<Chunk> {
    let col = |name: &str| batch.column_by_name(name).ok_or_else(|| lance_err(format!("missing column {name}")));

    let chunk_id = col("chunk_id")?.as_any().downcast_ref::<StringArray>().unwrap().value(row).to_string();
    let uuid_str = col("uuid")?.as_any().downcast_ref::<StringArray>().unwrap().value(row);
    let uuid = uuid::Uuid::parse_str(uuid_str).map_err(lance_err)?;
    let parent_uid = col("parent_uid")?.as_any().downcast_ref::<StringArray>().unwrap().value(row).to_string();
    let source = col("source")?.as_any().downcast_ref::<StringArray>().unwrap().value(row).to_string();
    let chunk_idx = col("chunk_idx")?.as_any().downcast_ref::<Int64Array>().unwrap().value(row) as u32;
    let text = col("text")?.as_any().downcast_ref::<StringArray>().unwrap().value(row).to_string();

    let title_col = col("title")?.as_any().downcast_ref::<StringArray>().unwrap();
    let title = if title_col.is_null(row) { None } else { Some(title_col.value(row).to_string()) };

    let section = section_from_str(col("section")?.as_any().downcast_ref::<StringArray>().unwrap().value(row));

    let published_col = col("published_at")?.as_any().downcast_ref::<StringArray>().unwrap();
    let published_at = if published_col.is_null(row) {
        None
    } else {
        chrono::DateTime::parse_from_rfc3339(published_col.value(row)).ok().map(|d| d.with_timezone(&chrono::Utc))
    };

    let tokens = col("tokens")?.as_any().downcast_ref::<Int64Array>().unwrap().value(row) as u32;
    let n_sentences = col("n_sentences")?.as_any().downcast_ref::<Int64Array>().unwrap().value(row) as u32;
    let meta_json = col("meta")?.as_any().downcast_ref::<StringArray>().unwrap().value(row);
    let meta: std::collections::BTreeMap<String, Value> = serde_json::from_str(meta_json)?;

    Ok(Chunk { chunk_id, uuid, parent_uid, source, chunk_idx, text, title, section, published_at, tokens, n_sentences, meta })
}

#[derive(Clone)]
pub struct VectorStore {
    conn: Connection,
}

impl VectorStore {
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        if !path.as_ref().exists() {
            std::fs::create_dir_all(path.as_ref()).map_err(|e| MedretrieveError::Unavailable(e.to_string()))?;
        }
        let conn = lancedb::connect(&path.as_ref().to_string_lossy()).execute().await.map_err(lance_err)?;
        Ok(Self { conn })
    }

    pub async fn initialize(&self) -> Result<()> {
        let tables = self.conn.table_names().execute().await.map_err(lance_err)?;
        if !tables.contains(&TABLE_CHUNKS.to_string()) {
            let schema = chunks_schema();
            let empty = RecordBatchIterator::new(vec![], schema);
            self.conn.create_table(TABLE_CHUNKS, empty).execute().await.map_err(lance_err)?;
        }
        Ok(())
    }

    pub async fn create_vector_index(&self) -> Result<()> {
        let table = self.conn.open_table(TABLE_CHUNKS).execute().await.map_err(lance_err)?;
        table.create_index(&["embedding"], lancedb::index::Index::Auto).execute().await.map_err(lance_err)?;
        Ok(())
    }

    /// Inserts (or, on `chunk_id` collision, duplicates — callers delete the
    /// parent's prior chunks before re-ingesting) a batch of chunks.
    pub async fn insert_chunks(&self, chunks: &[Chunk], embeddings: &[Option<Vec<f32>>]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let table = self.conn.open_table(TABLE_CHUNKS).execute().await.map_err(lance_err)?;
        let batches: Vec<RecordBatch> = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(c, e)| chunk_to_batch(c, e.as_deref()))
            .collect::<Result<_>>()?;
        let schema = batches[0].schema();
        let iter = RecordBatchIterator::new(batches.into_iter().map(Ok), schema);
        table.add(iter).execute().await.map_err(lance_err)?;
        Ok(())
    }

    pub async fn delete_by_parent_uid(&self, parent_uid: &str) -> Result<()> {
        let table = self.conn.open_table(TABLE_CHUNKS).execute().await.map_err(lance_err)?;
        table.delete(&format!("parent_uid = '{}'", parent_uid.replace('\'', "''"))).await.map_err(lance_err)?;
        Ok(())
    }

    pub async fn find_by_parent_uid(&self, parent_uid: &str) -> Result<Vec<Chunk>> {
        let table = self.conn.open_table(TABLE_CHUNKS).execute().await.map_err(lance_err)?;
        let mut stream = table
            .query()
            .only_if(format!("parent_uid = '{}'", parent_uid.replace('\'', "''")))
            .execute()
            .await
            .map_err(lance_err)?;

        let mut chunks = Vec::new();
        while let Some(batch) = stream.next().await {
            let batch = batch.map_err(lance_err)?;
            for i in 0..batch.num_rows() {
                chunks.push(batch_to_chunk(&batch, i)?);
            }
        }
        Ok(chunks)
    }

    /// Vector-similarity search over chunk embeddings, optionally filtered
    /// by a pre-built `only_if` predicate (e.g. `source = 'pubmed'`).
    pub async fn search_vector(&self, query_embedding: &[f32], k: usize, filter: Option<&str>) -> Result<Vec<(Chunk, f32)>> {
        let table = self.conn.open_table(TABLE_CHUNKS).execute().await.map_err(lance_err)?;
        let mut query = table.vector_search(query_embedding.to_vec()).map_err(lance_err)?.limit(k);
        if let Some(f) = filter {
            query = query.only_if(f);
        }
        let mut stream = query.execute().await.map_err(lance_err)?;

        let mut results = Vec::new();
        while let Some(batch) = stream.next().await {
            let batch = batch.map_err(lance_err)?;
            let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
            for i in 0..batch.num_rows() {
                let chunk = batch_to_chunk(&batch, i)?;
                let distance = distances.map(|d| d.value(i)).unwrap_or(0.0);
                results.push((chunk, distance));
            }
        }
        Ok(results)
    }

    /// Lexical candidate search: fetches chunks whose text contains any of
    /// `terms`, optionally filtered, for the caller to score (the BM25-style
    /// weighting lives in `medretrieve-retrieval`, which owns the full §4.6
    /// hybrid formula; this is the storage-layer retrieval primitive).
    pub async fn search_lexical(&self, terms: &[String], k: usize, filter: Option<&str>) -> Result<Vec<Chunk>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let table = self.conn.open_table(TABLE_CHUNKS).execute().await.map_err(lance_err)?;

        let term_predicate = terms
            .iter()
            .map(|t| format!("text ILIKE '%{}%'", t.replace('\'', "''").replace('%', "")))
            .collect::<Vec<_>>()
            .join(" OR ");
        let predicate = match filter {
            Some(f) => format!("({term_predicate}) AND ({f})"),
            None => term_predicate,
        };

        let mut stream = table.query().only_if(predicate).limit(k).execute().await.map_err(lance_err)?;
        let mut chunks = Vec::new();
        while let Some(batch) = stream.next().await {
            let batch = batch.map_err(lance_err)?;
            for i in 0..batch.num_rows() {
                chunks.push(batch_to_chunk(&batch, i)?);
            }
        }
        Ok(chunks)
    }

    pub async fn count(&self) -> Result<u64> {
        let table = self.conn.open_table(TABLE_CHUNKS).execute().await.map_err(lance_err)?;
        Ok(table.count_rows(None).await.map_err(lance_err)? as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medretrieve_common::Document;

    #[test]
    fn chunk_roundtrips_through_arrow_batch() {
        let doc = Document::new("pubmed", "1", Some("T".into()), "body text here").unwrap();
        let chunk = Chunk::new(&doc, "s0".into(), 0, "body text here".into(), Section::Methods, 10, 1, Default::default()).unwrap();

        let batch = chunk_to_batch(&chunk, None).unwrap();
        let back = batch_to_chunk(&batch, 0).unwrap();

        assert_eq!(back.chunk_id, chunk.chunk_id);
        assert_eq!(back.uuid, chunk.uuid);
        assert_eq!(back.parent_uid, chunk.parent_uid);
        assert_eq!(back.text, chunk.text);
        assert_eq!(back.section, Section::Methods);
    }
}
