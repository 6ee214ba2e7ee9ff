//! LanceDB-backed `VectorStore` (§4.4).
//!
//! Schema is generic over the chunk's `map<string, scalar>` metadata: the
//! metadata column is stored as a JSON string and matched against
//! client-side, since the predicate language a `MetadataFilter` expresses
//! (exact equality over an arbitrary key set) doesn't map onto a single SQL
//! `only_if` clause without knowing the key set ahead of time.

use std::path::Path;
use std::sync::Arc;

use arrow::array::Array;
use arrow::array::FixedSizeListArray;
use arrow::array::Float32Array;
use arrow::array::RecordBatch;
use arrow::array::StringArray;
use arrow::datatypes::DataType;
use arrow::datatypes::Field;
use arrow::datatypes::Schema;
use async_trait::async_trait;
use futures::StreamExt;
use lancedb::connection::Connection;
use lancedb::query::ExecutableQuery;
use lancedb::query::QueryBase;

use crate::error::Result;
use crate::error::RetrievalErr;
use crate::storage::VectorStore;
use crate::storage::COLLECTION_NAME;
use crate::types::Metadata;
use crate::types::MetadataFilter;
use crate::types::StoreMatch;

/// LanceDB store over the `ataraxai_knowledge` collection.
pub struct LanceDbStore {
    db: Arc<Connection>,
    table_name: String,
    dimension: i32,
}

impl LanceDbStore {
    /// Open or create the on-disk database at `path`. `dimension` must
    /// match the configured Embedder's output width.
    pub async fn open(path: &Path, dimension: i32) -> Result<Self> {
        let uri = path.to_string_lossy().to_string();
        let db = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RetrievalErr::StoreError {
                cause: format!("connect to {uri}: {e}"),
            })?;

        Ok(Self {
            db: Arc::new(db),
            table_name: COLLECTION_NAME.to_string(),
            dimension,
        })
    }

    fn get_schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension,
                ),
                false,
            ),
            Field::new("metadata", DataType::Utf8, false),
        ])
    }

    async fn table_exists(&self) -> Result<bool> {
        let tables = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| RetrievalErr::StoreError {
                cause: format!("list tables: {e}"),
            })?;
        Ok(tables.contains(&self.table_name))
    }

    async fn get_or_create_table(&self) -> Result<lancedb::Table> {
        if self.table_exists().await? {
            return self.open_table().await;
        }
        let schema = Arc::new(self.get_schema());
        let empty_batch = RecordBatch::new_empty(schema.clone());
        let reader = arrow::record_batch::RecordBatchIterator::new(vec![Ok(empty_batch)], schema);
        self.db
            .create_table(&self.table_name, reader)
            .execute()
            .await
            .map_err(|e| RetrievalErr::StoreError {
                cause: format!("create table {}: {e}", self.table_name),
            })
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.db
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RetrievalErr::StoreError {
                cause: format!("open table {}: {e}", self.table_name),
            })
    }

    fn build_embedding_array(&self, embeddings: &[Vec<f32>]) -> Result<FixedSizeListArray> {
        let dim = self.dimension as usize;
        let mut values: Vec<f32> = Vec::with_capacity(embeddings.len() * dim);
        for embedding in embeddings {
            if embedding.len() != dim {
                return Err(RetrievalErr::StoreError {
                    cause: format!(
                        "embedding dimension mismatch: expected {dim}, got {}",
                        embedding.len()
                    ),
                });
            }
            values.extend_from_slice(embedding);
        }
        let values_array = Float32Array::from(values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        FixedSizeListArray::try_new(field, self.dimension, Arc::new(values_array), None).map_err(
            |e| RetrievalErr::StoreError {
                cause: format!("build embedding array: {e}"),
            },
        )
    }

    fn rows_to_batch(
        &self,
        ids: &[String],
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: &[Metadata],
    ) -> Result<RecordBatch> {
        let id_array = StringArray::from(ids.iter().map(|s| s.as_str()).collect::<Vec<_>>());
        let text_array = StringArray::from(texts.iter().map(|s| s.as_str()).collect::<Vec<_>>());
        let embedding_array = self.build_embedding_array(embeddings)?;
        let metadata_json: Vec<String> = metadatas
            .iter()
            .map(|m| serde_json::to_string(m).unwrap_or_default())
            .collect();
        let metadata_array =
            StringArray::from(metadata_json.iter().map(|s| s.as_str()).collect::<Vec<_>>());

        RecordBatch::try_new(
            Arc::new(self.get_schema()),
            vec![
                Arc::new(id_array),
                Arc::new(text_array),
                Arc::new(embedding_array),
                Arc::new(metadata_array),
            ],
        )
        .map_err(|e| RetrievalErr::StoreError {
            cause: format!("build record batch: {e}"),
        })
    }

    fn batch_to_matches(batch: &RecordBatch) -> Result<Vec<(String, String, Metadata, f32)>> {
        let ids = batch
            .column_by_name("id")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| RetrievalErr::StoreError {
                cause: "result batch missing id column".to_string(),
            })?;
        let texts = batch
            .column_by_name("text")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| RetrievalErr::StoreError {
                cause: "result batch missing text column".to_string(),
            })?;
        let metadatas = batch
            .column_by_name("metadata")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| RetrievalErr::StoreError {
                cause: "result batch missing metadata column".to_string(),
            })?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let mut rows = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let metadata: Metadata = serde_json::from_str(metadatas.value(i)).unwrap_or_default();
            let distance = distances.map(|d| d.value(i)).unwrap_or(0.0);
            rows.push((ids.value(i).to_string(), texts.value(i).to_string(), metadata, distance));
        }
        Ok(rows)
    }
}

#[async_trait]
impl VectorStore for LanceDbStore {
    async fn add_chunks(
        &self,
        ids: Vec<String>,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Vec<Metadata>,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        if !(ids.len() == texts.len() && ids.len() == embeddings.len() && ids.len() == metadatas.len())
        {
            return Err(RetrievalErr::StoreError {
                cause: "add_chunks: ids/texts/embeddings/metadatas length mismatch".to_string(),
            });
        }

        // Duplicate ids overwrite: clear any existing rows with the same id first.
        self.delete_by_ids(&ids).await?;

        let table = self.get_or_create_table().await?;
        let batch = self.rows_to_batch(&ids, &texts, &embeddings, &metadatas)?;
        let schema = batch.schema();
        let reader = arrow::record_batch::RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RetrievalErr::StoreError {
                cause: format!("add_chunks: {e}"),
            })?;
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        n: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoreMatch>> {
        if embedding.len() != self.dimension as usize {
            return Err(RetrievalErr::StoreError {
                cause: format!(
                    "query embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    embedding.len()
                ),
            });
        }
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }
        let table = self.open_table().await?;

        // Oversample when a metadata filter is applied, since the predicate
        // is evaluated client-side against the JSON metadata column.
        let fetch_limit = if filter.is_some() { n.max(50) * 4 } else { n };

        let results = table
            .vector_search(embedding.to_vec())
            .map_err(|e| RetrievalErr::StoreError {
                cause: format!("vector_search: {e}"),
            })?
            .limit(fetch_limit)
            .execute()
            .await
            .map_err(|e| RetrievalErr::StoreError {
                cause: format!("vector_search execute: {e}"),
            })?;

        let mut rows = Vec::new();
        let mut stream = results;
        while let Some(batch) = stream.next().await {
            let batch = batch.map_err(|e| RetrievalErr::StoreError {
                cause: format!("vector_search stream: {e}"),
            })?;
            rows.extend(Self::batch_to_matches(&batch)?);
        }

        let matches: Vec<StoreMatch> = rows
            .into_iter()
            .filter(|(_, _, metadata, _)| filter.map(|f| f.matches(metadata)).unwrap_or(true))
            .take(n)
            .map(|(id, text, metadata, distance)| StoreMatch {
                id,
                text,
                metadata,
                distance,
            })
            .collect();

        Ok(matches)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() || !self.table_exists().await? {
            return Ok(());
        }
        let table = self.open_table().await?;
        let quoted: Vec<String> = ids.iter().map(|id| format!("'{}'", id.replace('\'', "''"))).collect();
        let predicate = format!("id IN ({})", quoted.join(", "));
        table
            .delete(&predicate)
            .await
            .map_err(|e| RetrievalErr::StoreError {
                cause: format!("delete_by_ids: {e}"),
            })?;
        Ok(())
    }

    async fn delete_by_metadata(&self, filter: &MetadataFilter) -> Result<()> {
        if !self.table_exists().await? {
            return Ok(());
        }
        let table = self.open_table().await?;
        let results = table
            .query()
            .execute()
            .await
            .map_err(|e| RetrievalErr::StoreError {
                cause: format!("delete_by_metadata scan: {e}"),
            })?;

        let mut matching_ids = Vec::new();
        let mut stream = results;
        while let Some(batch) = stream.next().await {
            let batch = batch.map_err(|e| RetrievalErr::StoreError {
                cause: format!("delete_by_metadata stream: {e}"),
            })?;
            for (id, _, metadata, _) in Self::batch_to_matches(&batch)? {
                if filter.matches(&metadata) {
                    matching_ids.push(id);
                }
            }
        }

        self.delete_by_ids(&matching_ids).await
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }
        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| RetrievalErr::StoreError {
                cause: format!("count_rows: {e}"),
            })
    }
}
