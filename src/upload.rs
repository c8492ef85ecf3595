//! Document upload pipeline: validate → extract → chunk → embed → upsert.
//!
//! Each file is validated and chunked independently; a bad file is rejected
//! with its own reason and never aborts the batch. All chunks across all
//! files are embedded in one batch call, then upserted into the target
//! namespace in fixed-size batches, sequentially, to bound request size.

use serde::Serialize;

use crate::answer::to_ascii;
use crate::chunk::chunk_document;
use crate::config::ChunkingConfig;
use crate::embedding::Embedder;
use crate::extract::extract_text;
use crate::models::{now_ts, ChunkMetadata, DocumentChunk, VectorRecord};
use crate::result::{ActionError, ActionResult};
use crate::vector::VectorIndex;

/// Records per upsert request.
const UPSERT_BATCH_SIZE: usize = 100;

/// One uploaded file, decoded from the request body.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A file that failed validation or extraction.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedFile {
    pub filename: String,
    pub reason: String,
}

/// Outcome of one upload batch.
#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub total_chunks: usize,
    pub namespace: String,
    pub rejected: Vec<RejectedFile>,
}

/// Run the pipeline for a batch of files against `namespace`. The caller has
/// already verified namespace ownership.
pub async fn process_documents(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    chunking: &ChunkingConfig,
    namespace: &str,
    files: &[UploadFile],
) -> ActionResult<UploadSummary> {
    if files.is_empty() {
        return Err(ActionError::validation("No files provided"));
    }
    if chunking.chunk_size == 0 || chunking.overlap_size >= chunking.chunk_size {
        return Err(ActionError::validation(
            "overlap_size must be smaller than chunk_size",
        ));
    }

    // 1. Extract and chunk each file independently, collecting rejections
    let mut all_chunks: Vec<DocumentChunk> = Vec::new();
    let mut rejected = Vec::new();

    for file in files {
        match extract_text(&file.bytes, &file.content_type) {
            Ok(text) => {
                all_chunks.extend(chunk_document(
                    &text,
                    &file.filename,
                    chunking.chunk_size,
                    chunking.overlap_size,
                ));
            }
            Err(e) => rejected.push(RejectedFile {
                filename: file.filename.clone(),
                reason: e.to_string(),
            }),
        }
    }

    let namespace = to_ascii(namespace);
    if all_chunks.is_empty() {
        return Ok(UploadSummary {
            total_chunks: 0,
            namespace,
            rejected,
        });
    }

    // 2. One embedding call for every chunk of every file
    let texts: Vec<String> = all_chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder
        .embed(&texts)
        .await
        .map_err(|e| ActionError::collaborator(format!("chunk embedding failed: {}", e)))?;
    if embeddings.len() != all_chunks.len() {
        return Err(ActionError::collaborator(format!(
            "embedding count mismatch: {} chunks, {} vectors",
            all_chunks.len(),
            embeddings.len()
        )));
    }

    // 3. Vector records; ids use the batch-wide position so two files in one
    //    upload can never collide
    let timestamp = now_ts();
    let records: Vec<VectorRecord> = all_chunks
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(position, (chunk, values))| VectorRecord {
            id: format!("{}-{}-{}", namespace, timestamp, position),
            values,
            metadata: ChunkMetadata {
                text: chunk.text.clone(),
                filename: chunk.filename.clone(),
                source: chunk.filename.clone(),
                chunk_index: chunk.chunk_index.to_string(),
                total_chunks: chunk.total_chunks.to_string(),
                namespace: namespace.clone(),
            },
        })
        .collect();

    // 4. Sequential batched upserts
    for batch in records.chunks(UPSERT_BATCH_SIZE) {
        index
            .upsert(&namespace, batch)
            .await
            .map_err(|e| ActionError::collaborator(format!("vector upsert failed: {}", e)))?;
    }

    Ok(UploadSummary {
        total_chunks: records.len(),
        namespace,
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{MIME_PDF, MIME_TEXT};
    use crate::result::ErrorKind;
    use crate::vector::MemoryVectorIndex;
    use anyhow::Result;
    use async_trait::async_trait;

    struct CountingEmbedder;

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn chunking(size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: size,
            overlap_size: overlap,
        }
    }

    fn text_file(name: &str, body: &str) -> UploadFile {
        UploadFile {
            filename: name.to_string(),
            content_type: MIME_TEXT.to_string(),
            bytes: body.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn short_file_yields_single_chunk() {
        let index = MemoryVectorIndex::new();
        let summary = process_documents(
            &CountingEmbedder,
            &index,
            &chunking(500, 100),
            "Docs",
            &[text_file("tiny.txt", "This file is only fifty characters long, okay.")],
        )
        .await
        .unwrap();

        assert_eq!(summary.total_chunks, 1);
        assert_eq!(summary.namespace, "Docs");
        assert!(summary.rejected.is_empty());

        let matches = index.query("Docs", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(matches.len(), 1);
        let meta = matches[0].metadata.as_ref().unwrap();
        assert_eq!(meta.filename, "tiny.txt");
        assert_eq!(meta.total_chunks, "1");
    }

    #[tokio::test]
    async fn bad_file_rejected_without_aborting_batch() {
        let index = MemoryVectorIndex::new();
        let files = vec![
            text_file("good.txt", "Valid document content."),
            UploadFile {
                filename: "bad.pdf".to_string(),
                content_type: MIME_PDF.to_string(),
                bytes: b"not really a pdf".to_vec(),
            },
            UploadFile {
                filename: "image.png".to_string(),
                content_type: "image/png".to_string(),
                bytes: vec![0u8; 16],
            },
        ];

        let summary = process_documents(
            &CountingEmbedder,
            &index,
            &chunking(500, 100),
            "Docs",
            &files,
        )
        .await
        .unwrap();

        assert_eq!(summary.total_chunks, 1);
        assert_eq!(summary.rejected.len(), 2);
        let names: Vec<&str> = summary.rejected.iter().map(|r| r.filename.as_str()).collect();
        assert!(names.contains(&"bad.pdf"));
        assert!(names.contains(&"image.png"));
    }

    #[tokio::test]
    async fn vector_ids_unique_across_files() {
        let index = MemoryVectorIndex::new();
        let body = "Sentence about topic one. ".repeat(40);
        let summary = process_documents(
            &CountingEmbedder,
            &index,
            &chunking(200, 40),
            "Docs",
            &[text_file("a.txt", &body), text_file("b.txt", &body)],
        )
        .await
        .unwrap();

        let matches = index.query("Docs", &[1.0, 0.0], 1000).await.unwrap();
        assert_eq!(matches.len(), summary.total_chunks);
        let mut ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), summary.total_chunks);
    }

    #[tokio::test]
    async fn large_batch_upserts_every_chunk() {
        let index = MemoryVectorIndex::new();
        // enough text to exceed one upsert batch
        let body = "word ".repeat(6000);
        let summary = process_documents(
            &CountingEmbedder,
            &index,
            &chunking(120, 20),
            "Docs",
            &[text_file("big.txt", &body)],
        )
        .await
        .unwrap();

        assert!(summary.total_chunks > UPSERT_BATCH_SIZE);
        let matches = index.query("Docs", &[1.0, 0.0], 10_000).await.unwrap();
        assert_eq!(matches.len(), summary.total_chunks);
    }

    #[tokio::test]
    async fn empty_batch_is_a_validation_error() {
        let index = MemoryVectorIndex::new();
        let err = process_documents(&CountingEmbedder, &index, &chunking(500, 100), "Docs", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn all_rejected_yields_zero_chunks_success() {
        let index = MemoryVectorIndex::new();
        let summary = process_documents(
            &CountingEmbedder,
            &index,
            &chunking(500, 100),
            "Docs",
            &[UploadFile {
                filename: "image.png".to_string(),
                content_type: "image/png".to_string(),
                bytes: vec![0u8; 16],
            }],
        )
        .await
        .unwrap();

        assert_eq!(summary.total_chunks, 0);
        assert_eq!(summary.rejected.len(), 1);
    }
}
