//! Local chunk index as a document retriever

use crate::collaborators::{CollaboratorError, DocumentRetriever, RetrievedChunk};
use finagent_store::{ChunkIndex, MetadataFilter};

impl DocumentRetriever for ChunkIndex {
    fn retrieve(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
        n: usize,
    ) -> Result<Vec<RetrievedChunk>, CollaboratorError> {
        let hits = self
            .search(query, filter, n)
            .map_err(|e| CollaboratorError::Retrieval(e.to_string()))?;

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                text: hit.text,
                metadata: hit.metadata,
                distance: hit.distance,
            })
            .collect())
    }
}
