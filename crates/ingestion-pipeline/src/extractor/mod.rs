pub mod chunker;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use common::{
    error::AppError,
    llm::{prompts::DEFAULT_EXTRACTION_SYSTEM_PROMPT, ChatMessage, ChatModel, CompletionOptions},
    utils::json::extract_json_object,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExtractedRelation {
    pub source: String,
    pub target: String,
    #[serde(rename = "relationType")]
    pub relation_type: String,
    #[serde(default)]
    pub weight: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relations: Vec<ExtractedRelation>,
}

/// LLM-driven entity/relation extraction over chunked text.
///
/// Chunks are processed sequentially to keep rate-limit pressure bounded;
/// a chunk whose response cannot be parsed contributes nothing rather than
/// failing the whole document.
pub struct EntityExtractor {
    chat: Arc<dyn ChatModel>,
}

impl EntityExtractor {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    #[instrument(skip_all, fields(len = text.len()))]
    pub async fn extract(&self, text: &str) -> Result<ExtractionResult, AppError> {
        let mut entities: Vec<ExtractedEntity> = Vec::new();
        let mut entity_index: HashMap<(String, String), usize> = HashMap::new();
        let mut relations: Vec<ExtractedRelation> = Vec::new();
        let mut relation_seen: HashSet<(String, String, String)> = HashSet::new();

        for chunk in chunker::chunk_text(text, chunker::CHUNK_BUDGET) {
            let parsed = self.extract_chunk(&chunk).await?;

            for entity in parsed.entities {
                let key = (entity.name.to_lowercase(), entity.entity_type.clone());
                match entity_index.get(&key) {
                    Some(&index) => {
                        // Later occurrences merge their properties into the
                        // first seen entity, shallow overwrite.
                        for (property, value) in entity.properties {
                            entities[index].properties.insert(property, value);
                        }
                    }
                    None => {
                        entity_index.insert(key, entities.len());
                        entities.push(entity);
                    }
                }
            }

            for relation in parsed.relations {
                let key = (
                    relation.source.to_lowercase(),
                    relation.target.to_lowercase(),
                    relation.relation_type.clone(),
                );
                if relation_seen.insert(key) {
                    relations.push(relation);
                }
            }
        }

        debug!(
            entities = entities.len(),
            relations = relations.len(),
            "extraction finished"
        );

        Ok(ExtractionResult { entities, relations })
    }

    async fn extract_chunk(&self, chunk: &str) -> Result<ExtractionResult, AppError> {
        let messages = [
            ChatMessage::system(DEFAULT_EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(chunk),
        ];
        let completion = self
            .chat
            .complete(
                &messages,
                CompletionOptions {
                    temperature: Some(0.0),
                    max_tokens: None,
                },
            )
            .await?;

        match parse_extraction(&completion.content) {
            Ok(result) => Ok(result),
            Err(error) => {
                warn!(%error, "discarding unparseable extraction chunk");
                Ok(ExtractionResult::default())
            }
        }
    }
}

fn parse_extraction(content: &str) -> Result<ExtractionResult, AppError> {
    let object = extract_json_object(content).ok_or_else(|| {
        AppError::LLMParsing("No JSON object in extraction response".to_string())
    })?;
    serde_json::from_str(object)
        .map_err(|e| AppError::LLMParsing(format!("Failed to parse extraction response: {e}")))
}
