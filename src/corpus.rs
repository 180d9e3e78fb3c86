//! Corpus loading and flattening.
//!
//! The corpus is a single structured JSON document (chapters containing
//! sections). [`flatten`] turns it into one [`Chunk`] per section, in document
//! order, backfilling section titles that the source left empty.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Section type tag for the opening text of a chapter.
pub const MAIN_CONTENT: &str = "main_content";

/// Title used when nothing better can be derived.
pub const UNTITLED_SECTION: &str = "Sección sin título";

/// Number of leading words used to synthesize a missing title.
const TITLE_WORDS: usize = 4;

/// Maximum characters kept in a chunk's content preview.
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CorpusFile {
    document: Document,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(rename = "chapter_number")]
    pub number: u32,
    #[serde(rename = "chapter_title")]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(rename = "section_type")]
    pub kind: String,
    pub content: String,
    #[serde(
        rename = "section_title",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SectionMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionMetadata {
    #[serde(default)]
    pub word_count: Option<u32>,
    #[serde(default)]
    pub key_terms: Vec<String>,
}

impl Section {
    /// Word count from the source metadata, or counted from the content.
    pub fn word_count(&self) -> u32 {
        self.metadata
            .as_ref()
            .and_then(|m| m.word_count)
            .unwrap_or_else(|| self.content.split_whitespace().count() as u32)
    }

    pub fn key_terms(&self) -> &[String] {
        self.metadata
            .as_ref()
            .map(|m| m.key_terms.as_slice())
            .unwrap_or_default()
    }

    /// The title this section is indexed under.
    ///
    /// Explicit titles are kept as-is. A chapter's main content is named
    /// after the chapter; any other section is named after its first words.
    pub fn resolved_title(&self, chapter: &Chapter) -> String {
        if let Some(title) = self.title.as_deref()
            && !title.trim().is_empty()
        {
            return title.to_string();
        }

        if self.kind == MAIN_CONTENT {
            return format!("Introducción - {}", chapter.title);
        }

        let first_words: Vec<&str> =
            self.content.split_whitespace().take(TITLE_WORDS).collect();
        if first_words.is_empty() {
            UNTITLED_SECTION.to_string()
        } else {
            format!("{}...", first_words.join(" "))
        }
    }
}

/// Denormalized metadata stored alongside every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub chapter_number: u32,
    #[serde(default)]
    pub chapter_title: String,
    #[serde(default)]
    pub section_type: String,
    #[serde(default = "untitled_section")]
    pub section_title: String,
    #[serde(default)]
    pub word_count: u32,
    #[serde(default)]
    pub key_terms: Vec<String>,
    #[serde(default)]
    pub document_title: String,
    #[serde(default)]
    pub content_preview: String,
}

fn untitled_section() -> String {
    UNTITLED_SECTION.to_string()
}

impl Default for ChunkMetadata {
    fn default() -> Self {
        Self {
            chapter_number: 0,
            chapter_title: String::new(),
            section_type: String::new(),
            section_title: untitled_section(),
            word_count: 0,
            key_terms: Vec::new(),
            document_title: String::new(),
            content_preview: String::new(),
        }
    }
}

/// One retrievable unit: a section's content plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Sequential identifier in document order, starting at 0.
    pub id: u64,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// The record persisted in the vector index for this chunk.
    pub fn to_payload(&self, uploaded_at: &str) -> ChunkPayload {
        ChunkPayload {
            metadata: self.metadata.clone(),
            content: self.content.clone(),
            uploaded_at: Some(uploaded_at.to_string()),
            chunk_id: Some(self.id),
        }
    }
}

/// The payload stored with each point in the vector index.
///
/// Decoding is lenient: fields missing from a stored payload take their
/// defaults instead of failing the whole query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    #[serde(flatten)]
    pub metadata: ChunkMetadata,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<u64>,
}

/// Read and parse a corpus file.
pub fn load(path: &Path) -> Result<Document> {
    let raw = std::fs::read_to_string(path)?;
    let document = parse(&raw)?;
    tracing::info!(
        path = %path.display(),
        chapters = document.chapters.len(),
        "loaded corpus"
    );
    Ok(document)
}

/// Parse a corpus from its JSON text.
pub fn parse(raw: &str) -> Result<Document> {
    let file: CorpusFile = serde_json::from_str(raw)?;
    Ok(file.document)
}

/// Flatten a document into chunks, one per section, in document order.
pub fn flatten(document: &Document) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for chapter in &document.chapters {
        for section in &chapter.sections {
            let id = chunks.len() as u64;
            chunks.push(Chunk {
                id,
                content: section.content.clone(),
                metadata: ChunkMetadata {
                    chapter_number: chapter.number,
                    chapter_title: chapter.title.clone(),
                    section_type: section.kind.clone(),
                    section_title: section.resolved_title(chapter),
                    word_count: section.word_count(),
                    key_terms: section.key_terms().to_vec(),
                    document_title: document.title.clone(),
                    content_preview: content_preview(&section.content),
                },
            });
        }
    }

    chunks
}

/// First 100 characters of `content`, with an ellipsis when truncated.
pub fn content_preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}
