/// Maximum number of characters handed to the embedding model per document.
pub const INGEST_EMBEDDING_CAP: usize = 6000;
/// A boundary is only used when it leaves at least this much content.
pub const INGEST_BOUNDARY_FLOOR: usize = 3000;

/// Bounded copy of `content` used for the document embedding; the stored
/// content is always the full text.
///
/// Over the cap, the cut falls on the last paragraph boundary within it, or
/// failing that the last sentence boundary (kept inclusive), as long as the
/// boundary sits past the floor; otherwise the text is hard-sliced at the
/// cap.
pub fn embedding_input(content: &str) -> String {
    if content.chars().count() <= INGEST_EMBEDDING_CAP {
        return content.to_string();
    }

    let prefix: String = content.chars().take(INGEST_EMBEDDING_CAP).collect();

    if let Some(position) = prefix.rfind("\n\n") {
        if prefix[..position].chars().count() > INGEST_BOUNDARY_FLOOR {
            return prefix[..position].to_string();
        }
    }

    if let Some(position) = prefix.rfind(['。', '\n']) {
        let end = position
            + prefix[position..]
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(0);
        if prefix[..end].chars().count() > INGEST_BOUNDARY_FLOOR {
            return prefix[..end].to_string();
        }
    }

    prefix
}
