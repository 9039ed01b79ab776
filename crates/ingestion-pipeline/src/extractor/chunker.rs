/// Upper bound on the size of a chunk handed to the extraction model.
pub const CHUNK_BUDGET: usize = 3000;

const SENTENCE_TERMINATORS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Splits `text` into extraction chunks of at most `budget` characters.
///
/// Paragraphs are the primary unit. A paragraph over budget is split at
/// sentence boundaries (a terminator followed by whitespace) and sentences
/// are packed greedily; a single sentence over budget is hard-sliced.
/// Document order is preserved throughout.
pub fn chunk_text(text: &str, budget: usize) -> Vec<String> {
    let mut chunks = Vec::new();

    for paragraph in split_paragraphs(text) {
        if paragraph.chars().count() <= budget {
            chunks.push(paragraph.to_string());
            continue;
        }

        let mut current = String::new();
        let mut current_len = 0usize;
        for sentence in split_sentences(paragraph) {
            let sentence_len = sentence.chars().count();

            if sentence_len > budget {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                chunks.extend(hard_slice(sentence, budget));
                continue;
            }

            if current_len + sentence_len > budget && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push_str(sentence);
            current_len += sentence_len;
        }
        if !current.is_empty() {
            chunks.push(current);
        }
    }

    chunks
}

/// Paragraph boundaries are runs of two or more newlines.
fn split_paragraphs(text: &str) -> Vec<&str> {
    text.split("\n\n")
        .map(|segment| segment.trim_matches('\n'))
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Sentence boundaries sit after a terminator that is followed by
/// whitespace; the whitespace stays with the next sentence.
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut chars = paragraph.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if SENTENCE_TERMINATORS.contains(&c) {
            if let Some(&(next_index, next_char)) = chars.peek() {
                if next_char.is_whitespace() {
                    sentences.push(&paragraph[start..next_index]);
                    start = next_index;
                }
            }
        }
    }

    if start < paragraph.len() {
        sentences.push(&paragraph[start..]);
    }

    sentences
}

fn hard_slice(text: &str, budget: usize) -> Vec<String> {
    text.chars()
        .collect::<Vec<_>>()
        .chunks(budget)
        .map(|piece| piece.iter().collect())
        .collect()
}
