use super::{parse_pairs, Workspace};
use std::path::Path;

/// Paragraphs longer than this are split on word boundaries
const MAX_CHUNK_CHARS: usize = 1000;

/// Split text into chunks at blank lines
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            flush(&mut current, &mut chunks);
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(line);
    }
    flush(&mut current, &mut chunks);
    chunks
}

fn flush(paragraph: &mut String, chunks: &mut Vec<String>) {
    if paragraph.is_empty() {
        return;
    }
    if paragraph.chars().count() <= MAX_CHUNK_CHARS {
        chunks.push(std::mem::take(paragraph));
        return;
    }

    let mut piece = String::new();
    for word in paragraph.split_whitespace() {
        if !piece.is_empty() && piece.chars().count() + 1 + word.chars().count() > MAX_CHUNK_CHARS {
            chunks.push(std::mem::take(&mut piece));
        }
        if !piece.is_empty() {
            piece.push(' ');
        }
        piece.push_str(word);
    }
    if !piece.is_empty() {
        chunks.push(piece);
    }
    paragraph.clear();
}

pub fn run(file: &Path, meta: &[String]) -> anyhow::Result<()> {
    let workspace = Workspace::load()?;
    let mut metadata = parse_pairs(meta)?;
    if let Some(name) = file.file_name().and_then(|n| n.to_str()) {
        metadata
            .entry("source".to_string())
            .or_insert_with(|| name.to_string());
    }

    let text = std::fs::read_to_string(file)?;
    let chunks = split_paragraphs(&text);
    if chunks.is_empty() {
        println!("Nothing to index in {}", file.display());
        return Ok(());
    }

    let index = workspace.chunks()?;
    let added = index.add_chunks(chunks.iter().map(String::as_str), &metadata)?;
    println!(
        "Indexed {} chunks from {} ({} total)",
        added,
        file.display(),
        index.count()?
    );
    Ok(())
}
