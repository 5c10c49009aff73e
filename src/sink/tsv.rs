//! Anki import file sink.
//!
//! Cards are appended to a tab-separated file that starts with Anki's
//! header directives, so the file can be imported as is. The file doubles
//! as the synced-card history: rows already in it are what pruning compares
//! against.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use super::{CardSink, DeliveryReport, SinkError, SyncedCard};
use crate::model::{CARD_FIELDS, EnrichedCard};
use crate::text;

/// Appends cards to an Anki-importable TSV file.
#[derive(Debug, Clone)]
pub struct TsvSink {
    path: PathBuf,
}

impl TsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Header directives written once, when the file is created.
fn header() -> String {
    let tags_column = CARD_FIELDS.len();
    format!(
        "#separator:tab\n#html:true\n#tags column:{}\n#columns:{}\n",
        tags_column,
        CARD_FIELDS.join("\t")
    )
}

/// Keep one card on one line.
fn escape_field(value: &str) -> String {
    value
        .replace('\t', " ")
        .replace('\r', "")
        .replace('\n', "<br>")
}

fn card_row(card: &EnrichedCard) -> String {
    let fields: Vec<String> = card.field_values().iter().map(|v| escape_field(v)).collect();
    fields.join("\t")
}

fn read_synced(path: &Path, wanted: &HashSet<String>) -> Result<Vec<SyncedCard>, std::io::Error> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut synced = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            tracing::warn!(path = %path.display(), "Skipping short row in card file");
            continue;
        }
        if wanted.contains(&text::fold_key(fields[1])) {
            synced.push(SyncedCard {
                uid: fields[0].to_string(),
                expression: fields[1].to_string(),
                part_of_speech: fields[3].to_string(),
                definition: fields[4].to_string(),
            });
        }
    }
    Ok(synced)
}

fn append_rows(path: &Path, rows: &[String]) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let is_new = !path.exists() || fs::metadata(path)?.len() == 0;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut buffer = String::new();
    if is_new {
        buffer.push_str(&header());
    }
    for row in rows {
        buffer.push_str(row);
        buffer.push('\n');
    }
    file.write_all(buffer.as_bytes())?;
    file.sync_all()
}

#[async_trait]
impl CardSink for TsvSink {
    fn name(&self) -> &str {
        "anki-tsv"
    }

    async fn synced_cards(&self, expressions: &[String]) -> Result<Vec<SyncedCard>, SinkError> {
        let path = self.path.clone();
        let wanted: HashSet<String> = expressions.iter().map(|e| text::fold_key(e)).collect();
        let synced = tokio::task::spawn_blocking(move || read_synced(&path, &wanted)).await??;
        Ok(synced)
    }

    async fn deliver(&self, cards: &[EnrichedCard]) -> Result<Vec<DeliveryReport>, SinkError> {
        let mut rows = Vec::with_capacity(cards.len());
        let mut reports = Vec::with_capacity(cards.len());
        for card in cards {
            if card.uid.is_empty() || card.expression.trim().is_empty() {
                tracing::warn!(lookup = %card.lookup_id, "Rejecting card without uid or expression");
                reports.push(DeliveryReport::rejected(&card.uid, "missing uid or expression"));
                continue;
            }
            rows.push(card_row(card));
            reports.push(DeliveryReport::accepted(&card.uid));
        }

        if !rows.is_empty() {
            let path = self.path.clone();
            tokio::task::spawn_blocking(move || append_rows(&path, &rows)).await??;
        }
        Ok(reports)
    }
}
