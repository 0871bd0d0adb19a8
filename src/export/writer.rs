//! JSONL encoding of training records.
//!
//! One record per line, in the layout trainers expect:
//! - SFT: `{"messages": [user, assistant]}`
//! - DPO: `{"prompt": "...", "chosen": "...", "rejected": "..."}`
//! - KTO: `{"prompt": [user], "completion": [assistant], "label": bool}`
//!
//! Output lands in a sibling temp file first and is renamed into place, so a
//! failed export never leaves a truncated file behind.

use crate::models::{
    DpoPair, ForgeError, KtoExample, Message, Result, SftRecord, TrainingRecords,
};
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Serialize)]
struct SftLine<'a> {
    messages: Vec<&'a Message>,
}

#[derive(Serialize)]
struct DpoLine<'a> {
    prompt: String,
    chosen: &'a str,
    rejected: &'a str,
}

#[derive(Serialize)]
struct KtoLine<'a> {
    prompt: &'a [Message],
    completion: [Message; 1],
    label: bool,
}

fn sft_line(record: &SftRecord) -> Result<String> {
    let assistant = Message::assistant(record.completion.as_str());
    let mut messages: Vec<&Message> = record.prompt.messages.iter().collect();
    messages.push(&assistant);
    encode(&SftLine { messages })
}

fn dpo_line(pair: &DpoPair) -> Result<String> {
    encode(&DpoLine {
        prompt: pair.prompt.plaintext(),
        chosen: &pair.chosen,
        rejected: &pair.rejected,
    })
}

fn kto_line(example: &KtoExample) -> Result<String> {
    encode(&KtoLine {
        prompt: &example.prompt.messages,
        completion: [Message::assistant(example.completion.as_str())],
        label: example.label,
    })
}

fn encode<T: Serialize>(line: &T) -> Result<String> {
    serde_json::to_string(line)
        .map_err(|e| ForgeError::Internal(format!("Failed to serialize record: {}", e)))
}

/// Encode every record as one JSON line.
pub fn encode_lines(records: &TrainingRecords) -> Result<Vec<String>> {
    match records {
        TrainingRecords::Sft(r) => r.iter().map(sft_line).collect(),
        TrainingRecords::Dpo(r) => r.iter().map(dpo_line).collect(),
        TrainingRecords::Kto(r) => r.iter().map(kto_line).collect(),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("export"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `records` to `path` as JSONL. Returns the number of lines written.
pub fn write_jsonl(path: &Path, records: &TrainingRecords) -> Result<usize> {
    let lines = encode_lines(records)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ForgeError::io("creating output directory", e))?;
    }

    let temp_path = temp_path(path);
    let file =
        File::create(&temp_path).map_err(|e| ForgeError::io("creating temp output file", e))?;
    let mut writer = BufWriter::new(file);
    for line in &lines {
        writeln!(writer, "{}", line).map_err(|e| ForgeError::io("writing output", e))?;
    }
    writer
        .flush()
        .map_err(|e| ForgeError::io("flushing output", e))?;
    drop(writer);
    debug!(path = %temp_path.display(), "Temp output written");

    // Atomic rename
    fs::rename(&temp_path, path).map_err(|e| ForgeError::io("renaming output file", e))?;

    info!(path = %path.display(), count = lines.len(), "Wrote training records");
    Ok(lines.len())
}
