//! Destinations for finished message records.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::extract::record::MessageRecord;

pub trait RecordSink {
    fn emit(&mut self, record: &MessageRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One JSON object per line.
pub struct JsonlSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl JsonlSink<Box<dyn Write + Send>> {
    /// Open `path` for writing (truncating), creating parent directories.
    /// `-` means stdout.
    pub fn create(path: &str) -> Result<Self> {
        if path == "-" {
            return Ok(Self::new(Box::new(std::io::stdout())));
        }

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create parent directory for records file {path}")
                })?;
            }
        }
        let file =
            File::create(path).with_context(|| format!("failed to create records file {path}"))?;
        Ok(Self::new(Box::new(BufWriter::new(file))))
    }
}

impl<W: Write> RecordSink for JsonlSink<W> {
    fn emit(&mut self, record: &MessageRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl RecordSink for Vec<MessageRecord> {
    fn emit(&mut self, record: &MessageRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}
