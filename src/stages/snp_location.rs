// src/stages/snp_location.rs

//! SNP location extraction.
//!
//! Reads a whitespace-separated summary-statistics file (plain or gzip) and
//! writes `SNP \t CHR \t BP` per line, i.e. fields 2, 1 and 3 of the input.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use tracing::debug;

use crate::errors::{PipelineError, Result};
use crate::stages::{ProgressEvent, StageKind, default_resources};
use crate::task::{BoxFuture, ResourceHints, Task, TaskContext, TaskOutput};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Input name carrying the summary-statistics path.
pub const INPUT: &str = "input";

#[derive(Debug, Clone)]
pub struct MakeSnpLocationFile {
    resources: ResourceHints,
}

impl MakeSnpLocationFile {
    pub fn new(resources: ResourceHints) -> Self {
        Self { resources }
    }
}

impl Default for MakeSnpLocationFile {
    fn default() -> Self {
        Self::new(default_resources(&StageKind::SnpLocation))
    }
}

impl Task for MakeSnpLocationFile {
    fn kind(&self) -> StageKind {
        StageKind::SnpLocation
    }

    fn resources(&self) -> ResourceHints {
        self.resources
    }

    fn run<'a>(&'a self, ctx: &'a mut TaskContext) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            let input = PathBuf::from(ctx.literal(INPUT)?);
            let output = ctx.scratch_dir().join("snp.loc");

            ctx.report(ProgressEvent::CreatingSnpLocations {
                input: input.clone(),
            });

            let out_path = output.clone();
            let lines = tokio::task::spawn_blocking(move || write_snp_locations(&input, &out_path))
                .await
                .map_err(|e| anyhow::anyhow!("snp location worker panicked: {e}"))??;

            ctx.report(ProgressEvent::SnpLocationsWritten { lines });

            let handle = ctx.put_file(&output)?;
            Ok(TaskOutput::Artifact(handle))
        })
    }
}

fn write_snp_locations(input: &Path, output: &Path) -> Result<u64> {
    let file = File::open(input).map_err(|e| {
        io::Error::new(e.kind(), format!("opening {}: {e}", input.display()))
    })?;
    let reader = open_maybe_gzip(file)?;
    let mut writer = BufWriter::new(File::create(output)?);
    let lines = extract_snp_locations(reader, &mut writer)?;
    writer.flush()?;
    debug!(input = %input.display(), lines, "snp locations extracted");
    Ok(lines)
}

/// Wrap `source` in a gzip decoder when it starts with the gzip magic bytes.
///
/// Detection is by content, not by file name.
pub fn open_maybe_gzip<R: Read + 'static>(source: R) -> Result<Box<dyn BufRead>> {
    let mut reader = BufReader::new(source);
    let is_gzip = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(reader))))
    } else {
        Ok(Box::new(reader))
    }
}

/// Stream `reader` into `writer`, emitting `field2 \t field1 \t field3` for
/// every non-blank line. Returns the number of lines written.
///
/// A non-blank line with fewer than three fields is a
/// [`PipelineError::DataFormat`] naming its 1-based line number.
pub fn extract_snp_locations<R: BufRead, W: Write>(mut reader: R, writer: &mut W) -> Result<u64> {
    let mut line = String::new();
    let mut line_no: u64 = 0;
    let mut written: u64 = 0;

    loop {
        line.clear();
        let n = reader.read_line(&mut line).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => {
                PipelineError::DataFormat(format!("line {}: not valid UTF-8", line_no + 1))
            }
            _ => PipelineError::Io(e),
        })?;
        if n == 0 {
            break;
        }
        line_no += 1;

        let mut fields = line.split_whitespace();
        let (Some(chr), Some(snp), Some(bp)) = (fields.next(), fields.next(), fields.next())
        else {
            if line.trim().is_empty() {
                continue;
            }
            return Err(PipelineError::DataFormat(format!(
                "line {line_no}: expected at least 3 fields, found {}",
                line.split_whitespace().count()
            )));
        };

        writeln!(writer, "{snp}\t{chr}\t{bp}")?;
        written += 1;
    }

    Ok(written)
}
