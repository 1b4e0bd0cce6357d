//! Concat list for an external encoder
//!
//! Renders a [`ClipPlan`] in the concat-demuxer list format:
//!
//! ```text
//! file 'vidA.mkv'
//! inpoint 50
//! outpoint 80
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use super::clips::ClipPlan;

fn quote(name: &str) -> String {
    format!("'{}'", name.replace('\'', r"'\''"))
}

pub fn render_concat_list(plan: &ClipPlan) -> String {
    let mut out = String::new();
    for segment in &plan.segments {
        out.push_str(&format!("file {}\n", quote(&segment.recording)));
        out.push_str(&format!("inpoint {}\n", segment.start));
        out.push_str(&format!("outpoint {}\n", segment.end));
    }
    out
}

pub fn write_concat_list<W: Write>(plan: &ClipPlan, mut writer: W) -> io::Result<()> {
    writer.write_all(render_concat_list(plan).as_bytes())?;
    writer.flush()
}

/// Write the list to `path`, replacing any existing file.
pub fn save_concat_list(plan: &ClipPlan, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = fs::File::create(path).with_context(|| format!("Failed to create concat list: {:?}", path))?;
    write_concat_list(plan, io::BufWriter::new(file))
        .with_context(|| format!("Failed to write concat list: {:?}", path))?;

    log::info!("{} clips written to {:?}", plan.segments.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::clips::ClipSegment;

    fn plan() -> ClipPlan {
        ClipPlan {
            segments: vec![
                ClipSegment { start: 50.0, end: 80.5, recording: "vidA.mkv".into() },
                ClipSegment { start: 0.0, end: 10.0, recording: "it's.mkv".into() },
            ],
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_render() {
        let text = render_concat_list(&plan());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "file 'vidA.mkv'",
                "inpoint 50",
                "outpoint 80.5",
                r"file 'it'\''s.mkv'",
                "inpoint 0",
                "outpoint 10",
            ]
        );
    }

    #[test]
    fn test_empty_plan() {
        assert_eq!(render_concat_list(&ClipPlan::default()), "");
    }

    #[test]
    fn test_save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt");
        save_concat_list(&plan(), &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), render_concat_list(&plan()));
    }
}
