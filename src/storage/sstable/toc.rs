//! The Toc component: a plain-text listing of the component kinds present
//! in one SSTable generation, written last during commit.

use std::path::{Path, PathBuf};

use crate::storage::sstable::ComponentKind;
use crate::{Error, Result};

/// Render the list of present component kinds into the Toc file's text
/// format: one kind name per line.
pub fn render(components: &[ComponentKind]) -> String {
    let mut lines: Vec<&str> = components.iter().map(|c| c.file_suffix()).collect();
    lines.sort_unstable();
    lines.join("\n") + "\n"
}

/// Write the Toc file through a temp-name/rename dance like every other
/// component, so a crash mid-write leaves only a missing Toc (treated as
/// "this generation never finished"), never a torn one.
pub fn write(path: &Path, components: &[ComponentKind]) -> Result<()> {
    let contents = render(components);
    let temp_path = temp_name(path);

    std::fs::write(&temp_path, contents).map_err(|e| Error::write(&temp_path, e))?;
    let file = std::fs::File::open(&temp_path).map_err(|e| Error::write(&temp_path, e))?;
    file.sync_all().map_err(|e| Error::write(&temp_path, e))?;
    drop(file);

    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        Error::write(path, e)
    })
}

fn temp_name(final_path: &Path) -> PathBuf {
    let mut os = final_path.as_os_str().to_owned();
    os.push("-tmp");
    PathBuf::from(os)
}

pub fn parse(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_sorts_component_names() {
        let rendered = render(&[ComponentKind::Data, ComponentKind::Filter]);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines, vec!["Data", "Filter"]);
    }

    #[test]
    fn test_write_and_parse_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ks-tbl-nb-1-TOC.txt");
        write(
            &path,
            &[ComponentKind::Data, ComponentKind::PrimaryIndex, ComponentKind::Toc],
        )
        .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed = parse(&contents);
        assert_eq!(parsed.len(), 3);
        assert!(parsed.contains(&"Data".to_string()));
    }

    #[test]
    fn test_write_leaves_no_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ks-tbl-nb-1-TOC.txt");
        write(&path, &[ComponentKind::Data]).unwrap();

        assert!(path.exists());
        assert!(!temp_name(&path).exists());
    }
}
