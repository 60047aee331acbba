//! Retrieval output formatting: a pure function from selected records to
//! the inline `<memories>` block contract. No I/O.

use crate::memory::MemoryRecord;

/// One retrieved record plus whether it was served from the archive.
pub struct RetrievedMemory<'a> {
    pub record: &'a MemoryRecord,
    pub from_archive: bool,
}

/// Renders the `<memories>` block. Returns `None` when `memories` is empty
/// — retrieval must never emit an empty or partial block.
pub fn format_memories_block(memories: &[RetrievedMemory<'_>]) -> Option<String> {
    if memories.is_empty() {
        return None;
    }
    let mut out = String::from("<memories>\n");
    for m in memories {
        let marker = if m.from_archive { "[archived]" } else { "" };
        out.push_str(&format!(
            "- [{}][L{}]{} {} → {}\n",
            m.record.created.to_rfc3339(),
            m.record.current_level,
            marker,
            m.record.trigger,
            m.record.content,
        ));
    }
    out.push_str("</memories>");
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::test_record;

    #[test]
    fn empty_selection_yields_none() {
        assert!(format_memories_block(&[]).is_none());
    }

    #[test]
    fn archived_marker_appears_only_for_archive_hits() {
        let active = test_record("mem_20260101_001");
        let archived = test_record("mem_20260101_002");
        let memories = vec![
            RetrievedMemory {
                record: &active,
                from_archive: false,
            },
            RetrievedMemory {
                record: &archived,
                from_archive: true,
            },
        ];
        let block = format_memories_block(&memories).unwrap();
        assert!(block.starts_with("<memories>\n"));
        assert!(block.ends_with("</memories>"));
        assert!(block.contains("[archived]"));
        let lines: Vec<&str> = block.lines().collect();
        assert!(!lines[1].contains("[archived]"));
        assert!(lines[2].contains("[archived]"));
    }
}
