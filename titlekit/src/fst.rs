use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::decrypt::{physical_offset, CancelToken, PAYLOAD_SIZE};
use crate::error::{TitleError, TitleResult};
use crate::manifest::ContentManifest;
use crate::report::{ExtractReport, Warning};
use crate::tmd::ContentChunkRecord;

const FST_ENTRY_SIZE: usize = 16;
const EXTHEADER_RECORD_SIZE: usize = 32;
const EXTHEADER_TABLE_OFFSET: usize = 0x14;

/// CLI-facing toggles over the tree walk; none of them change which bytes
/// get extracted, only what gets logged and whether files are written.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Walk and log the tree but never write files.
    pub no_extract: bool,
    /// Show (never extract) entries with the deleted bit set.
    pub show_all: bool,
    /// Log type/flags/offset/size/content-index per entry.
    pub dump_info: bool,
    /// Log accumulated paths instead of an indented tree.
    pub full_paths: bool,
}

struct RawEntry {
    kind: u8,
    name_off: u32,
    raw_off: u32,
    size: u32,
    flags: u16,
    content_index: u16,
}

impl RawEntry {
    fn is_dir(&self) -> bool {
        self.kind & 1 != 0
    }

    fn is_deleted(&self) -> bool {
        self.kind & 0x80 != 0
    }
}

fn read_entry(bytes: &[u8], entries_offset: usize, index: usize) -> TitleResult<RawEntry> {
    let off = entries_offset + index * FST_ENTRY_SIZE;
    let e = bytes.get(off..off + FST_ENTRY_SIZE).ok_or_else(|| {
        TitleError::MalformedMetadata(format!("fst entry {index} out of bounds"))
    })?;
    Ok(RawEntry {
        kind: e[0],
        name_off: u32::from_be_bytes([0, e[1], e[2], e[3]]),
        raw_off: u32::from_be_bytes(e[4..8].try_into().unwrap()),
        size: u32::from_be_bytes(e[8..12].try_into().unwrap()),
        flags: u16::from_be_bytes(e[12..14].try_into().unwrap()),
        content_index: u16::from_be_bytes(e[14..16].try_into().unwrap()),
    })
}

fn read_name(bytes: &[u8], names_offset: usize, name_off: u32) -> TitleResult<String> {
    let start = names_offset + name_off as usize;
    let slice = bytes
        .get(start..)
        .ok_or_else(|| TitleError::MalformedMetadata("fst name offset out of bounds".into()))?;
    let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
    Ok(String::from_utf8_lossy(&slice[..end]).into_owned())
}

/// Rejects anything that isn't a single, non-empty, non-traversal path
/// segment — the defensive check spec.md §4.3 asks for and the source
/// lacks.
fn name_is_safe(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\\')
}

fn content_path(game_dir: &Path, entry: &ContentChunkRecord) -> TitleResult<PathBuf> {
    for ext in [".app.dec", ".dec"] {
        let path = game_dir.join(format!("{}{ext}", entry.content_id_hex()));
        if path.is_file() {
            return Ok(path);
        }
    }
    Err(TitleError::MissingFile(
        game_dir.join(format!("{}.app.dec", entry.content_id_hex())),
    ))
}

/// Extracts the file tree embedded in `manifest.entries()[0]`'s decrypted
/// container into `output_dir`.
///
/// Content files absent from `game_dir` put the walk in partial mode: the
/// entries referencing them are skipped (with a warning) but the rest of
/// the tree is still walked.
///
/// `cancel` is polled once per directory/file entry; a tripped token aborts
/// the walk and removes the partial output of the file in progress, if any.
pub fn extract_title(
    game_dir: &Path,
    output_dir: &Path,
    manifest: &ContentManifest,
    options: &ExtractOptions,
    cancel: &dyn CancelToken,
) -> TitleResult<ExtractReport> {
    let entries = manifest.entries();
    let fst_entry = entries
        .first()
        .ok_or_else(|| TitleError::MalformedMetadata("manifest has no content entries".into()))?;

    let fst_path = content_path(game_dir, fst_entry)?;
    let fst_bytes = fs::read(&fst_path)?;

    if fst_bytes.len() < 12 {
        return Err(TitleError::MalformedMetadata("fst shorter than its own header".into()));
    }
    let exh_count = u32::from_be_bytes(fst_bytes[8..12].try_into().unwrap()) as usize;
    let entries_offset = EXTHEADER_TABLE_OFFSET + EXTHEADER_RECORD_SIZE * exh_count;

    let root = read_entry(&fst_bytes, entries_offset, 0)?;
    let total_entries = root.size as usize;
    let names_offset = entries_offset + FST_ENTRY_SIZE * total_entries;

    if fst_bytes.len() < names_offset {
        return Err(TitleError::MalformedMetadata(
            "fst truncated before name table".into(),
        ));
    }

    fs::create_dir_all(output_dir)?;
    let mut report = ExtractReport::default();
    let mut open_containers: Vec<Option<File>> = (0..entries.len()).map(|_| None).collect();
    let mut path_stack: Vec<String> = Vec::new();

    walk(
        &fst_bytes,
        entries_offset,
        names_offset,
        total_entries,
        1,
        entries,
        &mut open_containers,
        game_dir,
        output_dir,
        &mut path_stack,
        -1,
        options,
        &mut report,
        cancel,
    )?;

    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn walk(
    fst_bytes: &[u8],
    entries_offset: usize,
    names_offset: usize,
    total_entries: usize,
    start: usize,
    contents: &[ContentChunkRecord],
    open_containers: &mut [Option<File>],
    game_dir: &Path,
    output_dir: &Path,
    path_stack: &mut Vec<String>,
    topdir: i64,
    options: &ExtractOptions,
    report: &mut ExtractReport,
    cancel: &dyn CancelToken,
) -> TitleResult<usize> {
    let mut i = start;
    while i < total_entries {
        if cancel.is_cancelled() {
            return Err(TitleError::Cancelled);
        }

        let entry = read_entry(fst_bytes, entries_offset, i)?;
        let name = read_name(fst_bytes, names_offset, entry.name_off)?;

        if entry.is_dir() {
            // Preserved verbatim per spec.md §9's ambiguity note: the
            // source's meaning for this guard isn't fully documented.
            if i64::from(entry.raw_off) <= topdir {
                return Ok(i);
            }

            if !name_is_safe(&name) {
                report.warnings.push(Warning::PathEscape {
                    path: output_dir.join(&name),
                });
                i = entry.size as usize;
                continue;
            }

            path_stack.push(name.clone());
            if options.dump_info {
                log::info!(
                    "dir  flags={:#06x} content={} size={} -> {}",
                    entry.flags,
                    entry.content_index,
                    entry.size,
                    display_path(path_stack, options.full_paths)
                );
            }
            if !options.no_extract {
                fs::create_dir_all(output_dir.join(path_stack.join("/")))?;
            }

            let subtree_end = entry.size as usize;
            walk(
                fst_bytes,
                entries_offset,
                names_offset,
                total_entries,
                i + 1,
                contents,
                open_containers,
                game_dir,
                output_dir,
                path_stack,
                i64::from(entry.raw_off),
                options,
                report,
                cancel,
            )?;
            path_stack.pop();
            i = subtree_end;
            continue;
        }

        if entry.is_deleted() {
            if options.show_all {
                log::info!("deleted entry {} (skipped)", name);
            }
            i += 1;
            continue;
        }

        if !name_is_safe(&name) {
            report.warnings.push(Warning::PathEscape {
                path: output_dir.join(&name),
            });
            i += 1;
            continue;
        }

        path_stack.push(name);
        let out_path = output_dir.join(path_stack.join("/"));
        if options.dump_info {
            log::info!(
                "file flags={:#06x} content={} raw_off={:#x} size={} -> {}",
                entry.flags,
                entry.content_index,
                entry.raw_off,
                entry.size,
                display_path(path_stack, options.full_paths)
            );
        }

        let mut raw_off = u64::from(entry.raw_off);
        if entry.flags & 4 == 0 {
            raw_off <<= 5;
        }

        let content_index = entry.content_index as usize;
        if content_index >= contents.len() {
            return Err(TitleError::MalformedMetadata(format!(
                "fst entry references content index {content_index} >= {}",
                contents.len()
            )));
        }

        if !options.no_extract {
            match extract_file(
                contents,
                open_containers,
                game_dir,
                &out_path,
                raw_off,
                u64::from(entry.size),
                content_index,
            ) {
                Ok(()) => report.extracted.push(out_path),
                Err(TitleError::MissingFile(_)) => {
                    log::warn!("content for {} missing, skipping", out_path.display());
                    report.warnings.push(Warning::MissingContainer {
                        content_id: contents[content_index].content_id_hex(),
                    });
                    report.skipped.push(out_path);
                }
                Err(e) => {
                    let _ = fs::remove_file(&out_path);
                    return Err(e);
                }
            }
        } else {
            report.extracted.push(out_path);
        }
        path_stack.pop();
        i += 1;
    }
    Ok(i)
}

fn display_path(stack: &[String], full_paths: bool) -> String {
    if full_paths {
        stack.join("/")
    } else {
        stack.last().cloned().unwrap_or_default()
    }
}

fn extract_file(
    contents: &[ContentChunkRecord],
    open_containers: &mut [Option<File>],
    game_dir: &Path,
    out_path: &Path,
    raw_off: u64,
    size: u64,
    content_index: usize,
) -> TitleResult<()> {
    if open_containers[content_index].is_none() {
        let path = content_path(game_dir, &contents[content_index])?;
        open_containers[content_index] = Some(File::open(path)?);
    }
    let reader = open_containers[content_index].as_mut().unwrap();

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = File::create(out_path)?;

    if contents[content_index].is_hash_tree() {
        copy_hash_tree_range(reader, raw_off, size, &mut writer)
    } else {
        copy_flat_range(reader, raw_off, size, &mut writer)
    }
}

fn copy_flat_range(reader: &mut File, offset: u64, size: u64, writer: &mut File) -> TitleResult<()> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut remaining = size;
    let mut buf = vec![0u8; 1 << 16];
    while remaining > 0 {
        let take = remaining.min(buf.len() as u64) as usize;
        reader.read_exact(&mut buf[..take])?;
        writer.write_all(&buf[..take])?;
        remaining -= take as u64;
    }
    Ok(())
}

/// Copies `size` logical bytes starting at logical offset `logical_start`,
/// skipping the 0x400-byte prologue at the start of every 0x10000-byte
/// chunk by re-deriving the physical offset on every sub-read.
fn copy_hash_tree_range(
    reader: &mut File,
    logical_start: u64,
    size: u64,
    writer: &mut File,
) -> TitleResult<()> {
    let mut remaining = size;
    let mut logical = logical_start;
    let mut buf = vec![0u8; PAYLOAD_SIZE];

    while remaining > 0 {
        let intra = logical % PAYLOAD_SIZE as u64;
        let take = remaining.min(PAYLOAD_SIZE as u64 - intra) as usize;
        let phys = physical_offset(logical);
        reader.seek(SeekFrom::Start(phys))?;
        reader.read_exact(&mut buf[..take])?;
        writer.write_all(&buf[..take])?;
        logical += take as u64;
        remaining -= take as u64;
    }
    Ok(())
}
