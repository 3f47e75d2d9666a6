//! Page-image discovery in an input directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::warn;

use crate::core::model::Side;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

static SIDE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|[_\-\s]|\d)(left|right|l|r)$").unwrap());
static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub path: PathBuf,
    pub page: u32,
    pub side: Option<Side>,
    /// Earlier files already claimed this (page, side); 0 for the first one.
    pub duplicate: u32,
}

/// Page number and optional side tag from a file stem: the last digit run is
/// the page, a trailing `l`/`r`/`left`/`right` token the side.
pub fn parse_page_name(stem: &str) -> Option<(u32, Option<Side>)> {
    let side = SIDE_SUFFIX.captures(stem).and_then(|caps| {
        match caps.get(1).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
            Some("l") | Some("left") => Some(Side::Left),
            Some("r") | Some("right") => Some(Side::Right),
            _ => None,
        }
    });
    let page = DIGIT_RUN.find_iter(stem).last()?.as_str().parse().ok()?;
    Some((page, side))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Every page image under `dir`, in (page, side) order with left before right.
pub fn discover_pages(dir: &Path) -> Result<Vec<PageImage>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read input directory {}", dir.display()))?;

    let mut pages = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || !is_image(&path) {
            continue;
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        match parse_page_name(&stem) {
            Some((page, side)) => pages.push(PageImage { path, page, side, duplicate: 0 }),
            None => warn!(path = %path.display(), "no page number in file name, skipping"),
        }
    }
    pages.sort_by(|a, b| (a.page, a.side).cmp(&(b.page, b.side)).then_with(|| a.path.cmp(&b.path)));

    let mut seen: HashMap<(u32, Option<Side>), u32> = HashMap::new();
    for page in &mut pages {
        let count = seen.entry((page.page, page.side)).or_insert(0);
        page.duplicate = *count;
        if *count > 0 {
            warn!(
                path = %page.path.display(),
                page = page.page,
                "page number already taken, keeping as duplicate {}",
                *count + 1
            );
        }
        *count += 1;
    }
    Ok(pages)
}

/// Input already split upstream into left/right halves.
pub fn is_pre_split(pages: &[PageImage]) -> bool {
    pages.iter().any(|page| page.side.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_page_numbers_and_sides() {
        assert_eq!(parse_page_name("page-007"), Some((7, None)));
        assert_eq!(parse_page_name("scan_0012_r"), Some((12, Some(Side::Right))));
        assert_eq!(parse_page_name("book-3-left"), Some((3, Some(Side::Left))));
        assert_eq!(parse_page_name("0045L"), Some((45, Some(Side::Left))));
        assert_eq!(parse_page_name("vol2_page_118"), Some((118, None)));
        assert_eq!(parse_page_name("cover"), None);
    }

    #[test]
    fn words_ending_in_r_are_not_sides() {
        assert_eq!(parse_page_name("chapter_4_cover"), Some((4, None)));
    }

    #[test]
    fn discovers_images_in_page_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["p10.png", "p2_r.png", "p2_l.png", "notes.txt", "cover.png"] {
            fs::write(dir.path().join(name), b"")?;
        }
        let pages = discover_pages(dir.path())?;
        let keys: Vec<(u32, Option<Side>)> = pages.iter().map(|p| (p.page, p.side)).collect();
        assert_eq!(keys, vec![(2, Some(Side::Left)), (2, Some(Side::Right)), (10, None)]);
        assert!(is_pre_split(&pages));
        Ok(())
    }

    #[test]
    fn repeated_page_numbers_are_numbered_as_duplicates() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["vol2_page_1.png", "vol1_page_1.png", "vol2_page_2.png", "p2.jpg"] {
            fs::write(dir.path().join(name), b"")?;
        }
        let pages = discover_pages(dir.path())?;
        let found: Vec<(String, u32, u32)> = pages
            .iter()
            .map(|p| {
                let name = p.path.file_name().unwrap().to_string_lossy().to_string();
                (name, p.page, p.duplicate)
            })
            .collect();
        assert_eq!(
            found,
            vec![
                ("vol1_page_1.png".to_string(), 1, 0),
                ("vol2_page_1.png".to_string(), 1, 1),
                ("p2.jpg".to_string(), 2, 0),
                ("vol2_page_2.png".to_string(), 2, 1),
            ]
        );
        Ok(())
    }
}
