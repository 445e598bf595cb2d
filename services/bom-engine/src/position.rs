//! Position Generator
//!
//! Deterministic hierarchical position codes: `M1` for the root, then
//! `.U<n>`, `.S<n>`, `.F<n>`, `.G<n>` for levels 2-5, `.P<n>` for primary
//! parts and `.<letter>` for alternates.

use bomsync_models::{BomError, BomResult, Level};
use bomsync_utils::split_primary_suffix;

/// Fixed code of the level-1 root.
pub const ROOT_POSITION: &str = "M1";

fn container_letter(level: Level) -> Option<char> {
    match level {
        Level::Module => Some('U'),
        Level::Submodule => Some('S'),
        Level::Family => Some('F'),
        Level::Group => Some('G'),
        _ => None,
    }
}

/// Letter for a 1-based alternate index (`1 -> 'A'`).
pub fn alternate_letter(sibling_index: usize) -> Option<char> {
    if (1..=26).contains(&sibling_index) {
        char::from_u32('A' as u32 + sibling_index as u32 - 1)
    } else {
        None
    }
}

/// Generates the position code of a new node.
///
/// `sibling_index` is 1-based. Alternates (level 7, or any part request
/// flagged `is_alternate`) are anchored to the governing primary's position.
pub fn generate_position(
    level: u8,
    parent_position: Option<&str>,
    sibling_index: usize,
    is_alternate: bool,
) -> BomResult<String> {
    let level = Level::from_u8(level)?;
    if level == Level::Unit {
        return Ok(ROOT_POSITION.to_string());
    }

    let parent = parent_position
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| BomError::missing_parent(format!("level {} requires a parent position", level.as_u8())))?;

    if sibling_index == 0 {
        return Err(BomError::SiblingIndexOutOfRange { level: level.as_u8(), index: sibling_index });
    }

    if is_alternate && level.is_container() {
        return Err(BomError::InvalidLevel { level: level.as_u8() });
    }

    if level == Level::Alternate || is_alternate {
        let letter = alternate_letter(sibling_index)
            .ok_or(BomError::SiblingIndexOutOfRange { level: level.as_u8(), index: sibling_index })?;
        return Ok(format!("{}.{}", parent, letter));
    }

    if level == Level::Primary {
        return Ok(match split_primary_suffix(parent) {
            Some((prefix, existing)) => format!("{}.P{}", prefix, existing + sibling_index),
            None => format!("{}.P{}", parent, sibling_index),
        });
    }

    match container_letter(level) {
        Some(letter) => Ok(format!("{}.{}{}", parent, letter, sibling_index)),
        None => Err(BomError::InvalidLevel { level: level.as_u8() }),
    }
}

/// Position of the primary an alternate position is anchored to.
pub fn alternate_anchor(position: &str) -> Option<&str> {
    let (anchor, letter) = position.rsplit_once('.')?;
    let mut chars = letter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() => Some(anchor),
        _ => None,
    }
}
