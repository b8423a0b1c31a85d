//! Frame sequence detection.
//!
//! Two shapes are recognised: `name.frame.ext` and `name_frame.ext`, where
//! `frame` is a run of digits whose length is the padding.

use crate::element::Element;

/// Sequence components of a file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceInfo {
    pub name: String,
    pub separator: char,
    pub frame: i64,
    pub padding: usize,
    pub ext: String,
}

impl SequenceInfo {
    /// Group tag shared by every frame, e.g. `plate.####.exr`.
    pub fn group(&self) -> String {
        format!(
            "{}{}{}.{}",
            self.name,
            self.separator,
            "#".repeat(self.padding),
            self.ext
        )
    }

    /// printf-style group form, e.g. `plate.%04d.exr`.
    pub fn group_sprintf(&self) -> String {
        format!(
            "{}{}%0{}d.{}",
            self.name, self.separator, self.padding, self.ext
        )
    }

    /// File name of another frame of the same sequence.
    pub fn frame_name(&self, frame: i64) -> String {
        format!(
            "{}{}{:0width$}.{}",
            self.name,
            self.separator,
            frame,
            self.ext,
            width = self.padding
        )
    }
}

/// Detect the sequence shape of a base name.
pub fn detect(base_name: &str) -> Option<SequenceInfo> {
    let (stem, ext) = base_name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    let digits = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    let head = &stem[..stem.len() - digits];
    let separator = head.chars().last().filter(|c| matches!(c, '.' | '_'))?;
    let name = &head[..head.len() - 1];
    if name.is_empty() {
        return None;
    }
    Some(SequenceInfo {
        name: name.to_string(),
        separator,
        frame: stem[head.len()..].parse().ok()?,
        padding: digits,
        ext: ext.to_string(),
    })
}

/// Assign `imageType` and, for sequences, `name`, `frame`, `padding` and
/// the `group`/`groupSprintf` tags.
pub fn assign(element: &mut Element, base_name: &str) {
    match detect(base_name) {
        Some(info) => {
            element.set_var("imageType", "sequence", false);
            element.set_var("name", info.name.as_str(), false);
            element.set_var("frame", info.frame, false);
            element.set_var("padding", info.padding, false);
            element.set_tag("group", info.group());
            element.set_tag("groupSprintf", info.group_sprintf());
        }
        None => element.set_var("imageType", "single", false),
    }
}
