//! Image family and textures.

use crate::element::{Element, ElementInput};
use crate::error::Result;
use crate::kinds::{has_extension, IMAGE_EXTENSIONS};
use crate::registry::ElementKind;
use crate::sequence;

/// Base of every image kind: sequence detection and header dimensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageKind;

impl ElementKind for ImageKind {
    fn name(&self) -> &str {
        "image"
    }

    fn parent(&self) -> Option<&str> {
        Some("file")
    }

    fn test(&self, input: &ElementInput, _parent: Option<&Element>) -> bool {
        has_extension(&input.lower_name(), IMAGE_EXTENSIONS)
    }

    fn init(&self, element: &mut Element, input: &ElementInput) -> Result<()> {
        let Some(path) = input.path() else {
            return Ok(());
        };
        sequence::assign(element, &path.name());

        if path.exists() {
            match image::image_dimensions(path.as_path()) {
                Ok((width, height)) => {
                    element.set_var("width", i64::from(width), false);
                    element.set_var("height", i64::from(height), false);
                }
                Err(e) => tracing::debug!("No dimensions for {}: {}", path, e),
            }
        }
        Ok(())
    }
}

const MAP_TYPES: &[&str] = &[
    "diffuse",
    "albedo",
    "basecolor",
    "specular",
    "roughness",
    "metalness",
    "metallic",
    "normal",
    "bump",
    "displacement",
    "height",
    "opacity",
    "emissive",
    "ao",
    "occlusion",
    "gloss",
    "sss",
    "mask",
];

/// Parsed `<assetName>_<mapType>[_<udim>]`.
#[derive(Debug, PartialEq)]
struct TextureName {
    asset: String,
    map: String,
    udim: Option<i64>,
}

/// Four digits starting with `1`, e.g. `1001`.
fn is_udim(part: &str) -> bool {
    part.len() == 4 && part.starts_with('1') && part.bytes().all(|b| b.is_ascii_digit())
}

fn parse_texture(stem: &str) -> Option<TextureName> {
    let mut parts: Vec<&str> = stem.split('_').collect();
    let udim = match parts.last() {
        Some(last) if is_udim(last) => {
            let udim = last.parse().ok();
            parts.pop();
            udim
        }
        _ => None,
    };
    let map = parts.pop()?.to_lowercase();
    if parts.is_empty() || !MAP_TYPES.contains(&map.as_str()) {
        return None;
    }
    let asset = parts.join("_");
    if asset.is_empty() {
        return None;
    }
    Some(TextureName { asset, map, udim })
}

/// Texture maps named `<assetName>_<mapType>[_<udim>]`. UDIM tiles of the
/// same map share a `group` tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextureKind;

impl ElementKind for TextureKind {
    fn name(&self) -> &str {
        "texture"
    }

    fn parent(&self) -> Option<&str> {
        Some("image")
    }

    fn test(&self, input: &ElementInput, _parent: Option<&Element>) -> bool {
        input
            .path()
            .and_then(|p| p.name().rsplit_once('.').map(|(stem, _)| stem.to_string()))
            .is_some_and(|stem| parse_texture(&stem).is_some())
    }

    fn init(&self, element: &mut Element, input: &ElementInput) -> Result<()> {
        let Some(path) = input.path() else {
            return Ok(());
        };
        let base_name = path.name();
        let Some((stem, ext)) = base_name.rsplit_once('.') else {
            return Ok(());
        };
        let Some(texture) = parse_texture(stem) else {
            return Ok(());
        };

        // a UDIM suffix is not a frame number
        element.remove_var("frame");
        element.remove_var("padding");
        element.remove_tag("groupSprintf");
        element.set_var("imageType", "single", false);
        element.set_var("assetName", texture.asset.as_str(), false);
        element.set_var("mapType", texture.map.as_str(), false);

        match texture.udim {
            Some(udim) => {
                let prefix = &stem[..stem.len() - 5];
                element.set_var("udim", udim, false);
                element.set_var("name", prefix, false);
                element.set_tag("group", format!("{prefix}_<UDIM>.{ext}"));
            }
            None => {
                element.set_var("name", stem, false);
                element.remove_tag("group");
            }
        }
        Ok(())
    }
}
