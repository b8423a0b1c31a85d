//! Built-in element kinds.
//!
//! `file`, `directory` and `hashmap` are the catch-alls. Every other built-in
//! kind narrows `file` by extension, grouped into families (`image`, `video`,
//! `lut`, `scene`, `archive`, `ascii`) so filters can select a whole family.

mod ascii;
mod fs;
mod image;
mod pattern;

use crate::element::{Element, ElementInput};
use crate::registry::{ElementKind, KindRegistry};

pub use self::ascii::JsonKind;
pub use self::fs::{DirectoryKind, FileKind, HashmapKind};
pub use self::image::{ImageKind, TextureKind};
pub use self::pattern::PatternKind;

/// A kind recognised by file name suffix.
#[derive(Debug, Clone)]
pub struct ExtensionKind {
    name: &'static str,
    parent: &'static str,
    extensions: &'static [&'static str],
}

impl ExtensionKind {
    pub const fn new(
        name: &'static str,
        parent: &'static str,
        extensions: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            parent,
            extensions,
        }
    }

    /// Whether `lower_name` ends with one of the extensions.
    pub fn accepts(&self, lower_name: &str) -> bool {
        has_extension(lower_name, self.extensions)
    }
}

impl ElementKind for ExtensionKind {
    fn name(&self) -> &str {
        self.name
    }

    fn parent(&self) -> Option<&str> {
        Some(self.parent)
    }

    fn test(&self, input: &ElementInput, _parent: Option<&Element>) -> bool {
        self.accepts(&input.lower_name())
    }
}

pub(crate) fn has_extension(lower_name: &str, extensions: &[&str]) -> bool {
    extensions.iter().any(|ext| {
        lower_name.len() > ext.len() + 1
            && lower_name.ends_with(ext)
            && lower_name[..lower_name.len() - ext.len()].ends_with('.')
    })
}

pub(crate) const IMAGE_EXTENSIONS: &[&str] = &[
    "exr", "dpx", "jpg", "jpeg", "png", "tif", "tiff", "tga", "hdr", "tx", "psd",
];

const IMAGE_KINDS: &[ExtensionKind] = &[
    ExtensionKind::new("exr", "image", &["exr"]),
    ExtensionKind::new("dpx", "image", &["dpx"]),
    ExtensionKind::new("jpg", "image", &["jpg", "jpeg"]),
    ExtensionKind::new("png", "image", &["png"]),
    ExtensionKind::new("tif", "image", &["tif", "tiff"]),
    ExtensionKind::new("tga", "image", &["tga"]),
    ExtensionKind::new("hdr", "image", &["hdr"]),
    ExtensionKind::new("tx", "image", &["tx"]),
    ExtensionKind::new("psd", "image", &["psd"]),
];

const FAMILIES: &[(ExtensionKind, &[ExtensionKind])] = &[
    (
        ExtensionKind::new("video", "file", &["mov", "mp4", "mxf", "avi"]),
        &[
            ExtensionKind::new("mov", "video", &["mov"]),
            ExtensionKind::new("mp4", "video", &["mp4"]),
            ExtensionKind::new("mxf", "video", &["mxf"]),
            ExtensionKind::new("avi", "video", &["avi"]),
        ],
    ),
    (
        ExtensionKind::new("lut", "file", &["cube", "cc", "ccc", "cdl", "3dl"]),
        &[
            ExtensionKind::new("cube", "lut", &["cube"]),
            ExtensionKind::new("cc", "lut", &["cc"]),
            ExtensionKind::new("ccc", "lut", &["ccc"]),
            ExtensionKind::new("cdl", "lut", &["cdl"]),
            ExtensionKind::new("lut3d", "lut", &["3dl"]),
        ],
    ),
    (
        ExtensionKind::new("scene", "file", &["ma", "mb", "nk", "hip", "hipnc", "blend"]),
        &[
            ExtensionKind::new("mayaScene", "scene", &["ma", "mb"]),
            ExtensionKind::new("nukeScene", "scene", &["nk"]),
            ExtensionKind::new("houdiniScene", "scene", &["hip", "hipnc"]),
            ExtensionKind::new("blenderScene", "scene", &["blend"]),
        ],
    ),
    (
        ExtensionKind::new("archive", "file", &["zip", "tar", "tar.gz", "tgz", "rar", "7z"]),
        &[
            ExtensionKind::new("zip", "archive", &["zip"]),
            ExtensionKind::new("tar", "archive", &["tar"]),
            ExtensionKind::new("tarGz", "archive", &["tar.gz", "tgz"]),
            ExtensionKind::new("rar", "archive", &["rar"]),
            ExtensionKind::new("sevenZip", "archive", &["7z"]),
        ],
    ),
    (
        ExtensionKind::new("ascii", "file", &["json", "txt", "xml", "csv", "yaml", "yml"]),
        &[
            ExtensionKind::new("txt", "ascii", &["txt"]),
            ExtensionKind::new("xml", "ascii", &["xml"]),
            ExtensionKind::new("csv", "ascii", &["csv"]),
            ExtensionKind::new("yaml", "ascii", &["yaml", "yml"]),
        ],
    ),
];

/// Register the built-in taxonomy into `registry`.
pub fn register_builtin(registry: &KindRegistry) {
    registry.register(FileKind);
    registry.register(DirectoryKind);
    registry.register(HashmapKind);

    registry.register(ImageKind);
    for kind in IMAGE_KINDS {
        registry.register(kind.clone());
    }
    // tried before the per-extension image kinds at equal depth
    registry.register(TextureKind);

    for (family, members) in FAMILIES {
        registry.register(family.clone());
        for kind in members.iter() {
            registry.register(kind.clone());
        }
    }
    registry.register(JsonKind);
}
