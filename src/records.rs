use rabex::objects::pptr::PathId;
use serde_derive::Serialize;

use crate::pptr::ObjRef;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FontRecord {
    pub path_id: PathId,
    pub name: String,
    pub class_name: String,
    pub matched_by: &'static str,
    pub font_data: ObjRef,
    pub material: ObjRef,
    /// The font data's material if it resolved, else the font's own.
    /// Stays an unresolved pointer when neither resolved.
    pub effective_material: ObjRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FontDataRecord {
    pub path_id: PathId,
    pub name: String,
    pub class_name: String,
    pub matched_by: &'static str,
    pub version: Option<i64>,
    pub line_height: Option<f64>,
    pub use_dictionary: Option<bool>,
    pub chars_count: Option<usize>,
    pub texture: ObjRef,
    pub material: ObjRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialRecord {
    pub path_id: PathId,
    pub name: String,
    pub shader: ObjRef,
    pub shader_name: String,
    pub main_tex: ObjRef,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TextureRecord {
    pub path_id: PathId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Output path of the decoded image, relative to the output directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<String>,
}

/// Records that have a display name to sort by.
pub trait Named {
    fn name(&self) -> &str;
}

macro_rules! impl_named {
    ($($ty:ty),*) => {
        $(impl Named for $ty {
            fn name(&self) -> &str {
                &self.name
            }
        })*
    };
}
impl_named!(FontRecord, FontDataRecord, MaterialRecord, TextureRecord);

/// Stable sort by name, so equal names keep their encounter order.
pub fn sort_by_name<T: Named>(records: &mut [T]) {
    records.sort_by(|a, b| a.name().cmp(b.name()));
}
