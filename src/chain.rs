//! Resolution of the Font -> FontData -> Material -> Shader / Texture2D chain.

use indexmap::IndexMap;
use rabex::objects::pptr::PathId;
use serde::Deserialize as _;
use serde_json::Value;

use crate::fields::{
    self, FONT_DATA_KEYS, MAIN_TEX, MATERIAL_KEYS, TEX_ENV_NAME_KEYS, TEX_ENV_TEXTURE_KEYS,
    TEXTURE_KEYS,
};
use crate::index::ObjectIndex;
use crate::object::{SceneObject, TypeTag};
use crate::pptr::ObjRef;
use crate::records::{FontDataRecord, FontRecord, MaterialRecord, TextureRecord};
use crate::report::TEXTURE_DIR;
use crate::texture::{self, TextureExport};
use crate::unity::types::MonoScript;

/// Resolves materials and textures, caching every record by path id for the whole run.
pub struct ChainResolver<'a, O> {
    index: &'a ObjectIndex<O>,
    materials: IndexMap<PathId, MaterialRecord>,
    textures: IndexMap<PathId, TextureRecord>,
    export: Option<TextureExport>,
}

pub struct Resolutions {
    pub materials: IndexMap<PathId, MaterialRecord>,
    pub textures: IndexMap<PathId, TextureRecord>,
    pub export: Option<TextureExport>,
}

impl<'a, O: SceneObject> ChainResolver<'a, O> {
    /// With `extract_images`, every resolved texture is decoded as well.
    pub fn new(index: &'a ObjectIndex<O>, extract_images: bool) -> Self {
        ChainResolver {
            index,
            materials: IndexMap::new(),
            textures: IndexMap::new(),
            export: extract_images.then(TextureExport::default),
        }
    }

    pub fn material(&self, path_id: PathId) -> Option<&MaterialRecord> {
        self.materials.get(&path_id)
    }

    pub fn texture(&self, path_id: PathId) -> Option<&TextureRecord> {
        self.textures.get(&path_id)
    }

    fn is_resolved_material(&self, pptr: ObjRef) -> bool {
        pptr.optional()
            .is_some_and(|pptr| self.materials.contains_key(&pptr.path_id))
    }

    /// Returns the path id of the texture if the pointer resolves to a `Texture2D`.
    pub fn resolve_texture(&mut self, pptr: ObjRef) -> Option<PathId> {
        let pptr = pptr.optional()?;
        if self.textures.contains_key(&pptr.path_id) {
            return Some(pptr.path_id);
        }

        let index = self.index;
        let resolved = index.deref_typed(pptr, &TypeTag::Texture2D)?;
        let path_id = resolved.object.local_id();
        let mut record = TextureRecord {
            path_id,
            name: resolved.name(),
            ..Default::default()
        };

        if let Some(export) = &mut self.export {
            let decoded = texture::decode_texture(resolved.object, &resolved.tree);
            let entry = export.add(path_id, &record.name, decoded);
            record.width = entry.w;
            record.height = entry.h;
            record.image = entry.out.as_ref().map(|out| format!("{TEXTURE_DIR}/{out}"));
            record.decode_error = entry.error.clone();
        }

        self.textures.insert(path_id, record);
        Some(path_id)
    }

    /// Returns the path id of the material if the pointer resolves to a `Material`.
    pub fn resolve_material(&mut self, pptr: ObjRef) -> Option<PathId> {
        let pptr = pptr.optional()?;
        if self.materials.contains_key(&pptr.path_id) {
            return Some(pptr.path_id);
        }

        let index = self.index;
        let resolved = index.deref_typed(pptr, &TypeTag::Material)?;
        let path_id = resolved.object.local_id();

        let shader = ObjRef::from_optional_value(resolved.tree.get("m_Shader"));
        let shader_name = index
            .deref_typed(shader, &TypeTag::Shader)
            .map(|shader| shader.name())
            .unwrap_or_default();

        let main_tex = main_texture(&resolved.tree);
        self.resolve_texture(main_tex);

        let record = MaterialRecord {
            path_id,
            name: resolved.name(),
            shader,
            shader_name,
            main_tex,
        };
        self.materials.insert(path_id, record);
        Some(path_id)
    }

    pub fn font_data(
        &mut self,
        path_id: PathId,
        tree: &Value,
        class_name: String,
        matched_by: &'static str,
    ) -> FontDataRecord {
        let material = ObjRef::from_optional_value(fields::first_present(tree, MATERIAL_KEYS));
        let texture = ObjRef::from_optional_value(fields::first_present(tree, TEXTURE_KEYS));
        self.resolve_material(material);
        self.resolve_texture(texture);

        FontDataRecord {
            path_id,
            name: fields::name_of(tree),
            class_name,
            matched_by,
            version: fields::int_field(tree, "version"),
            line_height: fields::float_field(tree, "lineHeight"),
            use_dictionary: fields::bool_field(tree, "useDictionary"),
            chars_count: chars_count(tree),
            texture,
            material,
        }
    }

    /// Builds the record of a font. `effective_material` only considers the font's own
    /// material here, see [`ChainResolver::effective_material`].
    pub fn font(
        &mut self,
        path_id: PathId,
        tree: &Value,
        class_name: String,
        matched_by: &'static str,
    ) -> FontRecord {
        let font_data = ObjRef::from_optional_value(fields::first_present(tree, FONT_DATA_KEYS));
        let material = ObjRef::from_optional_value(fields::first_present(tree, MATERIAL_KEYS));
        self.resolve_material(material);

        FontRecord {
            path_id,
            name: fields::name_of(tree),
            class_name,
            matched_by,
            font_data,
            material,
            effective_material: self.effective_material(None, material),
        }
    }

    /// The font data's material if it resolved, else the font's own if that resolved.
    /// When neither resolved the raw pointer is kept, preferring the font data's.
    pub fn effective_material(&self, font_data_material: Option<ObjRef>, own: ObjRef) -> ObjRef {
        let font_data_material = font_data_material.unwrap_or(ObjRef::NULL);
        if self.is_resolved_material(font_data_material) {
            font_data_material
        } else if self.is_resolved_material(own) {
            own
        } else if !font_data_material.is_null() {
            font_data_material
        } else {
            own
        }
    }

    pub fn finish(self) -> Resolutions {
        Resolutions {
            materials: self.materials,
            textures: self.textures,
            export: self.export,
        }
    }
}

/// Finds the `_MainTex` pointer in `m_SavedProperties.m_TexEnvs`.
///
/// Entries are `{first, second}` mappings or `[first, second]` pairs, `first` being the
/// property name either directly or wrapped in a mapping.
pub fn main_texture(material: &Value) -> ObjRef {
    let Some(tex_envs) = material
        .get("m_SavedProperties")
        .and_then(|saved| saved.get("m_TexEnvs"))
        .and_then(fields::list_items)
    else {
        return ObjRef::NULL;
    };

    for entry in tex_envs {
        let (first, second) = match entry {
            Value::Object(pair) => (pair.get("first"), pair.get("second")),
            Value::Array(pair) if pair.len() == 2 => (pair.first(), pair.get(1)),
            _ => continue,
        };
        let name = match first {
            Some(Value::String(name)) => Some(name.as_str()),
            Some(first @ Value::Object(_)) => {
                fields::first_present(first, TEX_ENV_NAME_KEYS).and_then(Value::as_str)
            }
            _ => None,
        };
        if name != Some(MAIN_TEX) {
            continue;
        }

        let texture = second.and_then(|second| fields::first_present(second, TEX_ENV_TEXTURE_KEYS));
        return ObjRef::from_optional_value(texture);
    }

    ObjRef::NULL
}

pub fn chars_count(tree: &Value) -> Option<usize> {
    let chars = fields::list_items(tree.get("chars")?)?;
    Some(chars.len())
}

/// Best-effort `Namespace.Class` of a `MonoBehaviour`'s script.
pub fn script_class_name<O: SceneObject>(index: &ObjectIndex<O>, tree: &Value) -> Option<String> {
    let script = ObjRef::from_optional_value(tree.get("m_Script"));
    let script = index.deref_typed(script, &TypeTag::MonoScript)?;
    let script = MonoScript::deserialize(&script.tree).ok()?;
    (!script.m_ClassName.is_empty()).then(|| script.full_name().into_owned())
}
