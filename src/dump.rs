//! Scans an [`ObjectIndex`] for tk2d fonts and collects their resolved chains.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use indexmap::map::Entry;
use rabex::objects::pptr::PathId;
use regex::Regex;
use serde_derive::Serialize;
use serde_json::Value;

use crate::chain::{self, ChainResolver};
use crate::classify::{Classification, Classifier, Kind, Signals};
use crate::fields;
use crate::index::ObjectIndex;
use crate::object::{SceneObject, TypeTag};
use crate::records::{FontDataRecord, FontRecord, MaterialRecord, TextureRecord};
use crate::texture::TextureExport;

#[derive(Default)]
pub struct DumpOptions {
    /// Only `MonoBehaviour`s whose name matches are classified.
    pub name_filter: Option<Regex>,
    pub classifier: Classifier,
    /// Decode every resolved texture into an image.
    pub extract_images: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub type_counts: BTreeMap<String, usize>,
    pub monobehaviour_total: usize,
    pub monoscript_total: usize,
    /// `MonoBehaviour`s whose fields could not be read.
    pub unreadable: usize,
    pub font_like: usize,
    pub fontdata_like: usize,
    /// Readable `MonoBehaviour`s that passed the name filter.
    pub matched_by_name: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_regex: Option<String>,
}

/// Everything found in one run, in encounter order.
pub struct Analysis {
    pub diagnostics: Diagnostics,
    pub fonts: Vec<FontRecord>,
    pub font_datas: Vec<FontDataRecord>,
    pub materials: Vec<MaterialRecord>,
    pub textures: Vec<TextureRecord>,
    pub texture_export: Option<TextureExport>,
}

struct Candidate {
    path_id: PathId,
    tree: Value,
    class_name: Option<String>,
    classification: Classification,
}

pub fn dump<O: SceneObject>(index: &ObjectIndex<O>, options: &DumpOptions) -> Analysis {
    let mut diagnostics = Diagnostics {
        name_regex: options.name_filter.as_ref().map(|re| re.as_str().to_owned()),
        ..Default::default()
    };

    let mut font_candidates = Vec::new();
    let mut font_data_candidates = Vec::new();

    for object in index.iter() {
        let type_tag = object.type_tag();
        *diagnostics.type_counts.entry(type_tag.to_string()).or_default() += 1;
        match type_tag {
            TypeTag::MonoBehaviour => diagnostics.monobehaviour_total += 1,
            TypeTag::MonoScript => {
                diagnostics.monoscript_total += 1;
                continue;
            }
            _ => continue,
        }

        let tree = match object.field_tree() {
            Ok(tree) => tree,
            Err(e) => {
                tracing::trace!("MonoBehaviour {} is unreadable: {e}", object.local_id());
                diagnostics.unreadable += 1;
                continue;
            }
        };

        if let Some(filter) = &options.name_filter
            && !filter.is_match(&fields::name_of(&tree))
        {
            continue;
        }
        diagnostics.matched_by_name += 1;

        let class_name = chain::script_class_name(index, &tree);
        let signals = Signals::new(&tree, class_name.as_deref());
        let Some(classification) = options.classifier.classify(&signals) else {
            continue;
        };

        let candidate = Candidate {
            path_id: object.local_id(),
            tree,
            class_name,
            classification,
        };
        match classification.kind {
            Kind::Font => font_candidates.push(candidate),
            Kind::FontData => font_data_candidates.push(candidate),
        }
    }

    diagnostics.font_like = font_candidates.len();
    diagnostics.fontdata_like = font_data_candidates.len();

    let mut resolver = ChainResolver::new(index, options.extract_images);

    let mut font_datas: IndexMap<PathId, FontDataRecord> = IndexMap::new();
    for candidate in font_data_candidates {
        let Entry::Vacant(entry) = font_datas.entry(candidate.path_id) else {
            continue;
        };
        let record = resolver.font_data(
            candidate.path_id,
            &candidate.tree,
            candidate.class_name.unwrap_or_default(),
            candidate.classification.rule,
        );
        log_hit(&resolver, &record);
        entry.insert(record);
    }

    let mut fonts: IndexMap<PathId, FontRecord> = IndexMap::new();
    for candidate in font_candidates {
        if fonts.contains_key(&candidate.path_id) {
            continue;
        }
        let mut record = resolver.font(
            candidate.path_id,
            &candidate.tree,
            candidate.class_name.unwrap_or_default(),
            candidate.classification.rule,
        );

        // only classified font data counts, anything else stays unresolved
        let font_data_material = record
            .font_data
            .optional()
            .and_then(|font_data| font_datas.get(&font_data.path_id))
            .map(|font_data| font_data.material);
        record.effective_material = resolver.effective_material(font_data_material, record.material);

        fonts.insert(record.path_id, record);
    }

    let resolutions = resolver.finish();
    tracing::info!(
        "Found {} fonts, {} font data, {} materials, {} textures",
        fonts.len(),
        font_datas.len(),
        resolutions.materials.len(),
        resolutions.textures.len(),
    );

    Analysis {
        diagnostics,
        fonts: fonts.into_values().collect(),
        font_datas: font_datas.into_values().collect(),
        materials: resolutions.materials.into_values().collect(),
        textures: resolutions.textures.into_values().collect(),
        texture_export: resolutions.export,
    }
}

fn log_hit<O: SceneObject>(resolver: &ChainResolver<'_, O>, record: &FontDataRecord) {
    let material = resolver.material(record.material.path_id).filter(|_| !record.material.is_null());
    tracing::debug!(
        "[HIT] FontData {} '{}' chars={:?} material={} shader='{}'",
        record.path_id,
        record.name,
        record.chars_count,
        material.map_or("-", |m| m.name.as_str()),
        material.map_or("", |m| m.shader_name.as_str()),
    );
}
