//! Output artifacts of a dump run.

use std::fmt::Write as _;
use std::fs::{self, DirBuilder, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use rabex::objects::pptr::PathId;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde_derive::Serialize;

use crate::dump::{Analysis, Diagnostics};
use crate::records::{self, FontDataRecord, FontRecord, MaterialRecord, TextureRecord};
use crate::texture::TextureExport;

pub const DUMP_FILE: &str = "tk2d_dump.json";
pub const CHAINS_FILE: &str = "tk2d_chains.txt";
pub const CSV_FILE: &str = "tk2d_fontdata_dump.csv";
pub const TEXTURE_DIR: &str = "textures";

#[derive(Serialize)]
pub struct Report {
    pub source_assets: PathBuf,
    pub dependencies: Vec<PathBuf>,
    pub diagnostic: Diagnostics,
    pub fonts: Vec<FontRecord>,
    pub fontdatas: Vec<FontDataRecord>,
    pub materials: Vec<MaterialRecord>,
    pub textures: Vec<TextureRecord>,
    #[serde(skip)]
    texture_export: Option<TextureExport>,
}

#[derive(Debug, Default)]
pub struct WriteOptions {
    /// Also write the per font data CSV.
    pub csv: bool,
    /// Only rows whose main texture name matches end up in the CSV.
    pub texture_filter: Option<Regex>,
}

/// One line of the CSV. Column order is the declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FontDataRow {
    pub mono_pathid: PathId,
    pub version: Option<i64>,
    #[serde(rename = "lineHeight")]
    pub line_height: Option<f64>,
    pub chars_count: Option<usize>,
    pub material_pathid: Option<PathId>,
    pub material_name: Option<String>,
    pub shader_name: Option<String>,
    pub maintex_pathid: Option<PathId>,
    pub maintex_name: Option<String>,
}

const CSV_HEADER: [&str; 9] = [
    "mono_pathid",
    "version",
    "lineHeight",
    "chars_count",
    "material_pathid",
    "material_name",
    "shader_name",
    "maintex_pathid",
    "maintex_name",
];

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_owned())
}

fn or_dash<T: std::fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "-".to_owned(),
    }
}

impl Report {
    /// Sorts every record list by name. Paths are made absolute.
    pub fn new(analysis: Analysis, source_assets: &Path, dependencies: &[PathBuf]) -> Report {
        let Analysis {
            diagnostics,
            mut fonts,
            mut font_datas,
            mut materials,
            mut textures,
            texture_export,
        } = analysis;

        records::sort_by_name(&mut fonts);
        records::sort_by_name(&mut font_datas);
        records::sort_by_name(&mut materials);
        records::sort_by_name(&mut textures);

        Report {
            source_assets: absolute(source_assets),
            dependencies: dependencies.iter().map(|dep| absolute(dep)).collect(),
            diagnostic: diagnostics,
            fonts,
            fontdatas: font_datas,
            materials,
            textures,
            texture_export,
        }
    }

    pub fn texture_export(&self) -> Option<&TextureExport> {
        self.texture_export.as_ref()
    }

    fn material(&self, path_id: PathId) -> Option<&MaterialRecord> {
        self.materials.iter().find(|material| material.path_id == path_id)
    }

    fn texture(&self, path_id: PathId) -> Option<&TextureRecord> {
        self.textures.iter().find(|texture| texture.path_id == path_id)
    }

    /// Human readable trace of every font's chain, one block per font.
    pub fn chain_trace(&self) -> String {
        let font_datas: FxHashMap<PathId, &FontDataRecord> = self
            .fontdatas
            .iter()
            .map(|font_data| (font_data.path_id, font_data))
            .collect();

        let mut out = String::new();
        for font in &self.fonts {
            let _ = writeln!(out, "[Font] {} (pid={})", font.name, font.path_id);

            let font_data = font
                .font_data
                .optional()
                .and_then(|pptr| font_datas.get(&pptr.path_id));
            match font_data {
                Some(font_data) => {
                    let _ = writeln!(
                        out,
                        "  -> FontData: {} (pid={}) v={} lineHeight={} chars={}",
                        font_data.name,
                        font_data.path_id,
                        or_dash(&font_data.version),
                        or_dash(&font_data.line_height),
                        or_dash(&font_data.chars_count),
                    );
                }
                None => {
                    let pptr = font.font_data;
                    let _ = writeln!(
                        out,
                        "  -> FontData: unresolved (file={} pid={})",
                        pptr.file_id, pptr.path_id
                    );
                }
            }

            let material = font
                .effective_material
                .optional()
                .and_then(|pptr| self.material(pptr.path_id));
            match material {
                Some(material) => {
                    let _ = write!(
                        out,
                        "     -> Material: {} (pid={}) shader='{}' mainTexPid={}",
                        material.name, material.path_id, material.shader_name, material.main_tex.path_id,
                    );
                    if let Some(texture) = material
                        .main_tex
                        .optional()
                        .and_then(|pptr| self.texture(pptr.path_id))
                    {
                        let _ = write!(out, " mainTex='{}'", texture.name);
                    }
                    out.push('\n');
                }
                None => {
                    let pptr = font.effective_material;
                    let _ = writeln!(
                        out,
                        "     -> Material: unresolved (file={} pid={})",
                        pptr.file_id, pptr.path_id
                    );
                }
            }
            out.push('\n');
        }
        out
    }

    /// CSV projection of the font data records.
    pub fn fontdata_rows(&self, texture_filter: Option<&Regex>) -> Vec<FontDataRow> {
        let mut rows = Vec::with_capacity(self.fontdatas.len());
        for font_data in &self.fontdatas {
            let material = font_data
                .material
                .optional()
                .and_then(|pptr| self.material(pptr.path_id));
            let main_tex = material
                .and_then(|material| material.main_tex.optional())
                .and_then(|pptr| self.texture(pptr.path_id));

            if let Some(filter) = texture_filter
                && !main_tex.is_some_and(|texture| filter.is_match(&texture.name))
            {
                continue;
            }

            rows.push(FontDataRow {
                mono_pathid: font_data.path_id,
                version: font_data.version,
                line_height: font_data.line_height,
                chars_count: font_data.chars_count,
                material_pathid: font_data.material.optional().map(|pptr| pptr.path_id),
                material_name: material.map(|material| material.name.clone()),
                shader_name: material.map(|material| material.shader_name.clone()),
                maintex_pathid: main_tex.map(|texture| texture.path_id),
                maintex_name: main_tex.map(|texture| texture.name.clone()),
            });
        }
        rows
    }

    fn write_csv(&self, path: &Path, texture_filter: Option<&Regex>) -> Result<usize> {
        let rows = self.fontdata_rows(texture_filter);
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        writer.write_record(CSV_HEADER)?;
        for row in &rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(rows.len())
    }

    /// Writes every artifact into `out_dir` and returns the written paths.
    pub fn write(&self, out_dir: &Path, options: &WriteOptions) -> Result<Vec<PathBuf>> {
        DirBuilder::new()
            .recursive(true)
            .create(out_dir)
            .with_context(|| format!("Could not create output directory '{}'", out_dir.display()))?;
        let mut written = Vec::new();

        let dump_path = out_dir.join(DUMP_FILE);
        let file = File::create(&dump_path)
            .with_context(|| format!("Could not create '{}'", dump_path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        written.push(dump_path);

        let chains_path = out_dir.join(CHAINS_FILE);
        fs::write(&chains_path, self.chain_trace())
            .with_context(|| format!("Could not write '{}'", chains_path.display()))?;
        written.push(chains_path);

        if options.csv {
            let csv_path = out_dir.join(CSV_FILE);
            let rows = self
                .write_csv(&csv_path, options.texture_filter.as_ref())
                .with_context(|| format!("Could not write '{}'", csv_path.display()))?;
            tracing::info!("Wrote {rows} font data rows");
            written.push(csv_path);
        }

        if let Some(export) = &self.texture_export {
            let texture_dir = out_dir.join(TEXTURE_DIR);
            export.write(&texture_dir)?;
            tracing::info!("Extracted {} textures", export.len());
            written.push(texture_dir);
        }

        Ok(written)
    }
}
