use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::{Value, json};
use tk2d_dump::classify::{Classifier, Kind, TieBreak};
use tk2d_dump::report::{CHAINS_FILE, CSV_FILE, DUMP_FILE, TEXTURE_DIR};
use tk2d_dump::texture::MANIFEST_FILE;
use tk2d_dump::{DumpOptions, MemoryObject, ObjRef, ObjectIndex, Report, WriteOptions, dump};

fn pptr(path_id: i64) -> Value {
    json!({ "m_FileID": 0, "m_PathID": path_id })
}

fn out_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tk2d-dump-test-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn material(name: &str, shader: i64, tex_envs: Value) -> Value {
    json!({
        "m_Name": name,
        "m_Shader": pptr(shader),
        "m_SavedProperties": { "m_TexEnvs": tex_envs },
    })
}

/// Two fonts sharing one material through their font data, plus noise.
fn scene() -> Vec<MemoryObject> {
    vec![
        MemoryObject::new(
            1,
            "MonoBehaviour",
            json!({ "m_Name": "font_exo_12", "m_Script": pptr(0), "data": pptr(2) }),
        ),
        MemoryObject::new(
            2,
            "MonoBehaviour",
            json!({
                "m_Name": "font_exo_12_data",
                "m_Script": pptr(0),
                "version": 1,
                "lineHeight": 12.5,
                "chars": [1, 2, 3],
                "material": pptr(42),
            }),
        ),
        MemoryObject::new(
            3,
            "MonoBehaviour",
            json!({ "m_Name": "font_exo_24", "m_Script": pptr(0), "fontData": pptr(4) }),
        ),
        MemoryObject::new(
            4,
            "MonoBehaviour",
            json!({
                "m_Name": "font_exo_24_data",
                "m_Script": pptr(0),
                "chars": { "Array": [{}, {}, {}, {}] },
                "m_Material": pptr(42),
            }),
        ),
        MemoryObject::new(
            42,
            "Material",
            material(
                "font_exo_mat",
                43,
                json!([
                    { "first": { "data": "_MainTex" }, "second": { "m_Texture2D": pptr(44) } },
                ]),
            ),
        ),
        MemoryObject::new(43, "Shader", json!({ "m_Name": "tk2d/BlendVertexColor" })),
        MemoryObject::new(
            44,
            "Texture2D",
            json!({
                "m_Name": "font_exo_atlas",
                "m_Width": 1,
                "m_Height": 1,
                "m_TextureFormat": 4,
                "image data": [255, 0, 0, 255],
            }),
        ),
        MemoryObject::unreadable(50, "MonoBehaviour"),
        MemoryObject::new(51, "MonoBehaviour", json!({ "m_Name": "Camera", "m_Script": pptr(0) })),
        // font whose font data lives in a file that was not loaded
        MemoryObject::new(
            60,
            "MonoBehaviour",
            json!({ "m_Name": "font_missing", "m_Script": pptr(0), "data": { "m_FileID": 2, "m_PathID": 900 } }),
        ),
    ]
}

fn report(options: &DumpOptions) -> Report {
    let index = ObjectIndex::new(scene());
    let analysis = dump(&index, options);
    Report::new(analysis, Path::new("level0"), &[])
}

#[test]
fn font_data_fields() {
    let report = report(&DumpOptions::default());

    let data = report.fontdatas.iter().find(|d| d.path_id == 2).unwrap();
    assert_eq!(data.version, Some(1));
    assert_eq!(data.line_height, Some(12.5));
    assert_eq!(data.chars_count, Some(3));
    assert_eq!(data.material, ObjRef::local(42));
    assert_eq!(data.matched_by, "chars");

    let wrapped = report.fontdatas.iter().find(|d| d.path_id == 4).unwrap();
    assert_eq!(wrapped.chars_count, Some(4));
    assert_eq!(wrapped.material, ObjRef::local(42));
}

#[test]
fn shared_material_is_resolved_once() {
    let report = report(&DumpOptions::default());

    assert_eq!(report.materials.len(), 1);
    let material = &report.materials[0];
    assert_eq!(material.shader_name, "tk2d/BlendVertexColor");
    assert_eq!(material.main_tex, ObjRef::local(44));

    assert_eq!(report.textures.len(), 1);
    assert_eq!(report.textures[0].name, "font_exo_atlas");
    assert_eq!(report.textures[0].image, None);
}

#[test]
fn records_are_sorted_and_unreadable_objects_skipped() {
    let report = report(&DumpOptions::default());

    let names: Vec<_> = report.fonts.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["font_exo_12", "font_exo_24", "font_missing"]);
    assert!(report.fontdatas.iter().all(|d| d.path_id != 50));
    assert_eq!(report.diagnostic.unreadable, 1);
    assert_eq!(report.diagnostic.monobehaviour_total, 7);
    assert_eq!(report.diagnostic.font_like, 3);
    assert_eq!(report.diagnostic.fontdata_like, 2);
}

#[test]
fn chain_trace() {
    let trace = report(&DumpOptions::default()).chain_trace();
    assert!(trace.contains(
        "[Font] font_exo_12 (pid=1)\n  -> FontData: font_exo_12_data (pid=2) v=1 lineHeight=12.5 chars=3\n"
    ));
    assert!(trace.contains(
        "     -> Material: font_exo_mat (pid=42) shader='tk2d/BlendVertexColor' mainTexPid=44 mainTex='font_exo_atlas'\n"
    ));
    assert!(trace.contains(
        "[Font] font_missing (pid=60)\n  -> FontData: unresolved (file=2 pid=900)\n     -> Material: unresolved (file=0 pid=0)\n"
    ));
}

#[test]
fn name_filter_limits_classification() {
    let options = DumpOptions {
        name_filter: Some(Regex::new("_24").unwrap()),
        ..Default::default()
    };
    let report = report(&options);
    assert_eq!(report.fonts.len(), 1);
    assert_eq!(report.fonts[0].name, "font_exo_24");
    assert_eq!(report.fontdatas.len(), 1);
    assert_eq!(report.fontdatas[0].path_id, 4);
    assert_eq!(report.diagnostic.name_regex.as_deref(), Some("_24"));
}

#[test]
fn prefer_font_flips_ambiguous_objects() {
    let ambiguous = vec![MemoryObject::new(
        1,
        "MonoBehaviour",
        json!({ "m_Name": "both", "chars": [], "data": pptr(2) }),
    )];
    let index = ObjectIndex::new(ambiguous);

    let analysis = dump(&index, &DumpOptions::default());
    assert_eq!((analysis.fonts.len(), analysis.font_datas.len()), (0, 1));

    let options = DumpOptions {
        classifier: Classifier::new(TieBreak::PreferFont),
        ..Default::default()
    };
    let analysis = dump(&index, &options);
    assert_eq!((analysis.fonts.len(), analysis.font_datas.len()), (1, 0));
    assert_eq!(options.classifier.tie_break(), TieBreak::PreferFont);
    assert!(options.classifier.rules().iter().any(|rule| rule.kind == Kind::Font));
}

#[test]
fn writes_all_artifacts() {
    let dir = out_dir("artifacts");
    let options = DumpOptions {
        extract_images: true,
        ..Default::default()
    };
    let report = report(&options);
    let written = report
        .write(
            &dir,
            &WriteOptions {
                csv: true,
                texture_filter: None,
            },
        )
        .unwrap();
    assert_eq!(written.len(), 4);

    let dump: Value = serde_json::from_str(&fs::read_to_string(dir.join(DUMP_FILE)).unwrap()).unwrap();
    let keys: Vec<_> = dump.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        ["source_assets", "dependencies", "diagnostic", "fonts", "fontdatas", "materials", "textures"]
    );
    assert_eq!(dump["textures"][0]["image"], "textures/font_exo_atlas.png");
    assert_eq!(dump["textures"][0]["width"], 1);
    assert_eq!(dump["fonts"][0]["effective_material"]["path_id"], 42);

    let csv = fs::read_to_string(dir.join(CSV_FILE)).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("mono_pathid,version,lineHeight,chars_count,material_pathid,material_name,shader_name,maintex_pathid,maintex_name")
    );
    assert_eq!(
        lines.next(),
        Some("2,1,12.5,3,42,font_exo_mat,tk2d/BlendVertexColor,44,font_exo_atlas")
    );
    assert_eq!(lines.next(), Some("4,,,4,42,font_exo_mat,tk2d/BlendVertexColor,44,font_exo_atlas"));

    let texture_dir = dir.join(TEXTURE_DIR);
    let image = image::open(texture_dir.join("font_exo_atlas.png")).unwrap().to_rgba8();
    assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0, 255]);
    let manifest: Value =
        serde_json::from_str(&fs::read_to_string(texture_dir.join(MANIFEST_FILE)).unwrap()).unwrap();
    assert_eq!(manifest[0]["out"], "font_exo_atlas.png");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn output_is_deterministic() {
    let first = out_dir("determinism-a");
    let second = out_dir("determinism-b");
    let options = WriteOptions {
        csv: true,
        texture_filter: None,
    };
    report(&DumpOptions::default()).write(&first, &options).unwrap();
    report(&DumpOptions::default()).write(&second, &options).unwrap();

    for file in [DUMP_FILE, CHAINS_FILE, CSV_FILE] {
        assert_eq!(
            fs::read(first.join(file)).unwrap(),
            fs::read(second.join(file)).unwrap(),
            "{file} differs between runs"
        );
    }

    let _ = fs::remove_dir_all(&first);
    let _ = fs::remove_dir_all(&second);
}

#[test]
fn undecodable_main_texture_is_recorded() {
    let index = ObjectIndex::new([
        MemoryObject::new(
            1,
            "MonoBehaviour",
            json!({ "m_Name": "font_kr_data", "m_Script": pptr(0), "chars": [1], "material": pptr(2) }),
        ),
        MemoryObject::new(
            2,
            "Material",
            material("font_kr_mat", 0, json!([["_MainTex", { "m_Texture": pptr(3) }]])),
        ),
        // ETC_RGB4 is not decoded
        MemoryObject::new(
            3,
            "Texture2D",
            json!({
                "m_Name": "font_kr_atlas",
                "m_Width": 4,
                "m_Height": 4,
                "m_TextureFormat": 34,
                "image data": [0, 0, 0, 0, 0, 0, 0, 0],
            }),
        ),
        MemoryObject::new(
            4,
            "Texture2D",
            json!({ "m_Name": "font_kr_empty", "m_Width": 4, "m_Height": 4, "m_TextureFormat": 4 }),
        ),
        MemoryObject::new(
            5,
            "MonoBehaviour",
            json!({ "m_Name": "font_kr_data_2", "m_Script": pptr(0), "chars": [], "texture": pptr(4) }),
        ),
    ]);
    let options = DumpOptions {
        extract_images: true,
        ..Default::default()
    };
    let report = Report::new(dump(&index, &options), Path::new("level0"), &[]);

    assert_eq!(report.materials.len(), 1);
    assert_eq!(report.textures.len(), 2);
    let atlas = &report.textures[0];
    assert_eq!(atlas.name, "font_kr_atlas");
    assert_eq!(atlas.image, None);
    assert_eq!(atlas.width, None);
    assert!(atlas.decode_error.as_deref().unwrap().contains("unsupported texture format 34"));
    let empty = &report.textures[1];
    assert_eq!(empty.image, None);
    assert!(empty.decode_error.as_deref().unwrap().contains("no pixel data"));

    let dir = out_dir("undecodable");
    report.write(&dir, &WriteOptions::default()).unwrap();
    let manifest: Value =
        serde_json::from_str(&fs::read_to_string(dir.join(TEXTURE_DIR).join(MANIFEST_FILE)).unwrap()).unwrap();
    let entries = manifest.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry.get("out").is_none() && entry["error"].is_string()));
    let dump: Value = serde_json::from_str(&fs::read_to_string(dir.join(DUMP_FILE)).unwrap()).unwrap();
    assert!(dump["textures"][0]["image"].is_null());
    assert!(dump["textures"][0]["decode_error"].is_string());

    let _ = fs::remove_dir_all(&dir);
}
