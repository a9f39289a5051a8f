use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::json;
use tk2d_dump::{DumpOptions, MemoryObject, ObjectIndex, dump};

/// `fonts` font / font data pairs sharing a handful of materials, plus unrelated behaviours.
fn synthetic_scene(fonts: i64) -> Vec<MemoryObject> {
    let pptr = |path_id: i64| json!({ "m_FileID": 0, "m_PathID": path_id });
    let mut objects = Vec::new();

    for material in 0..8 {
        let path_id = 1_000_000 + material;
        objects.push(MemoryObject::new(
            path_id,
            "Material",
            json!({
                "m_Name": format!("font_mat_{material}"),
                "m_Shader": pptr(2_000_000),
                "m_SavedProperties": { "m_TexEnvs": [
                    { "first": { "name": "_MainTex" }, "second": { "m_Texture": pptr(path_id + 1000) } },
                ] },
            }),
        ));
        objects.push(MemoryObject::new(
            path_id + 1000,
            "Texture2D",
            json!({ "m_Name": format!("font_exo_{material}") }),
        ));
    }
    objects.push(MemoryObject::new(2_000_000, "Shader", json!({ "m_Name": "tk2d/BlendVertexColor" })));

    for font in 0..fonts {
        let font_id = 10 + font * 3;
        objects.push(MemoryObject::new(
            font_id,
            "MonoBehaviour",
            json!({ "m_Name": format!("font_{font}"), "m_Script": pptr(0), "data": pptr(font_id + 1) }),
        ));
        objects.push(MemoryObject::new(
            font_id + 1,
            "MonoBehaviour",
            json!({
                "m_Name": format!("font_{font}_data"),
                "m_Script": pptr(0),
                "lineHeight": 12.0,
                "chars": vec![json!({ "id": 65, "x": 0, "y": 0 }); 96],
                "material": pptr(1_000_000 + font % 8),
            }),
        ));
        objects.push(MemoryObject::new(
            font_id + 2,
            "MonoBehaviour",
            json!({ "m_Name": "Camera", "m_Script": pptr(0), "m_Enabled": 1 }),
        ));
    }
    objects
}

fn dump_scene(c: &mut Criterion) {
    let index = ObjectIndex::new(synthetic_scene(200));
    let options = DumpOptions::default();

    c.bench_function("dump 200 fonts", |b| {
        b.iter(|| black_box(dump(&index, &options)));
    });
}

fn build_index(c: &mut Criterion) {
    let objects = synthetic_scene(200);
    c.bench_function("index 200 fonts", |b| {
        b.iter(|| black_box(ObjectIndex::new(objects.iter().cloned())));
    });
}

criterion_group!(benches, dump_scene, build_index);
criterion_main!(benches);
