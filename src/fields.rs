//! Lookups over field trees whose key names drifted between tk2d and Unity versions.

use serde_json::Value;

/// Pointer from a `tk2dFont` to its `tk2dFontData`.
pub const FONT_DATA_KEYS: &[&str] = &["fontData", "data", "m_FontData", "m_fontData"];
pub const MATERIAL_KEYS: &[&str] = &["material", "m_Material", "m_material"];
pub const TEXTURE_KEYS: &[&str] = &["texture", "tex", "m_Texture"];
/// Keys that commonly appear on `tk2dFontData`.
pub const FONT_DATA_HINT_KEYS: &[&str] = &["chars", "lineHeight", "useDictionary"];

/// Property name inside a `m_TexEnvs` entry's `first`, when it is a mapping.
pub const TEX_ENV_NAME_KEYS: &[&str] = &["name", "m_Name", "data"];
/// Texture pointer inside a `m_TexEnvs` entry's `second`.
pub const TEX_ENV_TEXTURE_KEYS: &[&str] = &["m_Texture", "m_Texture2D", "texture"];

pub const MAIN_TEX: &str = "_MainTex";

/// Returns the value of the first key in `keys` that is present in `tree`.
pub fn first_present<'a>(tree: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let map = tree.as_object()?;
    keys.iter().find_map(|key| map.get(*key))
}

pub fn has_any(tree: &Value, keys: &[&str]) -> bool {
    first_present(tree, keys).is_some()
}

pub fn has_key(tree: &Value, key: &str) -> bool {
    tree.as_object().is_some_and(|map| map.contains_key(key))
}

/// Elements of a list, either plain or wrapped as `{"Array": [...]}`.
pub fn list_items(value: &Value) -> Option<&[Value]> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.get("Array")?.as_array().map(Vec::as_slice),
        _ => None,
    }
}

pub fn string_field<'a>(tree: &'a Value, key: &str) -> Option<&'a str> {
    tree.get(key)?.as_str()
}

/// `m_Name`, or the empty string if it is absent.
pub fn name_of(tree: &Value) -> String {
    string_field(tree, "m_Name").unwrap_or_default().to_owned()
}

pub fn int_field(tree: &Value, key: &str) -> Option<i64> {
    let value = tree.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_bool().map(i64::from))
        .or_else(|| value.as_f64().map(|float| float as i64))
}

pub fn float_field(tree: &Value, key: &str) -> Option<f64> {
    tree.get(key)?.as_f64()
}

/// Unity serializes bools as bytes in older versions.
pub fn bool_field(tree: &Value, key: &str) -> Option<bool> {
    let value = tree.get(key)?;
    value.as_bool().or_else(|| value.as_i64().map(|int| int != 0))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn first_present_respects_order_and_presence() {
        let tree = json!({ "m_material": 3, "material": null, "m_Material": 2 });
        assert_eq!(first_present(&tree, MATERIAL_KEYS), Some(&Value::Null));
        assert_eq!(first_present(&tree, &["m_Material", "m_material"]), Some(&json!(2)));
        assert_eq!(first_present(&tree, TEXTURE_KEYS), None);
        assert_eq!(first_present(&json!([1, 2]), TEXTURE_KEYS), None);
    }

    #[test]
    fn list_items_unwraps_array_wrapper() {
        let plain = json!([1, 2, 3]);
        let wrapped = json!({ "Array": [{}, {}, {}, {}] });
        assert_eq!(list_items(&plain).map(<[_]>::len), Some(3));
        assert_eq!(list_items(&wrapped).map(<[_]>::len), Some(4));
        assert_eq!(list_items(&json!({ "size": 4 })), None);
        assert_eq!(list_items(&json!(4)), None);
    }

    #[test]
    fn scalar_fields() {
        let tree = json!({
            "m_Name": "font_exo_12",
            "version": 1,
            "lineHeight": 12.5,
            "useDictionary": 0,
            "flag": true,
        });
        assert_eq!(name_of(&tree), "font_exo_12");
        assert_eq!(name_of(&json!({})), "");
        assert_eq!(int_field(&tree, "version"), Some(1));
        assert_eq!(int_field(&tree, "flag"), Some(1));
        assert_eq!(float_field(&tree, "lineHeight"), Some(12.5));
        assert_eq!(bool_field(&tree, "useDictionary"), Some(false));
        assert_eq!(bool_field(&tree, "flag"), Some(true));
        assert_eq!(int_field(&tree, "missing"), None);
    }
}
