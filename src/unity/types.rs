#![allow(non_snake_case)]

use std::borrow::Cow;

use serde_derive::Deserialize;

#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct MonoScript {
    pub m_Name: String,
    pub m_ClassName: String,
    pub m_Namespace: String,
    pub m_AssemblyName: String,
}
impl MonoScript {
    pub fn full_name(&self) -> Cow<'_, str> {
        match self.m_Namespace.is_empty() {
            true => Cow::Borrowed(&self.m_ClassName),
            false => Cow::Owned(format!("{}.{}", self.m_Namespace, self.m_ClassName)),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Texture2D {
    pub m_Name: String,
    pub m_Width: u32,
    pub m_Height: u32,
    pub m_TextureFormat: i32,
    #[serde(rename = "image data")]
    pub image_data: Vec<u8>,
    // only present from unity 5.3 onwards
    pub m_StreamData: Option<StreamingInfo>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct StreamingInfo {
    pub offset: u64,
    pub size: u32,
    pub path: String,
}
impl StreamingInfo {
    pub fn is_empty(&self) -> bool {
        self.path.is_empty() || self.size == 0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn script_full_name() {
        let script: MonoScript = serde_json::from_value(json!({
            "m_Name": "tk2dFontData",
            "m_ClassName": "tk2dFontData",
            "m_Namespace": "",
            "m_ExecutionOrder": 0,
        }))
        .unwrap();
        assert_eq!(script.full_name(), "tk2dFontData");

        let script = MonoScript {
            m_ClassName: "tk2dFont".into(),
            m_Namespace: "tk2d".into(),
            ..Default::default()
        };
        assert_eq!(script.full_name(), "tk2d.tk2dFont");
    }

    #[test]
    fn texture_without_stream_data() {
        let texture: Texture2D = serde_json::from_value(json!({
            "m_Name": "font_exo_12",
            "m_Width": 2,
            "m_Height": 1,
            "m_TextureFormat": 4,
            "image data": [1, 2, 3, 4, 5, 6, 7, 8],
        }))
        .unwrap();
        assert_eq!(texture.image_data.len(), 8);
        assert!(texture.m_StreamData.is_none());
    }
}
